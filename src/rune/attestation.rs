// Copyright (c) 2026 Valhalla
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Signed attestations and the subject-indexed store.
//!
//! Signed byte sequence (bit-exact):
//!
//! ```text
//! hex(subject) ":" hex(attester) ":" claim ":" confidence ":" expires_ms ":" created_at_ms
//! ```
//!
//! with the confidence printed with exactly six fractional digits
//! (`0.900000`). Only verified attestations are stored; expiry is enforced
//! at read time, so no active garbage collection is required.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::core::identity::{verify_signature, Identity};
use crate::core::types::NodeId;
use crate::rune::RuneError;

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A signed claim one node makes about another.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attestation {
    /// Node the claim is about.
    pub subject: NodeId,
    /// Node making the claim.
    pub attester: NodeId,
    /// Attester Ed25519 public key.
    pub attester_pk: [u8; 32],
    /// Free-form claim string.
    pub claim: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Expiry, milliseconds since UNIX epoch.
    pub expires_ms: u64,
    /// Creation time, milliseconds since UNIX epoch.
    pub created_at_ms: u64,
    /// Ed25519 signature over the signed byte sequence.
    pub signature: Vec<u8>,
}

impl Attestation {
    /// The exact byte sequence the signature covers.
    pub fn signing_bytes(&self) -> Vec<u8> {
        format!(
            "{}:{}:{}:{:.6}:{}:{}",
            hex::encode(self.subject.as_bytes()),
            hex::encode(self.attester.as_bytes()),
            self.claim,
            self.confidence,
            self.expires_ms,
            self.created_at_ms
        )
        .into_bytes()
    }

    /// Sign a claim about `subject`, valid for `ttl_ms`.
    pub fn seal(
        identity: &Identity,
        subject: NodeId,
        claim: impl Into<String>,
        confidence: f64,
        ttl_ms: u64,
    ) -> Result<Attestation, RuneError> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(RuneError::ConfidenceOutOfRange);
        }
        let created_at_ms = now_ms();
        let mut attestation = Attestation {
            subject,
            attester: identity.node_id(),
            attester_pk: identity.public_key(),
            claim: claim.into(),
            confidence,
            expires_ms: created_at_ms.saturating_add(ttl_ms),
            created_at_ms,
            signature: Vec::new(),
        };
        attestation.signature = identity.sign(&attestation.signing_bytes());
        Ok(attestation)
    }

    /// Verify every attestation invariant at time `now_ms`.
    pub fn verify(&self, now_ms: u64) -> Result<(), RuneError> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(RuneError::ConfidenceOutOfRange);
        }
        if now_ms > self.expires_ms {
            return Err(RuneError::Expired);
        }
        if NodeId::from_public_key(&self.attester_pk) != self.attester {
            return Err(RuneError::SignerMismatch);
        }
        verify_signature(&self.attester_pk, &self.signing_bytes(), &self.signature)
            .map_err(|_| RuneError::BadSignature)
    }
}

/// Subject-indexed store of verified attestations.
#[derive(Default)]
pub struct AttestationStore {
    by_subject: RwLock<HashMap<NodeId, Vec<Attestation>>>,
}

impl AttestationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Verify and store an attestation. Unverified attestations are
    /// rejected, never stored.
    pub fn add(&self, attestation: Attestation) -> Result<(), RuneError> {
        attestation.verify(now_ms())?;
        let mut by_subject = match self.by_subject.write() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        by_subject
            .entry(attestation.subject)
            .or_default()
            .push(attestation);
        Ok(())
    }

    /// Attestations about `subject`, excluding any past expiry.
    pub fn get_by_subject(&self, subject: &NodeId) -> Vec<Attestation> {
        let now = now_ms();
        let by_subject = match self.by_subject.read() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        by_subject
            .get(subject)
            .map(|atts| {
                atts.iter()
                    .filter(|a| now <= a.expires_ms)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Unexpired attestations made *by* `attester`, across all subjects.
    ///
    /// Full scan of the subject index; the trust walk expands only through
    /// edges the current node actually attested.
    pub fn attestations_by(&self, attester: &NodeId) -> Vec<Attestation> {
        let now = now_ms();
        let by_subject = match self.by_subject.read() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        by_subject
            .values()
            .flatten()
            .filter(|a| &a.attester == attester && now <= a.expires_ms)
            .cloned()
            .collect()
    }

    /// Number of stored attestations (including expired, which are filtered
    /// on read).
    pub fn len(&self) -> usize {
        let by_subject = match self.by_subject.read() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        by_subject.values().map(|v| v.len()).sum()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
