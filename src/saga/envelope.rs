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

//! Signed content envelopes.
//!
//! An envelope binds payload bytes to a content identifier, a publisher
//! identity, and an Ed25519 signature over `cid || data`. Envelopes are
//! immutable once sealed; any mutation requires re-signing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::core::identity::{verify_signature, Identity};
use crate::core::types::{decode_canonical_limited, encode_canonical, ContentId, NodeId};
use crate::saga::SagaError;

/// Wire size cap for an encoded envelope (payload cap plus headroom).
pub const MAX_ENVELOPE_WIRE_LEN: usize = 16 * 1024 * 1024 + 4096;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A signed, content-addressed blob.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentEnvelope {
    /// Content identifier of `data`.
    pub cid: ContentId,
    /// Payload bytes.
    pub data: Vec<u8>,
    /// Publisher identity (must match `public_key`).
    pub publisher: NodeId,
    /// Publisher Ed25519 public key.
    pub public_key: [u8; 32],
    /// Signature over `cid || data`.
    pub signature: Vec<u8>,
    /// Free-form metadata.
    pub metadata: BTreeMap<String, String>,
    /// Creation time, milliseconds since UNIX epoch.
    pub created_at_ms: u64,
}

fn signing_bytes(cid: &ContentId, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(34 + data.len());
    out.extend_from_slice(cid.as_bytes());
    out.extend_from_slice(data);
    out
}

impl ContentEnvelope {
    /// Hash, sign, and seal payload bytes into an envelope.
    pub fn seal(
        identity: &Identity,
        data: Vec<u8>,
        metadata: BTreeMap<String, String>,
    ) -> ContentEnvelope {
        let cid = ContentId::compute(&data);
        let signature = identity.sign(&signing_bytes(&cid, &data));
        ContentEnvelope {
            cid,
            data,
            publisher: identity.node_id(),
            public_key: identity.public_key(),
            signature,
            metadata,
            created_at_ms: now_ms(),
        }
    }

    /// Verify every envelope invariant.
    ///
    /// The CID must match the data, the publisher must match the public key,
    /// and the signature must verify. Failures are always surfaced; an
    /// unverified envelope is never admitted anywhere.
    pub fn verify(&self) -> Result<(), SagaError> {
        if ContentId::compute(&self.data) != self.cid {
            return Err(SagaError::CidMismatch);
        }
        if NodeId::from_public_key(&self.public_key) != self.publisher {
            return Err(SagaError::PublisherMismatch);
        }
        verify_signature(
            &self.public_key,
            &signing_bytes(&self.cid, &self.data),
            &self.signature,
        )
        .map_err(|_| SagaError::BadSignature)
    }

    /// Canonical wire encoding.
    pub fn to_wire(&self) -> Result<Vec<u8>, SagaError> {
        encode_canonical(self).map_err(|_| SagaError::Codec)
    }

    /// Decode from the canonical wire encoding. Does not verify.
    pub fn from_wire(bytes: &[u8]) -> Result<ContentEnvelope, SagaError> {
        decode_canonical_limited(bytes, MAX_ENVELOPE_WIRE_LEN).map_err(|_| SagaError::Codec)
    }
}
