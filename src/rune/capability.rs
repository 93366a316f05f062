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

//! Capability tokens.
//!
//! Signed byte sequence:
//!
//! ```text
//! hex(issuer) ":" hex(holder) ":" resource ":" ("true"|"false") ":" expires_ms ":" created_at_ms [":" action]*
//! ```
//!
//! Action order is part of the signed form. Delegation is represented only
//! by the `delegatable` flag; delegation chains are out of scope.

use serde::{Deserialize, Serialize};

use crate::core::identity::{verify_signature, Identity};
use crate::core::types::NodeId;
use crate::rune::attestation::now_ms;
use crate::rune::RuneError;

/// A signed token binding a holder to allowed actions on a resource.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    /// Issuing node.
    pub issuer: NodeId,
    /// Issuer Ed25519 public key.
    pub issuer_pk: [u8; 32],
    /// Node the token is granted to.
    pub holder: NodeId,
    /// Resource pattern, e.g. `/photos/*`.
    pub resource: String,
    /// Allowed actions, in signed order.
    pub actions: Vec<String>,
    /// Whether the holder may delegate (flag only).
    pub delegatable: bool,
    /// Expiry, milliseconds since UNIX epoch.
    pub expires_ms: u64,
    /// Creation time, milliseconds since UNIX epoch.
    pub created_at_ms: u64,
    /// Ed25519 signature over the signed byte sequence.
    pub signature: Vec<u8>,
}

impl Capability {
    /// The exact byte sequence the signature covers.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut out = format!(
            "{}:{}:{}:{}:{}:{}",
            hex::encode(self.issuer.as_bytes()),
            hex::encode(self.holder.as_bytes()),
            self.resource,
            self.delegatable,
            self.expires_ms,
            self.created_at_ms
        );
        for action in &self.actions {
            out.push(':');
            out.push_str(action);
        }
        out.into_bytes()
    }

    /// Issue a capability to `holder`, valid for `ttl_ms`.
    pub fn grant(
        identity: &Identity,
        holder: NodeId,
        resource: impl Into<String>,
        actions: Vec<String>,
        delegatable: bool,
        ttl_ms: u64,
    ) -> Capability {
        let created_at_ms = now_ms();
        let mut capability = Capability {
            issuer: identity.node_id(),
            issuer_pk: identity.public_key(),
            holder,
            resource: resource.into(),
            actions,
            delegatable,
            expires_ms: created_at_ms.saturating_add(ttl_ms),
            created_at_ms,
            signature: Vec::new(),
        };
        capability.signature = identity.sign(&capability.signing_bytes());
        capability
    }

    /// Verify signature, expiry, and issuer binding at time `now_ms`.
    pub fn verify(&self, now_ms: u64) -> Result<(), RuneError> {
        if now_ms > self.expires_ms {
            return Err(RuneError::Expired);
        }
        if NodeId::from_public_key(&self.issuer_pk) != self.issuer {
            return Err(RuneError::SignerMismatch);
        }
        verify_signature(&self.issuer_pk, &self.signing_bytes(), &self.signature)
            .map_err(|_| RuneError::BadSignature)
    }

    /// Whether `requester` may perform `action` now.
    ///
    /// Succeeds iff the token verifies, the requester is the holder, and
    /// the action appears in the granted list.
    pub fn check_action(&self, requester: &NodeId, action: &str) -> Result<(), RuneError> {
        self.verify(now_ms())?;
        if requester != &self.holder {
            return Err(RuneError::WrongHolder);
        }
        if !self.actions.iter().any(|a| a == action) {
            return Err(RuneError::ActionNotGranted);
        }
        Ok(())
    }
}
