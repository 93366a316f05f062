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

//! Node identity: Ed25519 keypair with a file-backed store.
//!
//! The identifier is `SHA-256(public_key)`. Key material lives in
//! `data_dir/identity.key` as PKCS#8, written atomically with 0600
//! permissions.

use ring::{
    rand::SystemRandom,
    signature::{Ed25519KeyPair, KeyPair, UnparsedPublicKey, ED25519},
};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use thiserror::Error;
use zeroize::Zeroize;

use crate::core::types::NodeId;

/// Identity key file name inside the data directory.
pub const IDENTITY_KEY_FILE: &str = "identity.key";

/// Identity errors.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("io")]
    Io,
    #[error("invalid key encoding")]
    InvalidKey,
    #[error("bad signature")]
    BadSignature,
    #[error("keygen")]
    Keygen,
}

/// A node's Ed25519 identity.
pub struct Identity {
    keypair: Ed25519KeyPair,
    public: [u8; 32],
    node_id: NodeId,
}

fn set_private_perms_best_effort(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }
}

/// Atomic write to disk (best-effort fsync, then rename).
fn atomic_write_private(path: &Path, bytes: &[u8]) -> Result<(), IdentityError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|_| IdentityError::Io)?;
    }

    let mut tmp = path.to_path_buf();
    tmp.set_extension("tmp");

    {
        let mut f = fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&tmp)
            .map_err(|_| IdentityError::Io)?;
        f.write_all(bytes).map_err(|_| IdentityError::Io)?;
        let _ = f.sync_all();
    }

    set_private_perms_best_effort(&tmp);
    fs::rename(&tmp, path).map_err(|_| IdentityError::Io)?;
    set_private_perms_best_effort(path);
    Ok(())
}

impl Identity {
    fn from_keypair(keypair: Ed25519KeyPair) -> Self {
        let pk = keypair.public_key().as_ref();
        let mut public = [0u8; 32];
        public.copy_from_slice(pk);
        let node_id = NodeId::from_public_key(&public);
        Self {
            keypair,
            public,
            node_id,
        }
    }

    /// Generate a fresh in-memory identity (not persisted).
    pub fn generate() -> Result<Self, IdentityError> {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).map_err(|_| IdentityError::Keygen)?;
        let kp = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).map_err(|_| IdentityError::InvalidKey)?;
        Ok(Self::from_keypair(kp))
    }

    /// Load `data_dir/identity.key`, or create and persist a new identity.
    pub fn load_or_create(data_dir: impl AsRef<Path>) -> Result<Self, IdentityError> {
        let path: PathBuf = data_dir.as_ref().join(IDENTITY_KEY_FILE);

        if path.exists() {
            let mut bytes = fs::read(&path).map_err(|_| IdentityError::Io)?;
            let kp = Ed25519KeyPair::from_pkcs8(&bytes).map_err(|_| IdentityError::InvalidKey)?;
            bytes.zeroize();
            return Ok(Self::from_keypair(kp));
        }

        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).map_err(|_| IdentityError::Keygen)?;
        atomic_write_private(&path, pkcs8.as_ref())?;

        let kp = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).map_err(|_| IdentityError::InvalidKey)?;
        Ok(Self::from_keypair(kp))
    }

    /// This identity's node identifier.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Ed25519 public key bytes.
    pub fn public_key(&self) -> [u8; 32] {
        self.public
    }

    /// Sign message bytes (64-byte Ed25519 signature).
    pub fn sign(&self, msg: &[u8]) -> Vec<u8> {
        self.keypair.sign(msg).as_ref().to_vec()
    }
}

/// Verify a signature given raw Ed25519 public key bytes.
pub fn verify_signature(pk: &[u8; 32], msg: &[u8], sig: &[u8]) -> Result<(), IdentityError> {
    if sig.len() != 64 {
        return Err(IdentityError::BadSignature);
    }
    let pk = UnparsedPublicKey::new(&ED25519, pk);
    pk.verify(msg, sig).map_err(|_| IdentityError::BadSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_persists_across_loads() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = Identity::load_or_create(dir.path()).expect("create");
        let b = Identity::load_or_create(dir.path()).expect("reload");
        assert_eq!(a.node_id(), b.node_id());
        assert_eq!(a.public_key(), b.public_key());
    }

    #[test]
    fn sign_verify_roundtrip() {
        let id = Identity::generate().expect("generate");
        let sig = id.sign(b"midgard");
        verify_signature(&id.public_key(), b"midgard", &sig).expect("verify");
        assert!(verify_signature(&id.public_key(), b"asgard", &sig).is_err());
    }
}
