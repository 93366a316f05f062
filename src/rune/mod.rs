#![forbid(unsafe_code)]

//! Rune: signed attestations, capability tokens, transitive trust.

pub mod attestation;
pub mod capability;
pub mod trust;

use thiserror::Error;

/// Rune errors.
#[derive(Debug, Error)]
pub enum RuneError {
    /// Signature does not verify.
    #[error("bad signature")]
    BadSignature,
    /// Artifact is past its expiry.
    #[error("expired")]
    Expired,
    /// Confidence outside `[0, 1]`.
    #[error("confidence out of range")]
    ConfidenceOutOfRange,
    /// Declared signer does not match the public key.
    #[error("signer does not match public key")]
    SignerMismatch,
    /// Capability presented by a node that does not hold it.
    #[error("wrong holder")]
    WrongHolder,
    /// Action not contained in the capability's action list.
    #[error("action not granted")]
    ActionNotGranted,
}
