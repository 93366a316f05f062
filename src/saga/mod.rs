#![forbid(unsafe_code)]

//! Saga: content envelopes, content-addressed cache, service registry,
//! intent messages.

pub mod cache;
pub mod envelope;
pub mod intent;
pub mod registry;

use thiserror::Error;

/// Saga errors.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Envelope CID does not match its data.
    #[error("content id mismatch")]
    CidMismatch,
    /// Envelope signature does not verify.
    #[error("bad signature")]
    BadSignature,
    /// Declared publisher does not match the public key.
    #[error("publisher does not match public key")]
    PublisherMismatch,
    /// Canonical encoding failure.
    #[error("codec")]
    Codec,
}
