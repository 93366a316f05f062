#![forbid(unsafe_code)]

//! Veil: Noise-XX encrypted sessions and stream multiplexing.

pub mod handshake;
pub mod mux;
pub mod session;

use thiserror::Error;

/// Veil errors.
#[derive(Debug, Error)]
pub enum VeilError {
    /// Noise protocol failure.
    #[error("noise: {0}")]
    Noise(#[from] snow::Error),
    /// Message does not fit the 16-bit length prefix.
    #[error("message too large")]
    MessageTooLarge,
    /// Decrypt failed; the session is terminated and must not be reused.
    #[error("decrypt failed")]
    Decrypt,
    /// Session closed.
    #[error("session closed")]
    Closed,
    /// Stream closed.
    #[error("stream closed")]
    StreamClosed,
    /// Peer sent no static key during the handshake.
    #[error("missing remote static key")]
    NoRemoteKey,
    /// Underlying I/O failure.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
