#![forbid(unsafe_code)]

//! Bifrost: framed transport layer.
//!
//! The codec is transport-agnostic; TCP and WebSocket transports carry the
//! same frames and pass the same behavioral suite.

pub mod codec;
pub mod tcp;
pub mod transport;
pub mod ws;
