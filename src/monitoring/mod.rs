#![forbid(unsafe_code)]

//! Observability: Prometheus metrics and the bounded event stream.

pub mod events;
pub mod metrics;
