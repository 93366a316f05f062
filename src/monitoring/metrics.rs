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

use prometheus::{IntCounter, IntGauge, Registry};
use thiserror::Error;

/// Metrics errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus")]
    Prom,
}

/// Metrics container.
#[derive(Clone)]
pub struct Metrics {
    /// Registry.
    pub registry: Registry,

    /// Live encrypted sessions gauge.
    pub sessions: IntGauge,
    /// Frames sent.
    pub frames_sent_total: IntCounter,
    /// Frames received.
    pub frames_received_total: IntCounter,

    /// Handshake failures.
    pub handshake_failures_total: IntCounter,
    /// Fatal decrypt failures.
    pub decrypt_failures_total: IntCounter,
    /// LRU cache evictions.
    pub cache_evictions_total: IntCounter,
    /// Stream payloads dropped on queue overflow.
    pub stream_payloads_dropped_total: IntCounter,
    /// Events dropped on a full event queue.
    pub events_dropped_total: IntCounter,
    /// Envelopes rejected by verification or trust gating.
    pub envelopes_rejected_total: IntCounter,
}

impl Metrics {
    /// Create and register metrics.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let sessions = IntGauge::new("valhalla_sessions", "Live encrypted sessions")
            .map_err(|_| MetricsError::Prom)?;
        let frames_sent_total = IntCounter::new("valhalla_frames_sent_total", "Frames sent")
            .map_err(|_| MetricsError::Prom)?;
        let frames_received_total =
            IntCounter::new("valhalla_frames_received_total", "Frames received")
                .map_err(|_| MetricsError::Prom)?;

        let handshake_failures_total =
            IntCounter::new("valhalla_handshake_failures_total", "Handshake failures")
                .map_err(|_| MetricsError::Prom)?;
        let decrypt_failures_total =
            IntCounter::new("valhalla_decrypt_failures_total", "Fatal decrypt failures")
                .map_err(|_| MetricsError::Prom)?;
        let cache_evictions_total =
            IntCounter::new("valhalla_cache_evictions_total", "LRU cache evictions")
                .map_err(|_| MetricsError::Prom)?;
        let stream_payloads_dropped_total = IntCounter::new(
            "valhalla_stream_payloads_dropped_total",
            "Stream payloads dropped on queue overflow",
        )
        .map_err(|_| MetricsError::Prom)?;
        let events_dropped_total = IntCounter::new(
            "valhalla_events_dropped_total",
            "Events dropped on a full event queue",
        )
        .map_err(|_| MetricsError::Prom)?;
        let envelopes_rejected_total = IntCounter::new(
            "valhalla_envelopes_rejected_total",
            "Envelopes rejected by verification or trust gating",
        )
        .map_err(|_| MetricsError::Prom)?;

        registry
            .register(Box::new(sessions.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(frames_sent_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(frames_received_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(handshake_failures_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(decrypt_failures_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(cache_evictions_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(stream_payloads_dropped_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(events_dropped_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(envelopes_rejected_total.clone()))
            .map_err(|_| MetricsError::Prom)?;

        Ok(Self {
            registry,
            sessions,
            frames_sent_total,
            frames_received_total,
            handshake_failures_total,
            decrypt_failures_total,
            cache_evictions_total,
            stream_payloads_dropped_total,
            events_dropped_total,
            envelopes_rejected_total,
        })
    }
}
