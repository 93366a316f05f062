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

//! Valhalla - a layered post-IP overlay networking stack (research PoC).
//!
//! This repository provides:
//! - Framed transport over TCP and WebSocket with a binary wire codec (Bifrost)
//! - Noise XX encrypted sessions with in-session stream multiplexing (Veil)
//! - Key-derived node identities and an XOR-metric peer table (Yggdrasil)
//! - Signed content envelopes, an LRU content cache and a service registry (Saga)
//! - Signed attestations, capability tokens and transitive trust scoring (Rune)
//! - Monitoring via Prometheus metrics and a bounded, drop-on-full event stream

/// Bifrost: framed transport layer (codec + TCP/WebSocket transports).
pub mod bifrost;
/// Core protocol primitives (shared types, identity, configuration).
pub mod core;
/// Observability (metrics, event stream).
pub mod monitoring;
/// Node composition: wires the subsystems into a running overlay node.
pub mod node;
/// Rune: trust and authorization layer (attestations, capabilities, trust).
pub mod rune;
/// Saga: content-addressed layer (envelopes, cache, registry, intents).
pub mod saga;
/// Veil: encrypted-session and stream-multiplex layer (Noise XX).
pub mod veil;
/// Yggdrasil: peer identity space and XOR-metric peer table.
pub mod yggdrasil;
