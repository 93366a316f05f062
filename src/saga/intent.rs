// Copyright (c) 2026 Valhalla
// Licensed under the Apache License, Version 2.0

//! Intent messages: what a node wants from a peer.
//!
//! Intents travel as the first payload on a multiplexed stream (or inside a
//! DATA frame on unencrypted links). The canonical encoding is
//! deterministic bincode with a hard size cap.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::core::types::{
    decode_canonical_limited, encode_canonical, CodecError, ContentId, IntentKind, NodeId,
};

/// Wire size cap for an encoded intent.
pub const MAX_INTENT_WIRE_LEN: usize = 64 * 1024;

/// A request carried over a stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentMessage {
    /// What the sender wants.
    pub kind: IntentKind,
    /// Sender identity.
    pub origin: NodeId,
    /// Target content, for FETCH/STORE.
    pub cid: Option<ContentId>,
    /// Target service name, for ANNOUNCE/RESOLVE.
    pub service: Option<String>,
    /// Creation time, milliseconds since UNIX epoch.
    pub created_at_ms: u64,
}

impl IntentMessage {
    /// Construct an intent stamped with the current time.
    pub fn new(kind: IntentKind, origin: NodeId) -> Self {
        let created_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self {
            kind,
            origin,
            cid: None,
            service: None,
            created_at_ms,
        }
    }

    /// FETCH intent for a content identifier.
    pub fn fetch(origin: NodeId, cid: ContentId) -> Self {
        let mut intent = Self::new(IntentKind::Fetch, origin);
        intent.cid = Some(cid);
        intent
    }

    /// STORE intent offering a content identifier.
    pub fn store(origin: NodeId, cid: ContentId) -> Self {
        let mut intent = Self::new(IntentKind::Store, origin);
        intent.cid = Some(cid);
        intent
    }

    /// ANNOUNCE intent for a service name.
    pub fn announce(origin: NodeId, service: String) -> Self {
        let mut intent = Self::new(IntentKind::Announce, origin);
        intent.service = Some(service);
        intent
    }

    /// RESOLVE intent for a service name.
    pub fn resolve(origin: NodeId, service: String) -> Self {
        let mut intent = Self::new(IntentKind::Resolve, origin);
        intent.service = Some(service);
        intent
    }

    /// Canonical wire encoding.
    pub fn to_wire(&self) -> Result<Vec<u8>, CodecError> {
        encode_canonical(self)
    }

    /// Decode from the canonical wire encoding.
    pub fn from_wire(bytes: &[u8]) -> Result<IntentMessage, CodecError> {
        decode_canonical_limited(bytes, MAX_INTENT_WIRE_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::Identity;

    #[test]
    fn intent_wire_roundtrip() {
        let id = Identity::generate().expect("identity");
        let cid = ContentId::compute(b"yggdrasil root");
        let intent = IntentMessage::fetch(id.node_id(), cid);
        let wire = intent.to_wire().expect("encode");
        let back = IntentMessage::from_wire(&wire).expect("decode");
        assert_eq!(intent, back);
    }

    #[test]
    fn intent_rejects_oversize() {
        let id = Identity::generate().expect("identity");
        let mut intent = IntentMessage::resolve(id.node_id(), String::new());
        intent.service = Some("x".repeat(MAX_INTENT_WIRE_LEN));
        let wire = intent.to_wire().expect("encode");
        assert!(IntentMessage::from_wire(&wire).is_err());
    }
}
