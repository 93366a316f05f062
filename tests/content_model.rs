// Copyright (c) 2026 Valhalla
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

use proptest::prelude::*;
use std::collections::BTreeMap;

use valhalla::core::identity::Identity;
use valhalla::core::types::{ContentId, NodeId, MULTIHASH_SHA2_256, MULTIHASH_SHA2_256_LEN};
use valhalla::saga::envelope::ContentEnvelope;

proptest! {
    #[test]
    fn content_id_is_self_describing_sha256(data in proptest::collection::vec(any::<u8>(), 0..1024)) {
        let cid = ContentId::compute(&data);
        let bytes = cid.as_bytes();
        prop_assert_eq!(bytes[0], MULTIHASH_SHA2_256);
        prop_assert_eq!(bytes[1], MULTIHASH_SHA2_256_LEN);
        let digest = ring::digest::digest(&ring::digest::SHA256, &data);
        prop_assert_eq!(&bytes[2..], digest.as_ref());
    }

    #[test]
    fn content_id_hex_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..256)) {
        let cid = ContentId::compute(&data);
        let hex_form = cid.to_string();
        prop_assert_eq!(hex_form.len(), 68);
        prop_assert_eq!(ContentId::parse(&hex_form).expect("parse"), cid);
    }

    #[test]
    fn node_id_string_roundtrip(bytes in any::<[u8; 32]>()) {
        let id = NodeId::from_bytes(bytes);
        let rendered = id.to_string();
        prop_assert!(rendered.starts_with("VH"));
        prop_assert_eq!(NodeId::parse(&rendered).expect("parse"), id);
    }

    #[test]
    fn xor_distance_is_symmetric_and_reflexively_zero(a in any::<[u8; 32]>(), b in any::<[u8; 32]>()) {
        let (a, b) = (NodeId::from_bytes(a), NodeId::from_bytes(b));
        prop_assert_eq!(a.xor_distance(&b), b.xor_distance(&a));
        prop_assert_eq!(a.xor_distance(&a), NodeId::from_bytes([0u8; 32]));
    }
}

#[test]
fn all_zero_node_id_renders_as_vh1() {
    let zero = NodeId::from_bytes([0u8; 32]);
    assert_eq!(zero.to_string(), "VH1");
    assert_eq!(NodeId::parse("VH1").expect("parse"), zero);
}

#[test]
fn short_forms_truncate() {
    let identity = Identity::generate().expect("identity");
    let short = identity.node_id().short();
    assert!(short.starts_with("VH"));
    assert!(short.ends_with("..."));
    assert_eq!(short.len(), 2 + 8 + 3);

    let cid = ContentId::compute(b"bifrost");
    let short = cid.short();
    assert!(short.ends_with("..."));
    assert_eq!(short.len(), 12 + 3);
}

#[test]
fn node_id_parse_rejects_garbage() {
    assert!(NodeId::parse("QmNoPrefix").is_err());
    assert!(NodeId::parse("VH0OIl").is_err());
    // 33 bytes of 0xff does not fit a 32-byte identifier.
    let too_long = format!("VH{}", bs58::encode(vec![0xffu8; 33]).into_string());
    assert!(NodeId::parse(&too_long).is_err());
}

#[test]
fn fresh_envelope_verifies() {
    let identity = Identity::generate().expect("identity");
    let mut metadata = BTreeMap::new();
    metadata.insert("kind".to_string(), "verse".to_string());
    let envelope = ContentEnvelope::seal(&identity, b"nine realms".to_vec(), metadata);

    envelope.verify().expect("fresh envelope verifies");
    assert_eq!(envelope.cid, ContentId::compute(b"nine realms"));
    assert_eq!(envelope.publisher, identity.node_id());
}

#[test]
fn mutated_envelopes_fail_verification() {
    let identity = Identity::generate().expect("identity");
    let other = Identity::generate().expect("other identity");
    let envelope = ContentEnvelope::seal(&identity, b"nine realms".to_vec(), BTreeMap::new());

    let mut tampered = envelope.clone();
    tampered.data = b"eight realms".to_vec();
    assert!(tampered.verify().is_err());

    let mut tampered = envelope.clone();
    tampered.public_key = other.public_key();
    assert!(tampered.verify().is_err());

    let mut tampered = envelope.clone();
    tampered.signature[0] ^= 0x01;
    assert!(tampered.verify().is_err());

    let mut tampered = envelope.clone();
    tampered.publisher = other.node_id();
    assert!(tampered.verify().is_err());
}

#[test]
fn envelope_wire_roundtrip_preserves_verification() {
    let identity = Identity::generate().expect("identity");
    let mut metadata = BTreeMap::new();
    metadata.insert("lang".to_string(), "old-norse".to_string());
    let envelope = ContentEnvelope::seal(&identity, vec![0u8; 4096], metadata);

    let wire = envelope.to_wire().expect("encode");
    let back = ContentEnvelope::from_wire(&wire).expect("decode");
    assert_eq!(back, envelope);
    back.verify().expect("decoded envelope verifies");
}
