// Copyright (c) 2026 Valhalla
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

use valhalla::core::identity::Identity;
use valhalla::rune::attestation::{Attestation, AttestationStore};
use valhalla::rune::capability::Capability;
use valhalla::rune::trust::{compute_trust, MAX_TRUST_DEPTH, TRUST_DECAY};
use valhalla::rune::RuneError;

const HOUR_MS: u64 = 60 * 60 * 1000;

#[test]
fn verified_attestation_is_stored_and_readable() {
    let alice = Identity::generate().expect("alice");
    let bob = Identity::generate().expect("bob");
    let store = AttestationStore::new();

    let attestation =
        Attestation::seal(&alice, bob.node_id(), "is-trusted", 0.9, HOUR_MS).expect("seal");
    store.add(attestation.clone()).expect("verified add");

    let about_bob = store.get_by_subject(&bob.node_id());
    assert_eq!(about_bob, vec![attestation]);
}

#[test]
fn tampered_attestations_are_rejected_and_never_stored() {
    let alice = Identity::generate().expect("alice");
    let bob = Identity::generate().expect("bob");
    let store = AttestationStore::new();

    let attestation =
        Attestation::seal(&alice, bob.node_id(), "is-trusted", 0.9, HOUR_MS).expect("seal");

    let mut tampered = attestation.clone();
    tampered.claim = "is-infallible".to_string();
    assert!(store.add(tampered).is_err());

    let mut tampered = attestation.clone();
    tampered.confidence = 0.4;
    assert!(store.add(tampered).is_err());

    let mut tampered = attestation.clone();
    tampered.subject = alice.node_id();
    assert!(store.add(tampered).is_err());

    let mut tampered = attestation.clone();
    tampered.expires_ms += 1;
    assert!(store.add(tampered).is_err());

    let mut tampered = attestation.clone();
    tampered.signature[10] ^= 0x01;
    assert!(store.add(tampered).is_err());

    let mut tampered = attestation.clone();
    tampered.attester_pk = bob.public_key();
    assert!(matches!(
        store.add(tampered),
        Err(RuneError::SignerMismatch)
    ));

    assert!(store.is_empty());
}

#[test]
fn out_of_range_confidence_is_rejected() {
    let alice = Identity::generate().expect("alice");
    let bob = Identity::generate().expect("bob");
    assert!(matches!(
        Attestation::seal(&alice, bob.node_id(), "c", 1.5, HOUR_MS),
        Err(RuneError::ConfidenceOutOfRange)
    ));
    assert!(matches!(
        Attestation::seal(&alice, bob.node_id(), "c", -0.1, HOUR_MS),
        Err(RuneError::ConfidenceOutOfRange)
    ));
}

#[test]
fn expiry_is_enforced_at_read_time() {
    let alice = Identity::generate().expect("alice");
    let bob = Identity::generate().expect("bob");
    let store = AttestationStore::new();

    let short_lived =
        Attestation::seal(&alice, bob.node_id(), "is-trusted", 0.9, 30).expect("seal");
    store.add(short_lived).expect("valid at add time");
    assert_eq!(store.len(), 1);

    std::thread::sleep(std::time::Duration::from_millis(80));

    // No garbage collection: the entry stays, reads filter it.
    assert_eq!(store.len(), 1);
    assert!(store.get_by_subject(&bob.node_id()).is_empty());
    assert!(store.attestations_by(&alice.node_id()).is_empty());
}

#[test]
fn attestation_signed_bytes_have_the_documented_shape() {
    let alice = Identity::generate().expect("alice");
    let bob = Identity::generate().expect("bob");
    let attestation =
        Attestation::seal(&alice, bob.node_id(), "is-trusted", 0.9, HOUR_MS).expect("seal");

    let signed = String::from_utf8(attestation.signing_bytes()).expect("utf8");
    let expected = format!(
        "{}:{}:is-trusted:0.900000:{}:{}",
        hex::encode(bob.node_id().as_bytes()),
        hex::encode(alice.node_id().as_bytes()),
        attestation.expires_ms,
        attestation.created_at_ms
    );
    assert_eq!(signed, expected);
}

#[test]
fn trust_is_reflexive_and_zero_without_paths() {
    let alice = Identity::generate().expect("alice");
    let bob = Identity::generate().expect("bob");
    let store = AttestationStore::new();

    assert_eq!(compute_trust(&store, alice.node_id(), alice.node_id()), 1.0);
    assert_eq!(compute_trust(&store, alice.node_id(), bob.node_id()), 0.0);
}

#[test]
fn transitive_trust_is_positive_and_decays() {
    let alice = Identity::generate().expect("alice");
    let bob = Identity::generate().expect("bob");
    let carol = Identity::generate().expect("carol");
    let store = AttestationStore::new();

    store
        .add(Attestation::seal(&alice, bob.node_id(), "is-trusted", 0.9, HOUR_MS).expect("seal"))
        .expect("add");
    store
        .add(Attestation::seal(&bob, carol.node_id(), "is-trusted", 0.8, HOUR_MS).expect("seal"))
        .expect("add");

    let direct = compute_trust(&store, alice.node_id(), bob.node_id());
    let transitive = compute_trust(&store, alice.node_id(), carol.node_id());

    assert!((direct - 0.9 * TRUST_DECAY).abs() < 1e-9);
    assert!((transitive - 0.9 * TRUST_DECAY * 0.8 * TRUST_DECAY).abs() < 1e-9);
    assert!(transitive > 0.0);
    assert!(transitive < direct);
}

#[test]
fn third_party_attestations_do_not_create_edges() {
    let alice = Identity::generate().expect("alice");
    let bob = Identity::generate().expect("bob");
    let mallory = Identity::generate().expect("mallory");
    let carol = Identity::generate().expect("carol");
    let store = AttestationStore::new();

    // Alice trusts Bob; Mallory vouches for Carol. Alice never attested
    // Mallory, so no path from Alice reaches Carol.
    store
        .add(Attestation::seal(&alice, bob.node_id(), "is-trusted", 0.9, HOUR_MS).expect("seal"))
        .expect("add");
    store
        .add(Attestation::seal(&mallory, carol.node_id(), "is-trusted", 1.0, HOUR_MS).expect("seal"))
        .expect("add");

    assert_eq!(compute_trust(&store, alice.node_id(), carol.node_id()), 0.0);
}

#[test]
fn deep_chains_stop_at_the_depth_limit() {
    let identities: Vec<Identity> = (0..MAX_TRUST_DEPTH + 3)
        .map(|_| Identity::generate().expect("identity"))
        .collect();
    let store = AttestationStore::new();
    for pair in identities.windows(2) {
        store
            .add(
                Attestation::seal(&pair[0], pair[1].node_id(), "is-trusted", 1.0, HOUR_MS)
                    .expect("seal"),
            )
            .expect("add");
    }

    let source = identities[0].node_id();
    // Within the walk depth the chain scores positive.
    let reachable = compute_trust(&store, source, identities[MAX_TRUST_DEPTH].node_id());
    assert!(reachable > 0.0);
    // Past it the walk gives up.
    let beyond = compute_trust(&store, source, identities[MAX_TRUST_DEPTH + 2].node_id());
    assert_eq!(beyond, 0.0);
}

#[test]
fn capability_grants_exactly_the_listed_actions_to_the_holder() {
    let issuer = Identity::generate().expect("issuer");
    let holder = Identity::generate().expect("holder");
    let other = Identity::generate().expect("other");

    let capability = Capability::grant(
        &issuer,
        holder.node_id(),
        "/photos/*",
        vec!["read".to_string()],
        false,
        HOUR_MS,
    );

    capability
        .check_action(&holder.node_id(), "read")
        .expect("read allowed");
    assert!(matches!(
        capability.check_action(&holder.node_id(), "write"),
        Err(RuneError::ActionNotGranted)
    ));
    assert!(matches!(
        capability.check_action(&other.node_id(), "read"),
        Err(RuneError::WrongHolder)
    ));
}

#[test]
fn action_order_is_part_of_the_signed_form() {
    let issuer = Identity::generate().expect("issuer");
    let holder = Identity::generate().expect("holder");
    let capability = Capability::grant(
        &issuer,
        holder.node_id(),
        "/runes/*",
        vec!["read".to_string(), "write".to_string()],
        true,
        HOUR_MS,
    );

    let mut reordered = capability.clone();
    reordered.actions.swap(0, 1);
    assert!(matches!(
        reordered.check_action(&holder.node_id(), "read"),
        Err(RuneError::BadSignature)
    ));

    let mut flipped = capability.clone();
    flipped.delegatable = false;
    assert!(matches!(
        flipped.check_action(&holder.node_id(), "read"),
        Err(RuneError::BadSignature)
    ));
}

#[test]
fn expired_capability_is_refused() {
    let issuer = Identity::generate().expect("issuer");
    let holder = Identity::generate().expect("holder");

    // Construct a token that expired an hour ago, properly signed.
    let mut capability = Capability {
        issuer: issuer.node_id(),
        issuer_pk: issuer.public_key(),
        holder: holder.node_id(),
        resource: "/photos/*".to_string(),
        actions: vec!["read".to_string()],
        delegatable: false,
        expires_ms: 1_700_000_000_000,
        created_at_ms: 1_699_990_000_000,
        signature: Vec::new(),
    };
    capability.signature = issuer.sign(&capability.signing_bytes());

    assert!(matches!(
        capability.check_action(&holder.node_id(), "read"),
        Err(RuneError::Expired)
    ));
}
