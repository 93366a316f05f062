// Copyright (c) 2026 Valhalla
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use valhalla::bifrost::codec::Frame;
use valhalla::bifrost::transport::{dial, PathAddr};
use valhalla::core::types::{ContentId, FrameType, NodeConfig};
use valhalla::node::Node;
use valhalla::saga::envelope::ContentEnvelope;
use valhalla::saga::intent::IntentMessage;
use valhalla::saga::registry::ServiceRecord;

fn config(dir: &std::path::Path) -> NodeConfig {
    let mut config = NodeConfig::default();
    config.node.data_dir = dir.to_string_lossy().to_string();
    config.transport.listen_addr = "/tcp/127.0.0.1:0".to_string();
    config
}

#[tokio::test(flavor = "multi_thread")]
async fn store_fetch_announce_resolve_between_nodes() {
    let server_dir = tempfile::tempdir().expect("server dir");
    let client_dir = tempfile::tempdir().expect("client dir");
    let (server, _server_events) = Node::new(config(server_dir.path())).expect("server node");
    let (client, _client_events) = Node::new(config(client_dir.path())).expect("client node");

    let (addr, _accept) = server.start().await.expect("server start");
    let session = client.connect(&addr).await.expect("connect");

    // Publish on the client, push to the server.
    let envelope = client.publish(b"skaldic verse".to_vec(), BTreeMap::new());
    assert!(session.store(&envelope).await.expect("store"));
    assert_eq!(server.cache().get(&envelope.cid), Some(envelope.clone()));

    // Fetch it back over a fresh stream.
    let fetched = session
        .fetch(envelope.cid)
        .await
        .expect("fetch")
        .expect("cache hit");
    assert_eq!(fetched, envelope);

    // A miss answers empty.
    let missing = ContentId::compute(b"nobody published this");
    assert!(session.fetch(missing).await.expect("fetch miss").is_none());

    // Announce a service, resolve it back.
    let record = ServiceRecord {
        service_name: "mead-hall".to_string(),
        node_id: client.node_id(),
        capabilities: BTreeMap::new(),
        load: 0.25,
        version: "1".to_string(),
    };
    assert!(session.announce(&record).await.expect("announce"));
    assert_eq!(session.resolve("mead-hall").await.expect("resolve"), vec![record]);
    assert!(session.resolve("empty-hall").await.expect("resolve empty").is_empty());

    // The server learned the peer.
    assert_eq!(server.peers().len(), 1);

    session.close().await;
    client.stop();
    server.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn trust_gate_blocks_unattested_publishers() {
    let server_dir = tempfile::tempdir().expect("server dir");
    let client_dir = tempfile::tempdir().expect("client dir");

    let mut server_config = config(server_dir.path());
    server_config.trust.min_trust = 0.5;
    let (server, _server_events) = Node::new(server_config).expect("server node");
    let (client, _client_events) = Node::new(config(client_dir.path())).expect("client node");

    let (addr, _accept) = server.start().await.expect("server start");
    let session = client.connect(&addr).await.expect("connect");

    let envelope = client.publish(b"unvouched saga".to_vec(), BTreeMap::new());

    // Unknown publisher: verification passes, trust gating refuses.
    assert!(!session.store(&envelope).await.expect("store refused"));
    assert!(server.cache().get(&envelope.cid).is_none());

    // One direct attestation clears the threshold (0.9 * 0.8 = 0.72).
    server
        .attest(client.node_id(), "is-trusted", 0.9, 60_000)
        .expect("attest");
    assert!(server.trust_in(client.node_id()) >= 0.5);
    assert!(session.store(&envelope).await.expect("store admitted"));
    assert_eq!(server.cache().get(&envelope.cid), Some(envelope));

    session.close().await;
    client.stop();
    server.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn tampered_store_is_rejected_with_an_ack() {
    let server_dir = tempfile::tempdir().expect("server dir");
    let client_dir = tempfile::tempdir().expect("client dir");
    let (server, _server_events) = Node::new(config(server_dir.path())).expect("server node");
    let (client, _client_events) = Node::new(config(client_dir.path())).expect("client node");

    let (addr, _accept) = server.start().await.expect("server start");
    let session = client.connect(&addr).await.expect("connect");

    let mut forged = client.publish(b"true verse".to_vec(), BTreeMap::new());
    forged.data = b"false verse".to_vec();

    assert!(!session.store(&forged).await.expect("rejected, not an error"));
    assert!(server.cache().get(&forged.cid).is_none());
    assert_eq!(server.metrics().envelopes_rejected_total.get(), 1);

    session.close().await;
    client.stop();
    server.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn framed_websocket_plane_serves_keepalive_and_fetch() {
    let server_dir = tempfile::tempdir().expect("server dir");
    let mut server_config = config(server_dir.path());
    server_config.transport.ws_listen_addr = Some("/ws/127.0.0.1:0".to_string());
    let (server, _server_events) = Node::new(server_config).expect("server node");
    let (_addr, _accept) = server.start().await.expect("server start");

    let envelope = server.publish(b"public verse".to_vec(), BTreeMap::new());

    let ws_addr: PathAddr = server.framed_addr().expect("framed plane bound");
    let conn = dial(&ws_addr).await.expect("dial framed plane");

    // Keepalive echoes.
    conn.send(&Frame::new(FrameType::Keepalive, Vec::new()))
        .await
        .expect("send keepalive");
    let pong = conn.receive().await.expect("keepalive reply");
    assert_eq!(pong.frame_type, FrameType::Keepalive);

    // Read-only fetch over the framed plane.
    let intent = IntentMessage::fetch(server.node_id(), envelope.cid);
    conn.send(&Frame::data(intent.to_wire().expect("intent wire")))
        .await
        .expect("send intent");
    let reply = conn.receive().await.expect("fetch reply");
    assert_eq!(reply.frame_type, FrameType::Data);
    let got = ContentEnvelope::from_wire(&reply.payload).expect("decode");
    assert_eq!(got, envelope);
    got.verify().expect("envelope verifies");

    // Mutating intents are refused on the plaintext plane.
    let store_intent = IntentMessage::store(server.node_id(), envelope.cid);
    conn.send(&Frame::data(store_intent.to_wire().expect("intent wire")))
        .await
        .expect("send store intent");
    let refusal = conn.receive().await.expect("refusal");
    assert_eq!(refusal.frame_type, FrameType::Control);
    assert_eq!(refusal.payload, vec![valhalla::node::ACK_REJECTED]);

    server.stop();
}
