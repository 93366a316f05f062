// Copyright (c) 2026 Valhalla
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::time::Duration;

use valhalla::veil::handshake::{initiate, respond, NoiseKeypair};
use valhalla::veil::mux::{StreamMux, STREAM_QUEUE_DEPTH};
use valhalla::veil::session::EncryptedConn;
use valhalla::veil::VeilError;

async fn session_pair() -> (EncryptedConn, EncryptedConn) {
    let (left, right) = tokio::io::duplex(1024 * 1024);
    let initiator_keys = NoiseKeypair::generate().expect("initiator keys");
    let responder_keys = NoiseKeypair::generate().expect("responder keys");
    let (initiator, responder) = tokio::join!(
        initiate(left, &initiator_keys),
        respond(right, &responder_keys)
    );
    (
        initiator.expect("initiator handshake"),
        responder.expect("responder handshake"),
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn stream_ids_are_monotonic_from_one() {
    let (initiator, responder) = session_pair().await;
    let mux = StreamMux::new(initiator);
    assert_eq!(mux.open_stream().id(), 1);
    assert_eq!(mux.open_stream().id(), 2);
    assert_eq!(mux.open_stream().id(), 3);
    mux.close().await;
    drop(responder);
}

#[tokio::test(flavor = "multi_thread")]
async fn ten_streams_fifty_messages_each() {
    let (initiator, responder) = session_pair().await;
    let client = StreamMux::new(initiator);
    let server = StreamMux::new(responder);

    let collector = tokio::spawn(async move {
        let mut handles = Vec::new();
        for _ in 0..10 {
            let stream = server.accept_stream().await.expect("incoming stream");
            handles.push(tokio::spawn(async move {
                let mut messages = Vec::with_capacity(50);
                for _ in 0..50 {
                    messages.push(stream.read().await.expect("read"));
                }
                (stream.id(), messages)
            }));
        }
        let mut by_id = HashMap::new();
        for handle in handles {
            let (id, messages) = handle.await.expect("reader task");
            by_id.insert(id, messages);
        }
        (server, by_id)
    });

    let streams: Vec<_> = (0..10).map(|_| client.open_stream()).collect();
    for (index, stream) in streams.iter().enumerate() {
        for j in 0..50 {
            stream
                .write(format!("stream-{index}-msg-{j}").as_bytes())
                .await
                .expect("no write returns an error");
        }
    }

    let (server, by_id) = collector.await.expect("collector task");
    for (index, stream) in streams.iter().enumerate() {
        let messages = by_id.get(&stream.id()).expect("stream delivered");
        assert_eq!(messages.len(), 50);
        // Per-stream ordering matches send order.
        for (j, message) in messages.iter().enumerate() {
            assert_eq!(message, format!("stream-{index}-msg-{j}").as_bytes());
        }
    }

    client.close().await;
    server.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn queue_overflow_drops_payloads_without_failing_the_sender() {
    let (initiator, responder) = session_pair().await;
    let client = StreamMux::new(initiator);
    let server = StreamMux::new(responder);

    let stream = client.open_stream();
    let burst = STREAM_QUEUE_DEPTH + 36;
    for j in 0..burst {
        stream
            .write(format!("burst-{j}").as_bytes())
            .await
            .expect("sender never fails on receiver overflow");
    }

    // Nobody is reading on the server; the queue fills and the surplus is
    // dropped by the reader loop.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while server.dropped_payloads() == 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(server.dropped_payloads() > 0);

    // The queued prefix is still delivered in order.
    let inbound = server.accept_stream().await.expect("incoming stream");
    for j in 0..10 {
        assert_eq!(
            inbound.read().await.expect("read"),
            format!("burst-{j}").as_bytes()
        );
    }

    client.close().await;
    server.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn close_drains_buffered_payloads_then_closes_streams() {
    let (initiator, responder) = session_pair().await;
    let client = StreamMux::new(initiator);
    let server = StreamMux::new(responder);

    let stream = client.open_stream();
    stream.write(b"last words").await.expect("write");

    let inbound = server.accept_stream().await.expect("incoming stream");
    client.close().await;

    // Buffered payloads drain before the close is observed.
    assert_eq!(inbound.read().await.expect("buffered payload"), b"last words");
    assert!(matches!(inbound.read().await, Err(VeilError::StreamClosed)));

    // The closed side refuses further writes.
    assert!(stream.write(b"after close").await.is_err());

    server.close().await;
}
