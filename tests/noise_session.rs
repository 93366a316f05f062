// Copyright (c) 2026 Valhalla
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use valhalla::veil::handshake::{initiate, respond, NoiseKeypair, NOISE_PARAMS};
use valhalla::veil::VeilError;

#[tokio::test(flavor = "multi_thread")]
async fn noise_xx_exchanges_payloads_both_directions() {
    let (left, right) = tokio::io::duplex(256 * 1024);
    let initiator_keys = NoiseKeypair::generate().expect("initiator keys");
    let responder_keys = NoiseKeypair::generate().expect("responder keys");

    let (initiator, responder) = tokio::join!(
        initiate(left, &initiator_keys),
        respond(right, &responder_keys)
    );
    let initiator = initiator.expect("initiator handshake");
    let responder = responder.expect("responder handshake");

    // Each side learned the other's static key.
    assert_eq!(initiator.remote_static(), responder_keys.public());
    assert_eq!(responder.remote_static(), initiator_keys.public());

    let payloads: Vec<Vec<u8>> = vec![
        b"hello valhalla".to_vec(),
        Vec::new(),
        vec![0x00, 0xFF, 0xAA, 0x55],
        vec![b'X'; 8192],
    ];

    for payload in &payloads {
        initiator.send(payload).await.expect("initiator send");
        let got = responder.receive().await.expect("responder receive");
        assert_eq!(&got, payload);

        responder.send(payload).await.expect("responder send");
        let got = initiator.receive().await.expect("initiator receive");
        assert_eq!(&got, payload);
    }
}

async fn write_prefixed<W: tokio::io::AsyncWrite + Unpin>(writer: &mut W, blob: &[u8]) {
    writer
        .write_all(&(blob.len() as u16).to_be_bytes())
        .await
        .expect("write length");
    writer.write_all(blob).await.expect("write blob");
}

async fn read_prefixed<R: tokio::io::AsyncRead + Unpin>(reader: &mut R) -> Vec<u8> {
    let mut len = [0u8; 2];
    reader.read_exact(&mut len).await.expect("read length");
    let mut blob = vec![0u8; u16::from_be_bytes(len) as usize];
    reader.read_exact(&mut blob).await.expect("read blob");
    blob
}

#[tokio::test(flavor = "multi_thread")]
async fn tampered_ciphertext_terminates_the_session() {
    let (left, mut right) = tokio::io::duplex(64 * 1024);
    let initiator_keys = NoiseKeypair::generate().expect("keys");

    // Hand-driven responder so the test can corrupt a ciphertext on the
    // wire after the handshake.
    let attacker = tokio::spawn(async move {
        let keys = snow::Builder::new(NOISE_PARAMS.parse().expect("params"))
            .generate_keypair()
            .expect("responder keys");
        let mut state = snow::Builder::new(NOISE_PARAMS.parse().expect("params"))
            .local_private_key(&keys.private)
            .expect("private key")
            .build_responder()
            .expect("responder");

        let mut buf = vec![0u8; 1024];
        let mut payload = vec![0u8; 1024];

        let msg = read_prefixed(&mut right).await;
        state.read_message(&msg, &mut payload).expect("message 1");

        let n = state.write_message(&[], &mut buf).expect("message 2");
        write_prefixed(&mut right, &buf[..n]).await;

        let msg = read_prefixed(&mut right).await;
        state.read_message(&msg, &mut payload).expect("message 3");

        let transport = state
            .into_stateless_transport_mode()
            .expect("transport mode");

        let mut ciphertext = vec![0u8; 64];
        let n = transport
            .write_message(0, b"odin", &mut ciphertext)
            .expect("encrypt");
        ciphertext.truncate(n);
        ciphertext[0] ^= 0x80;
        write_prefixed(&mut right, &ciphertext).await;
    });

    let conn = initiate(left, &initiator_keys)
        .await
        .expect("initiator handshake");

    assert!(matches!(conn.receive().await, Err(VeilError::Decrypt)));

    // The cipher state is consumed: every later operation refuses it.
    assert!(conn.is_terminated());
    assert!(matches!(conn.send(b"after").await, Err(VeilError::Closed)));
    assert!(matches!(conn.receive().await, Err(VeilError::Closed)));

    attacker.await.expect("attacker task");
}
