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

//! Noise XX handshake.
//!
//! Three messages, each a 2-byte big-endian length-prefixed opaque blob over
//! the raw connection (no Bifrost framing):
//!
//! 1. initiator -> responder: `e`
//! 2. responder -> initiator: `e, ee, s, es`
//! 3. initiator -> responder: `s, se`
//!
//! After message 3 both sides hold two cipher directions (send/recv, swapped
//! between roles per Noise conventions; `snow` tracks the role internally)
//! and the peer's static public key. A failure at any step shuts the
//! connection down and surfaces the error.

use snow::{Builder, HandshakeState};
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use zeroize::Zeroizing;

use crate::veil::session::{read_blob, write_blob, BoxedIo, EncryptedConn, SessionStream};
use crate::veil::VeilError;

/// Noise protocol name used by every Veil session.
pub const NOISE_PARAMS: &str = "Noise_XX_25519_ChaChaPoly_SHA256";

const HANDSHAKE_BUF_LEN: usize = 1024;

/// Static Curve25519 keypair for the Noise handshake.
///
/// Independent of the Ed25519 identity; the PoC does not bind them.
pub struct NoiseKeypair {
    secret: Zeroizing<Vec<u8>>,
    public: Vec<u8>,
}

impl NoiseKeypair {
    /// Generate a fresh static keypair.
    pub fn generate() -> Result<Self, VeilError> {
        let params = NOISE_PARAMS.parse().map_err(VeilError::Noise)?;
        let keypair = Builder::new(params).generate_keypair()?;
        Ok(Self {
            secret: Zeroizing::new(keypair.private),
            public: keypair.public,
        })
    }

    /// Public key bytes.
    pub fn public(&self) -> &[u8] {
        &self.public
    }
}

fn build_state(local: &NoiseKeypair, initiator: bool) -> Result<HandshakeState, VeilError> {
    let params = NOISE_PARAMS.parse().map_err(VeilError::Noise)?;
    let builder = Builder::new(params).local_private_key(&local.secret)?;
    let state = if initiator {
        builder.build_initiator()?
    } else {
        builder.build_responder()?
    };
    Ok(state)
}

fn into_session(
    state: HandshakeState,
    read: ReadHalf<BoxedIo>,
    write: WriteHalf<BoxedIo>,
) -> Result<EncryptedConn, VeilError> {
    let remote_static = state
        .get_remote_static()
        .ok_or(VeilError::NoRemoteKey)?
        .to_vec();
    let transport = state.into_stateless_transport_mode()?;
    Ok(EncryptedConn::new(transport, read, write, remote_static))
}

async fn initiate_inner(
    read: &mut ReadHalf<BoxedIo>,
    write: &mut WriteHalf<BoxedIo>,
    state: &mut HandshakeState,
) -> Result<(), VeilError> {
    let mut buf = vec![0u8; HANDSHAKE_BUF_LEN];
    let mut payload = vec![0u8; HANDSHAKE_BUF_LEN];

    // -> e
    let n = state.write_message(&[], &mut buf)?;
    write_blob(write, &buf[..n]).await?;

    // <- e, ee, s, es
    let msg = read_blob(read).await?;
    state.read_message(&msg, &mut payload)?;

    // -> s, se
    let n = state.write_message(&[], &mut buf)?;
    write_blob(write, &buf[..n]).await?;
    Ok(())
}

async fn respond_inner(
    read: &mut ReadHalf<BoxedIo>,
    write: &mut WriteHalf<BoxedIo>,
    state: &mut HandshakeState,
) -> Result<(), VeilError> {
    let mut buf = vec![0u8; HANDSHAKE_BUF_LEN];
    let mut payload = vec![0u8; HANDSHAKE_BUF_LEN];

    // <- e
    let msg = read_blob(read).await?;
    state.read_message(&msg, &mut payload)?;

    // -> e, ee, s, es
    let n = state.write_message(&[], &mut buf)?;
    write_blob(write, &buf[..n]).await?;

    // <- s, se
    let msg = read_blob(read).await?;
    state.read_message(&msg, &mut payload)?;
    Ok(())
}

async fn run<S: SessionStream + 'static>(
    stream: S,
    local: &NoiseKeypair,
    initiator: bool,
) -> Result<EncryptedConn, VeilError> {
    let boxed: BoxedIo = Box::new(stream);
    let (mut read, mut write) = tokio::io::split(boxed);
    let mut state = build_state(local, initiator)?;

    let result = if initiator {
        initiate_inner(&mut read, &mut write, &mut state).await
    } else {
        respond_inner(&mut read, &mut write, &mut state).await
    };

    match result {
        Ok(()) => into_session(state, read, write),
        Err(e) => {
            let _ = write.shutdown().await;
            Err(e)
        }
    }
}

/// Run the initiator role and return the encrypted session.
pub async fn initiate<S: SessionStream + 'static>(
    stream: S,
    local: &NoiseKeypair,
) -> Result<EncryptedConn, VeilError> {
    run(stream, local, true).await
}

/// Run the responder role and return the encrypted session.
pub async fn respond<S: SessionStream + 'static>(
    stream: S,
    local: &NoiseKeypair,
) -> Result<EncryptedConn, VeilError> {
    run(stream, local, false).await
}
