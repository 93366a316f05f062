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

//! Encrypted session over a raw byte stream.
//!
//! Each ciphertext message travels as a 2-byte big-endian length-prefixed
//! blob, the same framing the handshake uses. The session is one logical
//! ordered stream of plaintext messages. Send and receive hold independent
//! locks; nonce usage is strictly sequential per direction. A failed
//! decrypt terminates the session; the cipher state is never retried.

use snow::StatelessTransportState;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;

use crate::core::types::NodeId;
use crate::veil::VeilError;

/// Byte streams a session can run over.
pub trait SessionStream: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> SessionStream for T {}

pub(crate) type BoxedIo = Box<dyn SessionStream>;

/// Maximum length-prefixed blob (16-bit length).
pub const MAX_BLOB_LEN: usize = u16::MAX as usize;

/// AEAD tag overhead per message.
pub const AEAD_TAG_LEN: usize = 16;

/// Maximum plaintext per encrypted message.
pub const MAX_PLAINTEXT_LEN: usize = MAX_BLOB_LEN - AEAD_TAG_LEN;

/// Write one length-prefixed blob and flush.
pub(crate) async fn write_blob<W: AsyncWrite + Unpin>(
    writer: &mut W,
    blob: &[u8],
) -> Result<(), VeilError> {
    if blob.len() > MAX_BLOB_LEN {
        return Err(VeilError::MessageTooLarge);
    }
    writer.write_all(&(blob.len() as u16).to_be_bytes()).await?;
    writer.write_all(blob).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed blob.
pub(crate) async fn read_blob<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, VeilError> {
    let mut len_bytes = [0u8; 2];
    reader.read_exact(&mut len_bytes).await?;
    let len = u16::from_be_bytes(len_bytes) as usize;
    let mut blob = vec![0u8; len];
    reader.read_exact(&mut blob).await?;
    Ok(blob)
}

struct SendHalf {
    io: WriteHalf<BoxedIo>,
    nonce: u64,
}

struct RecvHalf {
    io: ReadHalf<BoxedIo>,
    nonce: u64,
}

/// An authenticated encrypted connection.
///
/// Owns both cipher directions exclusively; the states never escape this
/// type.
pub struct EncryptedConn {
    transport: StatelessTransportState,
    send: Mutex<SendHalf>,
    recv: Mutex<RecvHalf>,
    remote_static: Vec<u8>,
    terminated: AtomicBool,
}

impl EncryptedConn {
    pub(crate) fn new(
        transport: StatelessTransportState,
        read: ReadHalf<BoxedIo>,
        write: WriteHalf<BoxedIo>,
        remote_static: Vec<u8>,
    ) -> Self {
        Self {
            transport,
            send: Mutex::new(SendHalf { io: write, nonce: 0 }),
            recv: Mutex::new(RecvHalf { io: read, nonce: 0 }),
            remote_static,
            terminated: AtomicBool::new(false),
        }
    }

    /// The peer's static Noise public key.
    pub fn remote_static(&self) -> &[u8] {
        &self.remote_static
    }

    /// Identifier derived from the peer's static key (PoC binding; the
    /// Ed25519 identity is not bound to the Noise key).
    pub fn remote_node_id(&self) -> NodeId {
        NodeId::from_key_bytes(&self.remote_static)
    }

    /// Whether the session has been closed or invalidated.
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Encrypt and send one plaintext message.
    pub async fn send(&self, plaintext: &[u8]) -> Result<(), VeilError> {
        if plaintext.len() > MAX_PLAINTEXT_LEN {
            return Err(VeilError::MessageTooLarge);
        }
        if self.is_terminated() {
            return Err(VeilError::Closed);
        }
        let mut half = self.send.lock().await;
        let mut ciphertext = vec![0u8; plaintext.len() + AEAD_TAG_LEN];
        let n = self
            .transport
            .write_message(half.nonce, plaintext, &mut ciphertext)?;
        half.nonce += 1;
        write_blob(&mut half.io, &ciphertext[..n]).await
    }

    /// Receive and decrypt the next plaintext message.
    ///
    /// A decrypt failure is fatal: the session is marked terminated and
    /// every later operation fails with [`VeilError::Closed`].
    pub async fn receive(&self) -> Result<Vec<u8>, VeilError> {
        if self.is_terminated() {
            return Err(VeilError::Closed);
        }
        let mut half = self.recv.lock().await;
        let ciphertext = read_blob(&mut half.io).await?;
        let mut plaintext = vec![0u8; ciphertext.len()];
        match self
            .transport
            .read_message(half.nonce, &ciphertext, &mut plaintext)
        {
            Ok(n) => {
                half.nonce += 1;
                plaintext.truncate(n);
                Ok(plaintext)
            }
            Err(_) => {
                self.terminated.store(true, Ordering::Release);
                Err(VeilError::Decrypt)
            }
        }
    }

    /// Terminate the session and shut down the write side.
    pub async fn close(&self) {
        self.terminated.store(true, Ordering::Release);
        let mut half = self.send.lock().await;
        let _ = half.io.shutdown().await;
    }
}
