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

//! Stream multiplexer: unlimited logical streams over one encrypted session.
//!
//! Stream frame format (plaintext, inside one encrypted message):
//!
//! ```text
//! stream_id : u32 big-endian
//! length    : u32 big-endian
//! payload   : length bytes
//! ```
//!
//! A background reader loop demultiplexes inbound messages into per-stream
//! bounded queues (depth 64). On overflow the payload is dropped; this is
//! coarse backpressure, counted and logged, never an error to the sender.
//! Malformed messages are skipped. Streams have no FIN/RST on the wire;
//! they stay open until the session closes.
//!
//! Close ordering is the load-bearing invariant: terminate the raw
//! connection, wait for the reader loop to exit, then drain and close every
//! stream queue. The reader can never write into a closed queue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::core::types::NodeId;
use crate::veil::session::{EncryptedConn, MAX_PLAINTEXT_LEN};
use crate::veil::VeilError;

/// Stream frame header length.
pub const STREAM_HEADER_LEN: usize = 8;

/// Inbound queue depth per stream.
pub const STREAM_QUEUE_DEPTH: usize = 64;

/// Notification queue depth for remotely opened streams.
pub const INCOMING_QUEUE_DEPTH: usize = 64;

/// Largest payload one stream frame can carry.
pub const MAX_STREAM_PAYLOAD: usize = MAX_PLAINTEXT_LEN - STREAM_HEADER_LEN;

/// One logical stream over a session.
pub struct Stream {
    id: u32,
    conn: Arc<EncryptedConn>,
    inbound: Mutex<mpsc::Receiver<Vec<u8>>>,
    closed: AtomicBool,
}

impl Stream {
    /// Stream identifier.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Whether the stream has been closed with its session.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Send one payload as one stream frame.
    pub async fn write(&self, payload: &[u8]) -> Result<(), VeilError> {
        if payload.len() > MAX_STREAM_PAYLOAD {
            return Err(VeilError::MessageTooLarge);
        }
        if self.is_closed() {
            return Err(VeilError::StreamClosed);
        }
        let mut frame = Vec::with_capacity(STREAM_HEADER_LEN + payload.len());
        frame.extend_from_slice(&self.id.to_be_bytes());
        frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        frame.extend_from_slice(payload);
        self.conn.send(&frame).await
    }

    /// Block until a payload arrives or the stream closes.
    ///
    /// Buffered payloads drain before the close is observed.
    pub async fn read(&self) -> Result<Vec<u8>, VeilError> {
        let mut inbound = self.inbound.lock().await;
        inbound.recv().await.ok_or(VeilError::StreamClosed)
    }
}

struct StreamEntry {
    stream: Arc<Stream>,
    sender: mpsc::Sender<Vec<u8>>,
}

struct MuxShared {
    conn: Arc<EncryptedConn>,
    streams: StdRwLock<HashMap<u32, StreamEntry>>,
    next_id: AtomicU32,
    incoming: StdMutex<Option<mpsc::Sender<Arc<Stream>>>>,
    dropped_payloads: AtomicU64,
}

impl MuxShared {
    fn get_or_create(&self, id: u32, remote: bool) -> (Arc<Stream>, mpsc::Sender<Vec<u8>>) {
        if let Ok(streams) = self.streams.read() {
            if let Some(entry) = streams.get(&id) {
                return (entry.stream.clone(), entry.sender.clone());
            }
        }

        let created = {
            let mut streams = match self.streams.write() {
                Ok(g) => g,
                Err(p) => p.into_inner(),
            };
            // First reference wins: locally and remotely opened streams share
            // the id space.
            if let Some(entry) = streams.get(&id) {
                return (entry.stream.clone(), entry.sender.clone());
            }
            let (sender, receiver) = mpsc::channel(STREAM_QUEUE_DEPTH);
            let stream = Arc::new(Stream {
                id,
                conn: self.conn.clone(),
                inbound: Mutex::new(receiver),
                closed: AtomicBool::new(false),
            });
            streams.insert(
                id,
                StreamEntry {
                    stream: stream.clone(),
                    sender: sender.clone(),
                },
            );
            (stream, sender)
        };

        if remote {
            if let Ok(guard) = self.incoming.lock() {
                if let Some(tx) = guard.as_ref() {
                    if tx.try_send(created.0.clone()).is_err() {
                        warn!(stream = id, "incoming stream queue full; notification dropped");
                    }
                }
            }
        }
        created
    }

    /// Mark every stream closed and drop its sender. Idempotent.
    fn close_all(&self) {
        if let Ok(mut guard) = self.incoming.lock() {
            guard.take();
        }
        let entries: Vec<StreamEntry> = {
            let mut streams = match self.streams.write() {
                Ok(g) => g,
                Err(p) => p.into_inner(),
            };
            streams.drain().map(|(_, e)| e).collect()
        };
        for entry in entries {
            entry.stream.closed.store(true, Ordering::Release);
            // Sender drops here; readers drain buffered payloads, then
            // observe the close.
        }
    }
}

/// Multiplexer over one [`EncryptedConn`].
pub struct StreamMux {
    conn: Arc<EncryptedConn>,
    shared: Arc<MuxShared>,
    incoming: Mutex<mpsc::Receiver<Arc<Stream>>>,
    shutdown: watch::Sender<bool>,
    reader: StdMutex<Option<JoinHandle<()>>>,
}

impl StreamMux {
    /// Wrap a session and start the demultiplexing reader loop.
    pub fn new(conn: EncryptedConn) -> Self {
        let conn = Arc::new(conn);
        let (incoming_tx, incoming_rx) = mpsc::channel(INCOMING_QUEUE_DEPTH);
        let shared = Arc::new(MuxShared {
            conn: conn.clone(),
            streams: StdRwLock::new(HashMap::new()),
            next_id: AtomicU32::new(1),
            incoming: StdMutex::new(Some(incoming_tx)),
            dropped_payloads: AtomicU64::new(0),
        });

        let (shutdown, shutdown_rx) = watch::channel(false);
        let reader = tokio::spawn(read_loop(conn.clone(), shared.clone(), shutdown_rx));

        Self {
            conn,
            shared,
            incoming: Mutex::new(incoming_rx),
            shutdown,
            reader: StdMutex::new(Some(reader)),
        }
    }

    /// Identifier derived from the peer's static Noise key.
    pub fn remote_node_id(&self) -> NodeId {
        self.conn.remote_node_id()
    }

    /// Open a stream with the next locally allocated id.
    pub fn open_stream(&self) -> Arc<Stream> {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        self.shared.get_or_create(id, false).0
    }

    /// Look up a stream, creating it if the id is unknown.
    pub fn get_or_create_stream(&self, id: u32) -> Arc<Stream> {
        self.shared.get_or_create(id, false).0
    }

    /// Wait for the next remotely opened stream; `None` once the session is
    /// over.
    pub async fn accept_stream(&self) -> Option<Arc<Stream>> {
        let mut incoming = self.incoming.lock().await;
        incoming.recv().await
    }

    /// Payloads dropped on inbound queue overflow.
    pub fn dropped_payloads(&self) -> u64 {
        self.shared.dropped_payloads.load(Ordering::Relaxed)
    }

    /// Close the mux: terminate the raw connection, wait for the reader
    /// loop to exit, then drain and close every stream queue.
    pub async fn close(&self) {
        self.conn.close().await;
        let _ = self.shutdown.send(true);
        let handle = match self.reader.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.shared.close_all();
    }
}

async fn read_loop(
    conn: Arc<EncryptedConn>,
    shared: Arc<MuxShared>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let message = tokio::select! {
            _ = shutdown.changed() => break,
            received = conn.receive() => match received {
                Ok(m) => m,
                Err(e) => {
                    debug!(err = %e, "mux reader loop terminating");
                    break;
                }
            },
        };

        if message.len() < STREAM_HEADER_LEN {
            warn!(len = message.len(), "malformed stream frame; skipping");
            continue;
        }
        let mut id_bytes = [0u8; 4];
        id_bytes.copy_from_slice(&message[..4]);
        let stream_id = u32::from_be_bytes(id_bytes);

        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&message[4..8]);
        let declared = u32::from_be_bytes(len_bytes) as usize;
        if declared > message.len() - STREAM_HEADER_LEN {
            warn!(stream = stream_id, declared, "stream frame length exceeds message; skipping");
            continue;
        }

        let payload = message[STREAM_HEADER_LEN..STREAM_HEADER_LEN + declared].to_vec();
        let (_, sender) = shared.get_or_create(stream_id, true);
        if sender.try_send(payload).is_err() {
            shared.dropped_payloads.fetch_add(1, Ordering::Relaxed);
            warn!(stream = stream_id, "inbound stream queue full; payload dropped");
        }
    }

    // Remote-initiated teardown takes the same path as close(): queues only
    // close after the loop can no longer write into them.
    shared.close_all();
}
