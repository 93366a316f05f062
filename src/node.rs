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

//! Node composition.
//!
//! Wires the subsystems into a running overlay node: a Bifrost TCP listener
//! whose connections are promoted into Noise XX sessions, a stream
//! multiplexer serving intent requests, the content cache, the service
//! registry, the peer table, and the attestation store gating envelope
//! admission. An optional WebSocket listener serves the plaintext framed
//! plane (keepalives plus read-only intents) for in-browser consumers.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bifrost::codec::{CodecError as FrameCodecError, Frame};
use crate::bifrost::transport::{self, Conn, PathAddr, TransportError};
use crate::core::identity::{Identity, IdentityError};
use crate::core::types::{
    decode_canonical_limited, encode_canonical, CodecError, ContentId, FrameType, IntentKind,
    NodeConfig, NodeId, StackEvent,
};
use crate::monitoring::events::EventBus;
use crate::monitoring::metrics::{Metrics, MetricsError};
use crate::rune::attestation::{Attestation, AttestationStore};
use crate::rune::trust::compute_trust;
use crate::rune::RuneError;
use crate::saga::cache::ContentCache;
use crate::saga::envelope::ContentEnvelope;
use crate::saga::intent::{IntentMessage, MAX_INTENT_WIRE_LEN};
use crate::saga::registry::{ServiceRecord, ServiceRegistry};
use crate::saga::SagaError;
use crate::veil::handshake::{self, NoiseKeypair};
use crate::veil::mux::{Stream, StreamMux};
use crate::veil::VeilError;
use crate::yggdrasil::peer_table::PeerTable;

/// Acknowledgement byte: request applied.
pub const ACK_OK: u8 = 0x01;
/// Acknowledgement byte: request rejected.
pub const ACK_REJECTED: u8 = 0x00;

/// Node errors.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Identity failure.
    #[error("identity: {0}")]
    Identity(#[from] IdentityError),
    /// Transport failure.
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    /// Session failure.
    #[error("veil: {0}")]
    Veil(#[from] VeilError),
    /// Envelope failure.
    #[error("saga: {0}")]
    Saga(#[from] SagaError),
    /// Trust/authorization failure.
    #[error("rune: {0}")]
    Rune(#[from] RuneError),
    /// Canonical encoding failure.
    #[error("codec: {0}")]
    Codec(#[from] CodecError),
    /// Frame codec failure.
    #[error("frame codec: {0}")]
    FrameCodec(#[from] FrameCodecError),
    /// Metrics failure.
    #[error("metrics: {0}")]
    Metrics(#[from] MetricsError),
    /// Envelope publisher below the configured trust threshold.
    #[error("publisher trust below threshold")]
    TrustBelowThreshold,
    /// Sessions run over TCP only.
    #[error("sessions require a tcp address")]
    SessionTransport,
    /// Peer reply did not match the protocol.
    #[error("unexpected reply")]
    UnexpectedReply,
}

/// A running overlay node.
pub struct Node {
    identity: Arc<Identity>,
    noise: NoiseKeypair,
    config: NodeConfig,
    peers: Arc<PeerTable>,
    cache: Arc<ContentCache>,
    registry: Arc<ServiceRegistry>,
    attestations: Arc<AttestationStore>,
    metrics: Arc<Metrics>,
    events: EventBus,
    shutdown: watch::Sender<bool>,
    framed_addr: std::sync::Mutex<Option<PathAddr>>,
}

impl Node {
    /// Build a node from configuration, loading or creating its identity.
    ///
    /// Returns the node and the consumer end of its event stream.
    pub fn new(config: NodeConfig) -> Result<(Arc<Node>, mpsc::Receiver<StackEvent>), NodeError> {
        let identity = Arc::new(Identity::load_or_create(&config.node.data_dir)?);
        let noise = NoiseKeypair::generate()?;
        let metrics = Arc::new(Metrics::new()?);
        let (events, events_rx) = EventBus::channel();
        let (shutdown, _) = watch::channel(false);

        let peers = Arc::new(PeerTable::new(identity.node_id()));
        let cache = Arc::new(ContentCache::new(config.cache.max_entries));

        info!(node_id = %identity.node_id(), name = %config.node.name, "node initialized");

        Ok((
            Arc::new(Node {
                identity,
                noise,
                config,
                peers,
                cache,
                registry: Arc::new(ServiceRegistry::new()),
                attestations: Arc::new(AttestationStore::new()),
                metrics,
                events,
                shutdown,
                framed_addr: std::sync::Mutex::new(None),
            }),
            events_rx,
        ))
    }

    /// This node's identifier.
    pub fn node_id(&self) -> NodeId {
        self.identity.node_id()
    }

    /// Signing identity.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Content cache.
    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    /// Service registry.
    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Attestation store.
    pub fn attestations(&self) -> &AttestationStore {
        &self.attestations
    }

    /// Peer table.
    pub fn peers(&self) -> &PeerTable {
        &self.peers
    }

    /// Metrics container.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Bind the configured listener and serve sessions until shutdown.
    ///
    /// Returns the bound address (with the OS-assigned port) and the accept
    /// loop task. When a WebSocket address is configured, the framed plane
    /// is served alongside.
    pub async fn start(self: &Arc<Self>) -> Result<(PathAddr, JoinHandle<()>), NodeError> {
        let addr: PathAddr = self.config.transport.listen_addr.parse()?;
        if !matches!(addr, PathAddr::Tcp(_)) {
            return Err(NodeError::SessionTransport);
        }
        let listener = transport::listen(&addr).await?;
        let local = listener.local_addr()?;
        info!(addr = %local, "listening");

        if let Some(ws_addr) = self.config.transport.ws_listen_addr.clone() {
            let ws_addr: PathAddr = ws_addr.parse()?;
            let ws_listener = transport::listen(&ws_addr).await?;
            let ws_local = ws_listener.local_addr()?;
            info!(addr = %ws_local, "framed plane listening");
            if let Ok(mut guard) = self.framed_addr.lock() {
                *guard = Some(ws_local);
            }
            let node = self.clone();
            let mut shutdown_rx = self.shutdown.subscribe();
            tokio::spawn(async move {
                loop {
                    let accepted = tokio::select! {
                        _ = shutdown_rx.changed() => break,
                        accepted = ws_listener.accept() => accepted,
                    };
                    match accepted {
                        Ok(conn) => {
                            let node = node.clone();
                            tokio::spawn(async move {
                                serve_framed_conn(node, conn).await;
                            });
                        }
                        Err(e) => {
                            warn!(err = %e, "framed accept failed");
                            break;
                        }
                    }
                }
            });
        }

        let node = self.clone();
        let mut shutdown_rx = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                let accepted = tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    accepted = listener.accept() => accepted,
                };
                match accepted {
                    Ok(conn) => {
                        let node = node.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve_conn(node, conn).await {
                                debug!(err = %e, "session ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        warn!(err = %e, "accept failed");
                        break;
                    }
                }
            }
            info!("accept loop stopped");
        });

        Ok((local, handle))
    }

    /// Ask the accept loop to stop.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Bound framed-plane address, once started with one configured.
    pub fn framed_addr(&self) -> Option<PathAddr> {
        self.framed_addr.lock().ok().and_then(|g| g.clone())
    }

    /// Dial a peer and promote the connection into an encrypted session.
    pub async fn connect(&self, addr: &PathAddr) -> Result<PeerSession, NodeError> {
        let conn = transport::dial(addr).await?;
        let stream = conn
            .into_stream()
            .map_err(|_| NodeError::SessionTransport)?;
        let session = match handshake::initiate(stream, &self.noise).await {
            Ok(s) => s,
            Err(e) => {
                self.metrics.handshake_failures_total.inc();
                return Err(e.into());
            }
        };
        let remote_id = session.remote_node_id();
        self.peers.upsert(remote_id, addr.clone());
        self.metrics.sessions.inc();
        self.events.emit(StackEvent::SessionEstablished(remote_id));
        self.events.emit(StackEvent::PeerConnected(remote_id));
        Ok(PeerSession {
            local_id: self.node_id(),
            remote_id,
            mux: StreamMux::new(session),
        })
    }

    /// Seal payload bytes into a signed envelope and cache it.
    pub fn publish(
        &self,
        data: Vec<u8>,
        metadata: std::collections::BTreeMap<String, String>,
    ) -> ContentEnvelope {
        let envelope = ContentEnvelope::seal(&self.identity, data, metadata);
        self.events.emit(StackEvent::ContentStored(envelope.cid));
        self.cache.put(envelope.clone());
        envelope
    }

    /// Verify and admit an envelope into the cache.
    ///
    /// Third-party envelopes must clear the configured trust threshold;
    /// self-published content is always admitted. Rejections are surfaced
    /// and counted, never swallowed.
    pub fn admit_envelope(&self, envelope: ContentEnvelope) -> Result<ContentId, NodeError> {
        if let Err(e) = envelope.verify() {
            self.metrics.envelopes_rejected_total.inc();
            return Err(e.into());
        }
        let min_trust = self.config.trust.min_trust;
        if envelope.publisher != self.node_id() && min_trust > 0.0 {
            let score = compute_trust(&self.attestations, self.node_id(), envelope.publisher);
            if score < min_trust {
                self.metrics.envelopes_rejected_total.inc();
                return Err(NodeError::TrustBelowThreshold);
            }
        }
        let cid = envelope.cid;
        self.cache.put(envelope);
        self.events.emit(StackEvent::ContentStored(cid));
        Ok(cid)
    }

    /// Sign and store an attestation about `subject`.
    pub fn attest(
        &self,
        subject: NodeId,
        claim: impl Into<String>,
        confidence: f64,
        ttl_ms: u64,
    ) -> Result<Attestation, NodeError> {
        let attestation = Attestation::seal(&self.identity, subject, claim, confidence, ttl_ms)?;
        self.attestations.add(attestation.clone())?;
        self.events.emit(StackEvent::AttestationAdded {
            subject,
            attester: self.node_id(),
        });
        Ok(attestation)
    }

    /// Transitive trust score toward `target`.
    pub fn trust_in(&self, target: NodeId) -> f64 {
        compute_trust(&self.attestations, self.node_id(), target)
    }
}

/// An established session to one peer.
pub struct PeerSession {
    local_id: NodeId,
    remote_id: NodeId,
    mux: StreamMux,
}

impl PeerSession {
    /// Peer identifier (PoC binding: derived from the Noise static key).
    pub fn remote_id(&self) -> NodeId {
        self.remote_id
    }

    /// The underlying multiplexer.
    pub fn mux(&self) -> &StreamMux {
        &self.mux
    }

    /// Fetch an envelope by content identifier. `None` on a miss.
    pub async fn fetch(&self, cid: ContentId) -> Result<Option<ContentEnvelope>, NodeError> {
        let stream = self.mux.open_stream();
        let intent = IntentMessage::fetch(self.local_id, cid);
        stream.write(&intent.to_wire()?).await?;
        let reply = stream.read().await?;
        if reply.is_empty() {
            return Ok(None);
        }
        let envelope = ContentEnvelope::from_wire(&reply)?;
        envelope.verify()?;
        Ok(Some(envelope))
    }

    /// Offer an envelope for admission. Returns whether the peer accepted.
    pub async fn store(&self, envelope: &ContentEnvelope) -> Result<bool, NodeError> {
        let stream = self.mux.open_stream();
        let intent = IntentMessage::store(self.local_id, envelope.cid);
        stream.write(&intent.to_wire()?).await?;
        stream.write(&envelope.to_wire()?).await?;
        let ack = stream.read().await?;
        match ack.as_slice() {
            [ACK_OK] => Ok(true),
            [ACK_REJECTED] => Ok(false),
            _ => Err(NodeError::UnexpectedReply),
        }
    }

    /// Announce a service record to the peer's registry.
    pub async fn announce(&self, record: &ServiceRecord) -> Result<bool, NodeError> {
        let stream = self.mux.open_stream();
        let intent = IntentMessage::announce(self.local_id, record.service_name.clone());
        stream.write(&intent.to_wire()?).await?;
        stream.write(&encode_canonical(record)?).await?;
        let ack = stream.read().await?;
        match ack.as_slice() {
            [ACK_OK] => Ok(true),
            [ACK_REJECTED] => Ok(false),
            _ => Err(NodeError::UnexpectedReply),
        }
    }

    /// Resolve providers for a service name from the peer's registry.
    pub async fn resolve(&self, service: &str) -> Result<Vec<ServiceRecord>, NodeError> {
        let stream = self.mux.open_stream();
        let intent = IntentMessage::resolve(self.local_id, service.to_string());
        stream.write(&intent.to_wire()?).await?;
        let reply = stream.read().await?;
        Ok(decode_canonical_limited(&reply, MAX_INTENT_WIRE_LEN)?)
    }

    /// Close the session and its streams.
    pub async fn close(&self) {
        self.mux.close().await;
    }
}

async fn serve_conn(node: Arc<Node>, conn: Conn) -> Result<(), NodeError> {
    let remote_addr = conn.remote_addr();
    let stream = conn
        .into_stream()
        .map_err(|_| NodeError::SessionTransport)?;
    let session = match handshake::respond(stream, &node.noise).await {
        Ok(s) => s,
        Err(e) => {
            node.metrics.handshake_failures_total.inc();
            return Err(e.into());
        }
    };
    let remote_id = session.remote_node_id();
    node.peers.upsert(remote_id, remote_addr);
    node.metrics.sessions.inc();
    node.events.emit(StackEvent::SessionEstablished(remote_id));
    node.events.emit(StackEvent::PeerConnected(remote_id));

    let mux = StreamMux::new(session);
    while let Some(stream) = mux.accept_stream().await {
        node.events.emit(StackEvent::StreamOpened(stream.id()));
        let node = node.clone();
        tokio::spawn(async move {
            serve_stream(node, stream).await;
        });
    }

    mux.close().await;
    node.metrics.sessions.dec();
    node.events.emit(StackEvent::PeerDisconnected(remote_id));
    Ok(())
}

/// Serve the plaintext framed plane: keepalive echo plus read-only intents
/// inside DATA frames. Mutating intents are refused here; they belong on an
/// authenticated session.
async fn serve_framed_conn(node: Arc<Node>, conn: Conn) {
    loop {
        let frame = match conn.receive().await {
            Ok(f) => f,
            Err(_) => break,
        };
        node.metrics.frames_received_total.inc();

        let reply = match frame.frame_type {
            FrameType::Keepalive => Some(Frame::new(FrameType::Keepalive, Vec::new())),
            FrameType::Close => {
                let _ = conn.send(&Frame::new(FrameType::Close, Vec::new())).await;
                break;
            }
            FrameType::Control => None,
            FrameType::Data => match IntentMessage::from_wire(&frame.payload) {
                Ok(intent) => {
                    node.events.emit(StackEvent::IntentReceived(intent.kind));
                    framed_reply(&node, intent)
                }
                Err(e) => {
                    warn!(err = %e, "undecodable framed intent");
                    Some(Frame::new(FrameType::Control, vec![ACK_REJECTED]))
                }
            },
        };

        if let Some(reply) = reply {
            if conn.send(&reply).await.is_err() {
                break;
            }
            node.metrics.frames_sent_total.inc();
        }
    }
    let _ = conn.close().await;
}

fn framed_reply(node: &Node, intent: IntentMessage) -> Option<Frame> {
    match intent.kind {
        IntentKind::Fetch => {
            let hit = intent.cid.and_then(|cid| node.cache.get(&cid));
            match hit {
                Some(envelope) => {
                    node.events.emit(StackEvent::ContentFetched(envelope.cid));
                    match envelope.to_wire() {
                        Ok(bytes) => Some(Frame::data(bytes)),
                        Err(_) => Some(Frame::new(FrameType::Control, vec![ACK_REJECTED])),
                    }
                }
                None => Some(Frame::data(Vec::new())),
            }
        }
        IntentKind::Resolve => {
            let records = intent
                .service
                .map(|s| node.registry.lookup(&s))
                .unwrap_or_default();
            match encode_canonical(&records) {
                Ok(bytes) => Some(Frame::data(bytes)),
                Err(_) => Some(Frame::new(FrameType::Control, vec![ACK_REJECTED])),
            }
        }
        IntentKind::Store | IntentKind::Announce => {
            Some(Frame::new(FrameType::Control, vec![ACK_REJECTED]))
        }
    }
}

async fn serve_stream(node: Arc<Node>, stream: Arc<Stream>) {
    loop {
        let request = match stream.read().await {
            Ok(bytes) => bytes,
            Err(_) => break,
        };
        let intent = match IntentMessage::from_wire(&request) {
            Ok(i) => i,
            Err(e) => {
                warn!(stream = stream.id(), err = %e, "undecodable intent; dropping stream");
                break;
            }
        };
        node.events.emit(StackEvent::IntentReceived(intent.kind));

        let outcome = match intent.kind {
            IntentKind::Fetch => serve_fetch(&node, &stream, intent.cid).await,
            IntentKind::Store => serve_store(&node, &stream).await,
            IntentKind::Announce => serve_announce(&node, &stream).await,
            IntentKind::Resolve => serve_resolve(&node, &stream, intent.service).await,
        };
        if let Err(e) = outcome {
            debug!(stream = stream.id(), err = %e, "request failed; dropping stream");
            break;
        }
    }
}

async fn serve_fetch(
    node: &Node,
    stream: &Stream,
    cid: Option<ContentId>,
) -> Result<(), NodeError> {
    let hit = cid.and_then(|cid| node.cache.get(&cid));
    match hit {
        Some(envelope) => {
            node.events.emit(StackEvent::ContentFetched(envelope.cid));
            stream.write(&envelope.to_wire()?).await?;
        }
        None => stream.write(&[]).await?,
    }
    Ok(())
}

async fn serve_store(node: &Node, stream: &Stream) -> Result<(), NodeError> {
    let body = stream.read().await?;
    let status = match ContentEnvelope::from_wire(&body)
        .map_err(NodeError::from)
        .and_then(|envelope| node.admit_envelope(envelope))
    {
        Ok(_) => ACK_OK,
        Err(e) => {
            warn!(err = %e, "envelope rejected");
            ACK_REJECTED
        }
    };
    stream.write(&[status]).await?;
    Ok(())
}

async fn serve_announce(node: &Node, stream: &Stream) -> Result<(), NodeError> {
    let body = stream.read().await?;
    let status = match decode_canonical_limited::<ServiceRecord>(&body, MAX_INTENT_WIRE_LEN) {
        Ok(record) => {
            node.registry.register(record);
            ACK_OK
        }
        Err(e) => {
            warn!(err = %e, "undecodable service record");
            ACK_REJECTED
        }
    };
    stream.write(&[status]).await?;
    Ok(())
}

async fn serve_resolve(
    node: &Node,
    stream: &Stream,
    service: Option<String>,
) -> Result<(), NodeError> {
    let records = service
        .map(|s| node.registry.lookup(&s))
        .unwrap_or_default();
    stream.write(&encode_canonical(&records)?).await?;
    Ok(())
}
