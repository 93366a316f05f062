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

//! Shared overlay types and canonical encoding helpers.

use bincode::Options;
use ring::digest;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Canonical serialization error.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("serialization")]
    Serialize,
    #[error("deserialization")]
    Deserialize,
    #[error("size limit exceeded")]
    TooLarge,
}

/// Canonical bincode options (deterministic).
fn bincode_opts() -> impl Options {
    // Fixint encoding provides a stable integer representation.
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

/// Encode with deterministic rules. Requires deterministic container ordering (use BTreeMap/BTreeSet).
pub fn encode_canonical<T: Serialize>(v: &T) -> Result<Vec<u8>, CodecError> {
    bincode_opts()
        .serialize(v)
        .map_err(|_| CodecError::Serialize)
}

/// Decode with a hard size cap.
pub fn decode_canonical_limited<T: DeserializeOwned>(
    bytes: &[u8],
    max: usize,
) -> Result<T, CodecError> {
    if bytes.len() > max {
        return Err(CodecError::TooLarge);
    }
    // Cap inside the deserializer as well; large container lengths must not
    // allocate past the wire size.
    bincode_opts()
        .with_limit(max as u64)
        .deserialize(bytes)
        .map_err(|_| CodecError::Deserialize)
}

/// Errors parsing a [`NodeId`] or [`ContentId`] from its string form.
#[derive(Debug, Error)]
pub enum IdParseError {
    /// Missing the `VH` prefix.
    #[error("missing VH prefix")]
    MissingPrefix,
    /// Body is not valid base58 / hex.
    #[error("invalid encoding")]
    InvalidEncoding,
    /// Decoded byte length does not fit the identifier.
    #[error("invalid length")]
    InvalidLength,
}

fn sha256(data: &[u8]) -> [u8; 32] {
    let d = digest::digest(&digest::SHA256, data);
    let mut out = [0u8; 32];
    out.copy_from_slice(d.as_ref());
    out
}

/// 32-byte node identifier: SHA-256 of the node's Ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId([u8; 32]);

/// Display prefix for node identifiers.
pub const NODE_ID_PREFIX: &str = "VH";

impl NodeId {
    /// Derive the identifier for an Ed25519 public key.
    pub fn from_public_key(pk: &[u8; 32]) -> Self {
        Self(sha256(pk))
    }

    /// Derive an identifier by hashing arbitrary key bytes.
    ///
    /// Used for the PoC binding of Noise static keys to the identifier space;
    /// see the handshake module.
    pub fn from_key_bytes(key: &[u8]) -> Self {
        Self(sha256(key))
    }

    /// Construct from raw bytes.
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Byte-wise XOR distance to another identifier (DHT metric).
    pub fn xor_distance(&self, other: &NodeId) -> NodeId {
        let mut out = [0u8; 32];
        for (i, o) in out.iter_mut().enumerate() {
            *o = self.0[i] ^ other.0[i];
        }
        NodeId(out)
    }

    /// Number of leading zero bits; 256 for the zero identifier.
    pub fn leading_zero_bits(&self) -> u32 {
        let mut bits = 0u32;
        for b in self.0.iter() {
            if *b == 0 {
                bits += 8;
            } else {
                bits += b.leading_zeros();
                break;
            }
        }
        bits
    }

    /// Short display form: prefix plus 8 characters plus `...`.
    pub fn short(&self) -> String {
        let full = self.to_string();
        let head_len = NODE_ID_PREFIX.len() + 8;
        if full.len() <= head_len {
            full
        } else {
            format!("{}...", &full[..head_len])
        }
    }

    /// Parse the `VH`-prefixed base58 string form.
    pub fn parse(s: &str) -> Result<Self, IdParseError> {
        let body = s
            .strip_prefix(NODE_ID_PREFIX)
            .ok_or(IdParseError::MissingPrefix)?;
        let bytes = bs58::decode(body)
            .into_vec()
            .map_err(|_| IdParseError::InvalidEncoding)?;
        if bytes.len() > 32 {
            return Err(IdParseError::InvalidLength);
        }
        // Left-pad: the base58 body carries the identifier as a big integer.
        let mut out = [0u8; 32];
        out[32 - bytes.len()..].copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Big-integer base58: the all-zero identifier renders as "VH1".
        let first = self.0.iter().position(|b| *b != 0);
        let body = match first {
            Some(i) => bs58::encode(&self.0[i..]).into_string(),
            None => "1".to_string(),
        };
        write!(f, "{NODE_ID_PREFIX}{body}")
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.short())
    }
}

/// Multihash tag for SHA-256.
pub const MULTIHASH_SHA2_256: u8 = 0x12;
/// Digest length for SHA-256.
pub const MULTIHASH_SHA2_256_LEN: u8 = 32;

/// 34-byte self-describing content identifier (multihash).
///
/// Byte 0 is the hash algorithm tag, byte 1 the digest length, bytes 2..34
/// the digest. Only constructed by hashing payload bytes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentId([u8; 34]);

impl ContentId {
    /// Hash payload bytes into a content identifier.
    pub fn compute(data: &[u8]) -> Self {
        let mut out = [0u8; 34];
        out[0] = MULTIHASH_SHA2_256;
        out[1] = MULTIHASH_SHA2_256_LEN;
        out[2..].copy_from_slice(&sha256(data));
        Self(out)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 34] {
        &self.0
    }

    /// Short display form: 6-byte hex prefix plus `...`.
    pub fn short(&self) -> String {
        format!("{}...", hex::encode(&self.0[..6]))
    }

    /// Parse the full lowercase-hex string form.
    pub fn parse(s: &str) -> Result<Self, IdParseError> {
        let bytes = hex::decode(s).map_err(|_| IdParseError::InvalidEncoding)?;
        if bytes.len() != 34 {
            return Err(IdParseError::InvalidLength);
        }
        let mut out = [0u8; 34];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({})", self.short())
    }
}

// serde supports fixed arrays only up to 32 elements; the 34-byte multihash
// is carried as a length-checked byte sequence.
impl Serialize for ContentId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for ContentId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CidVisitor;
        impl<'de> serde::de::Visitor<'de> for CidVisitor {
            type Value = ContentId;
            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("34 content id bytes")
            }
            fn visit_bytes<E: serde::de::Error>(self, v: &[u8]) -> Result<ContentId, E> {
                if v.len() != 34 {
                    return Err(E::invalid_length(v.len(), &self));
                }
                let mut out = [0u8; 34];
                out.copy_from_slice(v);
                Ok(ContentId(out))
            }
            fn visit_seq<A: serde::de::SeqAccess<'de>>(
                self,
                mut seq: A,
            ) -> Result<ContentId, A::Error> {
                let mut out = [0u8; 34];
                for (i, o) in out.iter_mut().enumerate() {
                    *o = seq
                        .next_element()?
                        .ok_or_else(|| serde::de::Error::invalid_length(i, &self))?;
                }
                if seq.next_element::<u8>()?.is_some() {
                    return Err(serde::de::Error::invalid_length(35, &self));
                }
                Ok(ContentId(out))
            }
        }
        deserializer.deserialize_bytes(CidVisitor)
    }
}

/// Frame types carried on the Bifrost wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// Application payload.
    Data = 0x01,
    /// Transport control.
    Control = 0x02,
    /// Liveness probe.
    Keepalive = 0x03,
    /// Orderly shutdown notice.
    Close = 0x04,
}

impl FrameType {
    /// Wire byte.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parse a wire byte.
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(FrameType::Data),
            0x02 => Some(FrameType::Control),
            0x03 => Some(FrameType::Keepalive),
            0x04 => Some(FrameType::Close),
            _ => None,
        }
    }
}

/// Stream flag constants.
///
/// The multiplexer wire format carries no per-stream FIN/RST today: streams
/// stay open until the session closes. The flags are reserved for a future
/// revision of the stream header.
pub mod stream_flags {
    /// Stream open.
    pub const SYN: u8 = 0x01;
    /// Stream finished (reserved).
    pub const FIN: u8 = 0x02;
    /// Stream reset (reserved).
    pub const RST: u8 = 0x04;
}

/// Saga intent kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum IntentKind {
    /// Retrieve a content envelope by identifier.
    Fetch = 1,
    /// Offer a content envelope for admission.
    Store = 2,
    /// Announce a service record.
    Announce = 3,
    /// Resolve providers for a service name.
    Resolve = 4,
}

/// Events published on the node's bounded observability stream.
///
/// Emission never blocks; when the queue is full the event is dropped. This
/// stream is instrumentation, not a correctness channel.
#[derive(Clone, Debug)]
pub enum StackEvent {
    /// A transport connection was accepted or dialed.
    PeerConnected(NodeId),
    /// A session ended.
    PeerDisconnected(NodeId),
    /// A Noise session completed its handshake.
    SessionEstablished(NodeId),
    /// A multiplexed stream was opened.
    StreamOpened(u32),
    /// An envelope was admitted into the content cache.
    ContentStored(ContentId),
    /// An envelope was served or retrieved.
    ContentFetched(ContentId),
    /// A verified attestation was stored.
    AttestationAdded {
        /// Node the claim is about.
        subject: NodeId,
        /// Node making the claim.
        attester: NodeId,
    },
    /// An intent message arrived on a stream.
    IntentReceived(IntentKind),
}

/// Node configuration root.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node settings.
    #[serde(default)]
    pub node: NodeSettings,
    /// Transport settings.
    #[serde(default)]
    pub transport: TransportConfig,
    /// Content cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Trust gating settings.
    #[serde(default)]
    pub trust: TrustConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node: NodeSettings::default(),
            transport: TransportConfig::default(),
            cache: CacheConfig::default(),
            trust: TrustConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Parse a TOML configuration document.
    pub fn from_toml_str(raw: &str) -> Result<Self, CodecError> {
        toml::from_str(raw).map_err(|_| CodecError::Deserialize)
    }
}

/// Node settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeSettings {
    /// Human-readable name.
    pub name: String,
    /// Data directory (identity key material).
    pub data_dir: String,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            name: "valhalla".to_string(),
            data_dir: "./data".to_string(),
        }
    }
}

/// Transport settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Session listen address, e.g. `/tcp/0.0.0.0:9001`.
    pub listen_addr: String,
    /// Optional framed WebSocket listen address, e.g. `/ws/0.0.0.0:9002`.
    #[serde(default)]
    pub ws_listen_addr: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            listen_addr: "/tcp/127.0.0.1:9001".to_string(),
            ws_listen_addr: None,
        }
    }
}

/// Content cache settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum cached envelopes before LRU eviction.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_entries: 1024 }
    }
}

/// Trust gating settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrustConfig {
    /// Minimum transitive trust required to admit third-party envelopes.
    /// Zero admits every envelope that verifies.
    pub min_trust: f64,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self { min_trust: 0.0 }
    }
}
