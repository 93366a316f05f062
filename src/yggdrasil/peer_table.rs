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

//! Bucketed peer table with Kademlia-style XOR ordering.
//!
//! Peers land in one of 256 buckets by the bit length of their XOR distance
//! to the local identifier. Buckets are capacity-bounded; when full, the
//! stalest entry makes room. `closest` answers XOR-nearest lookups across
//! all buckets.

use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::bifrost::transport::PathAddr;
use crate::core::types::NodeId;

/// Number of distance buckets (one per possible distance bit length).
pub const BUCKET_COUNT: usize = 256;

/// Peers kept per bucket.
pub const BUCKET_CAPACITY: usize = 20;

/// A known peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerInfo {
    /// Peer identifier.
    pub node_id: NodeId,
    /// Last known dialable address.
    pub addr: PathAddr,
    /// Last contact, milliseconds since UNIX epoch.
    pub last_seen_ms: u64,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Bucketed peer set keyed by XOR distance to the local node.
pub struct PeerTable {
    local: NodeId,
    buckets: RwLock<Vec<Vec<PeerInfo>>>,
}

impl PeerTable {
    /// Create an empty table for the local identifier.
    pub fn new(local: NodeId) -> Self {
        Self {
            local,
            buckets: RwLock::new(vec![Vec::new(); BUCKET_COUNT]),
        }
    }

    /// The local identifier the table is keyed against.
    pub fn local_id(&self) -> NodeId {
        self.local
    }

    fn bucket_index(&self, id: &NodeId) -> Option<usize> {
        if *id == self.local {
            return None;
        }
        let zeros = self.local.xor_distance(id).leading_zero_bits() as usize;
        Some(BUCKET_COUNT - 1 - zeros.min(BUCKET_COUNT - 1))
    }

    /// Insert or refresh a peer. The local node is never stored.
    pub fn upsert(&self, node_id: NodeId, addr: PathAddr) {
        let Some(index) = self.bucket_index(&node_id) else {
            return;
        };
        let info = PeerInfo {
            node_id,
            addr,
            last_seen_ms: now_ms(),
        };
        let mut buckets = match self.buckets.write() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        let bucket = &mut buckets[index];
        if let Some(existing) = bucket.iter_mut().find(|p| p.node_id == node_id) {
            *existing = info;
            return;
        }
        if bucket.len() >= BUCKET_CAPACITY {
            // Full bucket: the stalest entry makes room.
            if let Some(stalest) = bucket
                .iter()
                .enumerate()
                .min_by_key(|(_, p)| p.last_seen_ms)
                .map(|(i, _)| i)
            {
                bucket.remove(stalest);
            }
        }
        bucket.push(info);
    }

    /// Remove a peer.
    pub fn remove(&self, node_id: &NodeId) -> bool {
        let Some(index) = self.bucket_index(node_id) else {
            return false;
        };
        let mut buckets = match self.buckets.write() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        let bucket = &mut buckets[index];
        match bucket.iter().position(|p| &p.node_id == node_id) {
            Some(pos) => {
                bucket.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Look up a single peer.
    pub fn get(&self, node_id: &NodeId) -> Option<PeerInfo> {
        let index = self.bucket_index(node_id)?;
        let buckets = match self.buckets.read() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        buckets[index].iter().find(|p| &p.node_id == node_id).cloned()
    }

    /// The `count` peers XOR-closest to `target`, nearest first.
    pub fn closest(&self, target: &NodeId, count: usize) -> Vec<PeerInfo> {
        let buckets = match self.buckets.read() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        let mut all: Vec<PeerInfo> = buckets.iter().flatten().cloned().collect();
        all.sort_by(|a, b| {
            a.node_id
                .xor_distance(target)
                .cmp(&b.node_id.xor_distance(target))
        });
        all.truncate(count);
        all
    }

    /// Total peers across all buckets.
    pub fn len(&self) -> usize {
        let buckets = match self.buckets.read() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        buckets.iter().map(|b| b.len()).sum()
    }

    /// Whether the table holds no peers.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
