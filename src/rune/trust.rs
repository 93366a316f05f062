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

//! Transitive trust scoring over the attestation graph.
//!
//! Breadth-first walk from the local node with per-hop decay. The walk
//! expands only through subjects the current node actually attested; an
//! attestation by some third party never creates an edge out of the
//! current node.

use std::collections::{HashSet, VecDeque};

use crate::core::types::NodeId;
use crate::rune::attestation::AttestationStore;

/// Per-hop trust decay.
pub const TRUST_DECAY: f64 = 0.8;

/// Maximum walk depth.
pub const MAX_TRUST_DEPTH: usize = 5;

/// Minimum trust worth propagating.
pub const MIN_TRUST: f64 = 0.01;

/// Score how much `source` trusts `target`, in `[0, 1]`.
///
/// `source == target` scores `1.0`. Otherwise the best decayed path through
/// the attestation graph wins; no path scores `0.0`.
pub fn compute_trust(store: &AttestationStore, source: NodeId, target: NodeId) -> f64 {
    if source == target {
        return 1.0;
    }

    let mut max_trust: f64 = 0.0;
    let mut visited: HashSet<NodeId> = HashSet::new();
    visited.insert(source);

    let mut queue: VecDeque<(NodeId, f64, usize)> = VecDeque::new();
    queue.push_back((source, 1.0, 0));

    while let Some((current, trust, depth)) = queue.pop_front() {
        for attestation in store.attestations_by(&current) {
            let derived = trust * attestation.confidence * TRUST_DECAY;
            if attestation.subject == target && derived > max_trust {
                max_trust = derived;
            }
            if depth < MAX_TRUST_DEPTH
                && derived >= MIN_TRUST
                && visited.insert(attestation.subject)
            {
                queue.push_back((attestation.subject, derived, depth + 1));
            }
        }
    }

    max_trust
}
