// Copyright (c) 2026 Valhalla
// Licensed under the Apache License, Version 2.0

//! Content-addressed LRU cache.
//!
//! Strict LRU keyed by [`ContentId`], bounded by a configured entry count.
//! `get` refreshes recency, so reads take the same exclusive lock as
//! writes; callers observe a linearizable order of put/get/evict.

#![forbid(unsafe_code)]

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::core::types::ContentId;
use crate::saga::envelope::ContentEnvelope;

/// Bounded LRU of content envelopes.
pub struct ContentCache {
    inner: Mutex<LruCache<ContentId, ContentEnvelope>>,
    evictions: AtomicU64,
}

impl ContentCache {
    /// Create a cache bounded to `max_entries` (minimum 1).
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            evictions: AtomicU64::new(0),
        }
    }

    /// Insert an envelope as most-recently-used.
    ///
    /// Replaces an existing entry for the same CID; evicts the
    /// least-recently-used entry when full. Never fails the caller.
    pub fn put(&self, envelope: ContentEnvelope) {
        let mut inner = match self.inner.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        let key = envelope.cid;
        if let Some((evicted_key, _)) = inner.push(key, envelope) {
            if evicted_key != key {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Look up an envelope, refreshing its recency on a hit.
    pub fn get(&self, cid: &ContentId) -> Option<ContentEnvelope> {
        let mut inner = match self.inner.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        inner.get(cid).cloned()
    }

    /// Current entry count.
    pub fn size(&self) -> usize {
        let inner = match self.inner.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        inner.len()
    }

    /// Total strict-LRU evictions so far.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}
