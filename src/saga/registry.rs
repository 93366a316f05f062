// Copyright (c) 2026 Valhalla
// Licensed under the Apache License, Version 2.0

//! In-memory service registry: service name to provider records.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use crate::core::types::NodeId;

/// One provider of a named service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    /// Service name.
    pub service_name: String,
    /// Providing node.
    pub node_id: NodeId,
    /// Free-form capability map.
    pub capabilities: BTreeMap<String, String>,
    /// Advertised load in `[0, 1]`.
    pub load: f64,
    /// Provider version string.
    pub version: String,
}

/// Thread-safe `service_name -> providers` mapping.
///
/// At most one record exists per `(service_name, node_id)`; re-registration
/// replaces in place. No ordering guarantees between concurrent
/// registrations.
#[derive(Default)]
pub struct ServiceRegistry {
    inner: RwLock<HashMap<String, Vec<ServiceRecord>>>,
}

impl ServiceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider, replacing any record with the same
    /// `(service_name, node_id)`.
    pub fn register(&self, record: ServiceRecord) {
        let mut inner = match self.inner.write() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        let records = inner.entry(record.service_name.clone()).or_default();
        match records
            .iter_mut()
            .find(|r| r.node_id == record.node_id)
        {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
    }

    /// Snapshot the current providers for a service.
    ///
    /// Returns a copy; callers never observe in-place mutation.
    pub fn lookup(&self, service_name: &str) -> Vec<ServiceRecord> {
        let inner = match self.inner.read() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        inner.get(service_name).cloned().unwrap_or_default()
    }

    /// Remove the first record matching `(service_name, node_id)`.
    pub fn unregister(&self, service_name: &str, node_id: &NodeId) -> bool {
        let mut inner = match self.inner.write() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        let Some(records) = inner.get_mut(service_name) else {
            return false;
        };
        let Some(pos) = records.iter().position(|r| &r.node_id == node_id) else {
            return false;
        };
        records.remove(pos);
        if records.is_empty() {
            inner.remove(service_name);
        }
        true
    }

    /// Number of distinct service names.
    pub fn service_count(&self) -> usize {
        let inner = match self.inner.read() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        inner.len()
    }
}
