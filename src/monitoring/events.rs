// Copyright (c) 2026 Valhalla
// Licensed under the Apache License, Version 2.0

//! Bounded event stream for UI instrumentation.
//!
//! Emission never blocks: a full queue drops the event. This is
//! observability, not a correctness channel; anything that needs reliable
//! observation belongs on an explicit subscribe API instead.

#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

use crate::core::types::StackEvent;

/// Event queue depth.
pub const EVENT_QUEUE_DEPTH: usize = 256;

/// Non-blocking, drop-on-full event emitter.
#[derive(Clone)]
pub struct EventBus {
    sender: mpsc::Sender<StackEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a bus and its single consumer.
    pub fn channel() -> (EventBus, mpsc::Receiver<StackEvent>) {
        let (sender, receiver) = mpsc::channel(EVENT_QUEUE_DEPTH);
        (
            EventBus {
                sender,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            receiver,
        )
    }

    /// Emit an event; drops it when the queue is full or the consumer is
    /// gone.
    pub fn emit(&self, event: StackEvent) {
        if let Err(e) = self.sender.try_send(event) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            trace!(?e, "event dropped");
        }
    }

    /// Events dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
