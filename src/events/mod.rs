//! Progress and status events emitted by the orchestrator
//!
//! Observers implement [`EventSink`] and register with an [`EventBus`].
//! Dispatch is synchronous and follows emission order; the orchestrator never
//! waits for, or depends on, an observer doing anything with an event.
//!
//! # Components
//!
//! - `TracingSink`: logs every event
//! - `ChannelSink`: forwards events into a `tokio::sync::broadcast` channel
//!   for async consumers (dashboards, SSE endpoints)

mod sinks;

pub use sinks::{ChannelSink, HarvestEvent, TracingSink};

use crate::crawler::SourceReference;
use crate::state::{BatchStatus, ItemStatus};
use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Per-item progress
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub batch_id: Uuid,
    /// One-based position of the item within the batch
    pub current: usize,
    pub total: usize,
    pub item: SourceReference,
    pub status: ItemStatus,
}

/// Batch-level status change
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEvent {
    /// None when no batch was created (already running, resolve failure)
    pub batch_id: Option<Uuid>,
    pub message: String,
    pub status: BatchStatus,
    pub timestamp: DateTime<Utc>,
}

impl StatusEvent {
    pub fn new(batch_id: Option<Uuid>, status: BatchStatus, message: impl Into<String>) -> Self {
        Self {
            batch_id,
            message: message.into(),
            status,
            timestamp: Utc::now(),
        }
    }
}

/// Observer of orchestrator events
pub trait EventSink: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
    fn on_status(&self, event: &StatusEvent);
}

/// Ordered fan-out to any number of sinks
#[derive(Clone, Default)]
pub struct EventBus {
    sinks: Arc<RwLock<Vec<Arc<dyn EventSink>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a sink; takes effect for the next emitted event
    pub fn subscribe(&self, sink: Arc<dyn EventSink>) {
        match self.sinks.write() {
            Ok(mut sinks) => sinks.push(sink),
            Err(poisoned) => poisoned.into_inner().push(sink),
        }
    }

    pub fn sink_count(&self) -> usize {
        self.snapshot().len()
    }

    pub fn emit_progress(&self, event: ProgressEvent) {
        for sink in self.snapshot() {
            sink.on_progress(&event);
        }
    }

    pub fn emit_status(&self, event: StatusEvent) {
        for sink in self.snapshot() {
            sink.on_status(&event);
        }
    }

    // Sinks run outside the lock so one may subscribe another mid-dispatch.
    fn snapshot(&self) -> Vec<Arc<dyn EventSink>> {
        match self.sinks.read() {
            Ok(sinks) => sinks.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
