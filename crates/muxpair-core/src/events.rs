//! Run progress events.
//!
//! [`EventBus`] wraps a `tokio::sync::broadcast` channel. The run coordinator
//! is the only producer; a CLI or GUI shell subscribes to render progress and
//! never needs to reach into the run itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::broadcast;

use crate::media::{RunReport, RunState, StreamKind};

/// Default broadcast buffer size.
const DEFAULT_CAPACITY: usize = 1024;

// ---------------------------------------------------------------------------
// RunEvent
// ---------------------------------------------------------------------------

/// Payload describing what happened during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    StateChanged {
        state: RunState,
    },
    ScanComplete {
        files: usize,
    },
    ProbeComplete {
        path: PathBuf,
        kind: StreamKind,
        duration: Option<f64>,
    },
    ProbeFailed {
        path: PathBuf,
        error: String,
    },
    MatchComplete {
        pairs: usize,
        unmatched: usize,
    },
    /// `index` is the 1-based pair position in submission order.
    MergeComplete {
        index: usize,
        output: PathBuf,
        attempts: u32,
    },
    MergeFailed {
        index: usize,
        output: PathBuf,
        attempts: u32,
        error: String,
    },
    RunComplete {
        report: Box<RunReport>,
    },
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A timestamped event ready for broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub payload: RunEvent,
}

impl Event {
    pub fn new(payload: RunEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast channel for [`RunEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new event bus with the given broadcast buffer size.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Broadcast an event to all current subscribers.
    pub fn emit(&self, payload: RunEvent) {
        if self.tx.send(Event::new(payload)).is_err() {
            tracing::trace!("No subscribers for run event");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
