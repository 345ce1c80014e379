//! Progress events and the sinks that receive them.
//!
//! Every request produces an append-only, ordered sequence of
//! [`ProgressEvent`]s. The last event of a finished request is always
//! `complete` or `error`.
//!
//! The orchestrator never knows how events travel: it hands each one to a
//! [`ProgressSink`]. One-shot mode collects them in a [`ProgressLog`];
//! streaming mode forwards them through the
//! [`crate::registry::ConnectionRegistry`] to a single consumer.
//!
//! # Example
//!
//! ```rust
//! use eventdoc_extract::progress::{ProgressEvent, ProgressLog, ProgressSink, ProgressStatus};
//!
//! let mut log = ProgressLog::default();
//! log.emit(ProgressEvent::processing("Segmenting image"));
//! log.emit(ProgressEvent::complete("Done", None));
//! assert_eq!(log.events().len(), 2);
//! assert_eq!(log.events()[1].status, ProgressStatus::Complete);
//! ```

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Status of one progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Processing,
    Complete,
    Error,
    Warning,
    Pong,
}

impl ProgressStatus {
    /// `complete` and `error` end a request's event sequence.
    pub fn is_terminal(self) -> bool {
        matches!(self, ProgressStatus::Complete | ProgressStatus::Error)
    }
}

/// One entry of a request's progress sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub status: ProgressStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl ProgressEvent {
    pub fn new(
        status: ProgressStatus,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self {
            status,
            message: message.into(),
            data,
            timestamp: now_millis(),
        }
    }

    pub fn processing(message: impl Into<String>) -> Self {
        Self::new(ProgressStatus::Processing, message, None)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(ProgressStatus::Warning, message, None)
    }

    pub fn complete(message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self::new(ProgressStatus::Complete, message, data)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ProgressStatus::Error, message, None)
    }

    pub fn pong() -> Self {
        Self::new(ProgressStatus::Pong, "pong", None)
    }

    /// Attach a JSON payload.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Current time as milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Receiver of progress events for one request.
///
/// `emit` reports whether the event reached its consumer. A sink whose
/// consumer went away returns `false` from then on; the orchestrator treats
/// that as a request to stop at the next stage boundary, never as a failure.
pub trait ProgressSink: Send {
    fn emit(&mut self, event: ProgressEvent) -> bool;

    /// Whether events can still be delivered.
    fn is_connected(&self) -> bool {
        true
    }
}

/// Accumulates every event in memory (one-shot mode).
#[derive(Debug, Default, Clone)]
pub struct ProgressLog {
    events: Vec<ProgressEvent>,
}

impl ProgressLog {
    pub fn events(&self) -> &[ProgressEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<ProgressEvent> {
        self.events
    }
}

impl ProgressSink for ProgressLog {
    fn emit(&mut self, event: ProgressEvent) -> bool {
        self.events.push(event);
        true
    }
}
