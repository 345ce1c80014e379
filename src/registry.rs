//! Live-consumer registry for streaming requests.
//!
//! Each streaming request has exactly one consumer. The registry owns the
//! sending half of that consumer's channel from `connect` until the request
//! ends or the consumer goes away, whichever is first. It is an ordinary
//! value: create one, wrap it in an `Arc`, and hand it to the streaming
//! entry points.
//!
//! Delivery is best-effort. A send to a consumer whose receiver was dropped
//! removes the consumer and reports `false`; nothing is raised.

use crate::progress::{ProgressEvent, ProgressSink};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

/// Opaque identifier of a registered consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Registry of live event consumers.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    next_id: AtomicU64,
    consumers: Mutex<HashMap<ConnectionId, UnboundedSender<ProgressEvent>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn consumers(&self) -> MutexGuard<'_, HashMap<ConnectionId, UnboundedSender<ProgressEvent>>> {
        // A panic while holding the lock leaves the map itself consistent.
        self.consumers.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Register an existing sender as a consumer.
    pub fn register(&self, sender: UnboundedSender<ProgressEvent>) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.consumers().insert(id, sender);
        debug!("registered consumer {}", id);
        id
    }

    /// Create a channel, register its sender and return the receiving half.
    pub fn connect(&self) -> (ConnectionId, UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (self.register(tx), rx)
    }

    /// Deliver one event. Returns `false` when the consumer is unknown or
    /// has disconnected; a disconnected consumer is deregistered.
    pub fn send(&self, id: ConnectionId, event: ProgressEvent) -> bool {
        let mut consumers = self.consumers();
        let Some(sender) = consumers.get(&id) else {
            return false;
        };
        if sender.send(event).is_ok() {
            return true;
        }
        consumers.remove(&id);
        debug!("consumer {} disconnected; deregistered", id);
        false
    }

    /// Answer a keep-alive ping with a `pong` event.
    pub fn heartbeat(&self, id: ConnectionId) -> bool {
        self.send(id, ProgressEvent::pong())
    }

    /// Remove a consumer. Dropping its sender closes the consumer's stream.
    pub fn deregister(&self, id: ConnectionId) -> bool {
        let removed = self.consumers().remove(&id).is_some();
        if removed {
            debug!("deregistered consumer {}", id);
        }
        removed
    }

    pub fn is_registered(&self, id: ConnectionId) -> bool {
        self.consumers().contains_key(&id)
    }

    /// Number of live consumers.
    pub fn len(&self) -> usize {
        self.consumers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A [`ProgressSink`] bound to one registered consumer.
///
/// Dropping the sink deregisters the consumer, so every exit path of a
/// streaming run (completion, error, disconnect, panic) releases it.
#[derive(Debug)]
pub struct RegisteredSink {
    registry: Arc<ConnectionRegistry>,
    id: ConnectionId,
    connected: bool,
}

impl RegisteredSink {
    pub fn new(registry: Arc<ConnectionRegistry>, id: ConnectionId) -> Self {
        Self {
            registry,
            id,
            connected: true,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl ProgressSink for RegisteredSink {
    fn emit(&mut self, event: ProgressEvent) -> bool {
        if !self.connected {
            return false;
        }
        self.connected = self.registry.send(self.id, event);
        self.connected
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

impl Drop for RegisteredSink {
    fn drop(&mut self) {
        self.registry.deregister(self.id);
    }
}
