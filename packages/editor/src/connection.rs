//! Connection handles.
//!
//! The engine never touches sockets. Each connection is represented by a
//! cloneable handle wrapping an unbounded queue of serialized events; the
//! transport layer owns a writer task that drains the queue into the actual
//! socket. Enqueueing never blocks, so broadcasts can happen while the
//! engine's state lock is held.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::protocol::ServerEvent;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to one client connection. Identity is the numeric id, not the
/// channel: clones compare equal.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: u64,
    tx: mpsc::UnboundedSender<String>,
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

impl ConnectionHandle {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            tx,
        }
    }

    /// Handle plus the receiving end, for tests and in-process transports.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Serializes and enqueues one event. Transport failures are logged and
    /// absorbed; a dead peer must never fail the sender.
    pub fn send(&self, event: &ServerEvent) {
        match serde_json::to_string(event) {
            Ok(payload) => {
                if self.tx.send(payload).is_err() {
                    tracing::warn!(connection = self.id, "dropping event for closed connection");
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to serialize outbound event");
            }
        }
    }
}
