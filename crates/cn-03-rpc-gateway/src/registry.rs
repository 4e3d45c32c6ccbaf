//! # Connection Registry
//!
//! Maps each authenticated address to the outbound side of its live
//! connection. Callers only see `register`, `unregister`, `send` and
//! `close_all`; the map itself stays private behind a reader/writer lock.
//!
//! Delivery is best-effort: a frame for an address with no live connection is
//! dropped and reported as not delivered. Nothing is queued or retried.

use parking_lot::RwLock;
use shared_types::Address;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Identifies one socket, independent of who authenticated on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Time-ordered (UUID v7).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outbound side of one connection: a bounded frame queue drained by the
/// socket writer, plus a close signal observed by both the reader loop and
/// the writer.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    frames: mpsc::Sender<String>,
    closed: Arc<watch::Sender<bool>>,
}

impl ConnectionHandle {
    /// Create a handle and the receiver its writer drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (frames, rx) = mpsc::channel(capacity.max(1));
        let (closed, _) = watch::channel(false);
        (
            Self {
                id: ConnectionId::new(),
                frames,
                closed: Arc::new(closed),
            },
            rx,
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Enqueue a frame, waiting at most `deadline` for queue space.
    ///
    /// Returns `false` if the connection is closed or the deadline passed.
    pub async fn send(&self, frame: String, deadline: Duration) -> bool {
        if self.is_closed() {
            return false;
        }
        match self.frames.send_timeout(frame, deadline).await {
            Ok(()) => true,
            Err(e) => {
                warn!(connection_id = %self.id, error = %e, "Outbound frame dropped");
                false
            }
        }
    }

    /// Signal the connection to shut down. Idempotent.
    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow() || self.frames.is_closed()
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        // The sender lives in `self`, so `wait_for` cannot fail here.
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

pub struct ConnectionRegistry {
    connections: RwLock<HashMap<Address, ConnectionHandle>>,
    write_timeout: Duration,
    shut_down: AtomicBool,
}

impl ConnectionRegistry {
    pub fn new(write_timeout: Duration) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            write_timeout,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Insert or replace the connection of `address`.
    ///
    /// A replaced connection is force-closed. After [`close_all`](Self::close_all)
    /// new registrations are refused and the handle is closed immediately.
    pub fn register(&self, address: Address, handle: ConnectionHandle) {
        if self.shut_down.load(Ordering::Acquire) {
            handle.close();
            return;
        }

        let previous = self.connections.write().insert(address, handle.clone());
        match previous {
            Some(old) if old.id() != handle.id() => {
                info!(
                    address = %address,
                    old_connection = %old.id(),
                    new_connection = %handle.id(),
                    "Replacing existing connection"
                );
                old.close();
            }
            _ => debug!(address = %address, connection_id = %handle.id(), "Connection registered"),
        }
    }

    /// Remove the entry for `address`, if any.
    pub fn unregister(&self, address: &Address) {
        if self.connections.write().remove(address).is_some() {
            debug!(address = %address, "Connection unregistered");
        }
    }

    /// Remove the entry for `address` only if it still belongs to `id`.
    ///
    /// A connection that was replaced must not evict its successor on exit.
    pub fn unregister_connection(&self, address: &Address, id: ConnectionId) {
        let mut connections = self.connections.write();
        if connections.get(address).is_some_and(|h| h.id() == id) {
            connections.remove(address);
            debug!(address = %address, connection_id = %id, "Connection unregistered");
        }
    }

    /// Best-effort delivery of one frame.
    pub async fn send(&self, address: &Address, frame: String) -> bool {
        // Clone the handle so the lock is not held across the await.
        let handle = self.connections.read().get(address).cloned();
        match handle {
            Some(handle) => handle.send(frame, self.write_timeout).await,
            None => {
                debug!(address = %address, "Recipient not connected");
                false
            }
        }
    }

    /// Force-close every registered connection and refuse new ones.
    pub fn close_all(&self) {
        self.shut_down.store(true, Ordering::Release);
        let drained: Vec<(Address, ConnectionHandle)> =
            self.connections.write().drain().collect();
        for (address, handle) in drained {
            info!(address = %address, "Closing connection");
            handle.close();
        }
    }

    pub fn is_connected(&self, address: &Address) -> bool {
        self.connections.read().contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }
}
