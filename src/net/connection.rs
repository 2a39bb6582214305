//! Inbound connection registry.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Hold one close handle per open connection, and nothing else
//! - Force-close every open connection exactly once on teardown
//!
//! # Design Decisions
//! - The registry never owns the socket; the connection task does
//! - A connection deregisters itself through [`ConnectionGuard`] when it
//!   ends, so entries are bounded by the number of open connections
//! - Closing is terminal: once [`ConnectionRegistry::close_all`] ran, no
//!   connection can register, so none outlives teardown

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::observability::metrics;

/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Default)]
struct CloseHandles {
    handles: HashMap<ConnectionId, oneshot::Sender<()>>,
    closed: bool,
}

/// Close handles for every open inbound connection.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<Mutex<CloseHandles>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, CloseHandles> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new connection.
    ///
    /// The receiver resolves when the registry closes the connection; the
    /// guard removes the entry when dropped. `None` once the registry has
    /// been closed.
    pub fn register(&self) -> Option<(ConnectionGuard, oneshot::Receiver<()>)> {
        let id = ConnectionId::new();
        let (tx, rx) = oneshot::channel();
        let open = {
            let mut inner = self.inner();
            if inner.closed {
                return None;
            }
            inner.handles.insert(id, tx);
            inner.handles.len()
        };
        metrics::connection_opened();
        tracing::debug!(connection_id = %id, open, "Connection registered");

        let guard = ConnectionGuard {
            registry: self.clone(),
            id,
        };
        Some((guard, rx))
    }

    /// Signal every registered connection to close and refuse new ones.
    /// Returns how many were signalled.
    pub fn close_all(&self) -> usize {
        let handles: Vec<_> = {
            let mut inner = self.inner();
            inner.closed = true;
            inner.handles.drain().collect()
        };
        let count = handles.len();
        for (id, tx) in handles {
            tracing::debug!(connection_id = %id, "Closing connection on teardown");
            let _ = tx.send(());
        }
        count
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.inner().handles.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner().closed
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn deregister(&self, id: ConnectionId) {
        let open = {
            let mut inner = self.inner();
            inner.handles.remove(&id);
            inner.handles.len()
        };
        tracing::debug!(connection_id = %id, open, "Connection deregistered");
    }
}

/// Keeps a connection registered for as long as it lives.
#[derive(Debug)]
pub struct ConnectionGuard {
    registry: ConnectionRegistry,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.deregister(self.id);
        metrics::connection_closed();
    }
}
