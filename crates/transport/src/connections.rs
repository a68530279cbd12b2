//! Connection registry for the duplex bindings.
//!
//! Maps connection ids to outbound frame senders. Sending to a closed
//! or unknown connection is a benign no-op so a departed client never
//! wedges the write path.

use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::mpsc;
use tracing::debug;

/// Registry of live WebSocket connections keyed by connection id.
#[derive(Default)]
pub struct ConnectionTable {
    inner: RwLock<HashMap<String, mpsc::UnboundedSender<String>>>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection's outbound sender under its id.
    pub fn register(&self, id: impl Into<String>, tx: mpsc::UnboundedSender<String>) {
        let id = id.into();
        debug!(connection = %id, "connection registered");
        self.inner.write().unwrap().insert(id, tx);
    }

    /// Drop a connection from the table. Returns false when the id was
    /// not present (already removed).
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.inner.write().unwrap().remove(id).is_some();
        if removed {
            debug!(connection = %id, "connection removed");
        }
        removed
    }

    /// Send a frame to one connection. Returns false without error when
    /// the connection is gone.
    pub fn send_to(&self, id: &str, frame: &str) -> bool {
        let table = self.inner.read().unwrap();
        match table.get(id) {
            Some(tx) => tx.send(frame.to_string()).is_ok(),
            None => false,
        }
    }

    /// Send a frame to every connection, pruning any that hung up.
    /// Returns the number of connections reached.
    pub fn broadcast(&self, frame: &str) -> usize {
        let mut table = self.inner.write().unwrap();
        let mut dead: Vec<String> = Vec::new();
        let mut reached = 0;
        for (id, tx) in table.iter() {
            if tx.send(frame.to_string()).is_ok() {
                reached += 1;
            } else {
                dead.push(id.clone());
            }
        }
        for id in dead {
            table.remove(&id);
        }
        reached
    }

    pub fn count(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    /// Drop every sender, which ends the per-connection send tasks.
    pub fn close_all(&self) {
        self.inner.write().unwrap().clear();
    }
}
