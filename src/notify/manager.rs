use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::OrderEvent;

/// A transport-level handle the fan-out can push text frames to
pub trait LiveConnection: Send + Sync {
    /// Distinguishes a replaced connection from its successor
    fn id(&self) -> Uuid;

    fn is_open(&self) -> bool;

    /// Hand a frame to the transport. Returns false if it was not accepted.
    fn send_text(&self, text: String) -> bool;
}

/// WebSocket-backed connection: frames go through a channel drained by the
/// socket's writer task.
pub struct WsConnection {
    id: Uuid,
    tx: mpsc::UnboundedSender<String>,
    open: AtomicBool,
}

impl WsConnection {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
            open: AtomicBool::new(true),
        }
    }

    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

impl LiveConnection for WsConnection {
    fn id(&self) -> Uuid {
        self.id
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.tx.is_closed()
    }

    fn send_text(&self, text: String) -> bool {
        self.tx.send(text).is_ok()
    }
}

/// Order id → live connection. At most one connection per order; events sent
/// before a client connects are dropped.
#[derive(Default)]
pub struct ConnectionManager {
    connections: DashMap<String, Arc<dyn LiveConnection>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `conn` for `order_id`, replacing any previous connection
    pub fn add_connection(&self, order_id: &str, conn: Arc<dyn LiveConnection>) {
        if let Some(previous) = self.connections.insert(order_id.to_string(), conn) {
            debug!(order_id, replaced = %previous.id(), "Replaced live connection");
        }
        info!(
            order_id,
            total = self.connections.len(),
            "Live connection registered"
        );
    }

    pub fn remove_connection(&self, order_id: &str) {
        if self.connections.remove(order_id).is_some() {
            info!(
                order_id,
                total = self.connections.len(),
                "Live connection removed"
            );
        }
    }

    /// Remove the registration only if it still points at `conn_id`, so a
    /// replaced socket closing late cannot evict its successor.
    pub fn release(&self, order_id: &str, conn_id: Uuid) {
        if self
            .connections
            .remove_if(order_id, |_, conn| conn.id() == conn_id)
            .is_some()
        {
            info!(order_id, "Live connection released");
        }
    }

    pub fn has_connection(&self, order_id: &str) -> bool {
        self.connections.contains_key(order_id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Best-effort push. Missing or closed connections are a no-op.
    pub fn send_to_order(&self, order_id: &str, event: &OrderEvent) {
        // Clone out so no map shard lock is held while sending
        let conn = match self.connections.get(order_id) {
            Some(entry) => entry.value().clone(),
            None => {
                debug!(order_id, event = event.kind(), "No live connection for order");
                return;
            }
        };

        if !conn.is_open() {
            debug!(order_id, event = event.kind(), "Live connection not open");
            return;
        }

        let text = match serde_json::to_string(event) {
            Ok(text) => text,
            Err(e) => {
                warn!(order_id, error = %e, "Failed to serialize order event");
                return;
            }
        };

        if conn.send_text(text) {
            debug!(order_id, event = event.kind(), "Order event sent");
        } else {
            debug!(order_id, event = event.kind(), "Live connection rejected event");
        }
    }
}
