//! Outbound message routing.
//!
//! The engine never talks to sockets. Each connection registers an
//! unbounded sender here; the transport layer drains the matching
//! receiver into its socket. A send to a connection that has gone away
//! is silently dropped — the departure path cleans the entry up.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;

use wordweave_protocol::{ConnectionId, ServerMessage};

pub struct ClientRegistry {
    senders: Mutex<HashMap<ConnectionId, UnboundedSender<ServerMessage>>>,
    next_id: AtomicU64,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            senders: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a new connection and returns its id plus the stream of
    /// messages addressed to it.
    pub async fn connect(
        &self,
    ) -> (ConnectionId, UnboundedReceiver<ServerMessage>) {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().await.insert(id, tx);
        (id, rx)
    }

    pub async fn disconnect(&self, id: ConnectionId) {
        self.senders.lock().await.remove(&id);
    }

    /// Sends one message to one connection. No-op if it is gone.
    pub async fn send(&self, id: ConnectionId, message: ServerMessage) {
        let senders = self.senders.lock().await;
        if let Some(tx) = senders.get(&id) {
            let _ = tx.send(message);
        }
    }

    /// Sends one message to every listed connection.
    pub async fn send_to_all(
        &self,
        ids: &[ConnectionId],
        message: &ServerMessage,
    ) {
        let senders = self.senders.lock().await;
        for id in ids {
            if let Some(tx) = senders.get(id) {
                let _ = tx.send(message.clone());
            }
        }
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}
