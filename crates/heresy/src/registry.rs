//! Registry of connected agents
//!
//! Every accepted WebSocket connection is registered under a fresh
//! [`Uuid`] together with the writer queue of its connection task.
//! Broadcasts only reach entries still marked open.

use crate::Result;
use heresy_proto::{encode, Message};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

/// Instruction for a connection's writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Send a text frame
    Text(String),
    /// Close the connection from the server side
    Close,
}

#[derive(Debug)]
struct Entry {
    tx: mpsc::UnboundedSender<Outbound>,
    open: bool,
    peer: Option<SocketAddr>,
}

/// Set of live agent connections
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: RwLock<HashMap<Uuid, Entry>>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and return its id
    pub async fn register(&self, tx: mpsc::UnboundedSender<Outbound>, peer: Option<SocketAddr>) -> Uuid {
        let id = Uuid::new_v4();
        self.entries.write().await.insert(
            id,
            Entry {
                tx,
                open: true,
                peer,
            },
        );
        info!(%id, peer = ?peer, "Agent connected");
        id
    }

    /// Forget a connection
    pub async fn remove(&self, id: Uuid) {
        if let Some(entry) = self.entries.write().await.remove(&id) {
            info!(%id, peer = ?entry.peer, "Agent disconnected");
        }
    }

    /// Send `message` to every open connection
    ///
    /// Returns the number of connections the message was queued for.
    pub async fn broadcast(&self, message: &Message) -> Result<usize> {
        let text = encode(message)?;
        let entries = self.entries.read().await;

        let mut sent = 0;
        for (id, entry) in entries.iter().filter(|(_, entry)| entry.open) {
            if entry.tx.send(Outbound::Text(text.clone())).is_ok() {
                sent += 1;
            } else {
                debug!(%id, "Writer gone, skipping connection");
            }
        }

        debug!("Broadcast {} message to {} agent(s)", message.kind(), sent);
        Ok(sent)
    }

    /// Ask a connection to close
    ///
    /// The entry stops receiving broadcasts at once and stays registered
    /// until its connection task removes it. Returns `false` when the id is
    /// unknown.
    pub async fn close(&self, id: Uuid) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get_mut(&id) {
            Some(entry) => {
                entry.open = false;
                let _ = entry.tx.send(Outbound::Close);
                true
            }
            None => false,
        }
    }

    /// Number of connections currently open
    pub async fn open_count(&self) -> usize {
        self.entries.read().await.values().filter(|e| e.open).count()
    }

    /// Ids of every registered connection
    pub async fn ids(&self) -> Vec<Uuid> {
        self.entries.read().await.keys().copied().collect()
    }
}
