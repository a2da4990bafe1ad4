// Broadcaster: fans encoded frames out to every connection through a
// broadcast channel. Slow clients lag and skip frames instead of blocking
// the rest; the per-connection write pump logs the skip.

use std::collections::HashSet;
use std::sync::RwLock;

use tokio::sync::broadcast;

use crate::messages::{encode_message, GameMessage};
use crate::metrics;

/// Frames buffered per subscriber before a slow client starts lagging.
const BROADCAST_CAPACITY: usize = 256;

pub struct Hub {
    tx: broadcast::Sender<Vec<u8>>,
    clients: RwLock<HashSet<String>>,
}

impl Hub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Hub {
            tx,
            clients: RwLock::new(HashSet::new()),
        }
    }

    /// Subscribe a new write pump to the outbound stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<u8>> {
        self.tx.subscribe()
    }

    /// Queue a pre-encoded frame for every connection. Send errors only mean
    /// there are no subscribers right now.
    pub fn broadcast_frame(&self, frame: Vec<u8>) {
        metrics::FRAMES_BROADCAST_TOTAL.inc();
        let _ = self.tx.send(frame);
    }

    pub fn broadcast_message(&self, message: &GameMessage) {
        match encode_message(message) {
            Ok(frame) => self.broadcast_frame(frame),
            Err(e) => tracing::error!("failed to encode broadcast message: {e}"),
        }
    }

    // --- Client registry (presence bookkeeping) ---

    pub fn register(&self, id: &str) {
        let mut clients = self.clients.write().unwrap();
        clients.insert(id.to_string());
        metrics::CONNECTED_WEBSOCKETS.set(clients.len() as i64);
    }

    pub fn unregister(&self, id: &str) {
        let mut clients = self.clients.write().unwrap();
        clients.remove(id);
        metrics::CONNECTED_WEBSOCKETS.set(clients.len() as i64);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.clients.read().unwrap().contains(id)
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().unwrap().len()
    }
}
