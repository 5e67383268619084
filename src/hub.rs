//! Fan-out hub broadcasting derived events to connected browser clients.
//!
//! The hub is the only consumer-facing channel: transcript entries parsed
//! from the media stream are serialized once and pushed to every registered
//! client. Delivery is fire-and-forget; a client whose channel is gone is
//! skipped, not removed — removal happens through its own close/error path.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

/// Plaintext acknowledgment sent once to every client on connect.
pub const GREETING: &str = "Connected to RTMS relay";

/// Transcript event pushed to browser clients.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptEvent {
    /// Always `"transcript"`
    #[serde(rename = "type")]
    pub event_type: &'static str,

    /// Transcript text
    pub content: String,

    /// Speaker display name
    pub user: String,

    /// Milliseconds since epoch
    pub timestamp: i64,
}

impl TranscriptEvent {
    pub fn new(content: String, user: String, timestamp: i64) -> Self {
        Self {
            event_type: "transcript",
            content,
            user,
            timestamp,
        }
    }
}

/// Registry of connected browser clients.
pub struct FanoutHub {
    clients: RwLock<HashMap<u64, mpsc::UnboundedSender<String>>>,
    next_id: AtomicU64,
}

impl FanoutHub {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a client and return its id plus the receiving end of its
    /// outbound queue. The connect greeting is queued before returning.
    pub async fn register(&self) -> (u64, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(GREETING.to_string());

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.clients.write().await.insert(id, tx);
        debug!(client_id = id, "frontend client registered");
        (id, rx)
    }

    /// Remove a client after its connection closed or errored.
    pub async fn unregister(&self, id: u64) {
        if self.clients.write().await.remove(&id).is_some() {
            debug!(client_id = id, "frontend client unregistered");
        }
    }

    /// Broadcast an event to every registered client.
    ///
    /// The event is serialized once; clients whose channel is closed are
    /// skipped. Never blocks and never fails the caller.
    pub async fn broadcast(&self, event: &TranscriptEvent) {
        let json = match serde_json::to_string(event) {
            Ok(j) => j,
            Err(e) => {
                warn!(error = %e, "failed to serialize fan-out event");
                return;
            }
        };

        let clients = self.clients.read().await;
        let mut delivered = 0usize;
        for tx in clients.values() {
            if tx.send(json.clone()).is_ok() {
                delivered += 1;
            }
        }
        debug!(
            clients = clients.len(),
            delivered, "broadcast transcript event"
        );
    }

    /// Number of currently registered clients.
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

impl Default for FanoutHub {
    fn default() -> Self {
        Self::new()
    }
}
