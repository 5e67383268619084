//! Relay session lifecycle and registry.
//!
//! A session is the unit of stream relay: one meeting, one stream id, at
//! most one signaling connection and one media connection. The registry
//! enforces the singleton rule per meeting: starting a stream that is
//! already active tears the old session down before the new one connects.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use crate::config::Config;
use crate::hub::FanoutHub;

/// Session error types
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no active session for meeting: {0}")]
    NotFound(String),
}

/// Outbound senders for the session's two upstream connections.
///
/// Each slot holds the queue feeding that connection's writer task. The
/// media task reaches the signaling connection through its slot to deliver
/// the ready acknowledgment; neither connection task holds the other.
#[derive(Default)]
struct ConnectionSlots {
    signaling: Option<mpsc::UnboundedSender<Message>>,
    media: Option<mpsc::UnboundedSender<Message>>,
}

/// One active relay session.
pub struct RelaySession {
    pub meeting_uuid: String,
    pub stream_id: String,
    shutdown_tx: broadcast::Sender<()>,
    closed: AtomicBool,
    slots: RwLock<ConnectionSlots>,
}

impl RelaySession {
    pub fn new(meeting_uuid: &str, stream_id: &str) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            meeting_uuid: meeting_uuid.to_string(),
            stream_id: stream_id.to_string(),
            shutdown_tx,
            closed: AtomicBool::new(false),
            slots: RwLock::new(ConnectionSlots::default()),
        }
    }

    /// Subscribe to the session's shutdown signal.
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Close the session. Idempotent; connection tasks observe the shutdown
    /// broadcast and unwind on their own.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!(
                meeting_uuid = %self.meeting_uuid,
                stream_id = %self.stream_id,
                "closing session"
            );
            // No receivers just means no connection task is alive yet
            let _ = self.shutdown_tx.send(());
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn set_signaling_sender(&self, tx: mpsc::UnboundedSender<Message>) {
        self.slots.write().await.signaling = Some(tx);
    }

    pub async fn clear_signaling_sender(&self) {
        self.slots.write().await.signaling = None;
    }

    pub async fn set_media_sender(&self, tx: mpsc::UnboundedSender<Message>) {
        self.slots.write().await.media = Some(tx);
    }

    pub async fn clear_media_sender(&self) {
        self.slots.write().await.media = None;
    }

    /// Clone of the signaling connection's outbound sender, if connected.
    pub async fn signaling_sender(&self) -> Option<mpsc::UnboundedSender<Message>> {
        self.slots.read().await.signaling.clone()
    }
}

/// Registry of active sessions, keyed by meeting UUID.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<RelaySession>>>,
    config: Arc<Config>,
    hub: Arc<FanoutHub>,
}

impl SessionManager {
    pub fn new(config: Arc<Config>, hub: Arc<FanoutHub>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
            hub,
        }
    }

    /// Start relaying a stream.
    ///
    /// If a session for this meeting is already active it is closed first,
    /// so a replayed start event cannot produce two concurrent relays.
    pub async fn begin(&self, meeting_uuid: &str, stream_id: &str, server_url: &str) {
        let session = Arc::new(RelaySession::new(meeting_uuid, stream_id));

        let previous = {
            let mut sessions = self.sessions.write().await;
            sessions.insert(meeting_uuid.to_string(), session.clone())
        };
        if let Some(old) = previous {
            if !old.is_closed() {
                warn!(
                    meeting_uuid = %meeting_uuid,
                    old_stream_id = %old.stream_id,
                    "replacing already-active session"
                );
            }
            old.close();
        }

        info!(
            meeting_uuid = %meeting_uuid,
            stream_id = %stream_id,
            server_url = %server_url,
            "starting relay session"
        );

        tokio::spawn(crate::signaling::run_signaling(
            session,
            self.config.clone(),
            self.hub.clone(),
            server_url.to_string(),
        ));
    }

    /// Stop the session for a meeting, if one is active.
    pub async fn stop(&self, meeting_uuid: &str) -> Result<(), SessionError> {
        let session = self.sessions.write().await.remove(meeting_uuid);
        match session {
            Some(s) => {
                s.close();
                Ok(())
            }
            None => Err(SessionError::NotFound(meeting_uuid.to_string())),
        }
    }

    pub async fn get(&self, meeting_uuid: &str) -> Option<Arc<RelaySession>> {
        self.sessions.read().await.get(meeting_uuid).cloned()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Close every active session. Used on process shutdown.
    pub async fn shutdown_all(&self) {
        let sessions: Vec<_> = self.sessions.write().await.drain().collect();
        for (_, session) in sessions {
            session.close();
        }
    }
}
