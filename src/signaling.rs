//! Signaling connection: handshake, media endpoint discovery, keep-alive.
//!
//! One task per session. The task owns the read half of the WebSocket; all
//! writes go through an unbounded queue drained by a companion writer task,
//! so the ready acknowledgment from the media task and our own keep-alive
//! echoes never contend for the sink.

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::auth::stream_signature;
use crate::config::Config;
use crate::hub::FanoutHub;
use crate::protocol::{msg_type, KeepAliveResponse, ServerMessage, SignalingHandshake};
use crate::session::RelaySession;

/// Signaling/media channel errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("handshake rejected with status {0}")]
    HandshakeRejected(i64),

    #[error("connection idle for {0} seconds")]
    IdleTimeout(u64),

    #[error("outbound queue closed")]
    QueueClosed,
}

/// Where the signaling connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignalingState {
    AwaitingHandshake,
    Established,
}

/// Serialize a message and queue it on a connection's outbound channel.
pub(crate) fn send_json<T: Serialize>(
    tx: &mpsc::UnboundedSender<Message>,
    value: &T,
) -> Result<(), ChannelError> {
    let json = serde_json::to_string(value)?;
    tx.send(Message::Text(json))
        .map_err(|_| ChannelError::QueueClosed)
}

/// Drain an outbound queue into a WebSocket sink. Exits when the queue
/// closes or the sink errors; a close frame is sent on the way out.
pub(crate) async fn pump_outbound<S>(mut rx: mpsc::UnboundedReceiver<Message>, mut sink: S)
where
    S: SinkExt<Message> + Unpin,
{
    while let Some(msg) = rx.recv().await {
        if sink.send(msg).await.is_err() {
            debug!("outbound sink closed, stopping writer");
            return;
        }
    }
    let _ = sink.send(Message::Close(None)).await;
}

/// Run the signaling connection for a session until it closes.
///
/// Losing this connection clears only the signaling slot; an established
/// media stream keeps flowing until the lifecycle webhook says stop. The
/// whole session is torn down only when the connection dies before the
/// handshake completed, since no media task exists yet at that point.
pub async fn run_signaling(
    session: Arc<RelaySession>,
    config: Arc<Config>,
    hub: Arc<FanoutHub>,
    server_url: String,
) {
    let meeting_uuid = session.meeting_uuid.clone();
    let mut established = false;
    if let Err(e) = drive_signaling(&session, &config, &hub, &server_url, &mut established).await {
        error!(meeting_uuid = %meeting_uuid, error = %e, "signaling connection failed");
    }
    session.clear_signaling_sender().await;
    if !established {
        session.close();
    }
    info!(meeting_uuid = %meeting_uuid, "signaling connection closed");
}

async fn drive_signaling(
    session: &Arc<RelaySession>,
    config: &Arc<Config>,
    hub: &Arc<FanoutHub>,
    server_url: &str,
    established: &mut bool,
) -> Result<(), ChannelError> {
    info!(
        meeting_uuid = %session.meeting_uuid,
        url = %server_url,
        "connecting to signaling server"
    );
    let (ws, _) = connect_async(server_url).await?;
    let (sink, mut read) = ws.split();

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(pump_outbound(rx, sink));
    session.set_signaling_sender(tx.clone()).await;

    let signature = stream_signature(
        &config.auth.client_id,
        &session.meeting_uuid,
        &session.stream_id,
        &config.auth.client_secret,
    );
    send_json(
        &tx,
        &SignalingHandshake::new(&session.meeting_uuid, &session.stream_id, signature),
    )?;

    let mut state = SignalingState::AwaitingHandshake;
    let mut shutdown = session.subscribe_shutdown();
    let idle = Duration::from_secs(config.limits.idle_timeout_seconds);

    loop {
        let inbound = tokio::select! {
            _ = shutdown.recv() => {
                debug!(meeting_uuid = %session.meeting_uuid, "signaling task shutting down");
                return Ok(());
            }
            inbound = tokio::time::timeout(idle, read.next()) => inbound,
        };

        let msg = match inbound {
            Err(_) => return Err(ChannelError::IdleTimeout(config.limits.idle_timeout_seconds)),
            Ok(None) => {
                info!(meeting_uuid = %session.meeting_uuid, "signaling server closed connection");
                return Ok(());
            }
            Ok(Some(msg)) => msg?,
        };

        let text = match msg {
            Message::Text(t) => t,
            Message::Close(_) => {
                info!(meeting_uuid = %session.meeting_uuid, "signaling close frame received");
                return Ok(());
            }
            // Pings are answered by the transport
            _ => continue,
        };

        let parsed: ServerMessage = match serde_json::from_str(&text) {
            Ok(p) => p,
            Err(e) => {
                warn!(
                    meeting_uuid = %session.meeting_uuid,
                    error = %e,
                    "unparseable signaling message, ignoring"
                );
                continue;
            }
        };

        match parsed.msg_type {
            msg_type::SIGNALING_HANDSHAKE_RESP => {
                if state != SignalingState::AwaitingHandshake {
                    warn!(
                        meeting_uuid = %session.meeting_uuid,
                        "unexpected handshake response on established channel"
                    );
                    continue;
                }
                if !parsed.is_success() {
                    return Err(ChannelError::HandshakeRejected(
                        parsed.status_code.unwrap_or(-1),
                    ));
                }
                let Some(media_url) = parsed.media_url().map(str::to_string) else {
                    warn!(
                        meeting_uuid = %session.meeting_uuid,
                        "handshake response carried no media endpoint, ignoring"
                    );
                    continue;
                };
                state = SignalingState::Established;
                *established = true;
                info!(
                    meeting_uuid = %session.meeting_uuid,
                    media_url = %media_url,
                    "signaling handshake complete"
                );
                tokio::spawn(crate::media::run_media(
                    session.clone(),
                    config.clone(),
                    hub.clone(),
                    media_url,
                ));
            }
            msg_type::KEEP_ALIVE_REQ => {
                debug!(meeting_uuid = %session.meeting_uuid, "echoing keep-alive");
                send_json(&tx, &KeepAliveResponse::echoing(parsed.timestamp))?;
            }
            other => {
                debug!(
                    meeting_uuid = %session.meeting_uuid,
                    msg_type = other,
                    "ignoring signaling message"
                );
            }
        }
    }
}
