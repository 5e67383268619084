//! Media connection: second handshake, ready acknowledgment, frame demux.
//!
//! Connects to the endpoint discovered over signaling, repeats the
//! signature handshake, then confirms readiness back across the signaling
//! channel before data starts flowing. Frames are demultiplexed by their
//! numeric type tag and handed to the session's recording writer; a frame
//! that fails to decode or persist is dropped without touching the
//! connection.

use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::auth::stream_signature;
use crate::config::Config;
use crate::hub::FanoutHub;
use crate::protocol::{msg_type, ClientReadyAck, KeepAliveResponse, MediaHandshake, ServerMessage};
use crate::recorder::{FrameKind, MediaFrame, RecordingWriter};
use crate::session::RelaySession;
use crate::signaling::{pump_outbound, send_json, ChannelError};

/// Run the media connection for a session until it closes.
///
/// The media channel going away does not end the session: signaling stays
/// up and the lifecycle webhook remains the authority on teardown.
pub async fn run_media(
    session: Arc<RelaySession>,
    config: Arc<Config>,
    hub: Arc<FanoutHub>,
    media_url: String,
) {
    let meeting_uuid = session.meeting_uuid.clone();
    if let Err(e) = drive_media(&session, &config, &hub, &media_url).await {
        error!(meeting_uuid = %meeting_uuid, error = %e, "media connection failed");
    }
    session.clear_media_sender().await;
    info!(meeting_uuid = %meeting_uuid, "media connection closed");
}

async fn drive_media(
    session: &Arc<RelaySession>,
    config: &Arc<Config>,
    hub: &Arc<FanoutHub>,
    media_url: &str,
) -> Result<(), ChannelError> {
    info!(
        meeting_uuid = %session.meeting_uuid,
        url = %media_url,
        "connecting to media server"
    );
    let (ws, _) = connect_async(media_url).await?;
    let (sink, mut read) = ws.split();

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(pump_outbound(rx, sink));
    session.set_media_sender(tx.clone()).await;

    let signature = stream_signature(
        &config.auth.client_id,
        &session.meeting_uuid,
        &session.stream_id,
        &config.auth.client_secret,
    );
    send_json(
        &tx,
        &MediaHandshake::new(&session.meeting_uuid, &session.stream_id, signature),
    )?;

    let mut writer: Option<RecordingWriter> = None;
    let mut shutdown = session.subscribe_shutdown();
    let idle = Duration::from_secs(config.limits.idle_timeout_seconds);

    loop {
        let inbound = tokio::select! {
            _ = shutdown.recv() => {
                debug!(meeting_uuid = %session.meeting_uuid, "media task shutting down");
                return Ok(());
            }
            inbound = tokio::time::timeout(idle, read.next()) => inbound,
        };

        let msg = match inbound {
            Err(_) => return Err(ChannelError::IdleTimeout(config.limits.idle_timeout_seconds)),
            Ok(None) => {
                info!(meeting_uuid = %session.meeting_uuid, "media server closed connection");
                return Ok(());
            }
            Ok(Some(msg)) => msg?,
        };

        // Some producers send JSON frames as binary messages
        let text = match msg {
            Message::Text(t) => t,
            Message::Binary(b) => String::from_utf8_lossy(&b).into_owned(),
            Message::Close(_) => {
                info!(meeting_uuid = %session.meeting_uuid, "media close frame received");
                return Ok(());
            }
            _ => continue,
        };

        let parsed: ServerMessage = match serde_json::from_str(&text) {
            Ok(p) => p,
            Err(e) => {
                warn!(
                    meeting_uuid = %session.meeting_uuid,
                    error = %e,
                    "unparseable media message, ignoring"
                );
                continue;
            }
        };

        match parsed.msg_type {
            msg_type::MEDIA_HANDSHAKE_RESP => {
                if !parsed.is_success() {
                    return Err(ChannelError::HandshakeRejected(
                        parsed.status_code.unwrap_or(-1),
                    ));
                }
                // Readiness is confirmed on the signaling channel, not here
                match session.signaling_sender().await {
                    Some(sig_tx) => {
                        send_json(&sig_tx, &ClientReadyAck::new(&session.stream_id))?;
                        info!(
                            meeting_uuid = %session.meeting_uuid,
                            "media handshake complete, client ready sent"
                        );
                    }
                    None => {
                        warn!(
                            meeting_uuid = %session.meeting_uuid,
                            "signaling channel gone before client ready could be sent"
                        );
                        return Ok(());
                    }
                }
                writer = Some(RecordingWriter::new(
                    config.recording.clone(),
                    hub.clone(),
                    &session.meeting_uuid,
                ));
            }
            msg_type::KEEP_ALIVE_REQ => {
                debug!(meeting_uuid = %session.meeting_uuid, "echoing media keep-alive");
                send_json(&tx, &KeepAliveResponse::echoing(parsed.timestamp))?;
            }
            tag @ (msg_type::DATA_AUDIO
            | msg_type::DATA_VIDEO
            | msg_type::DATA_SHARE
            | msg_type::DATA_TRANSCRIPT
            | msg_type::DATA_CHAT) => {
                let Some(writer) = writer.as_mut() else {
                    warn!(
                        meeting_uuid = %session.meeting_uuid,
                        msg_type = tag,
                        "data frame before handshake completion, dropping"
                    );
                    continue;
                };
                let Some(frame) = frame_from_message(tag, &parsed) else {
                    debug!(
                        meeting_uuid = %session.meeting_uuid,
                        msg_type = tag,
                        "data frame without payload, dropping"
                    );
                    continue;
                };
                // One bad frame never takes the connection down
                if let Err(e) = writer.handle_frame(frame).await {
                    warn!(
                        meeting_uuid = %session.meeting_uuid,
                        msg_type = tag,
                        error = %e,
                        "failed to process frame"
                    );
                }
            }
            other => {
                debug!(
                    meeting_uuid = %session.meeting_uuid,
                    msg_type = other,
                    "ignoring media message"
                );
            }
        }
    }
}

/// Build a recorder frame from a parsed data message. Returns `None` when
/// the message carries no payload.
fn frame_from_message(tag: u8, msg: &ServerMessage) -> Option<MediaFrame> {
    let kind = match tag {
        msg_type::DATA_AUDIO => FrameKind::Audio,
        msg_type::DATA_VIDEO => FrameKind::Video,
        msg_type::DATA_SHARE => FrameKind::ScreenShare,
        msg_type::DATA_TRANSCRIPT => FrameKind::Transcript,
        msg_type::DATA_CHAT => FrameKind::Chat,
        _ => return None,
    };
    let content = msg.content.as_ref()?;
    let data = content.data.clone()?;

    Some(MediaFrame {
        kind,
        speaker_id: content.speaker_id(),
        speaker_name: content.user_name.clone(),
        data,
        timestamp: content.timestamp,
    })
}
