//! Frame classification and per-kind persistence.
//!
//! Media payloads arrive base64-encoded inside JSON frames. The classifier
//! inspects the decoded bytes' magic numbers and routes them to a writer
//! policy: still images become one file per frame, H.264 accumulates in an
//! append-only per-speaker file, transcripts fan out to browser clients
//! (and optionally to a per-meeting log). All artifact paths are namespaced
//! by meeting so concurrent sessions can never collide.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::RecordingConfig;
use crate::hub::{FanoutHub, TranscriptEvent};

/// PNG file signature.
const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Payload kind detected from magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Jpeg,
    Png,
    H264,
    Unknown,
}

/// Classify a decoded payload by its magic bytes.
///
/// Checked in order, first match wins. A JPEG requires both the start and
/// end markers: a truncated JPEG is Unknown, not salvaged. H.264 Annex-B
/// start codes are only honored at offset 0.
pub fn classify(payload: &[u8]) -> PayloadKind {
    if payload.len() >= 4
        && payload[..2] == [0xFF, 0xD8]
        && payload[payload.len() - 2..] == [0xFF, 0xD9]
    {
        return PayloadKind::Jpeg;
    }
    if payload.len() >= 8 && payload[..8] == PNG_SIGNATURE {
        return PayloadKind::Png;
    }
    if payload.starts_with(&[0x00, 0x00, 0x00, 0x01]) || payload.starts_with(&[0x00, 0x00, 0x01]) {
        return PayloadKind::H264;
    }
    PayloadKind::Unknown
}

/// Sanitize an identifier for use in a filename: every character outside
/// `[A-Za-z0-9_-]` becomes `_`; an absent id falls back to `unknown`.
pub fn sanitize_id(raw: Option<&str>) -> String {
    match raw {
        Some(s) if !s.is_empty() => s
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect(),
        _ => "unknown".to_string(),
    }
}

/// Kind of an inbound data frame, as declared by its wire type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Audio,
    Video,
    ScreenShare,
    Transcript,
    Chat,
}

/// One data frame extracted from the media channel. Transient: classified,
/// dispatched to a writer, then discarded.
#[derive(Debug, Clone)]
pub struct MediaFrame {
    pub kind: FrameKind,
    pub speaker_id: Option<String>,
    pub speaker_name: Option<String>,
    /// Base64 bytes for media kinds, plain text for transcript/chat
    pub data: String,
    pub timestamp: Option<i64>,
}

/// Recorder errors. Per-frame failures are logged by the caller and never
/// abort the session.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("base64 decode failed: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-session artifact writer.
///
/// Owns its H.264 file handles exclusively; they are opened once per
/// speaker and kept for the session's lifetime.
pub struct RecordingWriter {
    meeting_dir: PathBuf,
    config: RecordingConfig,
    hub: Arc<FanoutHub>,
    jpeg_frames_seen: u64,
    h264_files: HashMap<String, File>,
    transcript_log: Option<File>,
    dir_ready: bool,
}

impl RecordingWriter {
    pub fn new(config: RecordingConfig, hub: Arc<FanoutHub>, meeting_uuid: &str) -> Self {
        let meeting_dir = PathBuf::from(&config.dir).join(sanitize_id(Some(meeting_uuid)));
        Self {
            meeting_dir,
            config,
            hub,
            jpeg_frames_seen: 0,
            h264_files: HashMap::new(),
            transcript_log: None,
            dir_ready: false,
        }
    }

    /// Route one frame to its writer policy.
    pub async fn handle_frame(&mut self, frame: MediaFrame) -> Result<(), RecorderError> {
        match frame.kind {
            FrameKind::Video | FrameKind::ScreenShare => self.write_media(frame).await,
            FrameKind::Transcript => self.handle_transcript(frame).await,
            FrameKind::Audio => {
                // Parsed and dropped: audio persistence is an extension
                // point, one more arm in this dispatch when it lands.
                let bytes = BASE64.decode(frame.data.as_bytes())?;
                debug!(
                    speaker = %sanitize_id(frame.speaker_id.as_deref()),
                    len = bytes.len(),
                    "audio frame received (not persisted)"
                );
                Ok(())
            }
            FrameKind::Chat => {
                debug!(
                    user = frame.speaker_name.as_deref().unwrap_or("unknown"),
                    "chat frame received (not persisted)"
                );
                Ok(())
            }
        }
    }

    async fn write_media(&mut self, frame: MediaFrame) -> Result<(), RecorderError> {
        // Screen-share frames may arrive as data: URIs
        let encoded = match frame.kind {
            FrameKind::ScreenShare => strip_data_uri(&frame.data),
            _ => frame.data.as_str(),
        };
        let bytes = BASE64.decode(encoded.as_bytes())?;

        let speaker = sanitize_id(frame.speaker_id.as_deref());
        let timestamp = frame
            .timestamp
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());

        match classify(&bytes) {
            PayloadKind::Jpeg => {
                self.jpeg_frames_seen += 1;
                if bytes.len() < self.config.jpeg_min_bytes {
                    warn!(len = bytes.len(), "skipping undersized JPEG frame");
                    return Ok(());
                }
                if self.jpeg_frames_seen <= self.config.jpeg_warmup_frames {
                    debug!(
                        frame = self.jpeg_frames_seen,
                        warmup = self.config.jpeg_warmup_frames,
                        "skipping warm-up JPEG frame"
                    );
                    return Ok(());
                }
                self.write_still(&speaker, timestamp, "jpg", &bytes).await
            }
            PayloadKind::Png => self.write_still(&speaker, timestamp, "png", &bytes).await,
            PayloadKind::H264 => self.append_h264(&speaker, &bytes).await,
            PayloadKind::Unknown => {
                warn!(
                    speaker = %speaker,
                    len = bytes.len(),
                    "unknown payload format, discarding"
                );
                Ok(())
            }
        }
    }

    async fn write_still(
        &mut self,
        speaker: &str,
        timestamp: i64,
        ext: &str,
        bytes: &[u8],
    ) -> Result<(), RecorderError> {
        self.ensure_dir().await?;
        let path = self.meeting_dir.join(format!("{}_{}.{}", speaker, timestamp, ext));
        tokio::fs::write(&path, bytes).await?;
        debug!(path = %path.display(), len = bytes.len(), "wrote still image");
        Ok(())
    }

    async fn append_h264(&mut self, speaker: &str, bytes: &[u8]) -> Result<(), RecorderError> {
        self.ensure_dir().await?;

        if !self.h264_files.contains_key(speaker) {
            let path = self.meeting_dir.join(format!("{}.h264", speaker));
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            info!(path = %path.display(), "opened H.264 output");
            self.h264_files.insert(speaker.to_string(), file);
        }

        if let Some(file) = self.h264_files.get_mut(speaker) {
            file.write_all(bytes).await?;
            file.flush().await?;
        }
        Ok(())
    }

    async fn handle_transcript(&mut self, frame: MediaFrame) -> Result<(), RecorderError> {
        let speaker = frame
            .speaker_name
            .clone()
            .unwrap_or_else(|| "Unknown".to_string());
        let timestamp = chrono::Utc::now().timestamp_millis();

        if self.config.persist_transcripts {
            self.append_transcript_log(&speaker, timestamp, &frame.data)
                .await?;
        }

        self.hub
            .broadcast(&TranscriptEvent::new(frame.data, speaker, timestamp))
            .await;
        Ok(())
    }

    async fn append_transcript_log(
        &mut self,
        speaker: &str,
        timestamp: i64,
        content: &str,
    ) -> Result<(), RecorderError> {
        self.ensure_dir().await?;

        if self.transcript_log.is_none() {
            let path = self.meeting_dir.join("transcript.jsonl");
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            self.transcript_log = Some(file);
        }

        let entry = serde_json::json!({
            "speaker": speaker,
            "timestamp": timestamp,
            "content": content,
        });
        if let Some(file) = self.transcript_log.as_mut() {
            file.write_all(entry.to_string().as_bytes()).await?;
            file.write_all(b"\n").await?;
            file.flush().await?;
        }
        Ok(())
    }

    async fn ensure_dir(&mut self) -> Result<(), RecorderError> {
        if !self.dir_ready {
            tokio::fs::create_dir_all(&self.meeting_dir).await?;
            self.dir_ready = true;
        }
        Ok(())
    }
}

/// Strip a `data:<mime>;base64,` prefix if present.
fn strip_data_uri(data: &str) -> &str {
    if data.starts_with("data:") {
        data.split_once(',').map(|(_, rest)| rest).unwrap_or(data)
    } else {
        data
    }
}
