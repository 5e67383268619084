//! Wire protocol for the RTMS signaling and media channels.
//!
//! Both channels speak JSON messages tagged with a numeric `msg_type`. The
//! codes are an external contract defined by the media provider; they are
//! collected here so that no numeric tag appears inline in session logic.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Numeric `msg_type` codes used on the signaling and media channels.
pub mod msg_type {
    /// Handshake request sent by the relay on the signaling channel.
    pub const SIGNALING_HANDSHAKE_REQ: u8 = 1;
    /// Handshake response from the signaling server.
    pub const SIGNALING_HANDSHAKE_RESP: u8 = 2;
    /// Handshake request sent by the relay on the media channel.
    pub const MEDIA_HANDSHAKE_REQ: u8 = 3;
    /// Handshake response from the media server.
    pub const MEDIA_HANDSHAKE_RESP: u8 = 4;
    /// Ready acknowledgment, sent on the signaling channel after the media
    /// handshake succeeds.
    pub const CLIENT_READY_ACK: u8 = 7;
    /// Keep-alive request; shared by both channels.
    pub const KEEP_ALIVE_REQ: u8 = 12;
    /// Keep-alive response; must echo the request's timestamp.
    pub const KEEP_ALIVE_RESP: u8 = 13;
    /// Audio payload frame.
    pub const DATA_AUDIO: u8 = 14;
    /// Video payload frame.
    pub const DATA_VIDEO: u8 = 15;
    /// Screen-share payload frame.
    pub const DATA_SHARE: u8 = 16;
    /// Transcript text frame.
    pub const DATA_TRANSCRIPT: u8 = 17;
    /// In-meeting chat frame.
    pub const DATA_CHAT: u8 = 18;
}

/// `status_code` value indicating a successful handshake.
pub const STATUS_OK: i64 = 0;

/// Protocol version sent in both handshakes.
pub const PROTOCOL_VERSION: u8 = 1;

/// Media type bitmask requesting audio, video and transcript streams.
pub const MEDIA_TYPE_AUDIO_VIDEO_TRANSCRIPT: u32 = 32;

/// Inbound message envelope shared by both channels.
///
/// Every inbound frame is first parsed into this shape; fields not present
/// for a given `msg_type` stay `None`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerMessage {
    pub msg_type: u8,

    #[serde(default)]
    pub status_code: Option<i64>,

    /// Media server discovery info, present on signaling handshake responses.
    #[serde(default)]
    pub media_server: Option<MediaServerInfo>,

    /// Keep-alive timestamp, echoed verbatim in the response.
    #[serde(default)]
    pub timestamp: Option<i64>,

    /// Frame body for media/transcript/chat messages.
    #[serde(default)]
    pub content: Option<FrameContent>,
}

impl ServerMessage {
    /// Media server endpoint from a signaling handshake response, if any.
    pub fn media_url(&self) -> Option<&str> {
        self.media_server
            .as_ref()
            .and_then(|m| m.server_urls.all.as_deref())
    }

    /// Whether this is a handshake response carrying a success status.
    pub fn is_success(&self) -> bool {
        self.status_code == Some(STATUS_OK)
    }
}

/// Media server discovery block inside a signaling handshake response.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaServerInfo {
    pub server_urls: ServerUrls,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerUrls {
    /// Endpoint serving all requested media kinds over one connection.
    #[serde(default)]
    pub all: Option<String>,
}

/// Payload body of a data frame.
#[derive(Debug, Clone, Deserialize)]
pub struct FrameContent {
    /// Speaker identifier; arrives as either a string or a number.
    #[serde(default)]
    pub user_id: Option<serde_json::Value>,

    #[serde(default)]
    pub user_name: Option<String>,

    /// Base64-encoded bytes for media kinds, plain text for transcript/chat.
    #[serde(default)]
    pub data: Option<String>,

    /// Producer-supplied capture time in milliseconds since epoch.
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl FrameContent {
    /// Speaker id normalized to a string, whatever JSON type it arrived as.
    pub fn speaker_id(&self) -> Option<String> {
        match &self.user_id {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Handshake request sent when the signaling connection opens.
#[derive(Debug, Serialize)]
pub struct SignalingHandshake {
    pub msg_type: u8,
    pub protocol_version: u8,
    pub meeting_uuid: String,
    pub rtms_stream_id: String,
    pub sequence: u64,
    pub signature: String,
}

impl SignalingHandshake {
    pub fn new(meeting_uuid: &str, stream_id: &str, signature: String) -> Self {
        Self {
            msg_type: msg_type::SIGNALING_HANDSHAKE_REQ,
            protocol_version: PROTOCOL_VERSION,
            meeting_uuid: meeting_uuid.to_string(),
            rtms_stream_id: stream_id.to_string(),
            sequence: rand::thread_rng().gen_range(0..1_000_000_000),
            signature,
        }
    }
}

/// Handshake request sent when the media connection opens.
///
/// The per-media parameter blocks are advisory capability declarations, not
/// negotiated values; they mirror what the provider expects to see.
#[derive(Debug, Serialize)]
pub struct MediaHandshake {
    pub msg_type: u8,
    pub protocol_version: u8,
    pub meeting_uuid: String,
    pub rtms_stream_id: String,
    pub signature: String,
    pub media_type: u32,
    pub payload_encryption: bool,
    pub media_params: MediaParams,
}

impl MediaHandshake {
    pub fn new(meeting_uuid: &str, stream_id: &str, signature: String) -> Self {
        Self {
            msg_type: msg_type::MEDIA_HANDSHAKE_REQ,
            protocol_version: PROTOCOL_VERSION,
            meeting_uuid: meeting_uuid.to_string(),
            rtms_stream_id: stream_id.to_string(),
            signature,
            media_type: MEDIA_TYPE_AUDIO_VIDEO_TRANSCRIPT,
            payload_encryption: false,
            media_params: MediaParams::default(),
        }
    }
}

/// Per-media capability declarations sent in the media handshake.
#[derive(Debug, Serialize)]
pub struct MediaParams {
    pub audio: AudioParams,
    pub video: VideoParams,
    pub deskshare: DeskshareParams,
    pub chat: ChatParams,
}

impl Default for MediaParams {
    fn default() -> Self {
        Self {
            audio: AudioParams {
                content_type: 1,
                sample_rate: 1,
                channel: 1,
                codec: 1,
                data_opt: 1,
                send_rate: 100,
            },
            // codec 7 = H.264
            video: VideoParams {
                codec: 7,
                resolution: 2,
                fps: 25,
            },
            // codec 5 = JPG stills
            deskshare: DeskshareParams { codec: 5 },
            chat: ChatParams { content_type: 5 },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AudioParams {
    pub content_type: u8,
    pub sample_rate: u8,
    pub channel: u8,
    pub codec: u8,
    pub data_opt: u8,
    pub send_rate: u32,
}

#[derive(Debug, Serialize)]
pub struct VideoParams {
    pub codec: u8,
    pub resolution: u8,
    pub fps: u8,
}

#[derive(Debug, Serialize)]
pub struct DeskshareParams {
    pub codec: u8,
}

#[derive(Debug, Serialize)]
pub struct ChatParams {
    pub content_type: u8,
}

/// Keep-alive response echoing the request's timestamp.
#[derive(Debug, Serialize)]
pub struct KeepAliveResponse {
    pub msg_type: u8,
    pub timestamp: Option<i64>,
}

impl KeepAliveResponse {
    pub fn echoing(timestamp: Option<i64>) -> Self {
        Self {
            msg_type: msg_type::KEEP_ALIVE_RESP,
            timestamp,
        }
    }
}

/// Ready acknowledgment sent back over the signaling channel once the media
/// handshake succeeds.
#[derive(Debug, Serialize)]
pub struct ClientReadyAck {
    pub msg_type: u8,
    pub rtms_stream_id: String,
}

impl ClientReadyAck {
    pub fn new(stream_id: &str) -> Self {
        Self {
            msg_type: msg_type::CLIENT_READY_ACK,
            rtms_stream_id: stream_id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_signaling_handshake_response() {
        let json = r#"{
            "msg_type": 2,
            "status_code": 0,
            "media_server": {
                "server_urls": { "all": "wss://media.example.com/all" }
            }
        }"#;

        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.msg_type, msg_type::SIGNALING_HANDSHAKE_RESP);
        assert!(msg.is_success());
        assert_eq!(msg.media_url(), Some("wss://media.example.com/all"));
    }

    #[test]
    fn test_parse_keep_alive_request() {
        let json = r#"{"msg_type": 12, "timestamp": 1712345678901}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();

        assert_eq!(msg.msg_type, msg_type::KEEP_ALIVE_REQ);
        assert_eq!(msg.timestamp, Some(1712345678901));

        let resp = KeepAliveResponse::echoing(msg.timestamp);
        let out = serde_json::to_value(&resp).unwrap();
        assert_eq!(out["msg_type"], 13);
        assert_eq!(out["timestamp"], 1712345678901i64);
    }

    #[test]
    fn test_speaker_id_accepts_string_and_number() {
        let as_string: ServerMessage = serde_json::from_str(
            r#"{"msg_type": 15, "content": {"user_id": "u-1", "data": "AA=="}}"#,
        )
        .unwrap();
        assert_eq!(
            as_string.content.unwrap().speaker_id(),
            Some("u-1".to_string())
        );

        let as_number: ServerMessage = serde_json::from_str(
            r#"{"msg_type": 15, "content": {"user_id": 16778240, "data": "AA=="}}"#,
        )
        .unwrap();
        assert_eq!(
            as_number.content.unwrap().speaker_id(),
            Some("16778240".to_string())
        );
    }

    #[test]
    fn test_media_handshake_shape() {
        let hs = MediaHandshake::new("meeting-1", "stream-1", "sig".to_string());
        let out = serde_json::to_value(&hs).unwrap();

        assert_eq!(out["msg_type"], 3);
        assert_eq!(out["media_type"], 32);
        assert_eq!(out["payload_encryption"], false);
        assert_eq!(out["media_params"]["video"]["codec"], 7);
        assert_eq!(out["media_params"]["deskshare"]["codec"], 5);
        assert_eq!(out["media_params"]["audio"]["send_rate"], 100);
    }

    #[test]
    fn test_client_ready_ack_carries_stream_id() {
        let ack = ClientReadyAck::new("stream-42");
        let out = serde_json::to_value(&ack).unwrap();
        assert_eq!(out["msg_type"], 7);
        assert_eq!(out["rtms_stream_id"], "stream-42");
    }
}
