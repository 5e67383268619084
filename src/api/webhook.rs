//! Lifecycle webhook: URL validation challenge and stream start/stop events.
//!
//! The webhook is the only ingress that creates or destroys sessions. Every
//! recognized event is acknowledged with 200 so the provider does not retry;
//! only a malformed payload earns a 400.

use axum::{extract::State, http::StatusCode, response::Json};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::{AppState, ErrorResponse};
use crate::auth::url_validation_hash;

/// Inbound webhook event envelope.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub event: String,

    #[serde(default)]
    pub payload: WebhookPayload,
}

/// Union of the payload fields across event types; absent fields stay `None`.
#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default, rename = "plainToken")]
    pub plain_token: Option<String>,

    #[serde(default)]
    pub meeting_uuid: Option<String>,

    #[serde(default)]
    pub rtms_stream_id: Option<String>,

    /// Signaling endpoint for this stream
    #[serde(default)]
    pub server_urls: Option<String>,
}

/// Handle a lifecycle webhook event.
pub async fn handle_webhook(
    State(state): State<AppState>,
    Json(event): Json<WebhookEvent>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ErrorResponse>)> {
    match event.event.as_str() {
        "endpoint.url_validation" => {
            let plain_token = required(event.payload.plain_token, "plainToken")?;
            let encrypted = url_validation_hash(&state.config.auth.webhook_secret, &plain_token);
            info!("answered URL validation challenge");
            Ok(Json(json!({
                "plainToken": plain_token,
                "encryptedToken": encrypted,
            })))
        }

        "meeting.rtms_started" => {
            let meeting_uuid = required(event.payload.meeting_uuid, "meeting_uuid")?;
            let stream_id = required(event.payload.rtms_stream_id, "rtms_stream_id")?;
            let server_url = required(event.payload.server_urls, "server_urls")?;

            state
                .sessions
                .begin(&meeting_uuid, &stream_id, &server_url)
                .await;
            Ok(Json(json!({ "status": "started" })))
        }

        "meeting.rtms_stopped" => {
            let meeting_uuid = required(event.payload.meeting_uuid, "meeting_uuid")?;

            // A stop for an unknown meeting is acknowledged anyway: the
            // provider retries on anything but 200.
            if let Err(e) = state.sessions.stop(&meeting_uuid).await {
                warn!(meeting_uuid = %meeting_uuid, error = %e, "stop for unknown session");
            }
            Ok(Json(json!({ "status": "stopped" })))
        }

        other => {
            info!(event = %other, "ignoring unhandled webhook event");
            Ok(Json(json!({ "status": "ignored" })))
        }
    }
}

fn required(
    field: Option<String>,
    name: &str,
) -> Result<String, (StatusCode, Json<ErrorResponse>)> {
    field.ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("missing field: {}", name),
            }),
        )
    })
}
