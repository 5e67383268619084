//! Browser-facing WebSocket endpoint for transcript fan-out.
//!
//! Strictly one-directional after the greeting: the relay pushes events,
//! and anything the browser sends is discarded. The read half is still
//! polled so close frames and dead peers are noticed promptly.

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info};

use super::AppState;

/// Upgrade a browser connection and register it with the fan-out hub.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (client_id, mut events) = state.hub.register().await;
    info!(client_id, "frontend client connected");

    let (mut sink, mut read) = socket.split();

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(text) => {
                        if sink.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    // Hub dropped the channel; connection is done
                    None => break,
                }
            }
            inbound = read.next() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(other)) => {
                        debug!(client_id, "discarding inbound frontend message: {:?}", other);
                    }
                }
            }
        }
    }

    state.hub.unregister(client_id).await;
    info!(client_id, "frontend client disconnected");
}
