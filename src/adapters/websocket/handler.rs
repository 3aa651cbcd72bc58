//! WebSocket upgrade handler for signaling connections.
//!
//! Handles the HTTP → WebSocket upgrade and the connection lifecycle:
//! 1. Resolve the user from the handshake
//! 2. Register a connection handle with the dispatcher
//! 3. Pump the connection's outbound queue to the socket
//! 4. Hand every inbound text frame to the dispatcher
//! 5. Unregister on close

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::application::{ConnectionHandle, Dispatcher};
use crate::domain::events::OutboundEvent;
use crate::domain::foundation::UserId;

/// State shared by the signaling routes.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    /// Outbound queue size per connection.
    pub queue_capacity: usize,
}

impl AppState {
    pub fn new(dispatcher: Arc<Dispatcher>, queue_capacity: usize) -> Self {
        Self {
            dispatcher,
            queue_capacity,
        }
    }
}

/// Handshake parameters.
///
/// Identity is asserted by the fronting gateway, which has already
/// authenticated the user.
#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    pub user_id: String,
}

/// Handle WebSocket upgrade requests.
///
/// Route: `GET /ws?user_id=...`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> Response {
    let user_id = match UserId::new(params.user_id) {
        Ok(id) => id,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    ws.on_upgrade(move |socket| handle_socket(socket, user_id, state))
}

/// Liveness check.
pub async fn health() -> &'static str {
    "ok"
}

/// Runs one connection until either side closes.
async fn handle_socket(socket: WebSocket, user_id: UserId, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (handle, mut outbound) = ConnectionHandle::channel(user_id, state.queue_capacity);
    let connection_id = state.dispatcher.on_connect(handle).await;

    // Writer: drains the outbound queue in FIFO order
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let Some(text) = encode(&event) else {
                continue;
            };
            if let Err(e) = sender.send(Message::Text(text)).await {
                tracing::debug!(connection_id = %connection_id, error = %e, "Send error, closing connection");
                break;
            }
        }
    });

    // Reader: dispatches client frames
    let dispatcher = state.dispatcher.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    dispatcher.on_frame(&connection_id, &text).await;
                }
                Ok(Message::Binary(_)) => {
                    tracing::warn!(connection_id = %connection_id, "Received unsupported binary message");
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Ok(Message::Close(_)) => {
                    tracing::debug!(connection_id = %connection_id, "Client sent close frame");
                    break;
                }
                Err(e) => {
                    tracing::debug!(connection_id = %connection_id, error = %e, "Receive error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.dispatcher.on_disconnect(&connection_id).await;
}

fn encode(event: &OutboundEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::error!(event = event.name(), error = %e, "Failed to encode outbound event");
            None
        }
    }
}

/// Create the axum router for the signaling endpoints.
pub fn signaling_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .with_state(state)
}
