use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use bugsus_core::net::messages::ServerMessage;
use bugsus_core::net::protocol::{MAX_MESSAGE_SIZE, decode_client_message, encode_server_message};

use crate::gateway;
use crate::rate_limit::TokenBucket;
use crate::registry::PlayerSender;
use crate::state::{AppState, ConnectionGuard};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let max_ws = state.config.limits.max_ws_connections;
    let current = state.ws_connection_count.load(Ordering::Relaxed);
    if current >= max_ws {
        tracing::warn!(current, max = max_ws, "WS connection limit reached");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    ws.max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let _guard = ConnectionGuard::new(Arc::clone(&state.ws_connection_count));
    let player_id = uuid::Uuid::new_v4().to_string();
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::channel::<ServerMessage>(state.config.limits.player_message_buffer);

    tracing::info!(player_id = %player_id, "Client connected");
    spawn_writer(ws_sender, rx);

    read_loop(&mut ws_receiver, &state, &player_id, &tx).await;

    gateway::handle_disconnect(&state.registry, &player_id).await;
    tracing::info!(player_id = %player_id, "Client disconnected");
}

fn spawn_writer(
    mut ws_sender: futures::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<ServerMessage>,
) {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match encode_server_message(&msg) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(error = %e, kind = msg.kind(), "Failed to encode server message");
                    continue;
                },
            };
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });
}

async fn read_loop(
    ws_receiver: &mut futures::stream::SplitStream<WebSocket>,
    state: &AppState,
    player_id: &str,
    tx: &PlayerSender,
) {
    let rate = state.config.limits.ws_rate_limit_per_sec;
    let mut budget = TokenBucket::new(rate, rate);

    while let Some(Ok(msg)) = ws_receiver.next().await {
        let text = match msg {
            Message::Text(t) => t,
            Message::Close(_) => break,
            _ => continue,
        };

        if !budget.try_take() {
            tracing::warn!(player_id, "Rate limited");
            continue;
        }
        if text.len() > MAX_MESSAGE_SIZE {
            tracing::warn!(player_id, size = text.len(), "Dropped oversized message");
            continue;
        }

        let client_msg = match decode_client_message(text.as_str()) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(player_id, error = %e, "Malformed client message");
                if let Err(e) = tx.try_send(ServerMessage::room_error("Malformed message")) {
                    tracing::debug!(player_id, error = %e, "Skipping reply to slow client");
                }
                continue;
            },
        };

        gateway::handle_client_message(&state.registry, player_id, tx, client_msg).await;
    }
}
