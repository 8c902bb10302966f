use axum::extract::rejection::QueryRejection;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;

use crate::domain::account::channel_key;
use crate::http::auth::{authenticate, bearer_token};
use crate::http::AppError;
use crate::AppState;

#[derive(Deserialize)]
pub struct SocketQuery {
    pub token: Option<String>,
}

/// Authenticates before upgrading; a socket never opens without a valid
/// access token.
pub async fn connect(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<SocketQuery>, QueryRejection>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, AppError> {
    let Query(query) = query?;
    let token = match bearer_token(&headers)? {
        Some(token) => token.to_string(),
        None => query
            .token
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| AppError::unauthorized("missing access token"))?,
    };
    let session = authenticate(&state, &token).await?;
    let channel = channel_key(session.role, session.user_id);
    let ws = ws.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;

    Ok(ws.on_upgrade(move |socket| serve_socket(state, channel, socket)))
}

async fn serve_socket(state: AppState, channel: String, socket: WebSocket) {
    let mut events = state.realtime.subscribe(&channel);
    let (mut sender, mut receiver) = socket.split();
    tracing::debug!(channel = %channel, "realtime session opened");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(frame) => {
                    if sender.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(channel = %channel, skipped, "realtime session lagging, events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Ping(payload))) => {
                    if sender.send(Message::Pong(payload)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    tracing::debug!(error = ?err, channel = %channel, "realtime socket error");
                    break;
                }
            },
        }
    }

    drop(events);
    state.realtime.release(&channel);
    tracing::debug!(channel = %channel, "realtime session closed");
}
