use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::models::{ClientMessage, ServerMessage};
use crate::services::auth_service;
use crate::state::AppState;
use crate::ws::session::CollabSession;

#[derive(Deserialize)]
pub struct WsAuthQuery {
    token: Option<String>,
}

/// Collaboration WebSocket endpoint. The identity assertion is verified
/// before the upgrade completes; a rejected handshake never processes any
/// event, and every verification failure looks the same to the client.
pub async fn collab_ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsAuthQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let token = match query.token {
        Some(token) => token,
        None => match auth_service::token_from_headers(&headers) {
            Ok(token) => token,
            Err(e) => {
                info!("WebSocket handshake without credentials: {}", e);
                return StatusCode::UNAUTHORIZED.into_response();
            }
        },
    };

    let subject = match auth_service::verify_subject(&token) {
        Ok(subject) => subject,
        Err(e) => {
            info!("WebSocket handshake rejected: {}", e);
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, subject, state))
}

/// Handle one authenticated connection until the transport drops it.
async fn handle_socket(socket: WebSocket, subject: String, state: Arc<AppState>) {
    // Transport-scoped id; the subject is bound once and immutable
    let conn_id = Uuid::new_v4();
    info!(
        "Collaboration connection established for subject {} with connection_id {}",
        subject, conn_id
    );

    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();

    // Writer task: serializes outbound events onto the socket
    let send_task = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to serialize outbound event: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut session = CollabSession::new(state, conn_id, subject, out_tx);

    // Reader loop: events from one connection are handled in arrival order
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => {
                let event: ClientMessage = match serde_json::from_str(&text) {
                    Ok(event) => event,
                    Err(e) => {
                        debug!("Malformed frame on connection {}: {}", conn_id, e);
                        session.send(ServerMessage::error("invalid message"));
                        continue;
                    }
                };
                session.handle(event).await;
            }
            Message::Close(_) => break,
            // Ping/pong are answered by the transport; binary frames are not
            // part of the protocol
            _ => {}
        }
    }

    // Always runs, whether the client left its rooms or just vanished
    session.finish().await;
    send_task.abort();

    info!("Collaboration connection {} terminated", conn_id);
}
