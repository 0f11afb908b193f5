//! WebSocket relay of object-change notifications.
//!
//! A client subscribes to one board at a time and receives every insert,
//! update and delete on it until it unsubscribes or disconnects.
//!
//! ```json
//! { "type": "subscribe", "board_id": "..." }
//! { "type": "unsubscribe" }
//! ```

use crate::routes::caller;
use crate::state::AppState;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::HeaderMap,
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use inkboard_core::ChangeNotification;
use inkboard_core::Role;
use inkboard_core::realtime::protocol::{ClientMessage, ServerMessage};
use inkboard_core::storage::{BoardId, UserId};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    // Anonymous sockets may connect but cannot subscribe
    let user = caller(&headers).ok();
    ws.on_upgrade(move |socket| handle_socket(socket, state, user))
}

/// What a subscribe request resolves to.
fn answer_subscribe(
    state: &AppState,
    user: Option<UserId>,
    board_id: BoardId,
) -> Result<broadcast::Receiver<ChangeNotification>, ServerMessage> {
    let Some(user) = user else {
        return Err(ServerMessage::Error {
            message: "Missing or invalid x-user-id header".to_string(),
        });
    };
    match state.require_role(board_id, user, Role::Viewer) {
        Ok(_) => Ok(state.subscribe(board_id)),
        Err(e) => Err(ServerMessage::Error {
            message: e.to_string(),
        }),
    }
}

fn encode(msg: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(msg) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            warn!("Failed to encode server message: {}", e);
            None
        }
    }
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, user: Option<UserId>) {
    let peer_id = Uuid::new_v4();
    info!("New connection: {}", peer_id);

    let (mut sender, mut receiver) = socket.split();
    let mut current: Option<(BoardId, broadcast::Receiver<ChangeNotification>)> = None;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                let reply = match msg {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(ClientMessage::Subscribe { board_id }) => {
                            if let Some((old, rx)) = current.take() {
                                drop(rx);
                                state.release(old);
                            }
                            match answer_subscribe(&state, user, board_id) {
                                Ok(rx) => {
                                    current = Some((board_id, rx));
                                    info!("Peer {} subscribed to board {}", peer_id, board_id);
                                    Some(ServerMessage::Subscribed { board_id })
                                }
                                Err(reply) => Some(reply),
                            }
                        }
                        Ok(ClientMessage::Unsubscribe) => {
                            if let Some((board_id, rx)) = current.take() {
                                drop(rx);
                                state.release(board_id);
                                info!("Peer {} unsubscribed from board {}", peer_id, board_id);
                            }
                            None
                        }
                        Err(e) => {
                            warn!("Invalid message from {}: {}", peer_id, e);
                            Some(ServerMessage::Error {
                                message: format!("Invalid message: {}", e),
                            })
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    // Ping/pong is answered by axum; binary frames carry nothing here
                    Some(Ok(_)) => None,
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", peer_id, e);
                        break;
                    }
                };
                if let Some(out) = reply.as_ref().and_then(encode) {
                    if sender.send(out).await.is_err() {
                        break;
                    }
                }
            }

            change = async {
                match &mut current {
                    Some((_, rx)) => rx.recv().await,
                    None => std::future::pending().await,
                }
            } => {
                match change {
                    Ok(change) => {
                        if let Some(out) = encode(&ServerMessage::ObjectChanged(change)) {
                            if sender.send(out).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // The client reloads on the next change it does see
                        debug!("Peer {} missed {} notifications", peer_id, missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        current = None;
                    }
                }
            }
        }
    }

    if let Some((board_id, rx)) = current.take() {
        drop(rx);
        state.release(board_id);
    }
    info!("Connection closed: {}", peer_id);
}
