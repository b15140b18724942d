use axum::extract::{
    State,
    ws::{self, WebSocket, WebSocketUpgrade},
};
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::game_logic::messages::{
    ClientToServerMessage, ServerToClientMessage, client_message_from_ws_text,
};
use crate::rooms::{ConnectRequest, RoomActorHandle};
use crate::state::AppState;

/// A room actor can stop between being handed out and receiving the connection.
const CONNECT_ATTEMPTS: usize = 3;

pub async fn ws_handler(
    ws_upgrade: WebSocketUpgrade,
    State(app_state): State<AppState>,
) -> impl IntoResponse {
    tracing::debug!("WebSocket: Connection attempt to /ws endpoint");
    ws_upgrade.on_upgrade(move |socket| handle_socket(socket, app_state))
}

async fn reject(ws_sender: &mut SplitSink<WebSocket, ws::Message>, message: String) {
    let error_response = ServerToClientMessage::SystemError { message };
    if let Ok(ws_msg) = error_response.to_ws_text() {
        let _ = ws_sender.send(ws_msg).await;
    }
    let _ = ws_sender.close().await;
}

/// Hands the connection to the room's actor, respawning the actor if the one
/// the manager returned has just stopped.
async fn attach_to_room(
    app_state: &AppState,
    room_id: &str,
    client_id: Uuid,
    request: ConnectRequest,
    client_tx: mpsc::Sender<ws::Message>,
) -> Option<RoomActorHandle> {
    for attempt in 1..=CONNECT_ATTEMPTS {
        let handle = match app_state.room_manager.get_or_spawn(room_id).await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(room.id = %room_id, error = %e, "Failed to obtain room actor");
                return None;
            }
        };
        match handle
            .client_connected(client_id, request.clone(), client_tx.clone())
            .await
        {
            Ok(()) => return Some(handle),
            Err(e) => {
                tracing::debug!(room.id = %room_id, attempt, error = %e, "Room actor stopped during connect");
                tokio::task::yield_now().await;
            }
        }
    }
    None
}

pub async fn handle_socket(socket: WebSocket, app_state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let client_id = Uuid::new_v4();

    let (room_id, request) = match ws_receiver.next().await {
        Some(Ok(ws::Message::Text(text_msg))) => match client_message_from_ws_text(text_msg.as_str()) {
            Ok(ClientToServerMessage::ConnectToRoom {
                room_id,
                player_id,
                name,
                picture,
            }) if !room_id.trim().is_empty() => (
                room_id.trim().to_string(),
                ConnectRequest {
                    player_id,
                    name,
                    picture,
                },
            ),
            Ok(other_msg) => {
                tracing::warn!(client.id = %client_id, message = ?other_msg, "Initial message was not a valid ConnectToRoom");
                reject(
                    &mut ws_sender,
                    "Invalid initial message. Expected ConnectToRoom with a room_id.".to_string(),
                )
                .await;
                return;
            }
            Err(e) => {
                tracing::warn!(client.id = %client_id, error = %e, "Failed to deserialize initial message");
                reject(
                    &mut ws_sender,
                    format!("Invalid initial connection message format: {e}"),
                )
                .await;
                return;
            }
        },
        Some(Ok(other_type_msg)) => {
            tracing::warn!(client.id = %client_id, message = ?other_type_msg, "Non-text initial message");
            reject(
                &mut ws_sender,
                "Initial message must be a text JSON message (ConnectToRoom).".to_string(),
            )
            .await;
            return;
        }
        Some(Err(e)) => {
            tracing::warn!(client.id = %client_id, error = %e, "Error receiving initial message");
            let _ = ws_sender.close().await;
            return;
        }
        None => {
            tracing::debug!(client.id = %client_id, "Client disconnected before sending initial message");
            return;
        }
    };

    let (actor_to_client_tx, mut actor_to_client_rx) = mpsc::channel::<ws::Message>(32);

    let Some(room_handle) =
        attach_to_room(&app_state, &room_id, client_id, request, actor_to_client_tx).await
    else {
        reject(
            &mut ws_sender,
            "Room is temporarily unavailable, please reconnect.".to_string(),
        )
        .await;
        return;
    };

    tracing::info!(client.id = %client_id, room.id = %room_id, "WebSocket client attached to room");

    let send_room_id = room_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(message_to_send) = actor_to_client_rx.recv().await {
            if ws_sender.send(message_to_send).await.is_err() {
                tracing::debug!(client.id = %client_id, room.id = %send_room_id, "WS send error, client likely disconnected");
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    let recv_handle = room_handle.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(ws::Message::Text(text_msg)) => {
                    if let Err(e) = recv_handle
                        .forward_client_event(client_id, text_msg.to_string())
                        .await
                    {
                        tracing::warn!(client.id = %client_id, error = %e, "Room actor gone, dropping connection");
                        break;
                    }
                }
                Ok(ws::Message::Close(_)) => {
                    tracing::debug!(client.id = %client_id, "WebSocket closed by client");
                    break;
                }
                // Pings are answered by axum; binary frames carry nothing we understand.
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(client.id = %client_id, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    room_handle.client_disconnected(client_id).await;
    tracing::info!(client.id = %client_id, room.id = %room_id, "WebSocket client disconnected");
}
