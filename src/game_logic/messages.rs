use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::cards::{Pile, Row};
use super::engine::RoomCommand;
use super::room::Room;

/// Messages sent from a game client (WebSocket) to the server.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "messageType", content = "payload")]
pub enum ClientToServerMessage {
    /// Must be the first message on a new connection. A `player_id` that is
    /// already seated in the room resumes that seat instead of dealing a new hand.
    ConnectToRoom {
        room_id: String,
        #[serde(default)]
        player_id: Option<Uuid>,
        name: String,
        #[serde(default)]
        picture: String,
    },
    /// Gives up the seat and closes the connection.
    LeaveRoom,
    ReplaceCard {
        row: Row,
        index: usize,
        pile: Pile,
    },
    DiscardDrawnCard,
    CallStop,
    PeekDone,
    NewGame,
    StartGame,
    KickPlayer {
        player_id: Uuid,
    },
    MakeAdmin {
        player_id: Uuid,
    },
}

impl ClientToServerMessage {
    /// The room command this message asks for, if it is not a connection handshake.
    pub fn into_command(self) -> Option<RoomCommand> {
        let command = match self {
            ClientToServerMessage::ConnectToRoom { .. } => return None,
            ClientToServerMessage::LeaveRoom => RoomCommand::Leave,
            ClientToServerMessage::ReplaceCard { row, index, pile } => {
                RoomCommand::ReplaceCard { row, index, pile }
            }
            ClientToServerMessage::DiscardDrawnCard => RoomCommand::DiscardDrawnCard,
            ClientToServerMessage::CallStop => RoomCommand::CallStop,
            ClientToServerMessage::PeekDone => RoomCommand::PeekDone,
            ClientToServerMessage::NewGame => RoomCommand::NewGame,
            ClientToServerMessage::StartGame => RoomCommand::StartGame,
            ClientToServerMessage::KickPlayer { player_id } => {
                RoomCommand::KickPlayer { player_id }
            }
            ClientToServerMessage::MakeAdmin { player_id } => RoomCommand::MakeAdmin { player_id },
        };
        Some(command)
    }
}

/// Messages sent from the server to game clients.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "messageType", content = "payload")]
pub enum ServerToClientMessage {
    /// Sent once to a connection that was given a new seat.
    PlayerAssigned { player_id: Uuid },
    /// Full room snapshot, broadcast after every change.
    RoomUpdate { room: Room },
    /// The sender's last command had no effect.
    ActionIgnored { action: String, reason: String },
    /// The receiving player was removed by the admin.
    Kicked,
    /// The room no longer exists.
    RoomClosed,
    SystemError { message: String },
}

impl ServerToClientMessage {
    pub fn to_ws_text(&self) -> Result<axum::extract::ws::Message, serde_json::Error> {
        serde_json::to_string(self)
            .map(|json_string| axum::extract::ws::Message::Text(json_string.into()))
    }
}

pub fn client_message_from_ws_text(text: &str) -> Result<ClientToServerMessage, serde_json::Error> {
    serde_json::from_str(text)
}
