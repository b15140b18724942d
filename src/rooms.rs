use axum::extract::ws;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::RoomsConfig;
use crate::error::ActorError;
use crate::game_logic::messages::client_message_from_ws_text;
use crate::game_logic::{
    Ignored, PlayerId, RoomCommand, ServerToClientMessage, engine, membership,
};
use crate::store::{RoomRepository, UpdateOutcome};

const ROOM_ACTOR_BUFFER: usize = 32;

/// Identity a client presents when it opens a connection to a room.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub player_id: Option<PlayerId>,
    pub name: String,
    pub picture: String,
}

#[derive(Debug)]
pub enum RoomManagerMessage {
    GetOrSpawnRoom {
        room_id: String,
        respond_to: oneshot::Sender<RoomActorHandle>,
    },
    RoomActorShutdown {
        room_id: String,
        actor_id: Uuid,
    },
}

/// Keeps at most one live room actor per room id in this process.
pub struct RoomManagerActor {
    receiver: mpsc::Receiver<RoomManagerMessage>,
    rooms: HashMap<String, RoomActorHandle>,
    self_sender: mpsc::Sender<RoomManagerMessage>,
    repository: RoomRepository,
    settings: Arc<RoomsConfig>,
}

impl RoomManagerActor {
    fn new(
        receiver: mpsc::Receiver<RoomManagerMessage>,
        self_sender: mpsc::Sender<RoomManagerMessage>,
        repository: RoomRepository,
        settings: Arc<RoomsConfig>,
    ) -> Self {
        RoomManagerActor {
            receiver,
            rooms: HashMap::new(),
            self_sender,
            repository,
            settings,
        }
    }

    #[tracing::instrument(skip(self, msg), fields(
        msg_type = %std::any::type_name_of_val(&msg)
    ))]
    async fn handle_message(&mut self, msg: RoomManagerMessage) {
        match msg {
            RoomManagerMessage::GetOrSpawnRoom {
                room_id,
                respond_to,
            } => {
                let live_handle = self
                    .rooms
                    .get(&room_id)
                    .filter(|handle| !handle.sender.is_closed())
                    .cloned();

                let handle = match live_handle {
                    Some(handle) => handle,
                    None => {
                        let manager_handle = RoomManagerHandle {
                            sender: self.self_sender.clone(),
                        };
                        let handle = RoomActorHandle::spawn(
                            room_id.clone(),
                            ROOM_ACTOR_BUFFER,
                            manager_handle,
                            self.repository.clone(),
                            Arc::clone(&self.settings),
                        );
                        tracing::info!(
                            room.id = %room_id,
                            actor.id = %handle.actor_id,
                            "Spawned room actor"
                        );
                        self.rooms.insert(room_id, handle.clone());
                        handle
                    }
                };
                let _ = respond_to.send(handle);
            }
            RoomManagerMessage::RoomActorShutdown { room_id, actor_id } => {
                let is_current = self
                    .rooms
                    .get(&room_id)
                    .is_some_and(|handle| handle.actor_id == actor_id);
                if is_current {
                    self.rooms.remove(&room_id);
                    tracing::info!(
                        room.id = %room_id,
                        actor.id = %actor_id,
                        "Cleaning up room after actor shutdown"
                    );
                } else {
                    tracing::debug!(
                        room.id = %room_id,
                        actor.id = %actor_id,
                        "Shutdown notice from a replaced room actor"
                    );
                }
            }
        }
    }
}

#[tracing::instrument(skip(actor))]
pub async fn run_room_manager_actor(mut actor: RoomManagerActor) {
    tracing::info!("RoomManager actor started");
    while let Some(msg) = actor.receiver.recv().await {
        actor.handle_message(msg).await;
    }
    tracing::info!("RoomManager actor stopped");
}

#[derive(Clone, Debug)]
pub struct RoomManagerHandle {
    sender: mpsc::Sender<RoomManagerMessage>,
}

impl RoomManagerHandle {
    pub fn spawn(buffer_size: usize, repository: RoomRepository, settings: Arc<RoomsConfig>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let actor = RoomManagerActor::new(receiver, sender.clone(), repository, settings);
        tokio::spawn(run_room_manager_actor(actor));
        Self { sender }
    }

    pub async fn get_or_spawn(&self, room_id: &str) -> Result<RoomActorHandle, ActorError> {
        let (respond_to, rx) = oneshot::channel();
        self.sender
            .send(RoomManagerMessage::GetOrSpawnRoom {
                room_id: room_id.to_string(),
                respond_to,
            })
            .await
            .map_err(|_| ActorError::ManagerUnavailable)?;
        rx.await.map_err(|_| ActorError::ManagerUnavailable)
    }

    async fn notify_room_shutdown(&self, room_id: String, actor_id: Uuid) -> Result<(), ActorError> {
        self.sender
            .send(RoomManagerMessage::RoomActorShutdown { room_id, actor_id })
            .await
            .map_err(|_| ActorError::ManagerUnavailable)
    }
}

#[derive(Debug)]
pub enum RoomActorMessage {
    ClientConnected {
        client_id: Uuid,
        request: ConnectRequest,
        client_tx: mpsc::Sender<ws::Message>,
    },
    ClientEvent {
        client_id: Uuid,
        raw_payload: String,
    },
    ClientDisconnected {
        client_id: Uuid,
    },
}

struct Connection {
    player_id: PlayerId,
    tx: mpsc::Sender<ws::Message>,
}

/// Serializes every change to one room made through this process and fans the
/// resulting snapshots out to the room's connections.
pub struct RoomActor {
    receiver: mpsc::Receiver<RoomActorMessage>,
    room_id: String,
    actor_id: Uuid,
    repository: RoomRepository,
    settings: Arc<RoomsConfig>,
    manager_handle: RoomManagerHandle,
    connections: HashMap<Uuid, Connection>,
}

impl RoomActor {
    fn new(
        receiver: mpsc::Receiver<RoomActorMessage>,
        room_id: String,
        actor_id: Uuid,
        repository: RoomRepository,
        settings: Arc<RoomsConfig>,
        manager_handle: RoomManagerHandle,
    ) -> Self {
        RoomActor {
            receiver,
            room_id,
            actor_id,
            repository,
            settings,
            manager_handle,
            connections: HashMap::new(),
        }
    }

    /// Returns true when the actor should stop.
    #[tracing::instrument(skip(self, msg), fields(
        room.id = %self.room_id,
        msg_type = %std::any::type_name_of_val(&msg)
    ))]
    async fn handle_message(&mut self, msg: RoomActorMessage) -> bool {
        match msg {
            RoomActorMessage::ClientConnected {
                client_id,
                request,
                client_tx,
            } => self.handle_client_connected(client_id, request, client_tx).await,
            RoomActorMessage::ClientEvent {
                client_id,
                raw_payload,
            } => self.handle_client_event(client_id, raw_payload).await,
            RoomActorMessage::ClientDisconnected { client_id } => {
                self.handle_client_disconnected(client_id).await
            }
        }
    }

    async fn handle_client_connected(
        &mut self,
        client_id: Uuid,
        request: ConnectRequest,
        client_tx: mpsc::Sender<ws::Message>,
    ) -> bool {
        let room = match self
            .repository
            .load_or_create(&self.room_id, self.settings.default_max_capacity)
            .await
        {
            Ok(room) => room,
            Err(e) => {
                tracing::error!(client.id = %client_id, error = %e, "Failed to load room for new connection");
                send_to(
                    &client_tx,
                    &ServerToClientMessage::SystemError {
                        message: "Room is temporarily unavailable, please reconnect.".to_string(),
                    },
                )
                .await;
                return self.connections.is_empty();
            }
        };

        match request.player_id.filter(|id| room.player(*id).is_some()) {
            Some(player_id) => self.resume_player(client_id, player_id, client_tx).await,
            None => self.seat_new_player(client_id, request, client_tx).await,
        }
    }

    async fn resume_player(
        &mut self,
        client_id: Uuid,
        player_id: PlayerId,
        client_tx: mpsc::Sender<ws::Message>,
    ) -> bool {
        let outcome = self
            .repository
            .update(&self.room_id, |room| {
                membership::set_active(room, player_id, true)
            })
            .await;

        match outcome {
            Ok(UpdateOutcome::Applied(room)) => {
                tracing::info!(client.id = %client_id, player.id = %player_id, "Player reconnected");
                self.connections.insert(
                    client_id,
                    Connection {
                        player_id,
                        tx: client_tx,
                    },
                );
                self.broadcast(&ServerToClientMessage::RoomUpdate { room }).await;
                false
            }
            Ok(UpdateOutcome::Ignored {
                reason: Ignored::Unchanged,
                room,
            }) => {
                // Already active through another connection.
                tracing::debug!(client.id = %client_id, player.id = %player_id, "Additional connection for active player");
                send_to(&client_tx, &ServerToClientMessage::RoomUpdate { room }).await;
                self.connections.insert(
                    client_id,
                    Connection {
                        player_id,
                        tx: client_tx,
                    },
                );
                false
            }
            Ok(UpdateOutcome::Ignored { reason, .. }) => {
                tracing::info!(client.id = %client_id, player.id = %player_id, outcome = %reason, "Reconnect rejected");
                send_to(
                    &client_tx,
                    &ServerToClientMessage::SystemError {
                        message: format!("Cannot rejoin room: {reason}"),
                    },
                )
                .await;
                self.connections.is_empty()
            }
            Ok(UpdateOutcome::Closed | UpdateOutcome::NotFound) => {
                send_to(&client_tx, &ServerToClientMessage::RoomClosed).await;
                self.connections.is_empty()
            }
            Err(e) => {
                tracing::error!(client.id = %client_id, player.id = %player_id, error = %e, "Failed to reactivate player");
                send_to(
                    &client_tx,
                    &ServerToClientMessage::SystemError {
                        message: "Could not rejoin the room, please reconnect.".to_string(),
                    },
                )
                .await;
                self.connections.is_empty()
            }
        }
    }

    async fn seat_new_player(
        &mut self,
        client_id: Uuid,
        request: ConnectRequest,
        client_tx: mpsc::Sender<ws::Message>,
    ) -> bool {
        let player_id = Uuid::new_v4();
        let ConnectRequest { name, picture, .. } = request;
        let outcome = self
            .repository
            .update(&self.room_id, |room| {
                membership::join(room, player_id, name.clone(), picture.clone())
            })
            .await;

        match outcome {
            Ok(UpdateOutcome::Applied(room)) => {
                send_to(&client_tx, &ServerToClientMessage::PlayerAssigned { player_id }).await;
                self.connections.insert(
                    client_id,
                    Connection {
                        player_id,
                        tx: client_tx,
                    },
                );
                self.broadcast(&ServerToClientMessage::RoomUpdate { room }).await;
                false
            }
            Ok(UpdateOutcome::Ignored { reason, .. }) => {
                tracing::info!(client.id = %client_id, outcome = %reason, "Join rejected");
                send_to(
                    &client_tx,
                    &ServerToClientMessage::SystemError {
                        message: format!("Cannot join room: {reason}"),
                    },
                )
                .await;
                self.connections.is_empty()
            }
            Ok(UpdateOutcome::Closed | UpdateOutcome::NotFound) => {
                send_to(&client_tx, &ServerToClientMessage::RoomClosed).await;
                self.connections.is_empty()
            }
            Err(e) => {
                tracing::error!(client.id = %client_id, error = %e, "Failed to seat new player");
                send_to(
                    &client_tx,
                    &ServerToClientMessage::SystemError {
                        message: "Could not join the room, please reconnect.".to_string(),
                    },
                )
                .await;
                self.connections.is_empty()
            }
        }
    }

    async fn handle_client_event(&mut self, client_id: Uuid, raw_payload: String) -> bool {
        let Some(player_id) = self.connections.get(&client_id).map(|c| c.player_id) else {
            tracing::warn!(client.id = %client_id, "Event from unregistered client");
            return false;
        };

        let message = match client_message_from_ws_text(&raw_payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(
                    client.id = %client_id,
                    error = %e,
                    event.raw = %raw_payload,
                    "Failed to deserialize event from client"
                );
                self.send_to_client(
                    client_id,
                    &ServerToClientMessage::SystemError {
                        message: format!("Invalid message format: {e}"),
                    },
                )
                .await;
                return false;
            }
        };
        let Some(command) = message.into_command() else {
            self.send_to_client(
                client_id,
                &ServerToClientMessage::SystemError {
                    message: "Already connected to this room.".to_string(),
                },
            )
            .await;
            return false;
        };

        let policy = self.settings.new_game_policy;
        let outcome = self
            .repository
            .update(&self.room_id, |room| {
                engine::apply(room, player_id, command, policy)
            })
            .await;

        match outcome {
            Ok(UpdateOutcome::Applied(room)) => {
                tracing::debug!(
                    player.id = %player_id,
                    action = command.name(),
                    outcome = "applied",
                    room.version = room.version,
                    "Room action applied"
                );
                self.broadcast(&ServerToClientMessage::RoomUpdate { room }).await;
                match command {
                    RoomCommand::KickPlayer { player_id: kicked } => {
                        self.send_to_player(kicked, &ServerToClientMessage::Kicked).await;
                        self.drop_player_connections(kicked);
                    }
                    RoomCommand::Leave => self.drop_player_connections(player_id),
                    _ => {}
                }
                self.connections.is_empty()
            }
            Ok(UpdateOutcome::Ignored { reason, .. }) => {
                tracing::debug!(
                    player.id = %player_id,
                    action = command.name(),
                    outcome = %reason,
                    "Room action ignored"
                );
                self.send_to_client(
                    client_id,
                    &ServerToClientMessage::ActionIgnored {
                        action: command.name().to_string(),
                        reason: reason.to_string(),
                    },
                )
                .await;
                false
            }
            Ok(UpdateOutcome::Closed | UpdateOutcome::NotFound) => {
                self.close_room().await;
                true
            }
            Err(e) => {
                tracing::error!(
                    player.id = %player_id,
                    action = command.name(),
                    error = %e,
                    "Failed to apply room action"
                );
                self.send_to_client(
                    client_id,
                    &ServerToClientMessage::SystemError {
                        message: format!("Could not apply {}, please retry.", command.name()),
                    },
                )
                .await;
                false
            }
        }
    }

    async fn handle_client_disconnected(&mut self, client_id: Uuid) -> bool {
        let Some(connection) = self.connections.remove(&client_id) else {
            return self.connections.is_empty();
        };
        let player_id = connection.player_id;
        if self.connections.values().any(|c| c.player_id == player_id) {
            return false;
        }

        if self.deactivate(player_id).await {
            self.connections.is_empty()
        } else {
            true
        }
    }

    /// Marks a player inactive and broadcasts the change. Returns false once the
    /// room is gone.
    async fn deactivate(&mut self, player_id: PlayerId) -> bool {
        let outcome = self
            .repository
            .update(&self.room_id, |room| {
                membership::set_active(room, player_id, false)
            })
            .await;

        match outcome {
            Ok(UpdateOutcome::Applied(room)) => {
                tracing::info!(player.id = %player_id, "Player marked inactive");
                self.broadcast(&ServerToClientMessage::RoomUpdate { room }).await;
            }
            Ok(UpdateOutcome::Ignored { .. }) => {}
            Ok(UpdateOutcome::Closed | UpdateOutcome::NotFound) => {
                self.close_room().await;
                return false;
            }
            Err(e) => {
                tracing::error!(player.id = %player_id, error = %e, "Failed to mark player inactive");
            }
        }
        true
    }

    async fn shut_down_idle(&mut self) {
        let players: HashSet<PlayerId> = self.connections.values().map(|c| c.player_id).collect();
        self.broadcast(&ServerToClientMessage::SystemError {
            message: "Disconnected after a long period of inactivity.".to_string(),
        })
        .await;
        self.connections.clear();
        for player_id in players {
            if !self.deactivate(player_id).await {
                break;
            }
        }
    }

    async fn close_room(&mut self) {
        tracing::info!("Room closed");
        self.broadcast(&ServerToClientMessage::RoomClosed).await;
        self.connections.clear();
    }

    fn drop_player_connections(&mut self, player_id: PlayerId) {
        self.connections.retain(|_, c| c.player_id != player_id);
    }

    async fn send_to_client(&self, client_id: Uuid, message: &ServerToClientMessage) {
        if let Some(connection) = self.connections.get(&client_id) {
            send_to(&connection.tx, message).await;
        }
    }

    async fn send_to_player(&self, player_id: PlayerId, message: &ServerToClientMessage) {
        for connection in self.connections.values().filter(|c| c.player_id == player_id) {
            send_to(&connection.tx, message).await;
        }
    }

    async fn broadcast(&self, message: &ServerToClientMessage) {
        let ws_msg = match message.to_ws_text() {
            Ok(ws_msg) => ws_msg,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize broadcast");
                return;
            }
        };
        for (client_id, connection) in &self.connections {
            if connection.tx.send(ws_msg.clone()).await.is_err() {
                tracing::warn!(client.id = %client_id, "Failed to send broadcast to client");
            }
        }
    }
}

async fn send_to(client_tx: &mpsc::Sender<ws::Message>, message: &ServerToClientMessage) {
    match message.to_ws_text() {
        Ok(ws_msg) => {
            if client_tx.send(ws_msg).await.is_err() {
                tracing::debug!("Client went away before message could be sent");
            }
        }
        Err(e) => tracing::error!(error = %e, "Failed to serialize message for client"),
    }
}

#[tracing::instrument(skip(actor), fields(
    room.id = %actor.room_id,
    actor.id = %actor.actor_id
))]
pub async fn run_room_actor(mut actor: RoomActor) {
    tracing::info!("Room actor started");

    let idle_timeout = actor.settings.idle_shutdown();
    let mut last_client_activity = Instant::now();

    loop {
        tokio::select! {
            maybe_msg = actor.receiver.recv() => {
                match maybe_msg {
                    Some(msg) => {
                        if matches!(msg, RoomActorMessage::ClientEvent { .. }) {
                            last_client_activity = Instant::now();
                        }
                        if actor.handle_message(msg).await {
                            tracing::info!("Room actor has no connections left");
                            break;
                        }
                    }
                    None => {
                        tracing::info!("Room actor channel closed. Shutting down");
                        break;
                    }
                }
            }
            _ = tokio::time::sleep_until(last_client_activity + idle_timeout), if !actor.connections.is_empty() => {
                tracing::info!("Room inactivity timeout");
                actor.shut_down_idle().await;
                break;
            }
        }
    }

    actor.receiver.close();
    if let Err(e) = actor
        .manager_handle
        .notify_room_shutdown(actor.room_id.clone(), actor.actor_id)
        .await
    {
        tracing::error!(error = %e, "Failed to notify RoomManager of shutdown");
    }
    tracing::info!("Room actor stopped");
}

#[derive(Clone, Debug)]
pub struct RoomActorHandle {
    sender: mpsc::Sender<RoomActorMessage>,
    pub room_id: String,
    actor_id: Uuid,
}

impl RoomActorHandle {
    pub fn spawn(
        room_id: String,
        buffer_size: usize,
        manager_handle: RoomManagerHandle,
        repository: RoomRepository,
        settings: Arc<RoomsConfig>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let actor_id = Uuid::new_v4();
        let actor = RoomActor::new(
            receiver,
            room_id.clone(),
            actor_id,
            repository,
            settings,
            manager_handle,
        );
        tokio::spawn(run_room_actor(actor));
        Self {
            sender,
            room_id,
            actor_id,
        }
    }

    pub async fn client_connected(
        &self,
        client_id: Uuid,
        request: ConnectRequest,
        client_tx: mpsc::Sender<ws::Message>,
    ) -> Result<(), ActorError> {
        self.sender
            .send(RoomActorMessage::ClientConnected {
                client_id,
                request,
                client_tx,
            })
            .await
            .map_err(|_| ActorError::RoomGone(self.room_id.clone()))
    }

    pub async fn forward_client_event(
        &self,
        client_id: Uuid,
        raw_payload: String,
    ) -> Result<(), ActorError> {
        self.sender
            .send(RoomActorMessage::ClientEvent {
                client_id,
                raw_payload,
            })
            .await
            .map_err(|_| ActorError::RoomGone(self.room_id.clone()))
    }

    pub async fn client_disconnected(&self, client_id: Uuid) {
        if self
            .sender
            .send(RoomActorMessage::ClientDisconnected { client_id })
            .await
            .is_err()
        {
            tracing::debug!(
                room.id = %self.room_id,
                client.id = %client_id,
                "Room actor already stopped before disconnect"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_logic::{GameState, Room};
    use crate::store::InMemoryRoomStore;
    use std::time::Duration;

    struct TestClient {
        id: Uuid,
        rx: mpsc::Receiver<ws::Message>,
    }

    fn setup() -> (RoomManagerHandle, RoomRepository) {
        setup_with(RoomsConfig::default())
    }

    fn setup_with(settings: RoomsConfig) -> (RoomManagerHandle, RoomRepository) {
        let repository = RoomRepository::new(
            Arc::new(InMemoryRoomStore::new()),
            Duration::from_secs(1),
            3,
        );
        let manager = RoomManagerHandle::spawn(8, repository.clone(), Arc::new(settings));
        (manager, repository)
    }

    async fn connect(handle: &RoomActorHandle, player_id: Option<PlayerId>, name: &str) -> TestClient {
        let (tx, rx) = mpsc::channel(32);
        let id = Uuid::new_v4();
        handle
            .client_connected(
                id,
                ConnectRequest {
                    player_id,
                    name: name.to_string(),
                    picture: String::new(),
                },
                tx,
            )
            .await
            .unwrap();
        TestClient { id, rx }
    }

    async fn next_message(client: &mut TestClient) -> Option<ServerToClientMessage> {
        let msg = tokio::time::timeout(Duration::from_secs(2), client.rx.recv())
            .await
            .expect("timed out waiting for server message")?;
        match msg {
            ws::Message::Text(text) => Some(serde_json::from_str(text.as_str()).unwrap()),
            other => panic!("unexpected frame {other:?}"),
        }
    }

    async fn next_room(client: &mut TestClient) -> Room {
        match next_message(client).await {
            Some(ServerToClientMessage::RoomUpdate { room }) => room,
            other => panic!("expected RoomUpdate, got {other:?}"),
        }
    }

    async fn join(handle: &RoomActorHandle, name: &str) -> (TestClient, PlayerId) {
        let mut client = connect(handle, None, name).await;
        let player_id = match next_message(&mut client).await {
            Some(ServerToClientMessage::PlayerAssigned { player_id }) => player_id,
            other => panic!("expected PlayerAssigned, got {other:?}"),
        };
        next_room(&mut client).await;
        (client, player_id)
    }

    #[tokio::test]
    async fn test_manager_reuses_live_room_actor() {
        let (manager, _) = setup();
        let first = manager.get_or_spawn("kitchen").await.unwrap();
        let _client = connect(&first, None, "Ada").await;
        let second = manager.get_or_spawn("kitchen").await.unwrap();
        assert_eq!(first.actor_id, second.actor_id);

        let other = manager.get_or_spawn("garden").await.unwrap();
        assert_ne!(first.actor_id, other.actor_id);
    }

    #[tokio::test]
    async fn test_joiners_are_assigned_and_broadcast() {
        let (manager, _) = setup();
        let handle = manager.get_or_spawn("kitchen").await.unwrap();

        let (mut ada, ada_id) = join(&handle, "Ada").await;
        let (_bob, bob_id) = join(&handle, "Bob").await;

        let room = next_room(&mut ada).await;
        assert_eq!(room.players.len(), 2);
        assert_eq!(room.admin_id, Some(ada_id));
        assert_eq!(room.players[1].id, bob_id);
        assert_eq!(room.players[1].name, "Bob");
    }

    #[tokio::test]
    async fn test_admin_only_start_and_ignored_feedback() {
        let (manager, _) = setup();
        let handle = manager.get_or_spawn("kitchen").await.unwrap();
        let (mut ada, _) = join(&handle, "Ada").await;
        let (mut bob, _) = join(&handle, "Bob").await;
        next_room(&mut ada).await;

        handle
            .forward_client_event(bob.id, r#"{"messageType":"StartGame"}"#.to_string())
            .await
            .unwrap();
        match next_message(&mut bob).await {
            Some(ServerToClientMessage::ActionIgnored { action, .. }) => {
                assert_eq!(action, "start_game")
            }
            other => panic!("expected ActionIgnored, got {other:?}"),
        }

        handle
            .forward_client_event(ada.id, r#"{"messageType":"StartGame"}"#.to_string())
            .await
            .unwrap();
        assert_eq!(next_room(&mut ada).await.game_state, GameState::Peeking);
        assert_eq!(next_room(&mut bob).await.game_state, GameState::Peeking);
    }

    #[tokio::test]
    async fn test_malformed_event_gets_system_error() {
        let (manager, _) = setup();
        let handle = manager.get_or_spawn("kitchen").await.unwrap();
        let (mut ada, _) = join(&handle, "Ada").await;

        handle
            .forward_client_event(ada.id, "not json".to_string())
            .await
            .unwrap();
        assert!(matches!(
            next_message(&mut ada).await,
            Some(ServerToClientMessage::SystemError { .. })
        ));
    }

    #[tokio::test]
    async fn test_full_room_rejects_connection() {
        let (manager, repository) = setup();
        repository.create("tiny", 2).await.unwrap();
        let handle = manager.get_or_spawn("tiny").await.unwrap();
        let (_ada, _) = join(&handle, "Ada").await;
        let (_bob, _) = join(&handle, "Bob").await;

        let mut late = connect(&handle, None, "Late").await;
        assert!(matches!(
            next_message(&mut late).await,
            Some(ServerToClientMessage::SystemError { .. })
        ));
        assert!(next_message(&mut late).await.is_none());
        assert_eq!(repository.load("tiny").await.unwrap().unwrap().players.len(), 2);
    }

    #[tokio::test]
    async fn test_reconnect_resumes_seat() {
        let (manager, _) = setup();
        let handle = manager.get_or_spawn("kitchen").await.unwrap();
        let (mut ada, _) = join(&handle, "Ada").await;
        let (bob, bob_id) = join(&handle, "Bob").await;
        next_room(&mut ada).await;
        let bob_hand = {
            handle.client_disconnected(bob.id).await;
            let room = next_room(&mut ada).await;
            let bob_seat = room.player(bob_id).unwrap();
            assert!(!bob_seat.is_active);
            bob_seat.hand.clone()
        };

        let mut bob_again = connect(&handle, Some(bob_id), "Bob").await;
        let room = next_room(&mut bob_again).await;
        let bob_seat = room.player(bob_id).unwrap();
        assert!(bob_seat.is_active);
        assert_eq!(bob_seat.hand, bob_hand);
        assert_eq!(room.players.len(), 2);
    }

    #[tokio::test]
    async fn test_kicked_player_is_notified_and_dropped() {
        let (manager, _) = setup();
        let handle = manager.get_or_spawn("kitchen").await.unwrap();
        let (mut ada, _) = join(&handle, "Ada").await;
        let (mut bob, bob_id) = join(&handle, "Bob").await;
        next_room(&mut ada).await;

        let kick = format!(r#"{{"messageType":"KickPlayer","payload":{{"player_id":"{bob_id}"}}}}"#);
        handle.forward_client_event(ada.id, kick).await.unwrap();

        assert_eq!(next_room(&mut ada).await.players.len(), 1);
        assert_eq!(next_room(&mut bob).await.players.len(), 1);
        assert!(matches!(
            next_message(&mut bob).await,
            Some(ServerToClientMessage::Kicked)
        ));
        assert!(next_message(&mut bob).await.is_none());
    }

    #[tokio::test]
    async fn test_last_disconnect_deletes_room() {
        let (manager, repository) = setup();
        let handle = manager.get_or_spawn("kitchen").await.unwrap();
        let (ada, _) = join(&handle, "Ada").await;
        assert!(repository.load("kitchen").await.unwrap().is_some());

        handle.client_disconnected(ada.id).await;
        let mut deleted = false;
        for _ in 0..50 {
            if repository.load("kitchen").await.unwrap().is_none() {
                deleted = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(deleted);
    }

    #[tokio::test]
    async fn test_connected_but_silent_room_is_shut_down() {
        let (manager, repository) = setup_with(RoomsConfig {
            idle_shutdown_secs: 1,
            ..RoomsConfig::default()
        });
        let handle = manager.get_or_spawn("kitchen").await.unwrap();
        let (mut ada, _) = join(&handle, "Ada").await;
        let (mut bob, _) = join(&handle, "Bob").await;
        next_room(&mut ada).await;

        for client in [&mut ada, &mut bob] {
            assert!(matches!(
                next_message(client).await,
                Some(ServerToClientMessage::SystemError { .. })
            ));
            assert!(next_message(client).await.is_none());
        }

        let mut deleted = false;
        for _ in 0..50 {
            if repository.load("kitchen").await.unwrap().is_none() {
                deleted = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(deleted, "a room whose players all went idle is removed");
    }
}
