// src/store.rs

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::game_logic::{ActionResult, Effect, Ignored, Room};

/// Whole-document persistence for rooms, keyed by room id.
///
/// `replace` and `delete` are conditional: they only succeed if the stored
/// document still has the version the caller loaded. `replace` bumps the
/// version on success.
#[async_trait]
pub trait RoomStore: Send + Sync {
    async fn load(&self, room_id: &str) -> Result<Option<Room>, StoreError>;
    async fn create(&self, room_id: &str, max_capacity: usize) -> Result<Room, StoreError>;
    async fn replace(&self, room: Room) -> Result<Room, StoreError>;
    async fn delete(&self, room_id: &str, expected_version: u64) -> Result<(), StoreError>;
}

#[derive(Default)]
pub struct InMemoryRoomStore {
    rooms: RwLock<HashMap<String, Room>>,
}

impl InMemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoomStore for InMemoryRoomStore {
    async fn load(&self, room_id: &str) -> Result<Option<Room>, StoreError> {
        Ok(self.rooms.read().await.get(room_id).cloned())
    }

    async fn create(&self, room_id: &str, max_capacity: usize) -> Result<Room, StoreError> {
        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(room_id) {
            return Err(StoreError::AlreadyExists(room_id.to_string()));
        }
        let room = Room::new(room_id.to_string(), max_capacity);
        rooms.insert(room_id.to_string(), room.clone());
        Ok(room)
    }

    async fn replace(&self, mut room: Room) -> Result<Room, StoreError> {
        let mut rooms = self.rooms.write().await;
        let stored_version = rooms.get(&room.id).map(|stored| stored.version);
        if stored_version != Some(room.version) {
            return Err(StoreError::VersionConflict {
                room_id: room.id.clone(),
                expected: room.version,
            });
        }
        room.version += 1;
        room.updated_at = Utc::now();
        rooms.insert(room.id.clone(), room.clone());
        Ok(room)
    }

    async fn delete(&self, room_id: &str, expected_version: u64) -> Result<(), StoreError> {
        let mut rooms = self.rooms.write().await;
        match rooms.get(room_id) {
            Some(stored) if stored.version != expected_version => Err(StoreError::VersionConflict {
                room_id: room_id.to_string(),
                expected: expected_version,
            }),
            Some(_) => {
                rooms.remove(room_id);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[derive(Debug)]
pub enum UpdateOutcome {
    Applied(Room),
    Ignored { reason: Ignored, room: Room },
    Closed,
    NotFound,
}

/// Bounded-time access to a [`RoomStore`] plus the load, mutate, conditional
/// replace cycle every room change goes through.
#[derive(Clone)]
pub struct RoomRepository {
    store: Arc<dyn RoomStore>,
    timeout: Duration,
    max_write_retries: u32,
}

impl RoomRepository {
    pub fn new(store: Arc<dyn RoomStore>, timeout: Duration, max_write_retries: u32) -> Self {
        Self {
            store,
            timeout,
            max_write_retries,
        }
    }

    async fn bounded<T>(
        &self,
        operation: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.timeout, operation)
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
    }

    pub async fn load(&self, room_id: &str) -> Result<Option<Room>, StoreError> {
        self.bounded(self.store.load(room_id)).await
    }

    pub async fn create(&self, room_id: &str, max_capacity: usize) -> Result<Room, StoreError> {
        self.bounded(self.store.create(room_id, max_capacity)).await
    }


    /// Loads the room, creating it when missing. Losing a create race to
    /// another connection just loads the winner's document.
    #[tracing::instrument(skip(self))]
    pub async fn load_or_create(&self, room_id: &str, max_capacity: usize) -> Result<Room, StoreError> {
        if let Some(room) = self.load(room_id).await? {
            return Ok(room);
        }
        match self.create(room_id, max_capacity).await {
            Ok(room) => {
                tracing::info!(room.id = %room_id, room.max_capacity = max_capacity, "Created room");
                Ok(room)
            }
            Err(StoreError::AlreadyExists(_)) => self
                .load(room_id)
                .await?
                .ok_or_else(|| StoreError::Unavailable(format!("room {room_id} vanished after create race"))),
            Err(e) => Err(e),
        }
    }

    /// Runs `mutation` against the latest stored room and persists the result.
    ///
    /// The mutation may run more than once: when another writer got in between
    /// the load and the replace it is re-applied to the fresh document, up to
    /// `max_write_retries` extra times.
    #[tracing::instrument(skip(self, mutation))]
    pub async fn update<F>(&self, room_id: &str, mut mutation: F) -> Result<UpdateOutcome, StoreError>
    where
        F: FnMut(&mut Room) -> ActionResult,
    {
        let attempts = self.max_write_retries + 1;
        for attempt in 1..=attempts {
            let Some(loaded) = self.load(room_id).await? else {
                return Ok(UpdateOutcome::NotFound);
            };
            let mut room = loaded.clone();

            let written = match mutation(&mut room) {
                Err(reason) => {
                    return Ok(UpdateOutcome::Ignored {
                        reason,
                        room: loaded,
                    });
                }
                Ok(Effect::Closed) => self
                    .bounded(self.store.delete(room_id, loaded.version))
                    .await
                    .map(|()| UpdateOutcome::Closed),
                Ok(Effect::Updated) => self
                    .bounded(self.store.replace(room))
                    .await
                    .map(UpdateOutcome::Applied),
            };

            match written {
                Ok(outcome) => {
                    if matches!(outcome, UpdateOutcome::Closed) {
                        tracing::info!(room.id = %room_id, "Room closed and deleted");
                    }
                    return Ok(outcome);
                }
                Err(StoreError::VersionConflict { expected, .. }) => {
                    tracing::warn!(
                        room.id = %room_id,
                        room.version = expected,
                        attempt,
                        "Concurrent room write detected, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(StoreError::RetriesExhausted {
            room_id: room_id.to_string(),
            attempts,
        })
    }
}
