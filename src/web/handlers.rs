use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};

use super::error::{Result as WebResult, WebError};
use crate::game_logic::Room;
use crate::game_logic::room::{MAX_ROOM_CAPACITY, MIN_ROOM_CAPACITY};
use crate::state::AppState;

const GENERATED_ROOM_ID_LEN: usize = 6;
const MAX_ROOM_ID_LEN: usize = 64;

#[derive(Deserialize, Debug, Default)]
pub struct CreateRoomRequest {
    pub room_id: Option<String>,
    pub max_capacity: Option<usize>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct RoomAvailability {
    pub exists: bool,
    pub is_full: bool,
}

fn generate_room_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_ROOM_ID_LEN)
        .map(|c| char::from(c).to_ascii_uppercase())
        .collect()
}

fn validate_room_id(room_id: &str) -> WebResult<()> {
    if room_id.is_empty() || room_id.len() > MAX_ROOM_ID_LEN {
        return Err(WebError::BadRequest(format!(
            "room_id must be 1 to {MAX_ROOM_ID_LEN} characters"
        )));
    }
    if !room_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(WebError::BadRequest(
            "room_id may only contain letters, digits, '-' and '_'".to_string(),
        ));
    }
    Ok(())
}

pub async fn get_room_handler(
    State(app_state): State<AppState>,
    Path(room_id): Path<String>,
) -> WebResult<Json<Room>> {
    tracing::debug!(room.id = %room_id, "HTTP: Received get_room request");
    app_state
        .repository
        .load(&room_id)
        .await?
        .map(Json)
        .ok_or(WebError::RoomNotFound(room_id))
}

pub async fn create_room_handler(
    State(app_state): State<AppState>,
    Json(payload): Json<CreateRoomRequest>,
) -> WebResult<(StatusCode, Json<Room>)> {
    tracing::info!(request = ?payload, "HTTP: Received create_room request");

    let max_capacity = payload
        .max_capacity
        .unwrap_or(app_state.rooms_config.default_max_capacity);
    if !(MIN_ROOM_CAPACITY..=MAX_ROOM_CAPACITY).contains(&max_capacity) {
        return Err(WebError::BadRequest(format!(
            "max_capacity must be between {MIN_ROOM_CAPACITY} and {MAX_ROOM_CAPACITY}"
        )));
    }

    let room_id = match payload.room_id {
        Some(room_id) => {
            let room_id = room_id.trim().to_string();
            validate_room_id(&room_id)?;
            room_id
        }
        None => generate_room_id(),
    };

    let room = app_state
        .repository
        .create(&room_id, max_capacity)
        .await
        .map_err(|e| {
            tracing::warn!(room.id = %room_id, error = %e, "Failed to create room");
            WebError::from(e)
        })?;

    tracing::info!(room.id = %room.id, room.max_capacity = room.max_capacity, "Created room");
    Ok((StatusCode::CREATED, Json(room)))
}

pub async fn room_availability_handler(
    State(app_state): State<AppState>,
    Path(room_id): Path<String>,
) -> WebResult<Json<RoomAvailability>> {
    let room = app_state.repository.load(&room_id).await?;
    Ok(Json(RoomAvailability {
        exists: room.is_some(),
        is_full: room.as_ref().is_some_and(Room::is_full),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoomsConfig;
    use crate::rooms::RoomManagerHandle;
    use crate::store::{InMemoryRoomStore, RoomRepository};
    use std::sync::Arc;
    use std::time::Duration;

    fn app_state() -> AppState {
        let repository = RoomRepository::new(
            Arc::new(InMemoryRoomStore::new()),
            Duration::from_secs(1),
            3,
        );
        let rooms_config = Arc::new(RoomsConfig::default());
        AppState {
            room_manager: RoomManagerHandle::spawn(8, repository.clone(), Arc::clone(&rooms_config)),
            repository,
            rooms_config,
        }
    }

    fn request(room_id: Option<&str>, max_capacity: Option<usize>) -> Json<CreateRoomRequest> {
        Json(CreateRoomRequest {
            room_id: room_id.map(str::to_string),
            max_capacity,
        })
    }

    #[tokio::test]
    async fn test_create_then_get_room() {
        let state = app_state();
        let (status, Json(room)) =
            create_room_handler(State(state.clone()), request(Some("kitchen"), Some(6)))
                .await
                .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(room.max_capacity, 6);

        let Json(fetched) = get_room_handler(State(state), Path("kitchen".to_string()))
            .await
            .unwrap();
        assert_eq!(fetched.id, "kitchen");
    }

    #[tokio::test]
    async fn test_create_generates_id_and_default_capacity() {
        let state = app_state();
        let (_, Json(room)) = create_room_handler(State(state), request(None, None))
            .await
            .unwrap();
        assert_eq!(room.id.len(), GENERATED_ROOM_ID_LEN);
        assert_eq!(room.max_capacity, RoomsConfig::default().default_max_capacity);
    }

    #[tokio::test]
    async fn test_create_existing_room_conflicts() {
        let state = app_state();
        create_room_handler(State(state.clone()), request(Some("kitchen"), None))
            .await
            .unwrap();
        let result = create_room_handler(State(state), request(Some("kitchen"), None)).await;
        assert!(matches!(result, Err(WebError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input() {
        let state = app_state();
        for (room_id, capacity) in [(Some("kitchen"), Some(1)), (Some("kitchen"), Some(18)), (Some("a b"), None)] {
            let result = create_room_handler(State(state.clone()), request(room_id, capacity)).await;
            assert!(matches!(result, Err(WebError::BadRequest(_))));
        }
    }

    #[tokio::test]
    async fn test_get_missing_room_is_not_found() {
        let result = get_room_handler(State(app_state()), Path("nowhere".to_string())).await;
        assert!(matches!(result, Err(WebError::RoomNotFound(_))));
    }

    #[tokio::test]
    async fn test_availability() {
        let state = app_state();
        let Json(missing) = room_availability_handler(State(state.clone()), Path("tiny".to_string()))
            .await
            .unwrap();
        assert_eq!(missing, RoomAvailability { exists: false, is_full: false });

        state.repository.create("tiny", 2).await.unwrap();
        let Json(open) = room_availability_handler(State(state), Path("tiny".to_string()))
            .await
            .unwrap();
        assert_eq!(open, RoomAvailability { exists: true, is_full: false });
    }
}
