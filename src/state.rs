use std::sync::Arc;

use crate::config::RoomsConfig;
use crate::rooms::RoomManagerHandle;
use crate::store::RoomRepository;

#[derive(Clone)]
pub struct AppState {
    pub room_manager: RoomManagerHandle,
    pub repository: RoomRepository,
    pub rooms_config: Arc<RoomsConfig>,
}
