use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading error: {0}")]
    Load(String),
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Failures of the room store. Everything except `VersionConflict` is an
/// infrastructure failure for the operation that hit it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Room {0} already exists")]
    AlreadyExists(String),
    #[error("Room {room_id} changed concurrently (expected version {expected})")]
    VersionConflict { room_id: String, expected: u64 },
    #[error("Room store did not answer within {0:?}")]
    Timeout(Duration),
    #[error("Room store unavailable: {0}")]
    Unavailable(String),
    #[error("Gave up updating room {room_id} after {attempts} conflicting writes")]
    RetriesExhausted { room_id: String, attempts: u32 },
}

#[derive(Debug, Error)]
pub enum ActorError {
    #[error("Room actor for {0} has stopped")]
    RoomGone(String),
    #[error("Room manager is not responding")]
    ManagerUnavailable,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Web server/handler error: {0}")]
    Web(#[from] crate::web::WebError),
    #[error("Room store error: {0}")]
    Store(#[from] StoreError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Configuration parsing error: {0}")]
    ConfigParsing(#[from] config::ConfigError),
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
