use crate::error::{ConfigError, Result as AppResult};
use crate::game_logic::NewGamePolicy;
use crate::game_logic::room::{MAX_ROOM_CAPACITY, MIN_ROOM_CAPACITY};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoomsConfig {
    /// Capacity given to rooms created implicitly by the first connection.
    pub default_max_capacity: usize,
    pub store_timeout_ms: u64,
    pub max_write_retries: u32,
    pub new_game_policy: NewGamePolicy,
    /// After this long without a client event, a room actor that still holds
    /// connections marks their players inactive, closes them and stops. An
    /// actor with no connections is never timed out.
    pub idle_shutdown_secs: u64,
}

impl RoomsConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn idle_shutdown(&self) -> Duration {
        Duration::from_secs(self.idle_shutdown_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_ROOM_CAPACITY..=MAX_ROOM_CAPACITY).contains(&self.default_max_capacity) {
            return Err(ConfigError::InvalidValue(format!(
                "rooms.default_max_capacity must be between {MIN_ROOM_CAPACITY} and {MAX_ROOM_CAPACITY}, got {}",
                self.default_max_capacity
            )));
        }
        if self.store_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "rooms.store_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            default_max_capacity: 4,
            store_timeout_ms: 2000,
            max_write_retries: 3,
            new_game_policy: NewGamePolicy::default(),
            idle_shutdown_secs: 3600,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AppSettings {
    pub server: ServerConfig,
    pub rooms: RoomsConfig,
}

pub fn load_settings() -> AppResult<AppSettings> {
    let defaults = RoomsConfig::default();
    let builder = Config::builder()
        .set_default("server.port", 3000)?
        .set_default("server.cors_origins", Vec::<String>::new())?
        .set_default("rooms.default_max_capacity", defaults.default_max_capacity as u64)?
        .set_default("rooms.store_timeout_ms", defaults.store_timeout_ms)?
        .set_default("rooms.max_write_retries", defaults.max_write_retries as u64)?
        .set_default("rooms.new_game_policy", "wait_for_start")?
        .set_default("rooms.idle_shutdown_secs", defaults.idle_shutdown_secs)?
        .add_source(File::with_name("config").required(false))
        .add_source(
            Environment::with_prefix("SIXES")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("server.cors_origins")
                .try_parsing(true),
        );

    let settings: AppSettings = builder
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?
        .try_deserialize()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    settings.rooms.validate()?;
    Ok(settings)
}
