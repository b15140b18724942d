// src/main.rs

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod game_logic;
mod rooms;
mod state;
mod store;
mod web;

use crate::config::load_settings;
use crate::error::Result as AppResult;
use crate::rooms::RoomManagerHandle;
use crate::state::AppState;
use crate::store::{InMemoryRoomStore, RoomRepository};
use crate::web::run_server;

#[tokio::main]
async fn main() -> AppResult<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("{}=debug,tower_http=debug", env!("CARGO_PKG_NAME")).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let app_settings = load_settings()?;
    tracing::info!(settings = ?app_settings, "Configuration loaded");

    let rooms_config = Arc::new(app_settings.rooms);
    let repository = RoomRepository::new(
        Arc::new(InMemoryRoomStore::new()),
        rooms_config.store_timeout(),
        rooms_config.max_write_retries,
    );
    let room_manager = RoomManagerHandle::spawn(64, repository.clone(), Arc::clone(&rooms_config));

    let app_state = AppState {
        room_manager,
        repository,
        rooms_config,
    };

    run_server(app_state, app_settings.server).await?;

    Ok(())
}
