mod api;
mod auth;
mod config;
mod db;
mod env;
mod error;
mod lifecycle;
mod mediator;
mod models;
mod session;
mod storage;
mod telemetry;
mod validation;
#[cfg(test)]
mod test;

use api::Blobs;
use auth::{forbidden, sweep_expired_sessions, unauthorized};
use chrono::Utc;
use config::{AppConfig, ConfigError};
use error::AppError;
use mediator::notes::{NoteFeed, purge_expired};
use rocket::data::{Limits, ToByteUnit};
use rocket::fs::FileServer;
use rocket::{Build, Rocket, catchers, tokio};
use session::SessionRegistry;
use sqlx::SqlitePool;
use std::sync::Arc;
use storage::LocalBlobStore;
use telemetry::{TelemetryFairing, init_tracing};
use thiserror::Error;
use tracing::{error, info};

const SESSION_SWEEP_SECS: u64 = 3600;
const NOTE_PURGE_SECS: u64 = 600;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Environment error: {0}")]
    Env(#[from] dotenvy::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("{0}")]
    Rocket(Box<rocket::Error>),
    #[error("Application error: {0}")]
    App(#[from] AppError),
}

impl From<rocket::Error> for Error {
    fn from(value: rocket::Error) -> Self {
        Error::Rocket(Box::new(value))
    }
}

#[rocket::main]
async fn main() -> Result<(), Error> {
    let env_files = env::load_environment()?;
    let _telemetry = init_tracing();
    info!(files = ?env_files, "Loaded environment");

    let config = AppConfig::from_env()?;
    tokio::fs::create_dir_all(&config.storage_root).await?;

    let pool = SqlitePool::connect(&config.database_url).await?;

    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations completed successfully");

    let registry = SessionRegistry::new();
    spawn_session_sweep(pool.clone(), registry.clone());
    if config.purge_expired_notes {
        spawn_note_purge(pool.clone());
    }

    let blobs: Blobs = Arc::new(LocalBlobStore::new(
        config.storage_root.clone(),
        &config.storage_public_url,
    ));

    init_rocket(pool, registry, config, blobs).launch().await?;
    Ok(())
}

fn spawn_session_sweep(pool: SqlitePool, registry: SessionRegistry) {
    tokio::spawn(async move {
        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;

        loop {
            if let Err(e) = sweep_expired_sessions(&pool, &registry).await {
                error!("Failed to clean expired sessions: {}", e);
            }

            tokio::time::sleep(tokio::time::Duration::from_secs(SESSION_SWEEP_SECS)).await;
        }
    });
}

fn spawn_note_purge(pool: SqlitePool) {
    tokio::spawn(async move {
        loop {
            match purge_expired(&pool, Utc::now()).await {
                Ok(0) => {}
                Ok(count) => info!("Purged {} expired notes", count),
                Err(e) => error!("Failed to purge expired notes: {}", e),
            }

            tokio::time::sleep(tokio::time::Duration::from_secs(NOTE_PURGE_SECS)).await;
        }
    });
}

pub fn init_rocket(
    pool: SqlitePool,
    registry: SessionRegistry,
    config: AppConfig,
    blobs: Blobs,
) -> Rocket<Build> {
    info!("Starting exam prep portal");

    let limits = Limits::default()
        .limit("file", 25.mebibytes())
        .limit("data-form", 26.mebibytes());
    let figment = rocket::Config::figment().merge(("limits", limits));

    let storage_root = config.storage_root.clone();
    let rocket = rocket::custom(figment)
        .manage(pool)
        .manage(registry)
        .manage(blobs)
        .manage(config)
        .manage(NoteFeed::default())
        .mount("/api", api::routes())
        .register("/api", catchers![unauthorized, forbidden])
        .attach(TelemetryFairing);

    if storage_root.is_dir() {
        rocket.mount("/storage", FileServer::from(storage_root))
    } else {
        rocket
    }
}
