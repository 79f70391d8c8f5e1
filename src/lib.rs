//! Blogging backend core.
//!
//! Two subsystems carry the weight here:
//! - `notify`: asynchronous notification fan-out through a bounded queue and
//!   a fixed worker pool, with drain-to-completion shutdown
//! - `pagination`: opaque keyset cursors, range-query construction and page
//!   assembly shared by every list command
//!
//! # Architecture
//!
//! - `commands`: request handlers (users, follows, posts, comments, bookmarks,
//!   notifications)
//! - `db`: SQLite store, migrations and queries
//! - `config`: service configuration persisted in the settings table
//! - `shutdown`: process signal handling

pub mod commands;
pub mod config;
pub mod db;
pub mod notify;
pub mod pagination;
pub mod shutdown;

#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use config::ServiceConfig;
use db::Database;
use notify::{DispatchStats, NotificationDispatcher, NotificationSink, SqliteNotificationSink};

// ---------------------------------------------------------------------------
// Shared error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Db(#[from] db::DbError),
    #[error("invalid cursor format")]
    InvalidCursor(#[from] pagination::CursorError),
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Dispatch(#[from] notify::DispatchError),
    #[error("{0}")]
    Config(#[from] config::ConfigError),
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Errors caused by the request rather than by the service.
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::InvalidCursor(e) => e.is_malformed(),
            Self::InvalidInput(_)
            | Self::NotFound(_)
            | Self::Conflict(_)
            | Self::Forbidden(_) => true,
            Self::Db(db::DbError::NotFound(_)) | Self::Db(db::DbError::Conflict(_)) => true,
            _ => false,
        }
    }
}

impl Serialize for AppError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct AppState {
    pub db: Arc<Database>,
    pub config: ServiceConfig,
    pub dispatcher: Arc<NotificationDispatcher>,
}

impl AppState {
    /// State whose notifications are persisted to `db`.
    pub fn new(db: Arc<Database>, config: ServiceConfig) -> Self {
        let sink = Arc::new(SqliteNotificationSink::new(db.clone()));
        Self::with_sink(db, config, sink)
    }

    pub fn with_sink(db: Arc<Database>, config: ServiceConfig, sink: Arc<dyn NotificationSink>) -> Self {
        let dispatcher = Arc::new(NotificationDispatcher::new(
            config.notifications.clone(),
            sink,
        ));
        Self {
            db,
            config,
            dispatcher,
        }
    }

    pub fn start(&self) -> Result<(), AppError> {
        self.dispatcher.start()?;
        Ok(())
    }

    /// Drain the notification queue, giving up after the configured timeout.
    /// Returns `None` when the drain did not finish in time.
    pub async fn shutdown(&self) -> Option<DispatchStats> {
        let timeout = self.config.notifications.shutdown_timeout();
        match tokio::time::timeout(timeout, self.dispatcher.shutdown()).await {
            Ok(stats) => Some(stats),
            Err(_) => {
                let stats = self.dispatcher.stats();
                tracing::warn!(
                    timeout_ms = self.config.notifications.shutdown_timeout_ms,
                    enqueued = stats.enqueued,
                    delivered = stats.delivered,
                    failed = stats.failed,
                    "notification drain timed out; pending events are lost"
                );
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Data directory
// ---------------------------------------------------------------------------

fn blogwire_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var("BLOGWIRE_DATA_DIR") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".blogwire");
    }

    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".blogwire");
    }

    PathBuf::from(".blogwire")
}

fn database_path() -> Result<PathBuf, AppError> {
    if let Ok(path) = std::env::var("BLOGWIRE_DATABASE_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }

    let data_dir = blogwire_data_dir();
    std::fs::create_dir_all(&data_dir).map_err(|e| {
        AppError::Other(format!(
            "failed to create data directory {}: {e}",
            data_dir.display()
        ))
    })?;
    Ok(data_dir.join("blogwire.db"))
}

// ---------------------------------------------------------------------------
// Application entry point
// ---------------------------------------------------------------------------

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("blogwire=debug,info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Open the store, start the notification workers and run until a shutdown
/// signal arrives, then drain.
pub async fn run() -> Result<(), AppError> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let db_path = database_path()?;
    let db = Arc::new(Database::open(&db_path)?);
    let config = config::load_service_config(&db)?;

    let state = AppState::new(db, config);
    state.start()?;
    tracing::info!(database = %db_path.display(), "blogwire started");

    shutdown::shutdown_signal().await;

    match state.shutdown().await {
        Some(stats) => tracing::info!(
            delivered = stats.delivered,
            failed = stats.failed,
            dropped = stats.dropped,
            "blogwire stopped"
        ),
        None => tracing::warn!("blogwire stopped before the notification queue drained"),
    }
    Ok(())
}
