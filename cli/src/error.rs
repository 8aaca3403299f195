//! Unified error handling for the command line.

use crate::config::ConfigError;
use crate::source::SourceError;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Snapshot error: {0}")]
    Source(#[from] SourceError),

    #[error("Sync error: {0}")]
    Engine(#[from] docsync_engine::Error),
}

/// Result type alias for commands.
pub type Result<T> = std::result::Result<T, AppError>;
