//! Database module for SQLite backup, retention and restore

pub mod storage;

pub mod backup;
pub mod backup_naming;
pub mod restore;

pub use backup::{BackupManager, BackupOptions};

use std::path::PathBuf;

/// Database error type for backup/restore operations
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database not found at {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("Backup not found: {0}")]
    BackupNotFound(String),

    #[error("Backup already exists: {0}")]
    BackupExists(String),

    #[error("Safety copy failed: {0}")]
    SafetyCopy(String),

    #[error("Backup verification failed: {0}")]
    Verification(String),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(error: sqlx::Error) -> Self {
        DatabaseError::Sqlite(error.to_string())
    }
}

/// Result type for database operations
pub type Result<T> = std::result::Result<T, DatabaseError>;
