//! Storage module for database backup/restore operations
//!
//! This module provides an abstraction layer over the place backups live,
//! so the backup manager only deals with staged snapshot files and names.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};

use crate::config::BackupConfig;
use crate::database::Result;

pub mod local_storage;

/// A stored backup with its metadata
#[derive(Debug, Clone, PartialEq)]
pub struct BackupRecord {
    /// File name, which is also the backup's identity
    pub file_name: String,
    /// Full path of the backup file
    pub path: PathBuf,
    /// Size of the backup in bytes
    pub size_bytes: u64,
    /// Last modification time of the file
    pub modified: DateTime<Local>,
    /// Capture time parsed from the file name, if it follows the naming scheme
    pub captured_at: Option<DateTime<Utc>>,
}

impl BackupRecord {
    /// When the backup was taken: the name's timestamp, else the file's mtime
    pub fn created(&self) -> DateTime<Local> {
        self.captured_at
            .map(|at| at.with_timezone(&Local))
            .unwrap_or(self.modified)
    }
}

/// A backup that could not be removed during pruning
#[derive(Debug, Clone, PartialEq)]
pub struct PruneFailure {
    pub file_name: String,
    pub reason: String,
}

/// Outcome of a retention pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PruneReport {
    /// Backups present after the pass, counting ones that failed to delete
    pub retained: usize,
    /// File names removed during the pass
    pub removed: Vec<String>,
    /// Deletions that failed; the pass continued past each of them
    pub failures: Vec<PruneFailure>,
    /// Set when the backups could not be enumerated, so nothing was pruned
    pub listing_error: Option<String>,
}

impl PruneReport {
    /// Report for a pass that could not list the backups
    pub fn listing_failed(reason: String) -> Self {
        Self {
            listing_error: Some(reason),
            ..Self::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.listing_error.is_none()
    }
}

/// Provides a unified interface for backup storage operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Move a finished snapshot into storage under `file_name`
    ///
    /// Fails with [`crate::database::DatabaseError::BackupExists`] rather than replacing an
    /// existing backup. Returns the final location.
    async fn store_backup(&self, staged_path: &Path, file_name: &str) -> Result<PathBuf>;

    /// List all backups, most recent first
    async fn list_backups(&self) -> Result<Vec<BackupRecord>>;

    /// Resolve a backup file name to its path
    ///
    /// Returns `None` when no such backup exists.
    async fn locate_backup(&self, file_name: &str) -> Result<Option<PathBuf>>;

    /// Delete a single backup
    async fn delete_backup(&self, file_name: &str) -> Result<()>;

    /// Delete all but the `keep_count` most recent backups
    async fn cleanup_old_backups(&self, keep_count: usize) -> Result<PruneReport>;
}

/// Create the storage provider for the current configuration
///
/// Does not touch the filesystem; the backup directory is created by the
/// first backup so that listing stays a pure read.
pub fn create_storage_provider(config: &BackupConfig) -> Arc<dyn StorageProvider> {
    Arc::new(local_storage::LocalStorageProvider::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(file_name: &str, captured_at: Option<DateTime<Utc>>) -> BackupRecord {
        BackupRecord {
            file_name: file_name.to_string(),
            path: PathBuf::from(file_name),
            size_bytes: 0,
            modified: Local.with_ymd_and_hms(2025, 7, 4, 9, 30, 0).unwrap(),
            captured_at,
        }
    }

    #[test]
    fn test_created_prefers_name_timestamp() {
        let captured = Utc.with_ymd_and_hms(2025, 6, 1, 14, 30, 5).unwrap();
        let copied_later = record("tag_diary_backup_20250601_143005.db", Some(captured));

        assert_eq!(copied_later.created(), captured.with_timezone(&Local));
        assert_ne!(copied_later.created(), copied_later.modified);
    }

    #[test]
    fn test_created_falls_back_to_mtime() {
        let hand_named = record("tag_diary_backup_manual.db", None);

        assert_eq!(hand_named.created(), hand_named.modified);
    }
}
