//! SQLite database backup implementation
//!
//! Snapshots are taken with `VACUUM INTO` on a connection to the live file.
//! SQLite runs it inside a read transaction, so the copy reflects committed
//! state even while the web application keeps writing, including WAL frames
//! that were not checkpointed yet.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use sqlx::Connection;
use tracing::{debug, info, warn};

use crate::config::BackupConfig;
use crate::database::backup_naming::BackupNamingService;
use crate::database::storage::{BackupRecord, PruneReport, StorageProvider};
use crate::database::{DatabaseError, Result};
use crate::db;

/// Prefix of the per-run staging directory inside the backup directory
const STAGING_PREFIX: &str = ".staging-";

/// Staging directories older than this are leftovers of interrupted runs
const STALE_STAGING_AGE: Duration = Duration::from_secs(60 * 60);

/// Options for configuring backup behavior
#[derive(Debug, Clone, Default)]
pub struct BackupOptions {
    /// Whether to verify the backup after creation
    pub verify: bool,
}

impl BackupOptions {
    pub fn from_config(config: &BackupConfig) -> Self {
        Self {
            verify: config.verify,
        }
    }
}

/// Result of a successful backup operation
#[derive(Debug, Clone)]
pub struct BackupResult {
    /// File name of the new backup
    pub file_name: String,
    /// Where the backup was stored
    pub path: PathBuf,
    /// Duration of the backup operation
    pub duration: Duration,
    /// Size of the backup in bytes
    pub size_bytes: u64,
    /// Retention pass that ran after the backup was stored
    pub pruned: PruneReport,
}

/// Manager for SQLite database backup operations
pub struct BackupManager {
    config: BackupConfig,
    naming: BackupNamingService,
    /// Storage provider for backups
    storage: Arc<dyn StorageProvider>,
}

impl BackupManager {
    pub fn new(config: BackupConfig, storage: Arc<dyn StorageProvider>) -> Self {
        let naming = BackupNamingService::new(&config.backup_prefix);
        Self {
            config,
            naming,
            storage,
        }
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    pub(crate) fn storage(&self) -> &dyn StorageProvider {
        self.storage.as_ref()
    }

    /// Create a backup of the live database, then prune old backups
    pub async fn create_backup(&self, options: &BackupOptions) -> Result<BackupResult> {
        self.create_backup_at(Utc::now(), options).await
    }

    /// Create a backup named after `timestamp` (primarily for testing)
    pub async fn create_backup_at(
        &self,
        timestamp: DateTime<Utc>,
        options: &BackupOptions,
    ) -> Result<BackupResult> {
        let start_time = Instant::now();
        let live_path = &self.config.database_path;

        if !live_path.is_file() {
            warn!("Database not found at {}", live_path.display());
            return Err(DatabaseError::SourceMissing(live_path.clone()));
        }

        self.config.ensure_backup_dir()?;
        sweep_stale_staging(&self.config.backup_dir, STALE_STAGING_AGE).await;

        let file_name = self.naming.backup_file_name_with_time(timestamp);
        info!("Creating backup {}", file_name);

        // Staged inside the backup directory so the final move is a same-filesystem
        // rename. Dropping the TempDir removes whatever a failed attempt left behind.
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&self.config.backup_dir)?;
        let staged_path = staging.path().join(&file_name);

        self.snapshot(live_path, &staged_path).await?;

        if options.verify {
            verify_backup(&staged_path).await?;
        }

        let size_bytes = tokio::fs::metadata(&staged_path).await?.len();
        let path = self.storage.store_backup(&staged_path, &file_name).await?;
        drop(staging);

        info!(
            "Backup created at {} ({} bytes)",
            path.display(),
            size_bytes
        );

        // The backup is stored; pruning problems are reported, never fatal
        let pruned = self.cleanup_old_backups().await;

        Ok(BackupResult {
            file_name,
            path,
            duration: start_time.elapsed(),
            size_bytes,
            pruned,
        })
    }

    /// Copy committed state of `live_path` into a new database at `dest_path`
    async fn snapshot(&self, live_path: &Path, dest_path: &Path) -> Result<()> {
        let dest = dest_path
            .to_str()
            .ok_or_else(|| DatabaseError::Sqlite("Invalid backup path".to_string()))?;

        let mut conn = db::open_existing(live_path).await?;

        let outcome = sqlx::query("VACUUM INTO ?")
            .bind(dest)
            .execute(&mut conn)
            .await
            .map_err(|e| DatabaseError::Sqlite(format!("Failed to execute VACUUM INTO: {}", e)));

        if let Err(e) = conn.close().await {
            debug!("Closing source connection failed: {}", e);
        }

        outcome.map(|_| ())
    }

    /// List all available backups, most recent first
    pub async fn list_backups(&self) -> Result<Vec<BackupRecord>> {
        self.storage.list_backups().await
    }

    /// Clean up old backups, keeping only the configured number
    pub async fn cleanup_old_backups(&self) -> PruneReport {
        let report = match self
            .storage
            .cleanup_old_backups(self.config.max_backups)
            .await
        {
            Ok(report) => report,
            Err(e) => {
                warn!("Could not list backups for pruning: {}", e);
                return PruneReport::listing_failed(e.to_string());
            }
        };

        if !report.failures.is_empty() {
            warn!(
                "{} old backup(s) could not be removed; {} remain",
                report.failures.len(),
                report.retained
            );
        }
        report
    }
}

/// Remove staging directories older than `min_age` left by interrupted runs.
///
/// Younger ones may belong to a backup still in progress and are kept.
async fn sweep_stale_staging(backup_dir: &Path, min_age: Duration) {
    let mut entries = match tokio::fs::read_dir(backup_dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Could not scan {} for staging leftovers: {}", backup_dir.display(), e);
            return;
        }
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let is_staging = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(STAGING_PREFIX));
        if !is_staging {
            continue;
        }

        let stale = match entry.metadata().await {
            Ok(metadata) if metadata.is_dir() => metadata
                .modified()
                .ok()
                .and_then(|modified| modified.elapsed().ok())
                .is_some_and(|age| age >= min_age),
            _ => false,
        };
        if !stale {
            continue;
        }

        let path = entry.path();
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => info!("Removed leftover staging directory {}", path.display()),
            Err(e) => warn!("Could not remove {}: {}", path.display(), e),
        }
    }
}

/// Verify a backup is a readable, structurally sound database
async fn verify_backup(backup_path: &Path) -> Result<()> {
    let mut conn = db::open_read_only(backup_path).await?;

    let status: String = sqlx::query_scalar("PRAGMA quick_check")
        .fetch_one(&mut conn)
        .await
        .map_err(|e| DatabaseError::Verification(e.to_string()))?;
    conn.close().await?;

    if status != "ok" {
        return Err(DatabaseError::Verification(status));
    }
    Ok(())
}
