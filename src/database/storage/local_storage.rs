//! Local filesystem implementation of the StorageProvider trait
//!
//! Backups are plain files directly inside the configured backup directory.
//! Only files matching the naming scheme are listed or pruned; anything else
//! in the directory is left alone.

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use tokio::fs as tokio_fs;
use tracing::{debug, info, warn};

use super::{BackupRecord, PruneFailure, PruneReport, StorageProvider};
use crate::config::BackupConfig;
use crate::database::backup_naming::BackupNamingService;
use crate::database::{DatabaseError, Result};

/// Provides local filesystem storage for database backups
pub struct LocalStorageProvider {
    /// Directory holding the backups
    backup_dir: PathBuf,
    naming: BackupNamingService,
}

impl LocalStorageProvider {
    pub fn new(config: &BackupConfig) -> Self {
        Self {
            backup_dir: config.backup_dir.clone(),
            naming: BackupNamingService::new(&config.backup_prefix),
        }
    }

    /// Path for a backup name, or `None` if the name is not a bare file name
    fn backup_path(&self, file_name: &str) -> Option<PathBuf> {
        let bare = Path::new(file_name).file_name().and_then(|n| n.to_str());
        if file_name.is_empty() || bare != Some(file_name) {
            return None;
        }
        Some(self.backup_dir.join(file_name))
    }

    async fn read_record(&self, path: PathBuf, file_name: String) -> Result<Option<BackupRecord>> {
        let metadata = match tokio_fs::metadata(&path).await {
            Ok(metadata) => metadata,
            // Removed between read_dir and stat
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(DatabaseError::Io(e)),
        };
        if !metadata.is_file() {
            return Ok(None);
        }

        let modified: DateTime<Local> = metadata.modified()?.into();
        let captured_at = self.naming.parse_timestamp(&file_name);

        Ok(Some(BackupRecord {
            file_name,
            path,
            size_bytes: metadata.len(),
            modified,
            captured_at,
        }))
    }
}

#[async_trait]
impl StorageProvider for LocalStorageProvider {
    async fn store_backup(&self, staged_path: &Path, file_name: &str) -> Result<PathBuf> {
        let dest_path = self
            .backup_path(file_name)
            .ok_or_else(|| DatabaseError::Config(format!("invalid backup name: {file_name}")))?;

        if !self.backup_dir.exists() {
            tokio_fs::create_dir_all(&self.backup_dir).await?;
        }

        // A hard link never replaces an existing name, unlike rename
        match tokio_fs::hard_link(staged_path, &dest_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(DatabaseError::BackupExists(file_name.to_string()));
            }
            Err(e) => return Err(DatabaseError::Io(e)),
        }
        if let Err(e) = tokio_fs::remove_file(staged_path).await {
            debug!("Could not remove staged copy {}: {}", staged_path.display(), e);
        }
        debug!("Stored backup at {}", dest_path.display());

        Ok(dest_path)
    }

    async fn list_backups(&self) -> Result<Vec<BackupRecord>> {
        if !self.backup_dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = tokio_fs::read_dir(&self.backup_dir).await?;
        let mut backups = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !self.naming.is_backup_file(&file_name) {
                continue;
            }
            if let Some(record) = self.read_record(entry.path(), file_name).await? {
                backups.push(record);
            }
        }

        // Newest first; equal mtimes fall back to the name, which sorts by capture time
        backups.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| b.file_name.cmp(&a.file_name))
        });

        Ok(backups)
    }

    async fn locate_backup(&self, file_name: &str) -> Result<Option<PathBuf>> {
        let Some(path) = self.backup_path(file_name) else {
            return Ok(None);
        };

        match tokio_fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => Ok(Some(path)),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DatabaseError::Io(e)),
        }
    }

    async fn delete_backup(&self, file_name: &str) -> Result<()> {
        let path = self
            .backup_path(file_name)
            .ok_or_else(|| DatabaseError::BackupNotFound(file_name.to_string()))?;

        tokio_fs::remove_file(&path).await?;
        Ok(())
    }

    async fn cleanup_old_backups(&self, keep_count: usize) -> Result<PruneReport> {
        let backups = self.list_backups().await?;
        let report = prune_backups(&backups, keep_count, move |file_name| async move {
            self.delete_backup(&file_name).await
        })
        .await;
        Ok(report)
    }
}

/// Delete every backup past the first `keep_count` of a newest-first listing.
///
/// A failed deletion is recorded and the pass moves on; `retained` counts the
/// backups still present afterwards, including the ones that failed.
pub(crate) async fn prune_backups<F, Fut>(
    backups: &[BackupRecord],
    keep_count: usize,
    mut delete: F,
) -> PruneReport
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut report = PruneReport::default();

    if backups.len() > keep_count {
        info!("Removing {} old backup(s)", backups.len() - keep_count);
    }

    for backup in backups.iter().skip(keep_count) {
        match delete(backup.file_name.clone()).await {
            Ok(()) => {
                info!("Removed old backup {}", backup.file_name);
                report.removed.push(backup.file_name.clone());
            }
            Err(e) => {
                warn!("Failed to remove old backup {}: {}", backup.file_name, e);
                report.failures.push(PruneFailure {
                    file_name: backup.file_name.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    report.retained = backups.len() - report.removed.len();
    report
}
