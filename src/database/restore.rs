//! Restore a stored backup over the live database file
//!
//! Restore assumes the web application is stopped. The current live file is
//! copied aside first, then the backup is written to a temporary file next to
//! the live path and renamed over it.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs as tokio_fs;
use tracing::{debug, info, warn};

use crate::database::backup::BackupManager;
use crate::database::backup_naming;
use crate::database::{DatabaseError, Result};

/// SQLite files that sit next to a database in WAL mode
const SIDECAR_SUFFIXES: [&str; 2] = ["-wal", "-shm"];

/// Result of a restore operation
#[derive(Debug, Clone)]
pub struct RestoreResult {
    /// Backup that was restored
    pub backup_path: PathBuf,
    /// Live database path that now holds the backup's contents
    pub live_path: PathBuf,
    /// Copy of the previous live file, if one existed
    pub safety_copy: Option<PathBuf>,
    /// Bytes written to the live path
    pub size_bytes: u64,
}

impl BackupManager {
    /// Restore the live database from the backup named `file_name`
    pub async fn restore_backup(&self, file_name: &str) -> Result<RestoreResult> {
        self.restore_backup_at(file_name, Utc::now()).await
    }

    /// Restore, naming the safety copy after `timestamp` (primarily for testing)
    pub async fn restore_backup_at(
        &self,
        file_name: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<RestoreResult> {
        let backup_path = self
            .storage()
            .locate_backup(file_name)
            .await?
            .ok_or_else(|| DatabaseError::BackupNotFound(file_name.to_string()))?;

        let live_path = self.config().database_path.clone();

        let safety_copy = if tokio_fs::try_exists(&live_path).await? {
            Some(create_safety_copy(&live_path, timestamp).await?)
        } else {
            None
        };

        info!("Restoring {} from {}", live_path.display(), file_name);
        let size_bytes = replace_file(&backup_path, &live_path).await?;
        remove_stale_sidecars(&live_path).await;

        info!("Database restored from {}", file_name);
        Ok(RestoreResult {
            backup_path,
            live_path,
            safety_copy,
            size_bytes,
        })
    }
}

/// Copy the live file aside, with its WAL if one is present
async fn create_safety_copy(live_path: &Path, timestamp: DateTime<Utc>) -> Result<PathBuf> {
    let safety_path = backup_naming::safety_copy_path(live_path, timestamp).ok_or_else(|| {
        DatabaseError::SafetyCopy(format!(
            "cannot derive a safety copy name from {}",
            live_path.display()
        ))
    })?;

    info!("Creating safety copy {}", safety_path.display());
    match copy_new(live_path, &safety_path).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(DatabaseError::SafetyCopy(format!(
                "{} already exists",
                safety_path.display()
            )));
        }
        Err(e) => {
            let _ = tokio_fs::remove_file(&safety_path).await;
            return Err(DatabaseError::SafetyCopy(e.to_string()));
        }
    }

    let live_wal = with_suffix(live_path, "-wal");
    if tokio_fs::try_exists(&live_wal).await? {
        let safety_wal = with_suffix(&safety_path, "-wal");
        if let Err(e) = copy_new(&live_wal, &safety_wal).await {
            if e.kind() != ErrorKind::AlreadyExists {
                let _ = tokio_fs::remove_file(&safety_wal).await;
            }
            let _ = tokio_fs::remove_file(&safety_path).await;
            return Err(DatabaseError::SafetyCopy(e.to_string()));
        }
    }

    Ok(safety_path)
}

/// Copy `source` to `dest`, failing with `AlreadyExists` instead of overwriting
async fn copy_new(source: &Path, dest: &Path) -> std::io::Result<u64> {
    let mut reader = tokio_fs::File::open(source).await?;
    let mut writer = tokio_fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dest)
        .await?;
    let copied = tokio::io::copy(&mut reader, &mut writer).await?;
    writer.sync_all().await?;
    Ok(copied)
}

/// Atomically replace `dest` with the contents of `source`
async fn replace_file(source: &Path, dest: &Path) -> Result<u64> {
    let parent = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tokio_fs::create_dir_all(&parent).await?;

    // Removed on drop unless persisted
    let temp = tempfile::Builder::new()
        .prefix(".restore-")
        .suffix(".db")
        .tempfile_in(&parent)?;

    let size_bytes = tokio_fs::copy(source, temp.path()).await?;
    temp.as_file().sync_all()?;

    temp.persist(dest).map_err(|e| DatabaseError::Io(e.error))?;
    debug!("Renamed restored copy over {}", dest.display());

    Ok(size_bytes)
}

/// Drop `-wal`/`-shm` files left from the replaced database
async fn remove_stale_sidecars(live_path: &Path) {
    for suffix in SIDECAR_SUFFIXES {
        let sidecar = with_suffix(live_path, suffix);
        match tokio_fs::remove_file(&sidecar).await {
            Ok(()) => debug!("Removed stale {}", sidecar.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove {}: {}", sidecar.display(), e),
        }
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackupConfig;
    use crate::database::backup::BackupOptions;
    use crate::database::storage::local_storage::LocalStorageProvider;
    use crate::db;
    use crate::db::test_support::{create_people_db, insert_people, read_people};
    use chrono::TimeZone;
    use sqlx::Connection;
    use std::sync::Arc;
    use tempfile::{TempDir, tempdir};

    fn setup(temp_dir: &TempDir) -> (BackupConfig, BackupManager) {
        let config = BackupConfig {
            database_path: temp_dir.path().join("tag_diary.db"),
            backup_dir: temp_dir.path().join("backups"),
            max_backups: 5,
            backup_prefix: String::from("tag_diary_backup"),
            verify: false,
        };
        let manager =
            BackupManager::new(config.clone(), Arc::new(LocalStorageProvider::new(&config)));
        (config, manager)
    }

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, hour, 0, 0).unwrap()
    }

    fn safety_copies(dir: &Path) -> Vec<PathBuf> {
        let mut found: Vec<PathBuf> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.contains("_before_restore_") && n.ends_with(".db"))
            })
            .collect();
        found.sort();
        found
    }

    async fn add_person(path: &Path, name: &str) {
        let mut conn = db::open_existing(path).await.unwrap();
        insert_people(&mut conn, &[name]).await;
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_restore_round_trip() {
        let temp_dir = tempdir().unwrap();
        let (config, manager) = setup(&temp_dir);
        create_people_db(&config.database_path, &["ada", "grace"]).await;

        let backup = manager
            .create_backup_at(ts(1), &BackupOptions::default())
            .await
            .unwrap();
        add_person(&config.database_path, "mallory").await;
        assert_eq!(read_people(&config.database_path).await.len(), 3);

        let result = manager.restore_backup_at(&backup.file_name, ts(2)).await.unwrap();

        assert_eq!(result.backup_path, backup.path);
        assert_eq!(
            std::fs::read(&config.database_path).unwrap(),
            std::fs::read(&backup.path).unwrap()
        );
        assert_eq!(result.size_bytes, backup.size_bytes);
        assert_eq!(read_people(&config.database_path).await, ["ada", "grace"]);
    }

    #[tokio::test]
    async fn test_safety_copy_precedes_overwrite() {
        let temp_dir = tempdir().unwrap();
        let (config, manager) = setup(&temp_dir);
        create_people_db(&config.database_path, &["ada"]).await;

        let backup = manager
            .create_backup_at(ts(1), &BackupOptions::default())
            .await
            .unwrap();
        add_person(&config.database_path, "grace").await;
        let live_before = std::fs::read(&config.database_path).unwrap();

        let result = manager.restore_backup_at(&backup.file_name, ts(2)).await.unwrap();

        let copies = safety_copies(temp_dir.path());
        assert_eq!(copies.len(), 1);
        assert_eq!(
            copies[0],
            temp_dir.path().join("tag_diary_before_restore_20250601_020000.db")
        );
        assert_eq!(result.safety_copy.as_ref(), Some(&copies[0]));
        assert_eq!(std::fs::read(&copies[0]).unwrap(), live_before);
        assert_eq!(read_people(&copies[0]).await, ["ada", "grace"]);

        // Safety copies live beside the database, outside retention
        assert_eq!(manager.list_backups().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_restore_without_live_file_skips_safety_copy() {
        let temp_dir = tempdir().unwrap();
        let (config, manager) = setup(&temp_dir);
        create_people_db(&config.database_path, &["ada"]).await;

        let backup = manager
            .create_backup_at(ts(1), &BackupOptions::default())
            .await
            .unwrap();
        std::fs::remove_file(&config.database_path).unwrap();

        let result = manager.restore_backup_at(&backup.file_name, ts(2)).await.unwrap();

        assert!(result.safety_copy.is_none());
        assert!(safety_copies(temp_dir.path()).is_empty());
        assert_eq!(read_people(&config.database_path).await, ["ada"]);
    }

    #[tokio::test]
    async fn test_not_found_restore_is_a_no_op() {
        let temp_dir = tempdir().unwrap();
        let (config, manager) = setup(&temp_dir);
        create_people_db(&config.database_path, &["ada"]).await;
        manager
            .create_backup_at(ts(1), &BackupOptions::default())
            .await
            .unwrap();

        let live_before = std::fs::read(&config.database_path).unwrap();
        let backups_before = manager.list_backups().await.unwrap();

        for name in ["tag_diary_backup_19990101_000000.db", "../tag_diary.db", ""] {
            let err = manager.restore_backup_at(name, ts(2)).await.unwrap_err();
            assert!(matches!(err, DatabaseError::BackupNotFound(_)), "{name}: {err}");
        }

        assert_eq!(std::fs::read(&config.database_path).unwrap(), live_before);
        assert_eq!(manager.list_backups().await.unwrap(), backups_before);
        assert!(safety_copies(temp_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_existing_safety_copy_aborts_restore() {
        let temp_dir = tempdir().unwrap();
        let (config, manager) = setup(&temp_dir);
        create_people_db(&config.database_path, &["ada"]).await;

        let backup = manager
            .create_backup_at(ts(1), &BackupOptions::default())
            .await
            .unwrap();
        add_person(&config.database_path, "grace").await;
        let live_before = std::fs::read(&config.database_path).unwrap();

        let clash = temp_dir.path().join("tag_diary_before_restore_20250601_020000.db");
        std::fs::write(&clash, b"earlier safety copy").unwrap();

        let err = manager
            .restore_backup_at(&backup.file_name, ts(2))
            .await
            .unwrap_err();

        assert!(matches!(err, DatabaseError::SafetyCopy(_)));
        assert_eq!(std::fs::read(&config.database_path).unwrap(), live_before);
        assert_eq!(std::fs::read(&clash).unwrap(), b"earlier safety copy");
    }

    #[tokio::test]
    async fn test_safety_copy_never_overwrites_wal_sidecar() {
        let temp_dir = tempdir().unwrap();
        let (config, manager) = setup(&temp_dir);
        create_people_db(&config.database_path, &["ada"]).await;

        let backup = manager
            .create_backup_at(ts(1), &BackupOptions::default())
            .await
            .unwrap();
        std::fs::write(with_suffix(&config.database_path, "-wal"), b"live frames").unwrap();
        let live_before = std::fs::read(&config.database_path).unwrap();

        let clash = temp_dir
            .path()
            .join("tag_diary_before_restore_20250601_020000.db-wal");
        std::fs::write(&clash, b"someone else's wal").unwrap();

        let err = manager
            .restore_backup_at(&backup.file_name, ts(2))
            .await
            .unwrap_err();

        assert!(matches!(err, DatabaseError::SafetyCopy(_)));
        assert_eq!(std::fs::read(&clash).unwrap(), b"someone else's wal");
        assert!(safety_copies(temp_dir.path()).is_empty());
        assert_eq!(std::fs::read(&config.database_path).unwrap(), live_before);
    }

    #[tokio::test]
    async fn test_restore_clears_stale_sidecars() {
        let temp_dir = tempdir().unwrap();
        let (config, manager) = setup(&temp_dir);
        create_people_db(&config.database_path, &["ada"]).await;

        let backup = manager
            .create_backup_at(ts(1), &BackupOptions::default())
            .await
            .unwrap();

        let live_wal = with_suffix(&config.database_path, "-wal");
        let live_shm = with_suffix(&config.database_path, "-shm");
        std::fs::write(&live_wal, b"old frames").unwrap();
        std::fs::write(&live_shm, b"old index").unwrap();

        let result = manager.restore_backup_at(&backup.file_name, ts(2)).await.unwrap();

        assert!(!live_wal.exists());
        assert!(!live_shm.exists());
        let safety = result.safety_copy.unwrap();
        assert_eq!(std::fs::read(with_suffix(&safety, "-wal")).unwrap(), b"old frames");
    }
}
