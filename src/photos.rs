//! Bulk removal of every photo, its relationship rows and its stored file

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use sqlx::Connection;
use sqlx::sqlite::SqliteConnection;
use tracing::{info, warn};

use crate::database::Result;

/// Tables that reference `photos.id` through a `photo_id` column
const JUNCTION_TABLES: [&str; 3] = ["album_photos", "vignette_photos", "photo_people"];

#[derive(Debug, Clone, sqlx::FromRow)]
struct PhotoRow {
    id: i64,
    filename: String,
    file_path: String,
}

/// Where in the removal of one photo something went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Database,
    File,
}

#[derive(Debug, Clone)]
pub struct PhotoFailure {
    pub photo_id: i64,
    pub filename: String,
    pub stage: FailureStage,
    pub reason: String,
}

/// Aggregate outcome of a bulk deletion
#[derive(Debug, Clone, Default)]
pub struct PhotoDeletionReport {
    pub found: usize,
    pub rows_deleted: usize,
    pub files_deleted: usize,
    pub files_missing: usize,
    pub failures: Vec<PhotoFailure>,
}

impl PhotoDeletionReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Number of photos currently in the database
pub async fn count_photos(conn: &mut SqliteConnection) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM photos")
        .fetch_one(&mut *conn)
        .await?)
}

/// Delete every photo row, its relationship rows and its file under `media_root`.
///
/// Each photo is removed in its own transaction; a failure rolls back that
/// photo only, keeps its file and moves on to the next one.
pub async fn delete_all_photos(
    conn: &mut SqliteConnection,
    media_root: &Path,
) -> Result<PhotoDeletionReport> {
    let photos: Vec<PhotoRow> = sqlx::query_as("SELECT id, filename, file_path FROM photos")
        .fetch_all(&mut *conn)
        .await?;

    let mut report = PhotoDeletionReport {
        found: photos.len(),
        ..PhotoDeletionReport::default()
    };
    info!("Found {} photos to delete", photos.len());

    for photo in photos {
        if let Err(e) = delete_photo_rows(conn, photo.id).await {
            warn!("Failed to delete photo {} from database: {}", photo.id, e);
            report.failures.push(PhotoFailure {
                photo_id: photo.id,
                filename: photo.filename,
                stage: FailureStage::Database,
                reason: e.to_string(),
            });
            continue;
        }
        report.rows_deleted += 1;

        match remove_photo_file(media_root, &photo.file_path).await {
            Ok(true) => report.files_deleted += 1,
            Ok(false) => {
                warn!("File not found for photo {}: {}", photo.id, photo.file_path);
                report.files_missing += 1;
            }
            Err(reason) => {
                warn!("Failed to delete file for photo {}: {}", photo.id, reason);
                report.failures.push(PhotoFailure {
                    photo_id: photo.id,
                    filename: photo.filename,
                    stage: FailureStage::File,
                    reason,
                });
            }
        }
    }

    Ok(report)
}

async fn delete_photo_rows(conn: &mut SqliteConnection, photo_id: i64) -> Result<()> {
    let mut tx = conn.begin().await?;

    for table in JUNCTION_TABLES {
        sqlx::query(&format!("DELETE FROM {table} WHERE photo_id = ?"))
            .bind(photo_id)
            .execute(&mut *tx)
            .await?;
    }
    sqlx::query("DELETE FROM photos WHERE id = ?")
        .bind(photo_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Remove the stored file; `Ok(false)` when it was already gone
async fn remove_photo_file(media_root: &Path, file_path: &str) -> std::result::Result<bool, String> {
    let full_path = resolve_media_path(media_root, file_path)
        .ok_or_else(|| format!("refusing path outside the media root: {file_path}"))?;

    match tokio::fs::remove_file(&full_path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.to_string()),
    }
}

/// Join a stored relative path onto the media root, rejecting escapes
fn resolve_media_path(media_root: &Path, file_path: &str) -> Option<PathBuf> {
    let relative = Path::new(file_path);
    let mut has_name = false;
    for component in relative.components() {
        match component {
            Component::Normal(_) => has_name = true,
            Component::CurDir => {}
            _ => return None,
        }
    }
    has_name.then(|| media_root.join(relative))
}
