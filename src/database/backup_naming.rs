//! Backup naming module for generating and parsing timestamp-based backup names
//!
//! Backups are named `<prefix>_<YYYYMMDD_HHMMSS>.db`. The fixed-width UTC
//! timestamp makes lexicographic order match capture order, and safety copies
//! taken before a restore use `<live-stem>_before_restore_<YYYYMMDD_HHMMSS>.db`.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::{Path, PathBuf};

/// strftime pattern shared by backups and safety copies
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Extension used for every snapshot file
pub const BACKUP_EXTENSION: &str = ".db";

const SAFETY_COPY_MARKER: &str = "_before_restore_";

/// Service for generating backup file names
#[derive(Debug, Clone)]
pub struct BackupNamingService {
    /// File name prefix (e.g., "tag_diary_backup")
    prefix: String,
}

impl BackupNamingService {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    /// Generate a backup file name using the specified timestamp
    pub fn backup_file_name_with_time(&self, timestamp: DateTime<Utc>) -> String {
        format!(
            "{}_{}{}",
            self.prefix,
            timestamp.format(TIMESTAMP_FORMAT),
            BACKUP_EXTENSION
        )
    }

    /// Whether a file name belongs to this backup set (`<prefix>_*.db`)
    pub fn is_backup_file(&self, file_name: &str) -> bool {
        self.stamp_of(file_name).is_some()
    }

    /// Capture time encoded in a backup name, second precision
    ///
    /// `None` for names outside this backup set and for hand-named backups.
    pub fn parse_timestamp(&self, file_name: &str) -> Option<DateTime<Utc>> {
        parse_stamp(self.stamp_of(file_name)?)
    }

    fn stamp_of<'a>(&self, file_name: &'a str) -> Option<&'a str> {
        file_name
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix('_')?
            .strip_suffix(BACKUP_EXTENSION)
    }
}

/// Name of the copy taken of `live_path` right before a restore
pub fn safety_copy_name(live_path: &Path, timestamp: DateTime<Utc>) -> Option<String> {
    let stem = live_path.file_stem()?.to_str()?;
    Some(format!(
        "{}{}{}{}",
        stem,
        SAFETY_COPY_MARKER,
        timestamp.format(TIMESTAMP_FORMAT),
        BACKUP_EXTENSION
    ))
}

/// Full path of the safety copy, placed next to the live file
pub fn safety_copy_path(live_path: &Path, timestamp: DateTime<Utc>) -> Option<PathBuf> {
    let name = safety_copy_name(live_path, timestamp)?;
    Some(live_path.with_file_name(name))
}

fn parse_stamp(stamp: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
