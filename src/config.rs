use std::env;
use std::path::{Path, PathBuf};

use crate::database::{DatabaseError, Result};

/// Configuration for database backup and restore functionality
#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// Path of the live SQLite database used by the web application
    pub database_path: PathBuf,
    /// Directory holding timestamped backups
    pub backup_dir: PathBuf,
    /// Maximum number of backups to keep
    pub max_backups: usize,
    /// File name prefix shared by every backup
    pub backup_prefix: String,
    /// Whether to run an integrity check on each new backup
    pub verify: bool,
}

impl Default for BackupConfig {
    fn default() -> Self {
        let database_path = PathBuf::from("tag_diary.db");
        Self {
            backup_dir: sibling_dir(&database_path, "backups"),
            database_path,
            max_backups: 30,
            backup_prefix: String::from("tag_diary_backup"),
            verify: false,
        }
    }
}

impl BackupConfig {
    /// Load backup configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let database_path = lookup("FAMILY_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.database_path);

        let backup_dir = lookup("BACKUP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| sibling_dir(&database_path, "backups"));

        let max_backups = match lookup("BACKUP_MAX_COUNT") {
            Some(raw) => raw.trim().parse().map_err(|_| {
                DatabaseError::Config(format!("BACKUP_MAX_COUNT is not a number: {raw}"))
            })?,
            None => defaults.max_backups,
        };

        let backup_prefix = lookup("BACKUP_PREFIX").unwrap_or(defaults.backup_prefix);

        let verify = lookup("BACKUP_VERIFY")
            .map(|v| parse_flag(&v))
            .unwrap_or(defaults.verify);

        let config = Self {
            database_path,
            backup_dir,
            max_backups,
            backup_prefix,
            verify,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make retention or naming meaningless
    pub fn validate(&self) -> Result<()> {
        if self.max_backups == 0 {
            return Err(DatabaseError::Config(
                "BACKUP_MAX_COUNT must be at least 1".to_string(),
            ));
        }
        if self.backup_prefix.is_empty() || self.backup_prefix.contains(['/', '\\']) {
            return Err(DatabaseError::Config(format!(
                "invalid backup prefix: {:?}",
                self.backup_prefix
            )));
        }
        Ok(())
    }

    /// Ensure local backup directory exists
    pub fn ensure_backup_dir(&self) -> std::io::Result<()> {
        if !self.backup_dir.exists() {
            std::fs::create_dir_all(&self.backup_dir)?;
        }
        Ok(())
    }
}

/// SMTP settings for the password reset notification
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    /// Sender address, also used as the SMTP login
    pub from_email: String,
    pub from_name: String,
    /// Login page linked from the message
    pub login_url: String,
    /// Name of the environment variable that holds the SMTP secret
    pub password_var: String,
}

impl MailConfig {
    pub fn from_env() -> std::result::Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> std::result::Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let from_email = lookup("MAIL_FROM")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| "MAIL_FROM must be set to the sender address".to_string())?;

        let smtp_port = match lookup("SMTP_PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| format!("SMTP_PORT is not a valid port: {raw}"))?,
            None => 587,
        };

        Ok(Self {
            smtp_host: lookup("SMTP_HOST").unwrap_or_else(|| String::from("smtp.gmail.com")),
            smtp_port,
            from_email,
            from_name: lookup("MAIL_FROM_NAME")
                .unwrap_or_else(|| String::from("Family Tree Admin")),
            login_url: lookup("MAIL_LOGIN_URL")
                .unwrap_or_else(|| String::from("http://localhost:3000/login")),
            password_var: lookup("SMTP_PASSWORD_VAR")
                .unwrap_or_else(|| String::from("GMAIL_APP_PASSWORD")),
        })
    }
}

/// Where uploaded photo files live on disk
#[derive(Debug, Clone)]
pub struct PhotoConfig {
    /// Base directory that photo `file_path` values are relative to
    pub media_root: PathBuf,
}

impl PhotoConfig {
    pub fn from_env(backup: &BackupConfig) -> Self {
        Self::from_lookup(backup, |key| env::var(key).ok())
    }

    pub fn from_lookup<F>(backup: &BackupConfig, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let media_root = lookup("PHOTO_MEDIA_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| parent_dir(&backup.database_path).to_path_buf());
        Self { media_root }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn sibling_dir(path: &Path, name: &str) -> PathBuf {
    parent_dir(path).join(name)
}
