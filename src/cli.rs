/// CLI argument parsing

use clap::{Parser, Subcommand};

use crate::migrations::Migration;

#[derive(Parser)]
#[command(name = "family-db-tools")]
#[command(version, about = "Backup, restore and maintenance for the family photo database", long_about = None)]
pub struct Cli {
    /// Defaults to `backup` when omitted
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a backup of the live database and prune old ones
    Backup,

    /// List available backups, newest first
    List,

    /// Restore the live database from a backup
    Restore {
        /// Backup file name as shown by `list`
        filename: String,
    },

    /// Apply a schema migration to the live database
    Migrate {
        #[arg(value_enum)]
        migration: Migration,

        /// Skip the backup normally taken first
        #[arg(long)]
        no_backup: bool,
    },

    /// Email a user their new login credentials
    SendPasswordEmail {
        /// Recipient address
        #[arg(long)]
        to: String,

        /// Username shown in the message
        #[arg(long)]
        username: String,

        /// Password to send; a random one is generated when omitted
        #[arg(long)]
        password: Option<String>,
    },

    /// Delete every photo, its album/vignette/people links and its file
    DeletePhotos {
        /// Actually delete; without it only the photo count is shown
        #[arg(long)]
        yes: bool,

        /// Skip the backup normally taken first
        #[arg(long)]
        no_backup: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_arguments_means_backup() {
        let cli = Cli::try_parse_from(["family-db-tools"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_restore_requires_filename() {
        assert!(Cli::try_parse_from(["family-db-tools", "restore"]).is_err());

        let cli = Cli::try_parse_from([
            "family-db-tools",
            "restore",
            "tag_diary_backup_20250601_143005.db",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Restore { ref filename }) if filename == "tag_diary_backup_20250601_143005.db"
        ));
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        assert!(Cli::try_parse_from(["family-db-tools", "frobnicate"]).is_err());
    }

    #[test]
    fn test_migrate_names() {
        let cli = Cli::try_parse_from(["family-db-tools", "migrate", "album-background"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Migrate {
                migration: Migration::AlbumBackground,
                no_backup: false
            })
        ));
    }
}
