use std::process::ExitCode;

use clap::Parser;
use dotenv::dotenv;
use sqlx::Connection;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod database;
mod db;
mod mailer;
mod migrations;
mod photos;

use cli::{Cli, Commands};
use config::{BackupConfig, MailConfig, PhotoConfig};
use database::storage::{PruneReport, create_storage_provider};
use database::{BackupManager, BackupOptions, DatabaseError};
use migrations::Migration;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn kilobytes(bytes: u64) -> String {
    format!("{:.2} KB", bytes as f64 / 1024.0)
}

fn print_prune_report(report: &PruneReport) {
    if !report.removed.is_empty() {
        println!("Removed {} old backup(s):", report.removed.len());
        for name in &report.removed {
            println!("  {name}");
        }
    }
    for failure in &report.failures {
        println!("Failed to remove {}: {}", failure.file_name, failure.reason);
    }
    match &report.listing_error {
        Some(reason) => println!("Old backups were not pruned: {reason}"),
        None => println!("Total backups: {}", report.retained),
    }
}

async fn run_backup(manager: &BackupManager) -> bool {
    let options = BackupOptions::from_config(manager.config());
    match manager.create_backup(&options).await {
        Ok(result) => {
            println!("Backup created: {}", result.file_name);
            println!("  Location: {}", result.path.display());
            println!("  Size: {}", kilobytes(result.size_bytes));
            println!("  Took: {:.2?}", result.duration);
            print_prune_report(&result.pruned);
            true
        }
        Err(DatabaseError::SourceMissing(path)) => {
            println!("Database not found at {}", path.display());
            false
        }
        Err(e) => {
            println!("Backup failed: {e}");
            false
        }
    }
}

async fn run_list(manager: &BackupManager) -> bool {
    let backups = match manager.list_backups().await {
        Ok(backups) => backups,
        Err(e) => {
            println!("Could not list backups: {e}");
            return false;
        }
    };

    if backups.is_empty() {
        println!("No backups found.");
        return true;
    }

    println!("Available backups ({}):\n", backups.len());
    for (i, backup) in backups.iter().enumerate() {
        println!("{:2}. {}", i + 1, backup.file_name);
        println!(
            "    Size: {} | Created: {}",
            kilobytes(backup.size_bytes),
            backup.created().format("%Y-%m-%d %H:%M:%S")
        );
    }
    true
}

async fn run_restore(manager: &BackupManager, filename: &str) -> bool {
    match manager.restore_backup(filename).await {
        Ok(result) => {
            if let Some(safety) = &result.safety_copy {
                println!("Safety copy of previous database: {}", safety.display());
            }
            println!(
                "Restored {} ({}) over {}",
                result.backup_path.display(),
                kilobytes(result.size_bytes),
                result.live_path.display()
            );
            true
        }
        Err(DatabaseError::BackupNotFound(name)) => {
            println!("Backup file not found: {name}");
            false
        }
        Err(e) => {
            println!("Restore failed: {e}");
            false
        }
    }
}

/// Safety-net backup before a destructive operation
async fn backup_first(manager: &BackupManager, skip: bool) -> bool {
    if skip {
        println!("Skipping backup (--no-backup)");
        return true;
    }
    if run_backup(manager).await {
        println!();
        true
    } else {
        println!("Aborting: no backup could be taken");
        false
    }
}

async fn run_migrate(manager: &BackupManager, migration: Migration, no_backup: bool) -> bool {
    if !backup_first(manager, no_backup).await {
        return false;
    }

    let mut conn = match db::open_existing(&manager.config().database_path).await {
        Ok(conn) => conn,
        Err(e) => {
            println!("{e}");
            return false;
        }
    };

    let outcome = migrations::run_migration(&mut conn, migration).await;
    let _ = conn.close().await;

    match outcome {
        Ok(steps) => {
            for step in &steps {
                println!("{step}");
            }
            println!("Migration completed successfully");
            true
        }
        Err(e) => {
            println!("Migration failed: {e}");
            false
        }
    }
}

async fn run_send_email(to: String, username: String, password: Option<String>) -> bool {
    let config = match MailConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            println!("{e}");
            return false;
        }
    };

    let new_password = password.unwrap_or_else(|| {
        let generated = mailer::generate_password(mailer::GENERATED_PASSWORD_LEN);
        println!("Generated password: {generated}");
        generated
    });

    let email = mailer::PasswordResetEmail {
        to,
        username,
        new_password,
    };

    match mailer::send_password_email(&config, &email).await {
        Ok(()) => {
            println!("Successfully sent password to {}", email.to);
            true
        }
        Err(e) => {
            println!("Failed to send email: {e}");
            false
        }
    }
}

async fn run_delete_photos(manager: &BackupManager, yes: bool, no_backup: bool) -> bool {
    let photo_config = PhotoConfig::from_env(manager.config());

    if yes && !backup_first(manager, no_backup).await {
        return false;
    }

    let mut conn = match db::open_existing(&manager.config().database_path).await {
        Ok(conn) => conn,
        Err(e) => {
            println!("{e}");
            return false;
        }
    };

    if !yes {
        let ok = match photos::count_photos(&mut conn).await {
            Ok(count) => {
                println!("{count} photo(s) would be deleted. Re-run with --yes to delete them.");
                true
            }
            Err(e) => {
                println!("Could not count photos: {e}");
                false
            }
        };
        let _ = conn.close().await;
        return ok;
    }

    let outcome = photos::delete_all_photos(&mut conn, &photo_config.media_root).await;
    let _ = conn.close().await;

    match outcome {
        Ok(report) => {
            for failure in &report.failures {
                println!(
                    "Photo {} ({}): {:?} error: {}",
                    failure.photo_id, failure.filename, failure.stage, failure.reason
                );
            }
            println!("{}", "=".repeat(50));
            println!("Deleted {} of {} photos from database", report.rows_deleted, report.found);
            println!(
                "Deleted {} physical files ({} already missing)",
                report.files_deleted, report.files_missing
            );
            println!("{}", "=".repeat(50));
            report.is_clean()
        }
        Err(e) => {
            println!("Photo deletion failed: {e}");
            false
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Load .env file
    dotenv().ok();
    init_tracing();

    // Unknown arguments print usage and exit without doing anything
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => e.exit(),
    };

    let config = match BackupConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            println!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let manager = BackupManager::new(config.clone(), create_storage_provider(&config));

    let ok = match cli.command.unwrap_or(Commands::Backup) {
        Commands::Backup => run_backup(&manager).await,
        Commands::List => run_list(&manager).await,
        Commands::Restore { filename } => run_restore(&manager, &filename).await,
        Commands::Migrate {
            migration,
            no_backup,
        } => run_migrate(&manager, migration, no_backup).await,
        Commands::SendPasswordEmail {
            to,
            username,
            password,
        } => run_send_email(to, username, password).await,
        Commands::DeletePhotos { yes, no_backup } => {
            run_delete_photos(&manager, yes, no_backup).await
        }
    };

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
