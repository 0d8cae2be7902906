//! One-shot schema migrations for the family photo database
//!
//! SQLite has no `ADD COLUMN IF NOT EXISTS`, so each step reads the table's
//! columns first and only alters when the column is absent. Re-running a
//! migration reports every step as skipped.

use std::fmt;

use sqlx::Connection;
use sqlx::sqlite::SqliteConnection;
use tracing::info;

use crate::database::Result;

/// Named migrations that can be run from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Migration {
    /// Add `sort_order` to photos and albums, ranked by creation time
    SortOrder,
    /// Add `background_image` to albums
    AlbumBackground,
    /// Every migration, in order
    All,
}

impl Migration {
    fn steps(self) -> &'static [ColumnMigration] {
        match self {
            Migration::SortOrder => &SORT_ORDER,
            Migration::AlbumBackground => &ALBUM_BACKGROUND,
            Migration::All => &ALL,
        }
    }
}

/// Adding one column to one table
#[derive(Debug)]
struct ColumnMigration {
    table: &'static str,
    column: &'static str,
    definition: &'static str,
    /// Statement run once, right after the column is added
    backfill: Option<&'static str>,
}

const PHOTOS_SORT_ORDER: ColumnMigration = ColumnMigration {
    table: "photos",
    column: "sort_order",
    definition: "sort_order INTEGER DEFAULT 0",
    backfill: Some(
        "UPDATE photos SET sort_order = (\
            SELECT COUNT(*) FROM photos p2 WHERE p2.created_at <= photos.created_at)",
    ),
};

const ALBUMS_SORT_ORDER: ColumnMigration = ColumnMigration {
    table: "albums",
    column: "sort_order",
    definition: "sort_order INTEGER DEFAULT 0",
    backfill: Some(
        "UPDATE albums SET sort_order = (\
            SELECT COUNT(*) FROM albums a2 WHERE a2.created_at <= albums.created_at)",
    ),
};

const ALBUMS_BACKGROUND_IMAGE: ColumnMigration = ColumnMigration {
    table: "albums",
    column: "background_image",
    definition: "background_image TEXT",
    backfill: None,
};

static SORT_ORDER: [ColumnMigration; 2] = [PHOTOS_SORT_ORDER, ALBUMS_SORT_ORDER];
static ALBUM_BACKGROUND: [ColumnMigration; 1] = [ALBUMS_BACKGROUND_IMAGE];
static ALL: [ColumnMigration; 3] = [PHOTOS_SORT_ORDER, ALBUMS_SORT_ORDER, ALBUMS_BACKGROUND_IMAGE];

/// What happened to a single column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    Applied,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStep {
    pub table: &'static str,
    pub column: &'static str,
    pub outcome: MigrationOutcome,
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.outcome {
            MigrationOutcome::Applied => {
                write!(f, "added {} column to {} table", self.column, self.table)
            }
            MigrationOutcome::Skipped => {
                write!(f, "{} column already exists in {} table", self.column, self.table)
            }
        }
    }
}

/// Run a migration inside a single transaction
pub async fn run_migration(
    conn: &mut SqliteConnection,
    migration: Migration,
) -> Result<Vec<MigrationStep>> {
    let mut tx = conn.begin().await?;
    let mut steps = Vec::new();

    for step in migration.steps() {
        let outcome = if column_exists(&mut tx, step.table, step.column).await? {
            MigrationOutcome::Skipped
        } else {
            info!("Adding {} column to {} table", step.column, step.table);
            sqlx::query(&format!("ALTER TABLE {} ADD COLUMN {}", step.table, step.definition))
                .execute(&mut *tx)
                .await?;
            if let Some(backfill) = step.backfill {
                sqlx::query(backfill).execute(&mut *tx).await?;
            }
            MigrationOutcome::Applied
        };

        steps.push(MigrationStep {
            table: step.table,
            column: step.column,
            outcome,
        });
    }

    tx.commit().await?;
    Ok(steps)
}

/// Whether `table` currently has a column named `column`
pub async fn column_exists(conn: &mut SqliteConnection, table: &str, column: &str) -> Result<bool> {
    let columns: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info(?)")
        .bind(table)
        .fetch_all(&mut *conn)
        .await?;

    Ok(columns.iter().any(|name| name == column))
}
