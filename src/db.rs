use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::ConnectOptions;

use crate::database::{DatabaseError, Result};

/// How long a statement waits on a lock held by the web application
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open a connection to an existing database file.
///
/// Never creates the file: a missing database is reported as
/// [`DatabaseError::SourceMissing`] so callers can tell it apart from SQL errors.
pub async fn open_existing(path: &Path) -> Result<SqliteConnection> {
    if !path.is_file() {
        return Err(DatabaseError::SourceMissing(path.to_path_buf()));
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(false)
        .busy_timeout(BUSY_TIMEOUT);

    Ok(options.connect().await?)
}

/// Open a database file read-only, used to check finished snapshots
pub async fn open_read_only(path: &Path) -> Result<SqliteConnection> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .read_only(true)
        .busy_timeout(BUSY_TIMEOUT);

    Ok(options.connect().await?)
}

#[cfg(test)]
pub mod test_support {
    //! Fixtures shared by the database tests

    use std::path::Path;

    use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
    use sqlx::{ConnectOptions, Connection};

    /// Create a small database with a `people` table holding `names`
    pub async fn create_people_db(path: &Path, names: &[&str]) {
        let mut conn = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .connect()
            .await
            .unwrap();

        sqlx::query("CREATE TABLE IF NOT EXISTS people (id INTEGER PRIMARY KEY, name TEXT)")
            .execute(&mut conn)
            .await
            .unwrap();
        insert_people(&mut conn, names).await;
        conn.close().await.unwrap();
    }

    pub async fn insert_people(conn: &mut SqliteConnection, names: &[&str]) {
        for name in names {
            sqlx::query("INSERT INTO people (name) VALUES (?)")
                .bind(*name)
                .execute(&mut *conn)
                .await
                .unwrap();
        }
    }

    /// Read back the `people` names in insertion order
    pub async fn read_people(path: &Path) -> Vec<String> {
        let mut conn = SqliteConnectOptions::new()
            .filename(path)
            .connect()
            .await
            .unwrap();
        let names = sqlx::query_scalar::<_, String>("SELECT name FROM people ORDER BY id")
            .fetch_all(&mut conn)
            .await
            .unwrap();
        conn.close().await.unwrap();
        names
    }
}
