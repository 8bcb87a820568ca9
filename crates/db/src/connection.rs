use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

pub type DbPool = sqlx::SqlitePool;

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 5, 30).await
}

/// Opens a pool, creating the database file on first use.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let url = if database_url.trim() == ":memory:" { "sqlite::memory:" } else { database_url };
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .connect_with(options)
        .await
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::{connect, connect_with_settings};

    #[tokio::test]
    async fn creates_missing_database_file() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("rolecall.db");
        let url = format!("sqlite://{}", path.display());

        let pool = connect(&url).await.expect("connect");
        pool.close().await;

        assert!(path.exists());
    }

    #[tokio::test]
    async fn accepts_bare_memory_url() {
        let pool = connect_with_settings(":memory:", 1, 5).await.expect("connect");
        let one: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&pool).await.expect("query");
        assert_eq!(one, 1);
    }
}
