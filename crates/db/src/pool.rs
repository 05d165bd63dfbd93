use serde::Deserialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

/// Connection settings for the authoritative SQLite store.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub busy_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:collectd.db".to_string(),
            max_connections: 10,
            busy_timeout_secs: 30,
        }
    }
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    fn is_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}

pub async fn create_pool(config: &DatabaseConfig) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(config.busy_timeout_secs))
        .pragma("foreign_keys", "ON");

    // Every in-memory connection is its own database.
    let max_connections = if config.is_memory() {
        1
    } else {
        config.max_connections.max(1)
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(config.busy_timeout_secs))
        .idle_timeout(None)
        .connect_with(options)
        .await?;

    tracing::debug!(url = %config.url, max_connections, "SQLite pool created");
    Ok(pool)
}

/// Opens a transaction that holds the write lock from its first statement.
///
/// A deferred transaction that reads before writing fails with
/// `SQLITE_BUSY` when another connection commits in between, so
/// read-then-write sequences take the lock up front instead.
pub(crate) async fn begin_write(
    pool: &SqlitePool,
) -> Result<sqlx::Transaction<'static, sqlx::Sqlite>, sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE collection_runs SET id = id WHERE 0")
        .execute(&mut *tx)
        .await?;
    Ok(tx)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tempfile::TempDir;

    /// File-backed pool with migrations applied. Keep the `TempDir` alive.
    pub async fn setup_test_db() -> (SqlitePool, TempDir) {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite:{}", dir.path().join("test.db").display());
        let pool = create_pool(&DatabaseConfig::new(url)).await.unwrap();
        run_migrations(&pool).await.unwrap();
        (pool, dir)
    }
}
