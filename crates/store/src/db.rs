//! SQLite connection and pool management.

use sqlx::SqliteConnection;
use sqlx::pool::PoolConnectionMetadata;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use exn::ResultExt;
use std::path::Path;

use crate::error::{ErrorKind, Result};
use crate::mode::MatchingMode;

// The engine is a single logical thread, but a couple of spare connections
// keep test fixtures from fighting over one handle.
const MAX_CONNECTIONS: u32 = 3;

/// SQLite database handle for the index.
///
/// Owns the connection pool and guarantees that every pooled connection has
/// the `case_sensitive_like` pragma matching the [`MatchingMode`]: ON exactly
/// when both the filesystem and the database are case-sensitive, OFF
/// otherwise. LIKE-based range queries rely on this.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    mode: MatchingMode,
}

impl Database {
    async fn new(options: SqliteConnectOptions, mode: MatchingMode, max: Option<u32>) -> Result<Self> {
        let case_sensitive_like = mode.sqlite_case_sensitive_like();
        let pool = SqlitePoolOptions::new()
            // This is IMPORTANT to apply the query-based PRAGMAs to EVERY
            // connection (set by max connections) instead of only the
            // first connection returned by the pool.
            .after_connect(move |conn, meta| Box::pin(async move {
                Self::apply_pragmas(conn, meta, case_sensitive_like).await
            }))
            .max_connections(max.unwrap_or(MAX_CONNECTIONS))
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(Self { pool, mode })
    }

    /// Connect to the index database at the given path.
    ///
    /// Creates the database file if it doesn't exist. The schema itself is
    /// managed by the store (see `SqliteStore::ensure_schema`) because the
    /// table and column names are configuration.
    pub async fn connect(path: impl AsRef<Path>, mode: MatchingMode) -> Result<Self> {
        let path = path.as_ref();
        let options = Self::base_options().filename(path).create_if_missing(true);
        Self::new(options, mode, None).await
    }

    /// Connect to an in-memory database (useful for testing).
    ///
    /// Note:
    /// - In-memory databases are destroyed when the connection closes.
    /// - Do NOT apply `#[cfg(test)]` so that other crates can also use this
    ///   in their tests.
    pub async fn connect_in_memory(mode: MatchingMode) -> Result<Self> {
        let options = Self::base_options().filename(":memory:");
        // In-memory database must either use the same cache `.shared_cache(true)`,
        // or be limited to one connection. Otherwise parallel connections will
        // see different databases that contain different data.
        Self::new(options, mode, Some(1)).await
    }

    /// Base connection options shared between file and in-memory databases.
    fn base_options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            // WAL mode for better concurrent read performance
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            // PRAGMA synchronous = NORMAL (balance between safety and speed)
            .synchronous(SqliteSynchronous::Normal)
            // A reindex of a large tree issues thousands of small
            // auto-committed statements; don't bail on the first busy signal.
            .busy_timeout(std::time::Duration::from_millis(1500))
    }

    /// Apply PRAGMA settings that aren't exposed via SqliteConnectOptions.
    async fn apply_pragmas(
        conn: &mut SqliteConnection,
        _meta: PoolConnectionMetadata,
        case_sensitive_like: bool,
    ) -> sqlx::Result<()> {
        let toggle = if case_sensitive_like { "ON" } else { "OFF" };
        sqlx::query(&format!(
            r#"
                PRAGMA case_sensitive_like = {toggle};
                PRAGMA temp_store = MEMORY;
            "#,
        ))
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Get a reference to the underlying connection pool.
    ///
    /// This is useful for running custom queries in tests.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The matching mode this database was connected for.
    pub fn mode(&self) -> MatchingMode {
        self.mode
    }

    /// Close the database connection pool.
    ///
    /// This waits for all connections to be returned to the pool and then
    /// closes them. After calling this, the Database instance should not
    /// be used.
    pub async fn close(&self) {
        // Let SQLite update query planner statistics
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }
}
