//! SQLite connection pool management.

use std::path::Path;
use std::time::{Duration, Instant};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info, warn};

use lumen_core::{defaults, Error, Result};

/// Default connection timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default time a writer waits on a locked database.
pub const DEFAULT_BUSY_TIMEOUT_SECS: u64 = 5;

/// Pool configuration options.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Connection timeout duration.
    pub connect_timeout: Duration,
    /// How long a statement waits on `SQLITE_BUSY` before failing.
    pub busy_timeout: Duration,
    /// Open the file read-only (never created or written).
    pub read_only: bool,
    /// Create the file when it does not exist.
    pub create_if_missing: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: defaults::STORE_MAX_CONNECTIONS,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            busy_timeout: Duration::from_secs(DEFAULT_BUSY_TIMEOUT_SECS),
            read_only: false,
            create_if_missing: true,
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration for reading a catalog owned by another application.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            create_if_missing: false,
            ..Self::default()
        }
    }

    /// Set the maximum number of connections.
    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the busy timeout.
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }
}

/// Open a pool on the SQLite file at `path`.
///
/// Writable pools use WAL journaling so queries can run while a batch is
/// being written.
pub async fn create_pool(path: &Path, config: PoolConfig) -> Result<SqlitePool> {
    let start = Instant::now();

    info!(
        subsystem = "database",
        component = "pool",
        op = "create",
        path = %path.display(),
        max_connections = config.max_connections,
        read_only = config.read_only,
        "Creating database connection pool"
    );

    let mut options = SqliteConnectOptions::new()
        .filename(path)
        .read_only(config.read_only)
        .create_if_missing(config.create_if_missing)
        .busy_timeout(config.busy_timeout);
    if !config.read_only {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.connect_timeout)
        .connect_with(options)
        .await
        .map_err(classify_open_error)?;

    info!(
        subsystem = "database",
        component = "pool",
        op = "established",
        pool_size = pool.size(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Database connection pool established"
    );
    Ok(pool)
}

/// Log current pool health metrics.
pub fn log_pool_metrics(pool: &SqlitePool) {
    let size = pool.size();
    let idle = pool.num_idle();

    debug!(
        subsystem = "database",
        component = "pool",
        op = "metrics",
        pool_size = size,
        pool_idle = idle,
        "Pool health check"
    );

    if idle == 0 && size > 0 {
        warn!(
            subsystem = "database",
            component = "pool",
            pool_size = size,
            "Connection pool has no idle connections"
        );
    }
}

/// Map errors caused by an unreadable database file to [`Error::Corrupted`].
pub fn classify_open_error(e: sqlx::Error) -> Error {
    if let sqlx::Error::Database(db) = &e {
        let message = db.message();
        if message.contains("not a database") || message.contains("malformed") {
            return Error::Corrupted(message.to_string());
        }
    }
    Error::Database(e)
}
