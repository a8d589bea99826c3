use crate::error::{LibraryError, LibraryResult};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How long an operation may run before it is abandoned.
///
/// Point lookups get a short budget, full-library scans a long one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Budget {
    Lookup,
    Query,
    Scan,
}

/// Settings for opening a [`Database`](crate::storage::Database).
#[derive(Debug, Clone)]
pub struct LibraryConfig {
    /// Location of the SQLite file. `-wal` and `-shm` files live next to it.
    pub db_path: PathBuf,

    /// Maximum pooled connections. Must leave room for readers while a
    /// batch holds one connection for its transaction.
    pub max_connections: u32,

    /// How long SQLite itself waits on a locked database before giving up.
    pub busy_timeout: Duration,

    pub lookup_timeout: Duration,
    pub query_timeout: Duration,
    pub scan_timeout: Duration,

    /// Deadline for background cleanup, independent of the request that
    /// triggered it.
    pub cleanup_timeout: Duration,

    pub health_check_interval: Duration,

    /// Prefix for derived thumbnail URLs.
    pub thumbnail_base: String,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("library.db"),
            max_connections: 4,
            busy_timeout: Duration::from_secs(5),
            lookup_timeout: Duration::from_secs(5),
            query_timeout: Duration::from_secs(30),
            scan_timeout: Duration::from_secs(120),
            cleanup_timeout: Duration::from_secs(10),
            health_check_interval: Duration::from_secs(60),
            thumbnail_base: "/api/thumbnail".to_string(),
        }
    }
}

impl LibraryConfig {
    /// Configuration for a database at `path` with default settings.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            db_path: path.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Configuration for the per-user default location,
    /// `{data_dir}/media-library/library.db`.
    ///
    /// Returns [`LibraryError::NotFound`] if the platform has no data directory.
    pub fn for_user() -> LibraryResult<Self> {
        Ok(Self::new(Self::default_db_path()?))
    }

    /// Resolves the per-user default database path.
    pub fn default_db_path() -> LibraryResult<PathBuf> {
        let data = dirs::data_dir()
            .ok_or_else(|| LibraryError::NotFound("user data directory".into()))?;
        Ok(data.join("media-library").join("library.db"))
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max.max(2);
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn with_timeouts(mut self, lookup: Duration, query: Duration, scan: Duration) -> Self {
        self.lookup_timeout = lookup;
        self.query_timeout = query;
        self.scan_timeout = scan;
        self
    }

    pub fn with_cleanup_timeout(mut self, timeout: Duration) -> Self {
        self.cleanup_timeout = timeout;
        self
    }

    pub fn with_health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }

    pub fn with_thumbnail_base(mut self, base: impl Into<String>) -> Self {
        self.thumbnail_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn timeout_for(&self, budget: Budget) -> Duration {
        match budget {
            Budget::Lookup => self.lookup_timeout,
            Budget::Query => self.query_timeout,
            Budget::Scan => self.scan_timeout,
        }
    }
}
