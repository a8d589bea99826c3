//! The single embedded database behind the library.
//!
//! [`Database`] owns the SQLite connection pool and a process-wide
//! reader/writer lock that every query goes through:
//!
//! - Writes run inside a [`Batch`], which holds the **exclusive** side of the
//!   lock for the whole transaction. SQLite only allows one writer anyway;
//!   taking the lock first turns "blocked by the engine" into an ordered wait
//!   in-process instead of busy retries.
//! - Reads hold the **shared** side for one query sequence and never upgrade.
//!
//! The lock is not re-entrant. Public read methods take the shared side
//! themselves; a method that already holds it calls the crate-internal
//! `*_unlocked` variant instead of the public one. Taking the shared side a
//! second time while a writer is queued would deadlock.
//!
//! Every pooled connection runs `PRAGMA mmap_size = 0` as it is opened. With
//! memory-mapped reads a storage failure under the database file (a network
//! volume dropping, a stale handle) arrives as a fault that kills the
//! process; with plain `read()` it is an I/O error the caller can handle.

mod batch;
pub mod health;
pub(crate) mod rows;

pub use batch::Batch;
pub use health::{HealthSnapshot, StorageHealth, StorageReport};

use crate::config::{Budget, LibraryConfig};
use crate::error::{LibraryError, LibraryResult};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
    lock: Arc<RwLock<()>>,
    health: Arc<StorageHealth>,
    config: Arc<LibraryConfig>,
}

impl Database {
    /// Opens or creates the database described by `config` and applies the
    /// schema migrations.
    pub async fn open(config: LibraryConfig) -> LibraryResult<Self> {
        if let Some(parent) = config.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(config.busy_timeout)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.query_timeout)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA mmap_size = 0")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        info!(
            path = %config.db_path.display(),
            max_connections = config.max_connections,
            "library database opened"
        );

        Ok(Self {
            pool,
            lock: Arc::new(RwLock::new(())),
            health: Arc::new(StorageHealth::default()),
            config: Arc::new(config),
        })
    }

    /// Opens a database at `path` with default settings.
    pub async fn open_path(path: impl AsRef<Path>) -> LibraryResult<Self> {
        Self::open(LibraryConfig::new(path)).await
    }

    /// The underlying pool. Queries issued here bypass the lock discipline.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn config(&self) -> &LibraryConfig {
        &self.config
    }

    pub fn health(&self) -> HealthSnapshot {
        self.health.snapshot()
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Shared side of the lock. Hold it for one query sequence only.
    pub(crate) async fn read_guard(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read().await
    }

    /// Runs `fut` under the deadline for `budget`, recording storage-class
    /// failures in the health counters.
    pub(crate) async fn bounded<T, F>(
        &self,
        operation: &'static str,
        budget: Budget,
        fut: F,
    ) -> LibraryResult<T>
    where
        F: Future<Output = LibraryResult<T>>,
    {
        let after = self.config.timeout_for(budget);
        let result = match tokio::time::timeout(after, fut).await {
            Ok(result) => result,
            Err(_) => Err(LibraryError::Timeout { operation, after }),
        };

        if let Err(err) = &result {
            self.observe_error(operation, err);
        }

        result
    }

    pub(crate) fn observe_error(&self, operation: &'static str, err: &LibraryError) {
        if err.is_storage() {
            self.health.record_storage_error();
            warn!(operation, error = %err, "storage error");
        }
    }

    /// Submits background cleanup discovered while serving a read.
    ///
    /// The task takes the exclusive lock itself and runs on
    /// `cleanup_timeout`, not on the deadline of the request that found the
    /// work: that request may be finished or cancelled before this starts.
    pub(crate) fn spawn_cleanup<F, Fut>(&self, task: &'static str, work: F) -> JoinHandle<()>
    where
        F: FnOnce(SqlitePool) -> Fut + Send + 'static,
        Fut: Future<Output = LibraryResult<u64>> + Send + 'static,
    {
        let db = self.clone();
        let deadline = self.config.cleanup_timeout;

        tokio::spawn(async move {
            let run = async {
                let _guard = db.lock.write().await;
                work(db.pool.clone()).await
            };

            match tokio::time::timeout(deadline, run).await {
                Ok(Ok(removed)) => debug!(task, removed, "cleanup finished"),
                Ok(Err(err)) => {
                    db.observe_error(task, &err);
                    warn!(task, error = %err, "cleanup failed");
                }
                Err(_) => warn!(task, ?deadline, "cleanup timed out"),
            }
        })
    }
}
