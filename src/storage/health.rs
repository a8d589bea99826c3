//! Storage health signals, kept apart from query-level errors.
//!
//! A failing `read()` on the database file usually means the storage under
//! it is degraded (volume unmounted, stale network handle), which needs a
//! different response than a bad query. Storage-class errors seen by any
//! operation are counted here, and a periodic check stats and reads the
//! database file and its WAL/shared-memory companions directly.

use super::Database;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::io::AsyncReadExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug)]
pub struct StorageHealth {
    storage_errors: AtomicU64,
    health_checks: AtomicU64,
    health_check_failures: AtomicU64,
    last_check_ok: AtomicBool,
}

impl Default for StorageHealth {
    fn default() -> Self {
        Self {
            storage_errors: AtomicU64::new(0),
            health_checks: AtomicU64::new(0),
            health_check_failures: AtomicU64::new(0),
            last_check_ok: AtomicBool::new(true),
        }
    }
}

/// Point-in-time copy of the health counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub storage_errors: u64,
    pub health_checks: u64,
    pub health_check_failures: u64,
    pub last_check_ok: bool,
}

impl StorageHealth {
    pub fn record_storage_error(&self) {
        self.storage_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn record_check(&self, ok: bool) {
        self.health_checks.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.health_check_failures.fetch_add(1, Ordering::Relaxed);
        }
        self.last_check_ok.store(ok, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            storage_errors: self.storage_errors.load(Ordering::Relaxed),
            health_checks: self.health_checks.load(Ordering::Relaxed),
            health_check_failures: self.health_check_failures.load(Ordering::Relaxed),
            last_check_ok: self.last_check_ok.load(Ordering::Relaxed),
        }
    }
}

/// Result of one storage check.
#[derive(Debug, Clone, Default)]
pub struct StorageReport {
    pub checked: Vec<PathBuf>,
    pub failures: Vec<(PathBuf, String)>,
}

impl StorageReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

impl Database {
    /// Stats and reads the first bytes of the database file and any
    /// `-wal`/`-shm` file next to it.
    ///
    /// The main file must exist. The auxiliary files are only checked when
    /// present, since SQLite removes them on a clean close.
    pub async fn check_storage(&self) -> StorageReport {
        let main = self.config.db_path.clone();
        let mut report = StorageReport::default();

        for (path, required) in [
            (main.clone(), true),
            (sidecar(&main, "-wal"), false),
            (sidecar(&main, "-shm"), false),
        ] {
            match probe(&path).await {
                Ok(()) => report.checked.push(path),
                Err(err) if err.kind() == ErrorKind::NotFound && !required => {}
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "storage health check failed");
                    report.checked.push(path.clone());
                    report.failures.push((path, err.to_string()));
                }
            }
        }

        self.health.record_check(report.is_ok());
        debug!(
            checked = report.checked.len(),
            failures = report.failures.len(),
            "storage health check finished"
        );
        report
    }

    /// Runs [`Database::check_storage`] every `health_check_interval` until
    /// the returned handle is aborted.
    pub fn spawn_health_monitor(&self) -> JoinHandle<()> {
        let db = self.clone();
        let period = self.config.health_check_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                db.check_storage().await;
            }
        })
    }
}

fn sidecar(main: &Path, suffix: &str) -> PathBuf {
    let mut name = main.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

async fn probe(path: &Path) -> std::io::Result<()> {
    tokio::fs::metadata(path).await?;
    let mut file = tokio::fs::File::open(path).await?;
    let mut buf = [0u8; 512];
    file.read(&mut buf).await?;
    Ok(())
}
