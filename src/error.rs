use std::time::Duration;
use thiserror::Error;

// Generic statement failure: bad SQL, missing table, FTS5 syntax errors.
const SQLITE_ERROR: i32 = 1;

// SQLite primary result codes that point at the storage underneath the
// database rather than at the statement being run.
const SQLITE_IOERR: i32 = 10;
const SQLITE_CORRUPT: i32 = 11;
const SQLITE_FULL: i32 = 13;
const SQLITE_CANTOPEN: i32 = 14;
const SQLITE_NOTADB: i32 = 26;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// A batch failed and rolling it back failed too. Both errors are kept.
    #[error("{source} (rollback also failed: {rollback})")]
    Rollback {
        source: Box<LibraryError>,
        rollback: sqlx::Error,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type LibraryResult<T> = Result<T, LibraryError>;

impl LibraryError {
    /// True when the failure most likely comes from degraded storage
    /// (disconnected volume, stale handle, full disk) instead of a bad query.
    pub fn is_storage(&self) -> bool {
        match self {
            LibraryError::Io(_) => true,
            LibraryError::Db(err) => sqlx_is_storage(err),
            LibraryError::Rollback { source, rollback } => {
                source.is_storage() || sqlx_is_storage(rollback)
            }
            _ => false,
        }
    }

    /// True for statement-level failures such as full-text syntax errors,
    /// which search recovers from by taking a simpler path.
    ///
    /// Only SQLite's generic `SQLITE_ERROR` qualifies. Busy, locked,
    /// interrupted, and read-only failures are reported, not recovered.
    pub fn is_query_shape(&self) -> bool {
        match self {
            LibraryError::Db(err) => primary_code(err) == Some(SQLITE_ERROR),
            _ => false,
        }
    }
}

/// Primary result code of a SQLite error. Extended codes keep the primary
/// code in their low byte.
fn primary_code(err: &sqlx::Error) -> Option<i32> {
    match err {
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .map(|code| code & 0xff),
        _ => None,
    }
}

fn sqlx_is_storage(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_) => true,
        _ => matches!(
            primary_code(err),
            Some(SQLITE_IOERR | SQLITE_CORRUPT | SQLITE_FULL | SQLITE_CANTOPEN | SQLITE_NOTADB)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    /// A database error carrying a raw SQLite result code.
    #[derive(Debug)]
    struct Coded(i32);

    impl fmt::Display for Coded {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "sqlite error {}", self.0)
        }
    }

    impl StdError for Coded {}

    impl DatabaseError for Coded {
        fn message(&self) -> &str {
            "coded"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Owned(self.0.to_string()))
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    fn db_error(code: i32) -> LibraryError {
        LibraryError::Db(sqlx::Error::Database(Box::new(Coded(code))))
    }

    #[test]
    fn only_generic_errors_are_query_shape() {
        assert!(db_error(1).is_query_shape());
        // SQLITE_BUSY, SQLITE_LOCKED, SQLITE_NOMEM, SQLITE_READONLY, SQLITE_INTERRUPT
        for code in [5, 6, 7, 8, 9] {
            let err = db_error(code);
            assert!(!err.is_query_shape(), "code {code}");
            assert!(!err.is_storage(), "code {code}");
        }
        // SQLITE_BUSY_RECOVERY is still busy
        assert!(!db_error(261).is_query_shape());
    }

    #[test]
    fn io_result_codes_are_storage() {
        // SQLITE_IOERR_READ, SQLITE_CORRUPT, SQLITE_FULL
        for code in [266, 11, 13] {
            let err = db_error(code);
            assert!(err.is_storage(), "code {code}");
            assert!(!err.is_query_shape(), "code {code}");
        }
    }

    #[test]
    fn io_errors_count_as_storage() {
        let err = LibraryError::Io(std::io::Error::other("stale handle"));
        assert!(err.is_storage());
        assert!(!err.is_query_shape());
    }

    #[test]
    fn rollback_keeps_both_messages() {
        let err = LibraryError::Rollback {
            source: Box::new(LibraryError::InvalidInput("bad row".into())),
            rollback: sqlx::Error::PoolClosed,
        };
        let text = err.to_string();
        assert!(text.contains("bad row"));
        assert!(text.contains("rollback also failed"));
    }
}
