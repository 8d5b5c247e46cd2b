// error.rs - Error types for the SQLite store.
//
// SqliteError is internal vocabulary. Each trait implementation converts it
// into the error type its trait speaks: StoreError, PolicyError or AuditError.

use std::path::PathBuf;

use stride_audit::AuditError;
use stride_policy::PolicyError;
use stride_proposal::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqliteError {
    #[error("failed to open database at {path}: {source}")]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },

    #[error("sqlite error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// A stored body did not parse, or a record could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database connection lock poisoned")]
    LockPoisoned,

    #[error("database schema version {found} is newer than supported version {supported}")]
    Schema { found: i64, supported: i64 },

    #[error(transparent)]
    Audit(#[from] AuditError),

    /// A condition of a unit of work did not hold; the transaction rolled back.
    #[error(transparent)]
    Rejected(StoreError),
}

impl From<SqliteError> for StoreError {
    fn from(err: SqliteError) -> Self {
        match err {
            SqliteError::Rejected(inner) => inner,
            SqliteError::Audit(inner) => StoreError::Audit(inner),
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

impl From<SqliteError> for PolicyError {
    fn from(err: SqliteError) -> Self {
        match err {
            SqliteError::Audit(inner) => PolicyError::Audit(inner),
            other => PolicyError::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<SqliteError> for AuditError {
    fn from(err: SqliteError) -> Self {
        match err {
            SqliteError::Audit(inner) => inner,
            other => AuditError::Unavailable(other.to_string()),
        }
    }
}
