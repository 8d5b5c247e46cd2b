// error.rs - Error types for the audit subsystem.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while recording or reading audit records.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Failed to open or create the audit log file.
    #[error("failed to open audit log at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write records to the log.
    #[error("failed to append audit records: {0}")]
    WriteFailed(#[from] std::io::Error),

    /// Failed to serialize or deserialize a record (malformed JSON).
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The hash chain is broken at the given sequence number.
    #[error("integrity check failed at sequence {sequence}: expected {expected}, got {actual}")]
    IntegrityViolation {
        sequence: u64,
        expected: String,
        actual: String,
    },

    /// The backing sink cannot accept writes (lock poisoned, database gone).
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}
