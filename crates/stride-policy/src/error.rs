// error.rs - Error types for the policy subsystem.

use thiserror::Error;

/// Errors that can occur during policy administration or refresh.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The named profile does not exist in the store.
    #[error("policy profile '{profile_id}' not found")]
    NotFound { profile_id: String },

    /// An upsert carried an unknown key, a mistyped value, or an invalid number.
    #[error("invalid policy override: {0}")]
    Validation(String),

    /// The policy store could not be read or written.
    #[error("policy store unavailable: {0}")]
    StoreUnavailable(String),

    /// The audit record for an upsert could not be written; the upsert was not applied.
    #[error("policy audit write failed: {0}")]
    Audit(#[from] stride_audit::AuditError),
}

impl PolicyError {
    /// Stable kebab-case code for reporting.
    pub fn code(&self) -> &'static str {
        match self {
            PolicyError::NotFound { .. } => "not-found",
            PolicyError::Validation(_) => "validation-error",
            PolicyError::StoreUnavailable(_) | PolicyError::Audit(_) => "store-unavailable",
        }
    }
}
