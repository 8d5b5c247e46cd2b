// error.rs - Error types for the Stride gateway.

use thiserror::Error;

use crate::auth::AuthError;

/// Errors returned by gateway operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The caller could not be identified.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The caller is known but may not act on this resource.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Proposal(#[from] stride_proposal::ProposalError),

    #[error(transparent)]
    Policy(#[from] stride_policy::PolicyError),

    #[error("audit error: {0}")]
    Audit(#[from] stride_audit::AuditError),

    #[error("storage error: {0}")]
    Storage(#[from] stride_sqlite::SqliteError),

    /// The config file exists but could not be read or parsed.
    #[error("invalid config at {path}: {message}")]
    Config { path: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<AuthError> for GatewayError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthorized(msg) => GatewayError::Unauthorized(msg),
            AuthError::Forbidden(msg) => GatewayError::Forbidden(msg),
        }
    }
}

impl GatewayError {
    /// Stable kebab-case code for reporting.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Unauthorized(_) => "unauthorized",
            GatewayError::Forbidden(_) => "forbidden",
            GatewayError::Proposal(e) => e.code(),
            GatewayError::Policy(e) => e.code(),
            GatewayError::Config { .. } => "validation-error",
            GatewayError::Audit(_) | GatewayError::Storage(_) | GatewayError::Io(_) => {
                "store-unavailable"
            }
        }
    }
}
