// error.rs - Error types for the proposal subsystem.
//
// ProposalError is what callers of the lifecycle engine see. StoreError is
// the narrower vocabulary of a ProposalStore; the engine inspects it (to
// retry a stale draft, for instance) before converting.

use stride_audit::AuditError;
use stride_policy::SafetyVerdict;
use thiserror::Error;
use uuid::Uuid;

use crate::proposal::ProposalState;

/// Errors returned by lifecycle and batch operations.
#[derive(Debug, Error)]
pub enum ProposalError {
    /// The referenced draft or proposal does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The proposal (or draft) is no longer in a state that permits the call.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Current policy thresholds block this apply.
    #[error("proposal {proposal_id} rejected by safety policy: {}", .verdict.reason)]
    SafetyRejected {
        proposal_id: Uuid,
        verdict: Box<SafetyVerdict>,
    },

    /// Malformed input: content payload, plan, batch request, profile id.
    #[error("validation error: {0}")]
    Validation(String),

    /// The durable store (or its audit sink) failed.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl ProposalError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        ProposalError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Stable kebab-case code for reporting.
    pub fn code(&self) -> &'static str {
        match self {
            ProposalError::NotFound { .. } => "not-found",
            ProposalError::Conflict(_) => "conflict",
            ProposalError::SafetyRejected { .. } => "safety-rejected",
            ProposalError::Validation(_) => "validation-error",
            ProposalError::StoreUnavailable(_) => "store-unavailable",
        }
    }
}

/// Errors a ProposalStore reports from a read or a commit.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional update found the proposal in a different state.
    #[error("proposal {proposal_id} is {actual}, expected {expected}")]
    StateMismatch {
        proposal_id: Uuid,
        expected: ProposalState,
        actual: ProposalState,
    },

    /// The draft plan changed since it was read.
    #[error("draft {draft_id} is at revision {actual}, expected {expected}")]
    StaleDraft {
        draft_id: Uuid,
        expected: u64,
        actual: u64,
    },

    /// An insert collided with an existing record.
    #[error("{0} already exists")]
    Duplicate(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The backing store cannot be reached or is corrupt.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The unit's audit records could not be appended; nothing was committed.
    #[error("audit write failed: {0}")]
    Audit(#[from] AuditError),
}

impl From<StoreError> for ProposalError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::StateMismatch { .. }
            | StoreError::StaleDraft { .. }
            | StoreError::Duplicate(_) => ProposalError::Conflict(err.to_string()),
            StoreError::NotFound { entity, id } => ProposalError::NotFound { entity, id },
            StoreError::Unavailable(_) | StoreError::Audit(_) => {
                ProposalError::StoreUnavailable(err.to_string())
            }
        }
    }
}

/// Errors from a plan content collaborator.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    #[error("invalid proposal content: {0}")]
    InvalidChange(String),
}

impl From<ContentError> for ProposalError {
    fn from(err: ContentError) -> Self {
        ProposalError::Validation(err.to_string())
    }
}
