// record.rs - Audit record data model.
//
// One AuditRecord per mutation: who did it, what kind of change, which
// entity, and the before/after values where they matter (policy bundles,
// proposal states). Records are immutable once sealed by a sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::actor::{Principal, Role};

/// What kind of mutation this record attests to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A coach opened a new planning draft for an athlete.
    DraftCreated,
    /// A draft was published; later plan changes go through proposals only.
    DraftPublished,
    /// A proposal was stored in `pending`.
    ProposalCreated,
    /// A proposal passed its safety check and was applied to the draft plan.
    ProposalApplied,
    /// A pending proposal was rejected.
    ProposalRejected,
    /// An undo proposal was created for an applied proposal.
    UndoRequested,
    /// An undo proposal was applied; the original is now undone.
    UndoCompleted,
    /// An undo proposal was rejected; the original is applied again.
    UndoAbandoned,
    /// An administrator created or replaced a policy profile.
    PolicyUpserted,
}

/// A single audit record.
///
/// `sequence`, `previous_hash` and `record_hash` are assigned by the sink
/// when the record is appended; until then they are zero/None.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
    /// Position in the log, strictly increasing from 1.
    pub sequence: u64,

    pub event_id: Uuid,

    pub timestamp: DateTime<Utc>,

    pub actor_id: String,

    pub actor_role: Role,

    pub action: AuditAction,

    /// The entity the action was applied to (e.g. "proposal:<uuid>").
    pub target: String,

    /// The owning entity used for listing (e.g. "draft:<uuid>", "policy:default").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<serde_json::Value>,

    #[serde(default)]
    pub metadata: serde_json::Value,

    /// Hash of the preceding record. None for the first record in a log.
    pub previous_hash: Option<String>,

    /// Hash of this record with `record_hash` itself set to None.
    pub record_hash: Option<String>,
}

impl AuditRecord {
    /// Create an unsealed record attributed to `actor`.
    pub fn new(actor: &Principal, action: AuditAction) -> Self {
        Self {
            sequence: 0,
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            actor_id: actor.id.clone(),
            actor_role: actor.role,
            action,
            target: String::new(),
            scope: None,
            before: None,
            after: None,
            metadata: serde_json::Value::Null,
            previous_hash: None,
            record_hash: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_before(mut self, before: serde_json::Value) -> Self {
        self.before = Some(before);
        self
    }

    pub fn with_after(mut self, after: serde_json::Value) -> Self {
        self.after = Some(after);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Whether this record concerns `reference`, either as target or scope.
    pub fn concerns(&self, reference: &str) -> bool {
        self.target == reference || self.scope.as_deref() == Some(reference)
    }
}

/// Audit reference for a draft.
pub fn draft_ref(draft_id: Uuid) -> String {
    format!("draft:{}", draft_id)
}

/// Audit reference for a proposal.
pub fn proposal_ref(proposal_id: Uuid) -> String {
    format!("proposal:{}", proposal_id)
}

/// Audit reference for a policy profile.
pub fn policy_ref(profile_id: &str) -> String {
    format!("policy:{}", profile_id)
}
