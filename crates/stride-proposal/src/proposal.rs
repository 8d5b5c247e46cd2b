// proposal.rs - Proposal: one proposed mutation to a draft plan.
//
// Forward proposals and undo proposals share one state machine:
//
//   Pending → Applied → UndoPending → Undone
//   Pending → Rejected
//   UndoPending → Applied   (its undo proposal was rejected)
//
// Rejected and Undone are terminal. An undo proposal itself only ever moves
// Pending → Applied | Rejected; once it is applied, its original is Undone.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stride_policy::ProjectedImpact;
use uuid::Uuid;

use crate::error::ProposalError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProposalState {
    /// Created, awaiting apply or reject.
    Pending,
    /// Its content is part of the draft plan.
    Applied,
    /// Rejected without touching the plan.
    Rejected,
    /// An undo proposal for it exists and is pending.
    UndoPending,
    /// Its undo proposal was applied.
    Undone,
}

impl ProposalState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalState::Pending => "pending",
            ProposalState::Applied => "applied",
            ProposalState::Rejected => "rejected",
            ProposalState::UndoPending => "undo_pending",
            ProposalState::Undone => "undone",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProposalState::Rejected | ProposalState::Undone)
    }

    /// Check whether moving from this state to `next` is allowed.
    pub fn can_transition_to(&self, next: ProposalState) -> bool {
        matches!(
            (self, next),
            (ProposalState::Pending, ProposalState::Applied)
                | (ProposalState::Pending, ProposalState::Rejected)
                | (ProposalState::Applied, ProposalState::UndoPending)
                | (ProposalState::UndoPending, ProposalState::Undone)
                // The undo proposal was rejected; the original stays applied.
                | (ProposalState::UndoPending, ProposalState::Applied)
        )
    }
}

impl fmt::Display for ProposalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProposalState {
    type Err = ProposalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProposalState::Pending),
            "applied" => Ok(ProposalState::Applied),
            "rejected" => Ok(ProposalState::Rejected),
            "undo_pending" => Ok(ProposalState::UndoPending),
            "undone" => Ok(ProposalState::Undone),
            other => Err(ProposalError::Validation(format!(
                "unknown proposal state '{}'",
                other
            ))),
        }
    }
}

/// Forward edits versus the inverse of an applied proposal.
///
/// Serializes as `{"type": "forward"}` or `{"type": "undo", "undoes": "<uuid>"}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProposalKind {
    Forward,
    Undo { undoes: Uuid },
}

impl ProposalKind {
    /// The proposal this one reverses, if it is an undo.
    pub fn undoes(&self) -> Option<Uuid> {
        match self {
            ProposalKind::Forward => None,
            ProposalKind::Undo { undoes } => Some(*undoes),
        }
    }
}

impl fmt::Display for ProposalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProposalKind::Forward => write!(f, "forward"),
            ProposalKind::Undo { .. } => write!(f, "undo"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Proposal {
    pub proposal_id: Uuid,

    pub draft_id: Uuid,

    pub kind: ProposalKind,

    pub state: ProposalState,

    /// The edit payload, interpreted by the content collaborator.
    pub content: serde_json::Value,

    /// Content that reverses this proposal, computed against the plan it
    /// was applied to. Set when the proposal is applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inverse: Option<serde_json::Value>,

    /// Impact as last projected (at creation, then again at apply).
    pub impact: ProjectedImpact,

    /// Id of the principal that created the proposal.
    pub created_by: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub undone_at: Option<DateTime<Utc>>,
}

impl Proposal {
    /// Create a pending proposal.
    pub fn new(
        draft_id: Uuid,
        kind: ProposalKind,
        content: serde_json::Value,
        impact: ProjectedImpact,
        created_by: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            proposal_id: Uuid::new_v4(),
            draft_id,
            kind,
            state: ProposalState::Pending,
            content,
            inverse: None,
            impact,
            created_by: created_by.into(),
            created_at: now,
            updated_at: now,
            applied_at: None,
            undone_at: None,
        }
    }

    /// Move to `next`, stamping the matching timestamp.
    pub fn transition(&mut self, next: ProposalState) -> Result<(), ProposalError> {
        if !self.state.can_transition_to(next) {
            return Err(ProposalError::Conflict(format!(
                "proposal {} cannot move from {} to {}",
                self.proposal_id, self.state, next
            )));
        }
        let now = Utc::now();
        match (self.state, next) {
            (ProposalState::Pending, ProposalState::Applied) => self.applied_at = Some(now),
            (_, ProposalState::Undone) => self.undone_at = Some(now),
            _ => {}
        }
        self.state = next;
        self.updated_at = now;
        Ok(())
    }

    /// Copy of this proposal moved to `next`.
    pub fn transitioned(&self, next: ProposalState) -> Result<Self, ProposalError> {
        let mut copy = self.clone();
        copy.transition(next)?;
        Ok(copy)
    }
}
