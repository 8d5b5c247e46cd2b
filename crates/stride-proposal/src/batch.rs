// batch.rs - Safety-gated batch approval.
//
// A batch drives the lifecycle engine over a list of candidate proposals of
// one draft, under one hours cap and one mode. Every candidate gets exactly
// one outcome, reported in input order. Items are independent: a failure on
// one never stops the rest, and each item commits (or not) on its own.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use stride_audit::Principal;
use uuid::Uuid;

use crate::error::ProposalError;
use crate::lifecycle::{ApplyOutcome, LifecycleEngine};
use crate::proposal::ProposalState;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    /// Apply every pending candidate whose impact is within the cap.
    Approve,
    /// Reject every pending candidate, whatever its impact.
    Reject,
}

impl fmt::Display for BatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchMode::Approve => write!(f, "approve"),
            BatchMode::Reject => write!(f, "reject"),
        }
    }
}

impl FromStr for BatchMode {
    type Err = ProposalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(BatchMode::Approve),
            "reject" => Ok(BatchMode::Reject),
            other => Err(ProposalError::Validation(format!(
                "unknown batch mode '{}' (expected approve or reject)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchRequest {
    pub draft_id: Uuid,
    pub candidates: Vec<Uuid>,
    /// Largest hours delta a candidate may have and still be applied.
    pub max_hours: f64,
    pub mode: BatchMode,
}

impl BatchRequest {
    fn validate(&self) -> Result<(), ProposalError> {
        if self.candidates.is_empty() {
            return Err(ProposalError::Validation(
                "batch needs at least one candidate".to_string(),
            ));
        }
        if !self.max_hours.is_finite() || self.max_hours < 0.0 {
            return Err(ProposalError::Validation(format!(
                "max_hours must be a finite, non-negative number (got {})",
                self.max_hours
            )));
        }
        let mut seen = HashSet::new();
        for id in &self.candidates {
            if !seen.insert(id) {
                return Err(ProposalError::Validation(format!(
                    "candidate {} listed more than once",
                    id
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    NotPending,
    ExceedsCap,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotPending => write!(f, "not-pending"),
            SkipReason::ExceedsCap => write!(f, "exceeds-cap"),
        }
    }
}

/// What happened to one candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BatchOutcome {
    Applied,
    Rejected,
    Skipped { reason: SkipReason },
    Failed { code: String, message: String },
}

impl BatchOutcome {
    fn failed(err: &ProposalError) -> Self {
        BatchOutcome::Failed {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for BatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchOutcome::Applied => write!(f, "applied"),
            BatchOutcome::Rejected => write!(f, "rejected"),
            BatchOutcome::Skipped { reason } => write!(f, "skipped({})", reason),
            BatchOutcome::Failed { code, .. } => write!(f, "failed({})", code),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchItem {
    pub proposal_id: Uuid,
    #[serde(flatten)]
    pub outcome: BatchOutcome,
}

/// Per-candidate outcomes, in the order the candidates were given.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchReport {
    pub draft_id: Uuid,
    pub mode: BatchMode,
    pub max_hours: f64,
    pub items: Vec<BatchItem>,
}

impl BatchReport {
    fn count(&self, pred: impl Fn(&BatchOutcome) -> bool) -> usize {
        self.items.iter().filter(|i| pred(&i.outcome)).count()
    }

    pub fn applied(&self) -> usize {
        self.count(|o| matches!(o, BatchOutcome::Applied))
    }

    pub fn rejected(&self) -> usize {
        self.count(|o| matches!(o, BatchOutcome::Rejected))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, BatchOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, BatchOutcome::Failed { .. }))
    }

    /// The outcome for one candidate.
    pub fn outcome(&self, proposal_id: Uuid) -> Option<&BatchOutcome> {
        self.items
            .iter()
            .find(|i| i.proposal_id == proposal_id)
            .map(|i| &i.outcome)
    }
}

impl LifecycleEngine {
    /// Run `request` over its candidates.
    ///
    /// Returns an error only for a malformed request or a missing draft.
    /// Everything that goes wrong with an individual candidate is reported
    /// as that candidate's outcome.
    pub fn batch_approve(
        &self,
        actor: &Principal,
        request: &BatchRequest,
    ) -> Result<BatchReport, ProposalError> {
        request.validate()?;
        self.get_draft(request.draft_id)?;

        let items: Vec<BatchItem> = request
            .candidates
            .iter()
            .map(|&proposal_id| BatchItem {
                proposal_id,
                outcome: self.batch_item(actor, request, proposal_id),
            })
            .collect();

        let report = BatchReport {
            draft_id: request.draft_id,
            mode: request.mode,
            max_hours: request.max_hours,
            items,
        };
        tracing::info!(
            draft_id = %request.draft_id,
            mode = %request.mode,
            actor = %actor,
            applied = report.applied(),
            rejected = report.rejected(),
            skipped = report.skipped(),
            failed = report.failed(),
            "batch finished"
        );
        Ok(report)
    }

    fn batch_item(
        &self,
        actor: &Principal,
        request: &BatchRequest,
        proposal_id: Uuid,
    ) -> BatchOutcome {
        let proposal = match self.get_proposal(proposal_id) {
            Ok(p) if p.draft_id == request.draft_id => p,
            Ok(_) => {
                return BatchOutcome::failed(&ProposalError::not_found(
                    "proposal in this draft",
                    proposal_id,
                ))
            }
            Err(err) => return self.item_failed(proposal_id, &err),
        };
        if proposal.state != ProposalState::Pending {
            return BatchOutcome::Skipped {
                reason: SkipReason::NotPending,
            };
        }

        match request.mode {
            BatchMode::Reject => match self.reject(actor, proposal_id) {
                Ok(_) => BatchOutcome::Rejected,
                // Someone else moved it first.
                Err(ProposalError::Conflict(_)) => BatchOutcome::Skipped {
                    reason: SkipReason::NotPending,
                },
                Err(err) => self.item_failed(proposal_id, &err),
            },
            BatchMode::Approve => {
                match self.apply_within(actor, proposal_id, Some(request.max_hours)) {
                    Ok(ApplyOutcome::Applied(_)) => BatchOutcome::Applied,
                    Ok(ApplyOutcome::ExceedsCap(_)) => BatchOutcome::Skipped {
                        reason: SkipReason::ExceedsCap,
                    },
                    Err(err) => self.item_failed(proposal_id, &err),
                }
            }
        }
    }

    fn item_failed(&self, proposal_id: Uuid, err: &ProposalError) -> BatchOutcome {
        tracing::warn!(
            proposal_id = %proposal_id,
            code = err.code(),
            error = %err,
            "batch item failed"
        );
        BatchOutcome::failed(err)
    }
}
