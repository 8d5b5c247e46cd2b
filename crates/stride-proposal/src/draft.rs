// draft.rs - An athlete's in-progress plan revision.
//
// The plan itself is opaque JSON interpreted only by the content
// collaborator. `plan_revision` increases by one on every change to the
// draft record; stores use it as the expected value for conditional plan
// updates.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stride_policy::DEFAULT_PROFILE;
use uuid::Uuid;

/// Whether a draft still accepts proposals.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    Active,
    Published,
}

impl fmt::Display for DraftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DraftStatus::Active => write!(f, "active"),
            DraftStatus::Published => write!(f, "published"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Draft {
    pub draft_id: Uuid,

    pub athlete_id: String,

    /// The coach who owns this draft.
    pub coach_id: String,

    pub status: DraftStatus,

    /// Policy profile the safety evaluator uses for this draft's proposals.
    pub policy_profile: String,

    /// The materialized plan, as of `plan_revision`.
    pub plan: serde_json::Value,

    pub plan_revision: u64,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Draft {
    /// Create an active draft on the default policy profile.
    pub fn new(
        athlete_id: impl Into<String>,
        coach_id: impl Into<String>,
        plan: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            draft_id: Uuid::new_v4(),
            athlete_id: athlete_id.into(),
            coach_id: coach_id.into(),
            status: DraftStatus::Active,
            policy_profile: DEFAULT_PROFILE.to_string(),
            plan,
            plan_revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_profile(mut self, profile_id: impl Into<String>) -> Self {
        self.policy_profile = profile_id.into();
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == DraftStatus::Active
    }

    /// The next revision of this draft with `plan` in place.
    pub fn revised(&self, plan: serde_json::Value) -> Self {
        let mut next = self.clone();
        next.plan = plan;
        next.plan_revision += 1;
        next.updated_at = Utc::now();
        next
    }

    /// The next revision of this draft, published.
    pub fn published(&self) -> Self {
        let mut next = self.revised(self.plan.clone());
        next.status = DraftStatus::Published;
        next
    }
}
