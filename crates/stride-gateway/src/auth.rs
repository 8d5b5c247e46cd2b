// auth.rs - Identity and ownership checks at the operation boundary.
//
// Default deny: an id that the authorizer does not know is Unauthorized, and
// a known principal acting on an athlete outside its roster is Forbidden.
// The gateway resolves a Principal once per call and hands it down
// explicitly; nothing below this layer consults the authorizer.

use std::collections::{BTreeMap, BTreeSet};

use stride_audit::{Principal, Role};
use thiserror::Error;

use crate::config::StrideConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),
}

/// Resolves callers and answers ownership questions.
pub trait Authorizer: Send + Sync {
    /// Map a caller id to a principal, or fail with `Unauthorized`.
    fn authenticate(&self, caller_id: &str) -> Result<Principal, AuthError>;

    /// Whether `coach_id` currently plans for `athlete_id`.
    fn coach_owns_athlete(&self, coach_id: &str, athlete_id: &str) -> bool;
}

/// An authorizer backed by a fixed roster, typically from the config file.
#[derive(Debug, Clone, Default)]
pub struct StaticRoster {
    coaches: BTreeMap<String, BTreeSet<String>>,
    admins: BTreeSet<String>,
}

impl StaticRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &StrideConfig) -> Self {
        let mut roster = Self::new();
        for (coach, athletes) in &config.roster {
            roster = roster.with_coach(coach.clone(), athletes.iter().cloned());
        }
        for admin in &config.admins {
            roster = roster.with_admin(admin.clone());
        }
        roster
    }

    pub fn with_coach(
        mut self,
        coach_id: impl Into<String>,
        athletes: impl IntoIterator<Item = String>,
    ) -> Self {
        self.coaches
            .entry(coach_id.into())
            .or_default()
            .extend(athletes);
        self
    }

    pub fn with_admin(mut self, admin_id: impl Into<String>) -> Self {
        self.admins.insert(admin_id.into());
        self
    }

    fn is_athlete(&self, id: &str) -> bool {
        self.coaches.values().any(|athletes| athletes.contains(id))
    }
}

impl Authorizer for StaticRoster {
    fn authenticate(&self, caller_id: &str) -> Result<Principal, AuthError> {
        // Admin wins if an id is listed twice.
        if self.admins.contains(caller_id) {
            Ok(Principal::admin(caller_id))
        } else if self.coaches.contains_key(caller_id) {
            Ok(Principal::coach(caller_id))
        } else if self.is_athlete(caller_id) {
            Ok(Principal::athlete(caller_id))
        } else {
            Err(AuthError::Unauthorized(format!(
                "unknown principal '{}'",
                caller_id
            )))
        }
    }

    fn coach_owns_athlete(&self, coach_id: &str, athlete_id: &str) -> bool {
        self.coaches
            .get(coach_id)
            .is_some_and(|athletes| athletes.contains(athlete_id))
    }
}

/// Require that `principal` is an administrator.
pub fn require_admin(principal: &Principal) -> Result<(), AuthError> {
    if principal.is_admin() {
        Ok(())
    } else {
        Err(AuthError::Forbidden(format!(
            "{} is not an administrator",
            principal
        )))
    }
}

/// Require that `principal` is a coach planning for `athlete_id`.
pub fn require_coach_of(
    authorizer: &dyn Authorizer,
    principal: &Principal,
    athlete_id: &str,
) -> Result<(), AuthError> {
    if principal.role == Role::Coach && authorizer.coach_owns_athlete(&principal.id, athlete_id) {
        Ok(())
    } else {
        Err(AuthError::Forbidden(format!(
            "{} does not coach athlete '{}'",
            principal, athlete_id
        )))
    }
}
