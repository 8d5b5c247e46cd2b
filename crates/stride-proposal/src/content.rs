// content.rs - The plan content collaborator.
//
// The lifecycle engine never looks inside a plan or a proposal payload. It
// asks a PlanContent implementation to project the impact of a payload,
// apply it, and compute its inverse, always against a specific plan value.
//
// SessionEdits is the built-in implementation. Plans look like
//
//   {"sessions": {"<id>": {"hours": 1.5, ...}, ...}, ...}
//
// and payloads are an ordered list of per-session edits:
//
//   {"edits": [{"op": "upsert", "session": "<id>", "value": {...}},
//              {"op": "remove", "session": "<id>"}]}
//
// Fields other than `hours` are carried through untouched.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use stride_policy::ProjectedImpact;

use crate::error::ContentError;

/// Interprets proposal payloads against draft plans.
///
/// Implementations must be deterministic: the same plan and payload always
/// give the same projection, result and inverse.
pub trait PlanContent: Send + Sync {
    /// Check that `plan` is something this collaborator can work with.
    fn validate_plan(&self, plan: &Value) -> Result<(), ContentError>;

    /// Check that `content` parses as a payload.
    fn validate_change(&self, content: &Value) -> Result<(), ContentError>;

    /// What applying `content` to `plan` would do.
    fn project(&self, plan: &Value, content: &Value) -> Result<ProjectedImpact, ContentError>;

    /// The plan after applying `content`.
    fn apply(&self, plan: &Value, content: &Value) -> Result<Value, ContentError>;

    /// A payload that, applied to `apply(plan, content)`, restores every
    /// part of `plan` that `content` touched.
    fn invert(&self, plan: &Value, content: &Value) -> Result<Value, ContentError>;
}

/// A single edit to one session of a plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SessionEdit {
    /// Create the session or replace it wholesale.
    Upsert { session: String, value: Value },

    /// Drop the session. Removing an absent session is a no-op.
    Remove { session: String },
}

impl SessionEdit {
    pub fn session(&self) -> &str {
        match self {
            SessionEdit::Upsert { session, .. } | SessionEdit::Remove { session } => session,
        }
    }
}

/// The payload format understood by [`SessionEdits`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EditSet {
    pub edits: Vec<SessionEdit>,
}

/// Built-in content collaborator for session-hour plans.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionEdits;

impl SessionEdits {
    fn parse(content: &Value) -> Result<EditSet, ContentError> {
        let set: EditSet = serde_json::from_value(content.clone())
            .map_err(|e| ContentError::InvalidChange(e.to_string()))?;

        if set.edits.is_empty() {
            return Err(ContentError::InvalidChange(
                "a proposal needs at least one edit".to_string(),
            ));
        }
        for edit in &set.edits {
            if edit.session().is_empty() {
                return Err(ContentError::InvalidChange(
                    "session id must not be empty".to_string(),
                ));
            }
            if let SessionEdit::Upsert { session, value } = edit {
                check_session(session, value).map_err(ContentError::InvalidChange)?;
            }
        }
        Ok(set)
    }

    fn sessions(plan: &Value) -> Result<Map<String, Value>, ContentError> {
        let object = plan
            .as_object()
            .ok_or_else(|| ContentError::InvalidPlan("plan must be a JSON object".to_string()))?;
        match object.get("sessions") {
            None => Ok(Map::new()),
            Some(Value::Object(sessions)) => Ok(sessions.clone()),
            Some(_) => Err(ContentError::InvalidPlan(
                "'sessions' must be an object".to_string(),
            )),
        }
    }

    fn edited(plan: &Value, set: &EditSet) -> Result<Map<String, Value>, ContentError> {
        let mut sessions = Self::sessions(plan)?;
        for edit in &set.edits {
            match edit {
                SessionEdit::Upsert { session, value } => {
                    sessions.insert(session.clone(), value.clone());
                }
                SessionEdit::Remove { session } => {
                    sessions.remove(session);
                }
            }
        }
        Ok(sessions)
    }
}

fn check_session(session: &str, value: &Value) -> Result<(), String> {
    let object = value
        .as_object()
        .ok_or_else(|| format!("session '{}' must be an object", session))?;
    match object.get("hours") {
        None => Ok(()),
        Some(hours) => match hours.as_f64() {
            Some(h) if h.is_finite() && h >= 0.0 => Ok(()),
            _ => Err(format!(
                "session '{}' hours must be a non-negative number",
                session
            )),
        },
    }
}

fn hours(session: &Value) -> f64 {
    session.get("hours").and_then(Value::as_f64).unwrap_or(0.0)
}

fn total_hours(sessions: &Map<String, Value>) -> f64 {
    sessions.values().map(hours).sum()
}

impl PlanContent for SessionEdits {
    fn validate_plan(&self, plan: &Value) -> Result<(), ContentError> {
        for (session, value) in &Self::sessions(plan)? {
            check_session(session, value).map_err(ContentError::InvalidPlan)?;
        }
        Ok(())
    }

    fn validate_change(&self, content: &Value) -> Result<(), ContentError> {
        Self::parse(content).map(|_| ())
    }

    fn project(&self, plan: &Value, content: &Value) -> Result<ProjectedImpact, ContentError> {
        let set = Self::parse(content)?;
        let before = total_hours(&Self::sessions(plan)?);
        let after = total_hours(&Self::edited(plan, &set)?);
        let touched: BTreeSet<&str> = set.edits.iter().map(SessionEdit::session).collect();

        Ok(ProjectedImpact {
            hours_delta: after - before,
            total_hours: after,
            sessions_touched: touched.len(),
        })
    }

    fn apply(&self, plan: &Value, content: &Value) -> Result<Value, ContentError> {
        let set = Self::parse(content)?;
        let sessions = Self::edited(plan, &set)?;
        let mut next = plan
            .as_object()
            .cloned()
            .ok_or_else(|| ContentError::InvalidPlan("plan must be a JSON object".to_string()))?;
        next.insert("sessions".to_string(), Value::Object(sessions));
        Ok(Value::Object(next))
    }

    fn invert(&self, plan: &Value, content: &Value) -> Result<Value, ContentError> {
        let set = Self::parse(content)?;
        let before = Self::sessions(plan)?;

        let mut seen = BTreeSet::new();
        let mut edits = Vec::new();
        for edit in &set.edits {
            let session = edit.session();
            if !seen.insert(session) {
                continue;
            }
            edits.push(match before.get(session) {
                Some(value) => SessionEdit::Upsert {
                    session: session.to_string(),
                    value: value.clone(),
                },
                None => SessionEdit::Remove {
                    session: session.to_string(),
                },
            });
        }

        serde_json::to_value(EditSet { edits })
            .map_err(|e| ContentError::InvalidChange(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plan() -> Value {
        json!({
            "week": 12,
            "sessions": {
                "mon": {"hours": 1.0, "kind": "easy"},
                "wed": {"hours": 2.0, "kind": "tempo"}
            }
        })
    }

    #[test]
    fn project_reports_delta_and_total() {
        let change = json!({"edits": [
            {"op": "upsert", "session": "mon", "value": {"hours": 2.5}},
            {"op": "upsert", "session": "sat", "value": {"hours": 1.5}}
        ]});
        let impact = SessionEdits.project(&plan(), &change).unwrap();
        assert_eq!(impact.hours_delta, 3.0);
        assert_eq!(impact.total_hours, 6.0);
        assert_eq!(impact.sessions_touched, 2);
    }

    #[test]
    fn apply_keeps_unrelated_fields() {
        let change = json!({"edits": [{"op": "remove", "session": "wed"}]});
        let next = SessionEdits.apply(&plan(), &change).unwrap();
        assert_eq!(next["week"], 12);
        assert!(next["sessions"].get("wed").is_none());
        assert_eq!(next["sessions"]["mon"]["kind"], "easy");
    }

    #[test]
    fn inverse_restores_touched_sessions() {
        let original = plan();
        let change = json!({"edits": [
            {"op": "upsert", "session": "mon", "value": {"hours": 3.0}},
            {"op": "upsert", "session": "mon", "value": {"hours": 4.0}},
            {"op": "remove", "session": "wed"},
            {"op": "upsert", "session": "fri", "value": {"hours": 1.0}}
        ]});
        let inverse = SessionEdits.invert(&original, &change).unwrap();
        let applied = SessionEdits.apply(&original, &change).unwrap();
        let restored = SessionEdits.apply(&applied, &inverse).unwrap();
        assert_eq!(restored, original);

        let edits: EditSet = serde_json::from_value(inverse).unwrap();
        assert_eq!(edits.edits.len(), 3);
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        assert!(SessionEdits.validate_change(&json!({"edits": []})).is_err());
        assert!(SessionEdits.validate_change(&json!({"changes": []})).is_err());
        assert!(SessionEdits
            .validate_change(&json!({"edits": [{"op": "upsert", "session": "mon", "value": 3}]}))
            .is_err());
        assert!(SessionEdits
            .validate_change(
                &json!({"edits": [{"op": "upsert", "session": "mon", "value": {"hours": -1}}]})
            )
            .is_err());
        assert!(SessionEdits
            .validate_change(&json!({"edits": [{"op": "remove", "session": "mon"}]}))
            .is_ok());
    }

    #[test]
    fn plan_must_be_an_object_with_session_objects() {
        assert!(SessionEdits.validate_plan(&json!([1, 2])).is_err());
        assert!(SessionEdits.validate_plan(&json!({"sessions": 4})).is_err());
        assert!(SessionEdits.validate_plan(&json!({})).is_ok());
        assert!(SessionEdits.validate_plan(&plan()).is_ok());
    }
}
