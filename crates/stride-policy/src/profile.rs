// profile.rs - Policy profiles and their override bundles.
//
// A profile is a named bundle of overrides. Only the keys below are
// recognised; anything a profile does not set falls back to the documented
// default. The default bundle is also what `get` returns for a profile the
// store has never seen.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// Profile used by drafts that do not name one.
pub const DEFAULT_PROFILE: &str = "default";

/// Largest hours increase a single proposal may add to a plan.
pub const MAX_HOURS_DELTA: &str = "max_hours_delta";

/// Largest total planned hours a plan may reach after a proposal.
pub const MAX_TOTAL_HOURS: &str = "max_total_hours";

/// When false, proposals pass the safety check unconditionally.
pub const SAFETY_ENABLED: &str = "safety_enabled";

const DEFAULT_MAX_HOURS_DELTA: f64 = 5.0;
const DEFAULT_MAX_TOTAL_HOURS: f64 = 20.0;
const DEFAULT_SAFETY_ENABLED: bool = true;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Number,
    Flag,
}

const KNOWN_KEYS: &[(&str, ValueKind)] = &[
    (MAX_HOURS_DELTA, ValueKind::Number),
    (MAX_TOTAL_HOURS, ValueKind::Number),
    (SAFETY_ENABLED, ValueKind::Flag),
];

/// A single override value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PolicyValue {
    Flag(bool),
    Number(f64),
}

/// Override key → value. Serializes as a plain JSON object.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct OverrideBundle(BTreeMap<String, PolicyValue>);

impl OverrideBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bundle returned for profiles the store does not contain.
    pub fn defaults() -> Self {
        Self::new()
            .with(MAX_HOURS_DELTA, PolicyValue::Number(DEFAULT_MAX_HOURS_DELTA))
            .with(MAX_TOTAL_HOURS, PolicyValue::Number(DEFAULT_MAX_TOTAL_HOURS))
            .with(SAFETY_ENABLED, PolicyValue::Flag(DEFAULT_SAFETY_ENABLED))
    }

    pub fn with(mut self, key: impl Into<String>, value: PolicyValue) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<PolicyValue> {
        self.0.get(key).copied()
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        match self.0.get(key) {
            Some(PolicyValue::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn flag(&self, key: &str) -> Option<bool> {
        match self.0.get(key) {
            Some(PolicyValue::Flag(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PolicyValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reject unknown keys, mistyped values, and negative or non-finite numbers.
    pub fn validate(&self) -> Result<(), PolicyError> {
        for (key, value) in &self.0 {
            let kind = KNOWN_KEYS
                .iter()
                .find(|(known, _)| known == key)
                .map(|(_, kind)| *kind)
                .ok_or_else(|| PolicyError::Validation(format!("unknown key '{}'", key)))?;

            match (kind, value) {
                (ValueKind::Number, PolicyValue::Number(n)) => {
                    if !n.is_finite() || *n < 0.0 {
                        return Err(PolicyError::Validation(format!(
                            "'{}' must be a finite, non-negative number (got {})",
                            key, n
                        )));
                    }
                }
                (ValueKind::Flag, PolicyValue::Flag(_)) => {}
                (ValueKind::Number, _) => {
                    return Err(PolicyError::Validation(format!(
                        "'{}' must be a number",
                        key
                    )))
                }
                (ValueKind::Flag, _) => {
                    return Err(PolicyError::Validation(format!(
                        "'{}' must be true or false",
                        key
                    )))
                }
            }
        }
        Ok(())
    }
}

/// A named bundle of overrides plus who last changed it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyProfile {
    pub profile_id: String,
    pub overrides: OverrideBundle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

impl PolicyProfile {
    pub fn new(profile_id: impl Into<String>, overrides: OverrideBundle) -> Self {
        Self {
            profile_id: profile_id.into(),
            overrides,
            modified_by: None,
            modified_at: None,
        }
    }

    pub fn modified(mut self, by: impl Into<String>, at: DateTime<Utc>) -> Self {
        self.modified_by = Some(by.into());
        self.modified_at = Some(at);
        self
    }
}

/// Check that a profile id is a short slug: `[a-z0-9_-]{1,64}`.
pub fn validate_profile_id(profile_id: &str) -> Result<(), PolicyError> {
    let valid = !profile_id.is_empty()
        && profile_id.len() <= 64
        && profile_id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(PolicyError::Validation(format!(
            "profile id '{}' must match [a-z0-9_-]{{1,64}}",
            profile_id
        )))
    }
}

/// The resolved thresholds one evaluation runs against.
///
/// This is a plain copy taken from a single cache snapshot; nothing about
/// it changes while an evaluation is in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub profile_id: String,
    /// Generation of the cache snapshot these values came from.
    pub generation: u64,
    pub max_hours_delta: f64,
    pub max_total_hours: f64,
    pub safety_enabled: bool,
}

impl Thresholds {
    /// Resolve each key from `bundle`, falling back to the documented default.
    pub fn resolve(profile_id: impl Into<String>, generation: u64, bundle: &OverrideBundle) -> Self {
        Self {
            profile_id: profile_id.into(),
            generation,
            max_hours_delta: bundle
                .number(MAX_HOURS_DELTA)
                .unwrap_or(DEFAULT_MAX_HOURS_DELTA),
            max_total_hours: bundle
                .number(MAX_TOTAL_HOURS)
                .unwrap_or(DEFAULT_MAX_TOTAL_HOURS),
            safety_enabled: bundle.flag(SAFETY_ENABLED).unwrap_or(DEFAULT_SAFETY_ENABLED),
        }
    }
}
