// evaluator.rs - Safety evaluation of a proposal's projected impact.
//
// `evaluate` is a pure function: one ProjectedImpact, one Thresholds copy,
// no I/O. Checks run in a fixed order and the first failing check decides:
//
// 1. Impact must be finite numbers → otherwise fail
// 2. Profile disables safety checks → pass
// 3. Hours delta ≤ max_hours_delta → otherwise fail
// 4. Total hours after ≤ max_total_hours → otherwise fail
// 5. Pass
//
// Comparisons use `f64::total_cmp` so ordering is total even for values
// that slipped past validation.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::profile::Thresholds;

/// What a proposal would do to the plan it targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectedImpact {
    /// Planned hours after minus planned hours before.
    pub hours_delta: f64,
    /// Planned hours after the proposal is applied.
    pub total_hours: f64,
    /// Number of distinct sessions the proposal touches.
    pub sessions_touched: usize,
}

impl ProjectedImpact {
    pub fn is_finite(&self) -> bool {
        self.hours_delta.is_finite() && self.total_hours.is_finite()
    }

    /// Whether the hours delta is at most `cap`. Non-finite impact never is.
    pub fn within(&self, cap: f64) -> bool {
        self.is_finite() && self.hours_delta.total_cmp(&cap) != Ordering::Greater
    }
}

/// One step of an evaluation, kept for display alongside the verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictCheck {
    pub check: String,
    pub outcome: String,
    pub passed: bool,
}

/// The outcome of one evaluation. Computed fresh on every preview and apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyVerdict {
    pub pass: bool,
    pub reason: String,
    /// The threshold the deciding check compared against.
    pub limit: f64,
    pub profile_id: String,
    pub generation: u64,
    pub checks: Vec<VerdictCheck>,
}

/// Evaluate `impact` against `thresholds`.
pub fn evaluate(impact: &ProjectedImpact, thresholds: &Thresholds) -> SafetyVerdict {
    let mut checks = Vec::new();
    let verdict = |pass: bool, reason: String, limit: f64, checks: Vec<VerdictCheck>| {
        SafetyVerdict {
            pass,
            reason,
            limit,
            profile_id: thresholds.profile_id.clone(),
            generation: thresholds.generation,
            checks,
        }
    };

    if !impact.is_finite() {
        checks.push(VerdictCheck {
            check: "finite_impact".to_string(),
            outcome: "failed: projected impact is not a finite number".to_string(),
            passed: false,
        });
        return verdict(
            false,
            "projected impact is not a finite number".to_string(),
            thresholds.max_hours_delta,
            checks,
        );
    }
    checks.push(VerdictCheck {
        check: "finite_impact".to_string(),
        outcome: "passed".to_string(),
        passed: true,
    });

    if !thresholds.safety_enabled {
        checks.push(VerdictCheck {
            check: "safety_enabled".to_string(),
            outcome: "skipped: disabled by profile".to_string(),
            passed: true,
        });
        return verdict(
            true,
            format!(
                "safety checks disabled by profile '{}'",
                thresholds.profile_id
            ),
            thresholds.max_hours_delta,
            checks,
        );
    }

    if impact.hours_delta.total_cmp(&thresholds.max_hours_delta) == Ordering::Greater {
        let reason = format!(
            "hours delta {} exceeds cap {}",
            impact.hours_delta, thresholds.max_hours_delta
        );
        checks.push(VerdictCheck {
            check: "max_hours_delta".to_string(),
            outcome: format!("failed: {}", reason),
            passed: false,
        });
        return verdict(false, reason, thresholds.max_hours_delta, checks);
    }
    checks.push(VerdictCheck {
        check: "max_hours_delta".to_string(),
        outcome: format!("passed: {} <= {}", impact.hours_delta, thresholds.max_hours_delta),
        passed: true,
    });

    if impact.total_hours.total_cmp(&thresholds.max_total_hours) == Ordering::Greater {
        let reason = format!(
            "total hours {} exceeds cap {}",
            impact.total_hours, thresholds.max_total_hours
        );
        checks.push(VerdictCheck {
            check: "max_total_hours".to_string(),
            outcome: format!("failed: {}", reason),
            passed: false,
        });
        return verdict(false, reason, thresholds.max_total_hours, checks);
    }
    checks.push(VerdictCheck {
        check: "max_total_hours".to_string(),
        outcome: format!(
            "passed: {} <= {}",
            impact.total_hours, thresholds.max_total_hours
        ),
        passed: true,
    });

    verdict(
        true,
        "within policy caps".to_string(),
        thresholds.max_hours_delta,
        checks,
    )
}
