// telemetry.rs - Cost estimates attached to apply audit records.
//
// Estimates are reporting data only. Nothing in the lifecycle reads them
// back, and an estimator can never cause an apply to fail.

use serde::{Deserialize, Serialize};
use stride_policy::ProjectedImpact;

/// A deterministic cost figure for one applied proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub amount: f64,
    pub currency: String,
    /// How the amount was derived, for display.
    pub basis: String,
}

/// Supplies cost estimates from a projected impact.
pub trait CostEstimator: Send + Sync {
    fn estimate(&self, impact: &ProjectedImpact) -> CostEstimate;
}

/// Coaching hours billed at a flat rate. Negative deltas give negative cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyRate {
    pub rate: f64,
    pub currency: String,
}

impl HourlyRate {
    pub fn new(rate: f64, currency: impl Into<String>) -> Self {
        Self {
            rate,
            currency: currency.into(),
        }
    }
}

impl CostEstimator for HourlyRate {
    fn estimate(&self, impact: &ProjectedImpact) -> CostEstimate {
        CostEstimate {
            amount: impact.hours_delta * self.rate,
            currency: self.currency.clone(),
            basis: format!("{} h x {} {}/h", impact.hours_delta, self.rate, self.currency),
        }
    }
}
