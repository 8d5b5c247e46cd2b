//! # stride-policy
//!
//! Administrator-tunable safety thresholds for Stride.
//!
//! Policy values live in named [`PolicyProfile`]s held by a durable
//! [`PolicyStore`]. Evaluation paths never read the store directly: they read
//! the [`PolicyRuntimeCache`], an immutable snapshot that is replaced
//! wholesale on [`PolicyRuntimeCache::refresh`].
//!
//! ## Key invariants
//!
//! - **Pull-based**: an upsert is durable immediately but invisible to
//!   cached reads until someone refreshes.
//! - **Whole snapshots**: readers see the old snapshot or the new one,
//!   never a mix.
//! - **Fail-safe refresh**: a store failure during refresh keeps the
//!   previous snapshot in place.
//! - **Pure evaluation**: [`evaluate`] takes one [`Thresholds`] copy and a
//!   [`ProjectedImpact`] and does no I/O.

pub mod admin;
pub mod cache;
pub mod error;
pub mod evaluator;
pub mod profile;
pub mod store;

pub use admin::PolicyAdmin;
pub use cache::{PolicyRuntimeCache, PolicySnapshot};
pub use error::PolicyError;
pub use evaluator::{evaluate, ProjectedImpact, SafetyVerdict, VerdictCheck};
pub use profile::{
    OverrideBundle, PolicyProfile, PolicyValue, Thresholds, DEFAULT_PROFILE, MAX_HOURS_DELTA,
    MAX_TOTAL_HOURS, SAFETY_ENABLED,
};
pub use store::{MemoryPolicyStore, PolicyStore};
