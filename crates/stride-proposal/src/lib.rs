//! # stride-proposal
//!
//! Proposal lifecycle and safety-gated batch approval for Stride drafts.
//!
//! A [`Proposal`] is one proposed edit to a [`Draft`]'s plan. The
//! [`LifecycleEngine`] creates, previews, applies, rejects and undoes
//! proposals; [`LifecycleEngine::batch_approve`] drives it over many
//! candidates at once under one hours cap.
//!
//! ## Key invariants
//!
//! - **Conditional transitions**: every state change is committed against the
//!   state it was read in. Of two racing applies (or undos) on the same
//!   proposal, exactly one succeeds and the other gets `Conflict`.
//! - **Fresh verdicts**: apply re-evaluates safety against the current
//!   policy snapshot, never a cached verdict.
//! - **Undo is a proposal**: undoing creates a new `Pending` proposal that
//!   carries the inverse captured at apply time. At most one undo is
//!   outstanding per applied proposal.
//! - **Audited units**: a mutation and its audit records commit together or
//!   not at all.
//! - **Per-item batches**: batch outcomes are reported per candidate; one
//!   failing item never aborts the rest.

pub mod batch;
pub mod content;
pub mod draft;
pub mod error;
pub mod lifecycle;
pub mod proposal;
pub mod store;
pub mod telemetry;

pub use batch::{BatchItem, BatchMode, BatchOutcome, BatchReport, BatchRequest, SkipReason};
pub use content::{EditSet, PlanContent, SessionEdit, SessionEdits};
pub use draft::{Draft, DraftStatus};
pub use error::{ContentError, ProposalError, StoreError};
pub use lifecycle::{LifecycleEngine, Preview, DEFAULT_APPLY_ATTEMPTS};
pub use proposal::{Proposal, ProposalKind, ProposalState};
pub use store::{DraftUpdate, MemoryProposalStore, ProposalStore, ProposalUpdate, UnitOfWork};
pub use telemetry::{CostEstimate, CostEstimator, HourlyRate};
