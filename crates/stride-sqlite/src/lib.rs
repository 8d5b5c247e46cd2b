//! # stride-sqlite
//!
//! SQLite storage for Stride.
//!
//! [`SqliteStore`] implements all three storage contracts on one database:
//! [`stride_proposal::ProposalStore`], [`stride_policy::PolicyStore`] and
//! [`stride_audit::AuditSink`]. Because drafts, proposals, profiles and audit
//! rows share one file, every mutation commits together with its audit
//! records in a single transaction.
//!
//! ## Tables
//!
//! - `drafts`: draft body plus `plan_revision` for conditional plan updates
//! - `proposals`: proposal body plus a `state` column for conditional transitions
//! - `policy_profiles`: override bundle body and last-modified metadata
//! - `audit_records`: hash-chained audit records keyed by sequence

pub mod error;
pub mod schema;
pub mod store;

pub use error::SqliteError;
pub use store::SqliteStore;
