//! # stride-audit
//!
//! Append-only audit trail for Stride.
//!
//! Every draft creation, proposal transition, and policy upsert is recorded
//! as an [`AuditRecord`] attributed to the [`Principal`] that caused it.
//! Records are sealed into a hash chain when appended: each one carries the
//! hash of its predecessor, so insertion, deletion or modification of any
//! record is detected by [`verify_chain`].
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use stride_audit::{AuditAction, AuditLog, AuditRecord, AuditSink, Principal};
//!
//! let log = AuditLog::open("/tmp/audit.jsonl").unwrap();
//! let admin = Principal::admin("ops-1");
//! let mut record = AuditRecord::new(&admin, AuditAction::PolicyUpserted)
//!     .with_target(stride_audit::policy_ref("default"));
//! log.append(std::slice::from_mut(&mut record)).unwrap();
//! ```

pub mod actor;
pub mod chain;
pub mod error;
pub mod hasher;
pub mod log;
pub mod record;
pub mod sink;

pub use actor::{Principal, Role};
pub use chain::{verify_chain, ChainHead};
pub use error::AuditError;
pub use log::AuditLog;
pub use record::{draft_ref, policy_ref, proposal_ref, AuditAction, AuditRecord};
pub use sink::{AuditSink, MemoryAuditLog};
