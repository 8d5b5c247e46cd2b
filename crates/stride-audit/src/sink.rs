// sink.rs - The audit sink contract and an in-memory implementation.
//
// A sink seals and stores a batch of records as one unit: either every
// record in the slice is appended, or none is and an error is returned.
// Stores call `append` before publishing the mutation the records describe,
// so a failed audit write means the mutation never becomes visible.

use std::sync::Mutex;

use crate::chain::ChainHead;
use crate::error::AuditError;
use crate::record::AuditRecord;

/// An append-only destination for audit records.
pub trait AuditSink: Send + Sync {
    /// Seal and append `records` as one unit, filling in sequence and hashes.
    fn append(&self, records: &mut [AuditRecord]) -> Result<(), AuditError>;

    /// Every record whose target or scope equals `reference`, oldest first.
    fn records_for(&self, reference: &str) -> Result<Vec<AuditRecord>, AuditError>;

    /// The complete log, oldest first.
    fn all(&self) -> Result<Vec<AuditRecord>, AuditError>;
}

#[derive(Default)]
struct MemoryLogState {
    head: ChainHead,
    records: Vec<AuditRecord>,
}

/// A process-local audit log. Used by the in-memory stores and in tests.
#[derive(Default)]
pub struct MemoryAuditLog {
    state: Mutex<MemoryLogState>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditLog {
    fn append(&self, records: &mut [AuditRecord]) -> Result<(), AuditError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| AuditError::Unavailable("audit log lock poisoned".to_string()))?;

        // Seal against a scratch head so a failure leaves the log untouched.
        let mut head = state.head.clone();
        for record in records.iter_mut() {
            head.seal(record)?;
        }

        state.head = head;
        state.records.extend(records.iter().cloned());
        Ok(())
    }

    fn records_for(&self, reference: &str) -> Result<Vec<AuditRecord>, AuditError> {
        let state = self
            .state
            .lock()
            .map_err(|_| AuditError::Unavailable("audit log lock poisoned".to_string()))?;
        Ok(state
            .records
            .iter()
            .filter(|r| r.concerns(reference))
            .cloned()
            .collect())
    }

    fn all(&self) -> Result<Vec<AuditRecord>, AuditError> {
        let state = self
            .state
            .lock()
            .map_err(|_| AuditError::Unavailable("audit log lock poisoned".to_string()))?;
        Ok(state.records.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Principal;
    use crate::chain::verify_chain;
    use crate::record::{draft_ref, proposal_ref, AuditAction};
    use uuid::Uuid;

    #[test]
    fn append_assigns_contiguous_sequences() {
        let log = MemoryAuditLog::new();
        let coach = Principal::coach("c");
        let mut batch = vec![
            AuditRecord::new(&coach, AuditAction::ProposalApplied),
            AuditRecord::new(&coach, AuditAction::UndoCompleted),
        ];
        log.append(&mut batch).unwrap();
        assert_eq!(batch[0].sequence, 1);
        assert_eq!(batch[1].sequence, 2);
        assert_eq!(log.len(), 2);
        verify_chain(&log.all().unwrap()).unwrap();
    }

    #[test]
    fn records_for_filters_by_target_and_scope() {
        let log = MemoryAuditLog::new();
        let coach = Principal::coach("c");
        let draft = Uuid::new_v4();
        let proposal = Uuid::new_v4();
        let mut batch = vec![
            AuditRecord::new(&coach, AuditAction::ProposalCreated)
                .with_target(proposal_ref(proposal))
                .with_scope(draft_ref(draft)),
            AuditRecord::new(&coach, AuditAction::DraftCreated)
                .with_target(draft_ref(Uuid::new_v4())),
        ];
        log.append(&mut batch).unwrap();

        assert_eq!(log.records_for(&draft_ref(draft)).unwrap().len(), 1);
        assert_eq!(log.records_for(&proposal_ref(proposal)).unwrap().len(), 1);
        assert!(log.records_for("draft:none").unwrap().is_empty());
    }
}
