// store.rs - ProposalStore: persistence for drafts and proposals.
//
// All mutation goes through `commit(UnitOfWork)`. A unit names one draft and
// carries every change the lifecycle engine wants to make in one step:
//
// - an optional replacement draft, conditional on the revision it was read at
// - new proposals
// - proposal updates, each conditional on the state it was read in
// - the audit records describing all of the above
//
// A store validates every condition first, appends the audit records, and
// only then publishes the changes. Any failure leaves the store untouched.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use stride_audit::{AuditRecord, AuditSink};
use uuid::Uuid;

use crate::draft::Draft;
use crate::error::StoreError;
use crate::proposal::{Proposal, ProposalState};

/// A draft replacement, applied only if the stored revision still matches.
#[derive(Debug, Clone)]
pub struct DraftUpdate {
    pub expected_revision: u64,
    pub draft: Draft,
}

/// A proposal replacement, applied only if the stored state still matches.
#[derive(Debug, Clone)]
pub struct ProposalUpdate {
    pub expected: ProposalState,
    pub proposal: Proposal,
}

/// Everything one lifecycle step changes, committed as a single unit.
#[derive(Debug, Clone)]
pub struct UnitOfWork {
    pub draft_id: Uuid,
    pub draft: Option<DraftUpdate>,
    pub inserts: Vec<Proposal>,
    pub updates: Vec<ProposalUpdate>,
    pub audit: Vec<AuditRecord>,
}

impl UnitOfWork {
    pub fn new(draft_id: Uuid) -> Self {
        Self {
            draft_id,
            draft: None,
            inserts: Vec::new(),
            updates: Vec::new(),
            audit: Vec::new(),
        }
    }

    pub fn with_draft(mut self, expected_revision: u64, draft: Draft) -> Self {
        self.draft = Some(DraftUpdate {
            expected_revision,
            draft,
        });
        self
    }

    pub fn insert(mut self, proposal: Proposal) -> Self {
        self.inserts.push(proposal);
        self
    }

    pub fn update(mut self, expected: ProposalState, proposal: Proposal) -> Self {
        self.updates.push(ProposalUpdate { expected, proposal });
        self
    }

    pub fn audit(mut self, record: AuditRecord) -> Self {
        self.audit.push(record);
        self
    }

    /// Check that every record in the unit belongs to the unit's draft.
    pub fn check_scope(&self) -> Result<(), StoreError> {
        if let Some(update) = &self.draft {
            if update.draft.draft_id != self.draft_id {
                return Err(StoreError::Unavailable(format!(
                    "unit for draft {} carries draft {}",
                    self.draft_id, update.draft.draft_id
                )));
            }
        }
        let proposals = self
            .inserts
            .iter()
            .chain(self.updates.iter().map(|u| &u.proposal));
        for proposal in proposals {
            if proposal.draft_id != self.draft_id {
                return Err(StoreError::Unavailable(format!(
                    "unit for draft {} carries proposal {} of draft {}",
                    self.draft_id, proposal.proposal_id, proposal.draft_id
                )));
            }
        }
        Ok(())
    }
}

/// Durable storage for drafts and their proposals.
pub trait ProposalStore: Send + Sync {
    /// Store a new draft together with its audit records.
    fn insert_draft(&self, draft: &Draft, audit: &mut [AuditRecord]) -> Result<(), StoreError>;

    fn draft(&self, draft_id: Uuid) -> Result<Option<Draft>, StoreError>;

    fn proposal(&self, proposal_id: Uuid) -> Result<Option<Proposal>, StoreError>;

    /// Every proposal of a draft, oldest first.
    fn proposals_for_draft(&self, draft_id: Uuid) -> Result<Vec<Proposal>, StoreError>;

    /// Validate and commit `unit` atomically. Returns the sealed audit records.
    fn commit(&self, unit: UnitOfWork) -> Result<Vec<AuditRecord>, StoreError>;
}

struct Partition {
    draft: Draft,
    proposals: HashMap<Uuid, Proposal>,
    order: Vec<Uuid>,
}

/// Process-local proposal store.
///
/// Each draft is its own partition behind its own mutex, so commits against
/// different drafts never contend. Lock order is partition, then index.
pub struct MemoryProposalStore {
    partitions: RwLock<HashMap<Uuid, Arc<Mutex<Partition>>>>,
    index: RwLock<HashMap<Uuid, Uuid>>,
    audit: Arc<dyn AuditSink>,
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("proposal store lock poisoned".to_string())
}

impl MemoryProposalStore {
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self {
            partitions: RwLock::new(HashMap::new()),
            index: RwLock::new(HashMap::new()),
            audit,
        }
    }

    pub fn audit_sink(&self) -> &Arc<dyn AuditSink> {
        &self.audit
    }

    fn partition(&self, draft_id: Uuid) -> Result<Option<Arc<Mutex<Partition>>>, StoreError> {
        let partitions = self.partitions.read().map_err(|_| poisoned())?;
        Ok(partitions.get(&draft_id).cloned())
    }
}

impl ProposalStore for MemoryProposalStore {
    fn insert_draft(&self, draft: &Draft, audit: &mut [AuditRecord]) -> Result<(), StoreError> {
        let mut partitions = self.partitions.write().map_err(|_| poisoned())?;
        if partitions.contains_key(&draft.draft_id) {
            return Err(StoreError::Duplicate(format!("draft {}", draft.draft_id)));
        }
        self.audit.append(audit)?;
        partitions.insert(
            draft.draft_id,
            Arc::new(Mutex::new(Partition {
                draft: draft.clone(),
                proposals: HashMap::new(),
                order: Vec::new(),
            })),
        );
        Ok(())
    }

    fn draft(&self, draft_id: Uuid) -> Result<Option<Draft>, StoreError> {
        match self.partition(draft_id)? {
            Some(partition) => {
                let partition = partition.lock().map_err(|_| poisoned())?;
                Ok(Some(partition.draft.clone()))
            }
            None => Ok(None),
        }
    }

    fn proposal(&self, proposal_id: Uuid) -> Result<Option<Proposal>, StoreError> {
        let draft_id = {
            let index = self.index.read().map_err(|_| poisoned())?;
            match index.get(&proposal_id) {
                Some(draft_id) => *draft_id,
                None => return Ok(None),
            }
        };
        match self.partition(draft_id)? {
            Some(partition) => {
                let partition = partition.lock().map_err(|_| poisoned())?;
                Ok(partition.proposals.get(&proposal_id).cloned())
            }
            None => Ok(None),
        }
    }

    fn proposals_for_draft(&self, draft_id: Uuid) -> Result<Vec<Proposal>, StoreError> {
        let partition = self.partition(draft_id)?.ok_or_else(|| StoreError::NotFound {
            entity: "draft",
            id: draft_id.to_string(),
        })?;
        let partition = partition.lock().map_err(|_| poisoned())?;
        Ok(partition
            .order
            .iter()
            .filter_map(|id| partition.proposals.get(id).cloned())
            .collect())
    }

    fn commit(&self, mut unit: UnitOfWork) -> Result<Vec<AuditRecord>, StoreError> {
        unit.check_scope()?;
        let partition = self
            .partition(unit.draft_id)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "draft",
                id: unit.draft_id.to_string(),
            })?;
        let mut partition = partition.lock().map_err(|_| poisoned())?;

        // Validate every condition before touching anything.
        if let Some(update) = &unit.draft {
            if partition.draft.plan_revision != update.expected_revision {
                return Err(StoreError::StaleDraft {
                    draft_id: unit.draft_id,
                    expected: update.expected_revision,
                    actual: partition.draft.plan_revision,
                });
            }
        }
        for update in &unit.updates {
            let current = partition
                .proposals
                .get(&update.proposal.proposal_id)
                .ok_or_else(|| StoreError::NotFound {
                    entity: "proposal",
                    id: update.proposal.proposal_id.to_string(),
                })?;
            if current.state != update.expected {
                return Err(StoreError::StateMismatch {
                    proposal_id: current.proposal_id,
                    expected: update.expected,
                    actual: current.state,
                });
            }
        }
        {
            let index = self.index.read().map_err(|_| poisoned())?;
            for proposal in &unit.inserts {
                if index.contains_key(&proposal.proposal_id) {
                    return Err(StoreError::Duplicate(format!(
                        "proposal {}",
                        proposal.proposal_id
                    )));
                }
            }
        }

        // Audit first: if it fails nothing below runs.
        self.audit.append(&mut unit.audit)?;

        let mut index = self.index.write().map_err(|_| poisoned())?;
        if let Some(update) = unit.draft {
            partition.draft = update.draft;
        }
        for proposal in unit.inserts {
            index.insert(proposal.proposal_id, proposal.draft_id);
            partition.order.push(proposal.proposal_id);
            partition.proposals.insert(proposal.proposal_id, proposal);
        }
        for update in unit.updates {
            partition
                .proposals
                .insert(update.proposal.proposal_id, update.proposal);
        }

        Ok(unit.audit)
    }
}
