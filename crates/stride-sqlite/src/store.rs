// store.rs - SqliteStore: one database for proposals, policy, and audit.
//
// Every write runs in a single IMMEDIATE transaction that also appends its
// audit rows, so a mutation and its audit records commit together. State
// transitions are `UPDATE ... WHERE proposal_id = ? AND state = ?` with a
// row-count check, and plan updates are conditional on `plan_revision` the
// same way. The chain head is read from the last audit row inside each
// transaction, which keeps the chain intact across processes sharing a file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use stride_audit::{verify_chain, AuditError, AuditRecord, AuditSink, ChainHead};
use stride_policy::{PolicyError, PolicyProfile, PolicyStore};
use stride_proposal::{Draft, Proposal, ProposalState, ProposalStore, StoreError, UnitOfWork};
use uuid::Uuid;

use crate::error::SqliteError;
use crate::schema;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SqliteError> {
        let path = path.as_ref().to_path_buf();
        tracing::info!(path = %path.display(), "opening sqlite store");

        let conn = Connection::open(&path).map_err(|source| SqliteError::Open {
            path: path.clone(),
            source,
        })?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        schema::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path),
        })
    }

    /// Open an in-memory database (for tests and dry runs).
    pub fn open_in_memory() -> Result<Self, SqliteError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteError> {
        self.conn.lock().map_err(|_| SqliteError::LockPoisoned)
    }

    /// Verify the stored audit chain. Returns the number of records.
    pub fn verify_audit(&self) -> Result<usize, AuditError> {
        let records = self.all()?;
        verify_chain(&records)?;
        Ok(records.len())
    }

    fn transact<T>(
        &self,
        work: impl FnOnce(&Transaction<'_>) -> Result<T, SqliteError>,
    ) -> Result<T, SqliteError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = work(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

fn append_audit(tx: &Transaction<'_>, records: &mut [AuditRecord]) -> Result<(), SqliteError> {
    let last: Option<(i64, String)> = tx
        .query_row(
            "SELECT sequence, record_hash FROM audit_records ORDER BY sequence DESC LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let mut head = match last {
        Some((sequence, hash)) => ChainHead::resume(sequence as u64, Some(hash)),
        None => ChainHead::default(),
    };

    for record in records.iter_mut() {
        head.seal(record)?;
        tx.execute(
            "INSERT INTO audit_records (sequence, target, scope, record_hash, body)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.sequence as i64,
                record.target,
                record.scope,
                record.record_hash,
                serde_json::to_string(record)?
            ],
        )?;
    }
    Ok(())
}

fn read_bodies<T: serde::de::DeserializeOwned>(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<T>, SqliteError> {
    let mut stmt = conn.prepare(sql)?;
    let bodies = stmt
        .query_map(params, |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<String>, _>>()?;
    bodies
        .iter()
        .map(|body| serde_json::from_str(body).map_err(SqliteError::from))
        .collect()
}

fn read_body<T: serde::de::DeserializeOwned>(
    conn: &Connection,
    sql: &str,
    id: &str,
) -> Result<Option<T>, SqliteError> {
    let body: Option<String> = conn
        .query_row(sql, [id], |row| row.get(0))
        .optional()?;
    body.map(|b| serde_json::from_str(&b))
        .transpose()
        .map_err(SqliteError::from)
}

fn draft_revision(tx: &Transaction<'_>, draft_id: Uuid) -> Result<Option<u64>, SqliteError> {
    let revision: Option<i64> = tx
        .query_row(
            "SELECT plan_revision FROM drafts WHERE draft_id = ?1",
            [draft_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(revision.map(|r| r as u64))
}

fn commit_unit(tx: &Transaction<'_>, unit: &mut UnitOfWork) -> Result<(), SqliteError> {
    unit.check_scope().map_err(SqliteError::Rejected)?;
    let draft_key = unit.draft_id.to_string();

    let current = draft_revision(tx, unit.draft_id)?.ok_or_else(|| {
        SqliteError::Rejected(StoreError::NotFound {
            entity: "draft",
            id: draft_key.clone(),
        })
    })?;

    if let Some(update) = &unit.draft {
        let changed = tx.execute(
            "UPDATE drafts SET plan_revision = ?1, body = ?2
             WHERE draft_id = ?3 AND plan_revision = ?4",
            params![
                update.draft.plan_revision as i64,
                serde_json::to_string(&update.draft)?,
                draft_key,
                update.expected_revision as i64
            ],
        )?;
        if changed == 0 {
            return Err(SqliteError::Rejected(StoreError::StaleDraft {
                draft_id: unit.draft_id,
                expected: update.expected_revision,
                actual: current,
            }));
        }
    }

    for update in &unit.updates {
        let id = update.proposal.proposal_id;
        let changed = tx.execute(
            "UPDATE proposals SET state = ?1, body = ?2
             WHERE proposal_id = ?3 AND state = ?4",
            params![
                update.proposal.state.as_str(),
                serde_json::to_string(&update.proposal)?,
                id.to_string(),
                update.expected.as_str()
            ],
        )?;
        if changed == 0 {
            let actual: Option<String> = tx
                .query_row(
                    "SELECT state FROM proposals WHERE proposal_id = ?1",
                    [id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            return Err(SqliteError::Rejected(match actual {
                None => StoreError::NotFound {
                    entity: "proposal",
                    id: id.to_string(),
                },
                Some(state) => StoreError::StateMismatch {
                    proposal_id: id,
                    expected: update.expected,
                    actual: state.parse::<ProposalState>().map_err(|e| {
                        SqliteError::Rejected(StoreError::Unavailable(e.to_string()))
                    })?,
                },
            }));
        }
    }

    for proposal in &unit.inserts {
        let exists = tx
            .query_row(
                "SELECT 1 FROM proposals WHERE proposal_id = ?1",
                [proposal.proposal_id.to_string()],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if exists {
            return Err(SqliteError::Rejected(StoreError::Duplicate(format!(
                "proposal {}",
                proposal.proposal_id
            ))));
        }
        tx.execute(
            "INSERT INTO proposals (proposal_id, draft_id, state, body) VALUES (?1, ?2, ?3, ?4)",
            params![
                proposal.proposal_id.to_string(),
                draft_key,
                proposal.state.as_str(),
                serde_json::to_string(proposal)?
            ],
        )?;
    }

    append_audit(tx, &mut unit.audit)
}

impl ProposalStore for SqliteStore {
    fn insert_draft(&self, draft: &Draft, audit: &mut [AuditRecord]) -> Result<(), StoreError> {
        self.transact(|tx| {
            if draft_revision(tx, draft.draft_id)?.is_some() {
                return Err(SqliteError::Rejected(StoreError::Duplicate(format!(
                    "draft {}",
                    draft.draft_id
                ))));
            }
            tx.execute(
                "INSERT INTO drafts (draft_id, plan_revision, body) VALUES (?1, ?2, ?3)",
                params![
                    draft.draft_id.to_string(),
                    draft.plan_revision as i64,
                    serde_json::to_string(draft)?
                ],
            )?;
            append_audit(tx, audit)
        })?;
        Ok(())
    }

    fn draft(&self, draft_id: Uuid) -> Result<Option<Draft>, StoreError> {
        let conn = self.lock()?;
        Ok(read_body(
            &conn,
            "SELECT body FROM drafts WHERE draft_id = ?1",
            &draft_id.to_string(),
        )?)
    }

    fn proposal(&self, proposal_id: Uuid) -> Result<Option<Proposal>, StoreError> {
        let conn = self.lock()?;
        Ok(read_body(
            &conn,
            "SELECT body FROM proposals WHERE proposal_id = ?1",
            &proposal_id.to_string(),
        )?)
    }

    fn proposals_for_draft(&self, draft_id: Uuid) -> Result<Vec<Proposal>, StoreError> {
        let conn = self.lock()?;
        let exists = conn
            .query_row(
                "SELECT 1 FROM drafts WHERE draft_id = ?1",
                [draft_id.to_string()],
                |_| Ok(()),
            )
            .optional()
            .map_err(SqliteError::from)?
            .is_some();
        if !exists {
            return Err(StoreError::NotFound {
                entity: "draft",
                id: draft_id.to_string(),
            });
        }
        Ok(read_bodies(
            &conn,
            "SELECT body FROM proposals WHERE draft_id = ?1 ORDER BY rowid",
            [draft_id.to_string()],
        )?)
    }

    fn commit(&self, mut unit: UnitOfWork) -> Result<Vec<AuditRecord>, StoreError> {
        self.transact(|tx| commit_unit(tx, &mut unit))?;
        Ok(unit.audit)
    }
}

impl PolicyStore for SqliteStore {
    fn read_all(&self) -> Result<BTreeMap<String, PolicyProfile>, PolicyError> {
        let conn = self.lock()?;
        let profiles: Vec<PolicyProfile> = read_bodies(
            &conn,
            "SELECT body FROM policy_profiles ORDER BY profile_id",
            [],
        )?;
        Ok(profiles
            .into_iter()
            .map(|p| (p.profile_id.clone(), p))
            .collect())
    }

    fn write(&self, profile: &PolicyProfile, audit: &mut AuditRecord) -> Result<(), PolicyError> {
        self.transact(|tx| {
            tx.execute(
                "INSERT INTO policy_profiles (profile_id, body, modified_by, modified_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(profile_id) DO UPDATE SET
                     body = excluded.body,
                     modified_by = excluded.modified_by,
                     modified_at = excluded.modified_at",
                params![
                    profile.profile_id,
                    serde_json::to_string(profile)?,
                    profile.modified_by,
                    profile.modified_at.map(|t| t.to_rfc3339())
                ],
            )?;
            append_audit(tx, std::slice::from_mut(audit))
        })?;
        Ok(())
    }

    fn read(&self, profile_id: &str) -> Result<Option<PolicyProfile>, PolicyError> {
        let conn = self.lock()?;
        Ok(read_body(
            &conn,
            "SELECT body FROM policy_profiles WHERE profile_id = ?1",
            profile_id,
        )?)
    }
}

impl AuditSink for SqliteStore {
    fn append(&self, records: &mut [AuditRecord]) -> Result<(), AuditError> {
        self.transact(|tx| append_audit(tx, records))?;
        Ok(())
    }

    fn records_for(&self, reference: &str) -> Result<Vec<AuditRecord>, AuditError> {
        let conn = self.lock()?;
        Ok(read_bodies(
            &conn,
            "SELECT body FROM audit_records WHERE target = ?1 OR scope = ?1 ORDER BY sequence",
            [reference],
        )?)
    }

    fn all(&self) -> Result<Vec<AuditRecord>, AuditError> {
        let conn = self.lock()?;
        Ok(read_bodies(
            &conn,
            "SELECT body FROM audit_records ORDER BY sequence",
            [],
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stride_audit::{draft_ref, policy_ref, AuditAction, Principal};
    use stride_policy::{OverrideBundle, PolicyValue, ProjectedImpact, MAX_HOURS_DELTA};
    use stride_proposal::ProposalKind;
    use tempfile::tempdir;

    fn coach() -> Principal {
        Principal::coach("coach-1")
    }

    fn seeded(store: &SqliteStore) -> (Draft, Proposal) {
        let draft = Draft::new("athlete-1", "coach-1", json!({"sessions": {}}));
        let mut audit = [AuditRecord::new(&coach(), AuditAction::DraftCreated)
            .with_target(draft_ref(draft.draft_id))];
        store.insert_draft(&draft, &mut audit).unwrap();

        let proposal = Proposal::new(
            draft.draft_id,
            ProposalKind::Forward,
            json!({"edits": []}),
            ProjectedImpact::default(),
            "coach-1",
        );
        store
            .commit(
                UnitOfWork::new(draft.draft_id)
                    .insert(proposal.clone())
                    .audit(AuditRecord::new(&coach(), AuditAction::ProposalCreated)),
            )
            .unwrap();
        (draft, proposal)
    }

    #[test]
    fn draft_and_proposal_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let (draft, proposal) = seeded(&store);

        assert_eq!(store.draft(draft.draft_id).unwrap().unwrap(), draft);
        assert_eq!(
            store.proposal(proposal.proposal_id).unwrap().unwrap(),
            proposal
        );
        assert_eq!(store.proposals_for_draft(draft.draft_id).unwrap(), vec![proposal]);
        assert!(store.draft(Uuid::new_v4()).unwrap().is_none());
        assert!(matches!(
            store.proposals_for_draft(Uuid::new_v4()),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn conditional_update_is_enforced() {
        let store = SqliteStore::open_in_memory().unwrap();
        let (draft, proposal) = seeded(&store);
        let applied = proposal.transitioned(ProposalState::Applied).unwrap();

        store
            .commit(UnitOfWork::new(draft.draft_id).update(ProposalState::Pending, applied.clone()))
            .unwrap();
        let err = store
            .commit(UnitOfWork::new(draft.draft_id).update(ProposalState::Pending, applied))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::StateMismatch {
                actual: ProposalState::Applied,
                ..
            }
        ));
    }

    #[test]
    fn failed_unit_rolls_back_everything() {
        let store = SqliteStore::open_in_memory().unwrap();
        let (draft, proposal) = seeded(&store);
        let before = store.all().unwrap().len();

        // Valid draft update, invalid proposal update: nothing may stick.
        let wrong = proposal.transitioned(ProposalState::Rejected).unwrap();
        let err = store
            .commit(
                UnitOfWork::new(draft.draft_id)
                    .with_draft(0, draft.revised(json!({"sessions": {"x": {"hours": 1.0}}})))
                    .update(ProposalState::Applied, wrong)
                    .audit(AuditRecord::new(&coach(), AuditAction::ProposalRejected)),
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::StateMismatch { .. }));
        assert_eq!(store.draft(draft.draft_id).unwrap().unwrap().plan_revision, 0);
        assert_eq!(store.all().unwrap().len(), before);
    }

    #[test]
    fn stale_revision_is_reported() {
        let store = SqliteStore::open_in_memory().unwrap();
        let (draft, _) = seeded(&store);
        let next = draft.revised(json!({"sessions": {}}));
        store
            .commit(UnitOfWork::new(draft.draft_id).with_draft(0, next.clone()))
            .unwrap();
        let err = store
            .commit(UnitOfWork::new(draft.draft_id).with_draft(0, next))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::StaleDraft {
                expected: 0,
                actual: 1,
                ..
            }
        ));
    }

    #[test]
    fn policy_profiles_upsert_and_list() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ops = Principal::admin("ops");
        for cap in [5.0, 2.0] {
            let profile = PolicyProfile::new(
                "default",
                OverrideBundle::new().with(MAX_HOURS_DELTA, PolicyValue::Number(cap)),
            );
            let mut record =
                AuditRecord::new(&ops, AuditAction::PolicyUpserted).with_target(policy_ref("default"));
            store.write(&profile, &mut record).unwrap();
        }

        let all = store.read_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all["default"].overrides.number(MAX_HOURS_DELTA), Some(2.0));
        assert_eq!(store.records_for(&policy_ref("default")).unwrap().len(), 2);
    }

    #[test]
    fn audit_chain_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stride.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            seeded(&store);
        }
        let store = SqliteStore::open(&path).unwrap();
        seeded(&store);

        assert_eq!(store.verify_audit().unwrap(), 4);
        let sequences: Vec<u64> = store.all().unwrap().iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3, 4]);
    }
}
