// batch_approval.rs - Batch approve/reject behaviour under a cap.

use std::sync::Arc;

use serde_json::{json, Value};
use uuid::Uuid;

use stride_audit::{AuditError, AuditRecord, AuditSink, MemoryAuditLog, Principal};
use stride_policy::{
    MemoryPolicyStore, OverrideBundle, PolicyProfile, PolicyRuntimeCache, PolicyValue,
    MAX_HOURS_DELTA,
};
use stride_proposal::{
    BatchMode, BatchOutcome, BatchRequest, Draft, LifecycleEngine, MemoryProposalStore,
    ProposalState, SessionEdits, SkipReason,
};

fn engine_with(profiles: Vec<PolicyProfile>) -> LifecycleEngine {
    let audit = Arc::new(MemoryAuditLog::new());
    let policy = Arc::new(MemoryPolicyStore::new(audit.clone()).with_profiles(profiles));
    let cache = Arc::new(PolicyRuntimeCache::load(policy).unwrap());
    LifecycleEngine::new(
        Arc::new(MemoryProposalStore::new(audit)),
        Arc::new(SessionEdits),
        cache,
    )
}

fn engine() -> LifecycleEngine {
    engine_with(Vec::new())
}

fn coach() -> Principal {
    Principal::coach("coach-1")
}

fn add_hours(session: &str, hours: f64) -> Value {
    json!({"edits": [{"op": "upsert", "session": session, "value": {"hours": hours}}]})
}

fn draft(engine: &LifecycleEngine) -> Draft {
    engine
        .create_draft(
            &coach(),
            "athlete-1",
            "coach-1",
            json!({"sessions": {"mon": {"hours": 1.0}}}),
            None,
        )
        .unwrap()
}

fn request(draft: &Draft, candidates: Vec<Uuid>, max_hours: f64, mode: BatchMode) -> BatchRequest {
    BatchRequest {
        draft_id: draft.draft_id,
        candidates,
        max_hours,
        mode,
    }
}

#[test]
fn three_hour_proposal_under_cap_five_is_applied() {
    let engine = engine();
    let d = draft(&engine);
    let p1 = engine.create(&coach(), d.draft_id, add_hours("tue", 3.0)).unwrap();

    let report = engine
        .batch_approve(&coach(), &request(&d, vec![p1.proposal_id], 5.0, BatchMode::Approve))
        .unwrap();

    assert_eq!(report.outcome(p1.proposal_id), Some(&BatchOutcome::Applied));
    assert_eq!(
        engine.get_proposal(p1.proposal_id).unwrap().state,
        ProposalState::Applied
    );
}

#[test]
fn three_hour_proposal_over_cap_two_is_skipped() {
    let engine = engine();
    let d = draft(&engine);
    let p1 = engine.create(&coach(), d.draft_id, add_hours("tue", 3.0)).unwrap();

    let report = engine
        .batch_approve(&coach(), &request(&d, vec![p1.proposal_id], 2.0, BatchMode::Approve))
        .unwrap();

    assert_eq!(
        report.outcome(p1.proposal_id),
        Some(&BatchOutcome::Skipped {
            reason: SkipReason::ExceedsCap
        })
    );
    assert_eq!(
        engine.get_proposal(p1.proposal_id).unwrap().state,
        ProposalState::Pending
    );
}

#[test]
fn approve_splits_candidates_on_the_cap() {
    let engine = engine();
    let d = draft(&engine);
    let small = engine.create(&coach(), d.draft_id, add_hours("tue", 1.0)).unwrap();
    let large = engine.create(&coach(), d.draft_id, add_hours("wed", 4.0)).unwrap();
    let equal = engine.create(&coach(), d.draft_id, add_hours("thu", 2.0)).unwrap();

    let report = engine
        .batch_approve(
            &coach(),
            &request(
                &d,
                vec![small.proposal_id, large.proposal_id, equal.proposal_id],
                2.0,
                BatchMode::Approve,
            ),
        )
        .unwrap();

    assert_eq!(report.items.len(), 3);
    assert_eq!(report.items[0].proposal_id, small.proposal_id);
    assert_eq!(report.applied(), 2);
    assert_eq!(report.skipped(), 1);
    assert_eq!(
        engine.get_proposal(large.proposal_id).unwrap().state,
        ProposalState::Pending
    );
    assert_eq!(
        engine.get_proposal(equal.proposal_id).unwrap().state,
        ProposalState::Applied
    );
}

#[test]
fn reject_mode_ignores_impact() {
    let engine = engine();
    let d = draft(&engine);
    let huge = engine.create(&coach(), d.draft_id, add_hours("tue", 40.0)).unwrap();
    let tiny = engine.create(&coach(), d.draft_id, add_hours("wed", 0.5)).unwrap();

    let report = engine
        .batch_approve(
            &coach(),
            &request(
                &d,
                vec![huge.proposal_id, tiny.proposal_id],
                0.0,
                BatchMode::Reject,
            ),
        )
        .unwrap();

    assert_eq!(report.rejected(), 2);
    for id in [huge.proposal_id, tiny.proposal_id] {
        assert_eq!(
            engine.get_proposal(id).unwrap().state,
            ProposalState::Rejected
        );
    }
}

#[test]
fn non_pending_candidates_are_skipped() {
    let engine = engine();
    let d = draft(&engine);
    let done = engine.create(&coach(), d.draft_id, add_hours("tue", 1.0)).unwrap();
    engine.reject(&coach(), done.proposal_id).unwrap();

    for mode in [BatchMode::Approve, BatchMode::Reject] {
        let report = engine
            .batch_approve(&coach(), &request(&d, vec![done.proposal_id], 5.0, mode))
            .unwrap();
        assert_eq!(
            report.outcome(done.proposal_id),
            Some(&BatchOutcome::Skipped {
                reason: SkipReason::NotPending
            })
        );
    }
}

#[test]
fn safety_rejection_fails_only_that_item() {
    let strict = PolicyProfile::new(
        "default",
        OverrideBundle::new().with(MAX_HOURS_DELTA, PolicyValue::Number(1.0)),
    );
    let engine = engine_with(vec![strict]);
    let d = draft(&engine);
    let blocked = engine.create(&coach(), d.draft_id, add_hours("tue", 3.0)).unwrap();
    let fine = engine.create(&coach(), d.draft_id, add_hours("wed", 1.0)).unwrap();

    let report = engine
        .batch_approve(
            &coach(),
            &request(
                &d,
                vec![blocked.proposal_id, fine.proposal_id],
                10.0,
                BatchMode::Approve,
            ),
        )
        .unwrap();

    match report.outcome(blocked.proposal_id) {
        Some(BatchOutcome::Failed { code, .. }) => assert_eq!(code, "safety-rejected"),
        other => panic!("expected failed outcome, got {:?}", other),
    }
    assert_eq!(report.outcome(fine.proposal_id), Some(&BatchOutcome::Applied));
}

#[test]
fn unknown_and_foreign_candidates_fail_not_found() {
    let engine = engine();
    let d = draft(&engine);
    let other = draft(&engine);
    let foreign = engine
        .create(&coach(), other.draft_id, add_hours("tue", 1.0))
        .unwrap();
    let missing = Uuid::new_v4();

    let report = engine
        .batch_approve(
            &coach(),
            &request(&d, vec![missing, foreign.proposal_id], 5.0, BatchMode::Approve),
        )
        .unwrap();
    assert_eq!(report.failed(), 2);
    for item in &report.items {
        match &item.outcome {
            BatchOutcome::Failed { code, .. } => assert_eq!(code, "not-found"),
            other => panic!("expected failed outcome, got {:?}", other),
        }
    }
    assert_eq!(
        engine.get_proposal(foreign.proposal_id).unwrap().state,
        ProposalState::Pending
    );
}

/// Sink that accepts a fixed number of appends and then fails.
struct FailingAfter {
    inner: MemoryAuditLog,
    remaining: std::sync::Mutex<usize>,
}

impl AuditSink for FailingAfter {
    fn append(&self, records: &mut [AuditRecord]) -> Result<(), AuditError> {
        let mut remaining = self.remaining.lock().unwrap();
        if *remaining == 0 {
            return Err(AuditError::Unavailable("audit disk full".to_string()));
        }
        *remaining -= 1;
        self.inner.append(records)
    }
    fn records_for(&self, reference: &str) -> Result<Vec<AuditRecord>, AuditError> {
        self.inner.records_for(reference)
    }
    fn all(&self) -> Result<Vec<AuditRecord>, AuditError> {
        self.inner.all()
    }
}

#[test]
fn store_outage_is_a_failed_item_not_an_abort() {
    // Draft + two creates succeed; every apply after that fails its audit write.
    let audit = Arc::new(FailingAfter {
        inner: MemoryAuditLog::new(),
        remaining: std::sync::Mutex::new(3),
    });
    let policy = Arc::new(MemoryPolicyStore::new(Arc::new(MemoryAuditLog::new())));
    let engine = LifecycleEngine::new(
        Arc::new(MemoryProposalStore::new(audit)),
        Arc::new(SessionEdits),
        Arc::new(PolicyRuntimeCache::load(policy).unwrap()),
    );
    let d = draft(&engine);
    let a = engine.create(&coach(), d.draft_id, add_hours("tue", 1.0)).unwrap();
    let b = engine.create(&coach(), d.draft_id, add_hours("wed", 1.0)).unwrap();

    let report = engine
        .batch_approve(
            &coach(),
            &request(&d, vec![a.proposal_id, b.proposal_id], 5.0, BatchMode::Approve),
        )
        .unwrap();

    assert_eq!(report.failed(), 2);
    for item in &report.items {
        match &item.outcome {
            BatchOutcome::Failed { code, .. } => assert_eq!(code, "store-unavailable"),
            other => panic!("expected failed outcome, got {:?}", other),
        }
    }
    assert_eq!(
        engine.get_proposal(a.proposal_id).unwrap().state,
        ProposalState::Pending
    );
    assert_eq!(engine.get_draft(d.draft_id).unwrap().plan_revision, 0);
}

#[test]
fn malformed_request_is_a_validation_error() {
    let engine = engine();
    let d = draft(&engine);
    let err = engine
        .batch_approve(&coach(), &request(&d, vec![], 5.0, BatchMode::Approve))
        .unwrap_err();
    assert_eq!(err.code(), "validation-error");

    let missing = BatchRequest {
        draft_id: Uuid::new_v4(),
        candidates: vec![Uuid::new_v4()],
        max_hours: 5.0,
        mode: BatchMode::Approve,
    };
    assert_eq!(
        engine.batch_approve(&coach(), &missing).unwrap_err().code(),
        "not-found"
    );
}
