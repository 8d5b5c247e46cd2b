// lifecycle.rs - The proposal lifecycle engine.
//
// Every mutating call takes the acting Principal explicitly and ends in a
// single `ProposalStore::commit`. The commit carries the expected prior
// state of each proposal it touches, so two callers racing on the same
// proposal cannot both win: the loser's commit fails its condition and the
// caller sees Conflict.
//
// Apply also carries the draft revision it computed the new plan from. If
// another proposal on the same draft committed first, the plan is recomputed
// from the fresh draft and the commit retried, up to `apply_attempts` times.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use stride_audit::{draft_ref, proposal_ref, AuditAction, AuditRecord, Principal};
use stride_policy::profile::validate_profile_id;
use stride_policy::{evaluate, PolicyRuntimeCache, ProjectedImpact, SafetyVerdict, Thresholds};
use uuid::Uuid;

use crate::content::PlanContent;
use crate::draft::Draft;
use crate::error::{ProposalError, StoreError};
use crate::proposal::{Proposal, ProposalKind, ProposalState};
use crate::store::{ProposalStore, UnitOfWork};
use crate::telemetry::CostEstimator;

/// Apply attempts made when the draft plan keeps moving underneath.
pub const DEFAULT_APPLY_ATTEMPTS: u32 = 3;

/// A side-effect-free look at what applying a proposal would do now.
#[derive(Debug, Clone, Serialize)]
pub struct Preview {
    pub proposal_id: Uuid,
    pub draft_id: Uuid,
    pub state: ProposalState,
    pub impact: ProjectedImpact,
    pub thresholds: Thresholds,
    pub verdict: SafetyVerdict,
}

pub(crate) enum ApplyOutcome {
    Applied(Proposal),
    ExceedsCap(ProjectedImpact),
}

enum ApplyStep {
    Done(ApplyOutcome),
    Stale(StoreError),
}

pub struct LifecycleEngine {
    store: Arc<dyn ProposalStore>,
    content: Arc<dyn PlanContent>,
    cache: Arc<PolicyRuntimeCache>,
    cost: Option<Arc<dyn CostEstimator>>,
    apply_attempts: u32,
}

fn transition_record(
    actor: &Principal,
    action: AuditAction,
    proposal: &Proposal,
    from: ProposalState,
) -> AuditRecord {
    AuditRecord::new(actor, action)
        .with_target(proposal_ref(proposal.proposal_id))
        .with_scope(draft_ref(proposal.draft_id))
        .with_before(json!({ "state": from }))
        .with_after(json!({ "state": proposal.state }))
}

impl LifecycleEngine {
    pub fn new(
        store: Arc<dyn ProposalStore>,
        content: Arc<dyn PlanContent>,
        cache: Arc<PolicyRuntimeCache>,
    ) -> Self {
        Self {
            store,
            content,
            cache,
            cost: None,
            apply_attempts: DEFAULT_APPLY_ATTEMPTS,
        }
    }

    pub fn with_cost_estimator(mut self, cost: Arc<dyn CostEstimator>) -> Self {
        self.cost = Some(cost);
        self
    }

    /// At least one attempt is always made.
    pub fn with_apply_attempts(mut self, attempts: u32) -> Self {
        self.apply_attempts = attempts.max(1);
        self
    }

    pub fn cache(&self) -> &Arc<PolicyRuntimeCache> {
        &self.cache
    }

    pub fn store(&self) -> &Arc<dyn ProposalStore> {
        &self.store
    }

    fn load_draft(&self, draft_id: Uuid) -> Result<Draft, ProposalError> {
        self.store
            .draft(draft_id)?
            .ok_or_else(|| ProposalError::not_found("draft", draft_id))
    }

    fn load_proposal(&self, proposal_id: Uuid) -> Result<Proposal, ProposalError> {
        self.store
            .proposal(proposal_id)?
            .ok_or_else(|| ProposalError::not_found("proposal", proposal_id))
    }

    fn require_unpublished(draft: &Draft) -> Result<(), ProposalError> {
        if draft.is_active() {
            Ok(())
        } else {
            Err(ProposalError::Conflict(format!(
                "draft {} is already {}",
                draft.draft_id, draft.status
            )))
        }
    }

    // ── Drafts ──────────────────────────────────────────────────

    /// Open a new draft for `athlete_id`, owned by `coach_id`.
    pub fn create_draft(
        &self,
        actor: &Principal,
        athlete_id: &str,
        coach_id: &str,
        plan: Value,
        policy_profile: Option<&str>,
    ) -> Result<Draft, ProposalError> {
        if athlete_id.is_empty() || coach_id.is_empty() {
            return Err(ProposalError::Validation(
                "athlete and coach ids must not be empty".to_string(),
            ));
        }
        self.content.validate_plan(&plan)?;

        let mut draft = Draft::new(athlete_id, coach_id, plan);
        if let Some(profile) = policy_profile {
            validate_profile_id(profile).map_err(|e| ProposalError::Validation(e.to_string()))?;
            draft = draft.with_profile(profile);
        }

        let mut audit = [AuditRecord::new(actor, AuditAction::DraftCreated)
            .with_target(draft_ref(draft.draft_id))
            .with_scope(draft_ref(draft.draft_id))
            .with_after(json!({
                "athlete_id": draft.athlete_id,
                "coach_id": draft.coach_id,
                "policy_profile": draft.policy_profile,
            }))];
        self.store.insert_draft(&draft, &mut audit)?;

        tracing::info!(draft_id = %draft.draft_id, actor = %actor, "draft created");
        Ok(draft)
    }

    /// Publish a draft. The plan of a published draft still changes through
    /// applied proposals; publishing twice is a conflict.
    pub fn publish_draft(&self, actor: &Principal, draft_id: Uuid) -> Result<Draft, ProposalError> {
        let draft = self.load_draft(draft_id)?;
        Self::require_unpublished(&draft)?;

        let published = draft.published();
        let unit = UnitOfWork::new(draft_id)
            .with_draft(draft.plan_revision, published.clone())
            .audit(
                AuditRecord::new(actor, AuditAction::DraftPublished)
                    .with_target(draft_ref(draft_id))
                    .with_scope(draft_ref(draft_id))
                    .with_before(json!({ "status": draft.status }))
                    .with_after(json!({ "status": published.status })),
            );
        self.store.commit(unit)?;

        tracing::info!(draft_id = %draft_id, actor = %actor, "draft published");
        Ok(published)
    }

    pub fn get_draft(&self, draft_id: Uuid) -> Result<Draft, ProposalError> {
        self.load_draft(draft_id)
    }

    // ── Proposals ───────────────────────────────────────────────

    /// Store a new forward proposal in `Pending`.
    pub fn create(
        &self,
        actor: &Principal,
        draft_id: Uuid,
        content: Value,
    ) -> Result<Proposal, ProposalError> {
        let draft = self.load_draft(draft_id)?;
        self.content.validate_change(&content)?;
        let impact = self.content.project(&draft.plan, &content)?;

        let proposal = Proposal::new(draft_id, ProposalKind::Forward, content, impact, &actor.id);
        let unit = UnitOfWork::new(draft_id).insert(proposal.clone()).audit(
            AuditRecord::new(actor, AuditAction::ProposalCreated)
                .with_target(proposal_ref(proposal.proposal_id))
                .with_scope(draft_ref(draft_id))
                .with_after(json!({ "state": proposal.state, "kind": proposal.kind }))
                .with_metadata(json!({ "impact": impact })),
        );
        self.store.commit(unit)?;

        tracing::info!(
            proposal_id = %proposal.proposal_id,
            draft_id = %draft_id,
            actor = %actor,
            "proposal created"
        );
        Ok(proposal)
    }

    pub fn get_proposal(&self, proposal_id: Uuid) -> Result<Proposal, ProposalError> {
        self.load_proposal(proposal_id)
    }

    /// Every proposal of a draft, oldest first.
    pub fn list_proposals(&self, draft_id: Uuid) -> Result<Vec<Proposal>, ProposalError> {
        self.load_draft(draft_id)?;
        Ok(self.store.proposals_for_draft(draft_id)?)
    }

    /// Project the proposal against the current plan and evaluate it against
    /// the current policy snapshot. Works in any state; changes nothing.
    pub fn preview(&self, proposal_id: Uuid) -> Result<Preview, ProposalError> {
        let proposal = self.load_proposal(proposal_id)?;
        let draft = self.load_draft(proposal.draft_id)?;
        let impact = self.content.project(&draft.plan, &proposal.content)?;
        let thresholds = self.cache.thresholds(&draft.policy_profile);
        let verdict = evaluate(&impact, &thresholds);

        tracing::debug!(
            proposal_id = %proposal_id,
            pass = verdict.pass,
            hours_delta = impact.hours_delta,
            "proposal previewed"
        );
        Ok(Preview {
            proposal_id,
            draft_id: draft.draft_id,
            state: proposal.state,
            impact,
            thresholds,
            verdict,
        })
    }

    /// Apply a pending proposal to its draft.
    ///
    /// The verdict is recomputed here against the current snapshot; a
    /// preview taken earlier does not count. Applying an undo proposal also
    /// moves the proposal it reverses to `Undone`.
    pub fn apply(&self, actor: &Principal, proposal_id: Uuid) -> Result<Proposal, ProposalError> {
        match self.apply_within(actor, proposal_id, None)? {
            ApplyOutcome::Applied(proposal) => Ok(proposal),
            ApplyOutcome::ExceedsCap(impact) => Err(ProposalError::Validation(format!(
                "hours delta {} exceeds cap",
                impact.hours_delta
            ))),
        }
    }

    /// Apply, first checking the freshly projected impact against `cap`.
    pub(crate) fn apply_within(
        &self,
        actor: &Principal,
        proposal_id: Uuid,
        cap: Option<f64>,
    ) -> Result<ApplyOutcome, ProposalError> {
        let mut attempt = 1;
        loop {
            match self.try_apply(actor, proposal_id, cap)? {
                ApplyStep::Done(outcome) => return Ok(outcome),
                ApplyStep::Stale(err) => {
                    if attempt >= self.apply_attempts {
                        return Err(err.into());
                    }
                    tracing::warn!(
                        proposal_id = %proposal_id,
                        attempt,
                        error = %err,
                        "draft plan moved during apply, retrying"
                    );
                    attempt += 1;
                }
            }
        }
    }

    fn try_apply(
        &self,
        actor: &Principal,
        proposal_id: Uuid,
        cap: Option<f64>,
    ) -> Result<ApplyStep, ProposalError> {
        let proposal = self.load_proposal(proposal_id)?;
        if proposal.state != ProposalState::Pending {
            return Err(ProposalError::Conflict(format!(
                "proposal {} is {}, only pending proposals can be applied",
                proposal_id, proposal.state
            )));
        }
        let draft = self.load_draft(proposal.draft_id)?;

        let impact = self.content.project(&draft.plan, &proposal.content)?;
        if let Some(cap) = cap {
            if !impact.within(cap) {
                return Ok(ApplyStep::Done(ApplyOutcome::ExceedsCap(impact)));
            }
        }

        let thresholds = self.cache.thresholds(&draft.policy_profile);
        let verdict = evaluate(&impact, &thresholds);
        if !verdict.pass {
            tracing::info!(
                proposal_id = %proposal_id,
                reason = %verdict.reason,
                limit = verdict.limit,
                "apply blocked by safety policy"
            );
            return Err(ProposalError::SafetyRejected {
                proposal_id,
                verdict: Box::new(verdict),
            });
        }

        let inverse = self.content.invert(&draft.plan, &proposal.content)?;
        let plan = self.content.apply(&draft.plan, &proposal.content)?;

        let mut applied = proposal.transitioned(ProposalState::Applied)?;
        applied.inverse = Some(inverse);
        applied.impact = impact;

        let mut metadata = json!({
            "impact": impact,
            "verdict": {
                "reason": verdict.reason,
                "limit": verdict.limit,
                "profile_id": verdict.profile_id,
                "generation": verdict.generation,
            },
        });
        if let Some(cost) = &self.cost {
            metadata["cost_estimate"] = json!(cost.estimate(&impact));
        }

        let mut unit = UnitOfWork::new(draft.draft_id)
            .with_draft(draft.plan_revision, draft.revised(plan))
            .update(ProposalState::Pending, applied.clone())
            .audit(
                transition_record(
                    actor,
                    AuditAction::ProposalApplied,
                    &applied,
                    ProposalState::Pending,
                )
                .with_metadata(metadata),
            );

        if let Some(original_id) = proposal.kind.undoes() {
            let original = self.load_proposal(original_id)?;
            if original.state != ProposalState::UndoPending {
                return Err(ProposalError::Conflict(format!(
                    "proposal {} is {}, expected undo_pending",
                    original_id, original.state
                )));
            }
            let undone = original.transitioned(ProposalState::Undone)?;
            unit = unit.update(ProposalState::UndoPending, undone.clone()).audit(
                transition_record(
                    actor,
                    AuditAction::UndoCompleted,
                    &undone,
                    ProposalState::UndoPending,
                )
                .with_metadata(json!({ "undo_proposal_id": proposal_id })),
            );
        }

        match self.store.commit(unit) {
            Ok(_) => {}
            Err(err @ StoreError::StaleDraft { .. }) => return Ok(ApplyStep::Stale(err)),
            Err(err) => return Err(err.into()),
        }

        tracing::info!(
            proposal_id = %proposal_id,
            draft_id = %applied.draft_id,
            actor = %actor,
            hours_delta = impact.hours_delta,
            kind = %applied.kind,
            "proposal applied"
        );
        Ok(ApplyStep::Done(ApplyOutcome::Applied(applied)))
    }

    /// Reject a pending proposal. Rejecting an undo proposal returns the
    /// proposal it would have reversed to `Applied`.
    pub fn reject(&self, actor: &Principal, proposal_id: Uuid) -> Result<Proposal, ProposalError> {
        let proposal = self.load_proposal(proposal_id)?;
        if proposal.state != ProposalState::Pending {
            return Err(ProposalError::Conflict(format!(
                "proposal {} is {}, only pending proposals can be rejected",
                proposal_id, proposal.state
            )));
        }

        let rejected = proposal.transitioned(ProposalState::Rejected)?;
        let mut unit = UnitOfWork::new(proposal.draft_id)
            .update(ProposalState::Pending, rejected.clone())
            .audit(transition_record(
                actor,
                AuditAction::ProposalRejected,
                &rejected,
                ProposalState::Pending,
            ));

        if let Some(original_id) = proposal.kind.undoes() {
            let original = self.load_proposal(original_id)?;
            let restored = original.transitioned(ProposalState::Applied)?;
            unit = unit
                .update(ProposalState::UndoPending, restored.clone())
                .audit(
                    transition_record(
                        actor,
                        AuditAction::UndoAbandoned,
                        &restored,
                        ProposalState::UndoPending,
                    )
                    .with_metadata(json!({ "undo_proposal_id": proposal_id })),
                );
        }

        self.store.commit(unit)?;

        tracing::info!(proposal_id = %proposal_id, actor = %actor, "proposal rejected");
        Ok(rejected)
    }

    /// Create the undo proposal for an applied proposal.
    ///
    /// The new proposal is `Pending` and carries the inverse recorded when
    /// the original was applied; the original moves to `UndoPending`. Only
    /// one undo may be outstanding per proposal.
    pub fn undo(&self, actor: &Principal, proposal_id: Uuid) -> Result<Proposal, ProposalError> {
        let original = self.load_proposal(proposal_id)?;
        if original.state != ProposalState::Applied {
            return Err(ProposalError::Conflict(format!(
                "proposal {} is {}, only applied proposals can be undone",
                proposal_id, original.state
            )));
        }
        let draft = self.load_draft(original.draft_id)?;

        let inverse = original.inverse.clone().ok_or_else(|| {
            ProposalError::Conflict(format!("proposal {} has no recorded inverse", proposal_id))
        })?;
        let impact = self.content.project(&draft.plan, &inverse)?;
        let undo = Proposal::new(
            draft.draft_id,
            ProposalKind::Undo {
                undoes: proposal_id,
            },
            inverse,
            impact,
            &actor.id,
        );
        let pending = original.transitioned(ProposalState::UndoPending)?;

        let unit = UnitOfWork::new(draft.draft_id)
            .insert(undo.clone())
            .update(ProposalState::Applied, pending.clone())
            .audit(
                AuditRecord::new(actor, AuditAction::ProposalCreated)
                    .with_target(proposal_ref(undo.proposal_id))
                    .with_scope(draft_ref(draft.draft_id))
                    .with_after(json!({ "state": undo.state, "kind": undo.kind }))
                    .with_metadata(json!({ "impact": impact })),
            )
            .audit(
                transition_record(
                    actor,
                    AuditAction::UndoRequested,
                    &pending,
                    ProposalState::Applied,
                )
                .with_metadata(json!({ "undo_proposal_id": undo.proposal_id })),
            );
        self.store.commit(unit)?;

        tracing::info!(
            proposal_id = %proposal_id,
            undo_proposal_id = %undo.proposal_id,
            actor = %actor,
            "undo requested"
        );
        Ok(undo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::SessionEdits;
    use crate::draft::DraftStatus;
    use crate::store::MemoryProposalStore;
    use crate::telemetry::HourlyRate;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use stride_audit::{AuditSink, MemoryAuditLog};
    use stride_policy::{
        MemoryPolicyStore, OverrideBundle, PolicyProfile, PolicyValue, MAX_HOURS_DELTA,
    };

    struct Fixture {
        engine: LifecycleEngine,
        audit: Arc<MemoryAuditLog>,
        coach: Principal,
    }

    fn fixture(profiles: Vec<PolicyProfile>) -> Fixture {
        let audit = Arc::new(MemoryAuditLog::new());
        let policy = Arc::new(MemoryPolicyStore::new(audit.clone()).with_profiles(profiles));
        let cache = Arc::new(PolicyRuntimeCache::load(policy).unwrap());
        let store = Arc::new(MemoryProposalStore::new(audit.clone()));
        Fixture {
            engine: LifecycleEngine::new(store, Arc::new(SessionEdits), cache),
            audit,
            coach: Principal::coach("coach-1"),
        }
    }

    fn hours(session: &str, h: f64) -> Value {
        json!({"edits": [{"op": "upsert", "session": session, "value": {"hours": h}}]})
    }

    fn draft(f: &Fixture) -> Draft {
        f.engine
            .create_draft(
                &f.coach,
                "athlete-1",
                "coach-1",
                json!({"sessions": {"mon": {"hours": 2.0}}}),
                None,
            )
            .unwrap()
    }

    #[test]
    fn create_on_missing_draft_is_not_found() {
        let f = fixture(vec![]);
        let err = f
            .engine
            .create(&f.coach, Uuid::new_v4(), hours("tue", 1.0))
            .unwrap_err();
        assert_eq!(err.code(), "not-found");
    }

    #[test]
    fn create_with_bad_content_is_validation_error() {
        let f = fixture(vec![]);
        let d = draft(&f);
        let err = f
            .engine
            .create(&f.coach, d.draft_id, json!({"nonsense": true}))
            .unwrap_err();
        assert_eq!(err.code(), "validation-error");
    }

    #[test]
    fn preview_changes_nothing() {
        let f = fixture(vec![]);
        let d = draft(&f);
        let p = f.engine.create(&f.coach, d.draft_id, hours("tue", 3.0)).unwrap();
        let before = f.audit.len();

        let preview = f.engine.preview(p.proposal_id).unwrap();
        assert!(preview.verdict.pass);
        assert_eq!(preview.impact.hours_delta, 3.0);
        assert_eq!(preview.state, ProposalState::Pending);
        assert_eq!(f.audit.len(), before);
        assert_eq!(f.engine.get_draft(d.draft_id).unwrap().plan_revision, 0);
    }

    #[test]
    fn apply_updates_plan_and_records_inverse() {
        let f = fixture(vec![]);
        let d = draft(&f);
        let p = f.engine.create(&f.coach, d.draft_id, hours("mon", 4.0)).unwrap();
        let applied = f.engine.apply(&f.coach, p.proposal_id).unwrap();

        assert_eq!(applied.state, ProposalState::Applied);
        assert!(applied.applied_at.is_some());
        assert_eq!(
            applied.inverse,
            Some(hours("mon", 2.0)),
        );
        let stored = f.engine.get_draft(d.draft_id).unwrap();
        assert_eq!(stored.plan["sessions"]["mon"]["hours"], 4.0);
        assert_eq!(stored.plan_revision, 1);
    }

    #[test]
    fn safety_rejection_leaves_everything_pending() {
        let strict = PolicyProfile::new(
            "default",
            OverrideBundle::new().with(MAX_HOURS_DELTA, PolicyValue::Number(1.0)),
        );
        let f = fixture(vec![strict]);
        let d = draft(&f);
        let p = f.engine.create(&f.coach, d.draft_id, hours("tue", 3.0)).unwrap();

        let err = f.engine.apply(&f.coach, p.proposal_id).unwrap_err();
        match err {
            ProposalError::SafetyRejected { verdict, .. } => assert_eq!(verdict.limit, 1.0),
            other => panic!("expected SafetyRejected, got {:?}", other),
        }
        assert_eq!(
            f.engine.get_proposal(p.proposal_id).unwrap().state,
            ProposalState::Pending
        );
    }

    #[test]
    fn reject_twice_is_conflict() {
        let f = fixture(vec![]);
        let d = draft(&f);
        let p = f.engine.create(&f.coach, d.draft_id, hours("tue", 1.0)).unwrap();
        f.engine.reject(&f.coach, p.proposal_id).unwrap();
        let err = f.engine.reject(&f.coach, p.proposal_id).unwrap_err();
        assert_eq!(err.code(), "conflict");
    }

    #[test]
    fn rejecting_an_undo_restores_the_original() {
        let f = fixture(vec![]);
        let d = draft(&f);
        let p = f.engine.create(&f.coach, d.draft_id, hours("tue", 1.0)).unwrap();
        f.engine.apply(&f.coach, p.proposal_id).unwrap();
        let undo = f.engine.undo(&f.coach, p.proposal_id).unwrap();

        f.engine.reject(&f.coach, undo.proposal_id).unwrap();
        assert_eq!(
            f.engine.get_proposal(p.proposal_id).unwrap().state,
            ProposalState::Applied
        );
        // It can be undone again afterwards.
        assert!(f.engine.undo(&f.coach, p.proposal_id).is_ok());
    }

    #[test]
    fn published_draft_changes_only_through_proposals() {
        let f = fixture(vec![]);
        let d = draft(&f);
        let pending = f.engine.create(&f.coach, d.draft_id, hours("tue", 1.0)).unwrap();
        f.engine.publish_draft(&f.coach, d.draft_id).unwrap();

        // Proposals opened before and after publishing both go through.
        f.engine.apply(&f.coach, pending.proposal_id).unwrap();
        let later = f.engine.create(&f.coach, d.draft_id, hours("wed", 1.5)).unwrap();
        f.engine.apply(&f.coach, later.proposal_id).unwrap();

        let undo = f.engine.undo(&f.coach, later.proposal_id).unwrap();
        f.engine.apply(&f.coach, undo.proposal_id).unwrap();
        assert_eq!(
            f.engine.get_proposal(later.proposal_id).unwrap().state,
            ProposalState::Undone
        );

        let stored = f.engine.get_draft(d.draft_id).unwrap();
        assert_eq!(stored.status, DraftStatus::Published);
        assert_eq!(stored.plan["sessions"]["tue"]["hours"], 1.0);
        assert!(stored.plan["sessions"].get("wed").is_none());

        assert_eq!(
            f.engine
                .publish_draft(&f.coach, d.draft_id)
                .unwrap_err()
                .code(),
            "conflict"
        );
    }

    #[test]
    fn every_mutation_is_attributed() {
        let f = fixture(vec![]);
        let d = draft(&f);
        let p = f.engine.create(&f.coach, d.draft_id, hours("tue", 1.0)).unwrap();
        f.engine.apply(&f.coach, p.proposal_id).unwrap();

        let records = f.audit.records_for(&draft_ref(d.draft_id)).unwrap();
        let actions: Vec<AuditAction> = records.iter().map(|r| r.action).collect();
        assert_eq!(
            actions,
            vec![
                AuditAction::DraftCreated,
                AuditAction::ProposalCreated,
                AuditAction::ProposalApplied
            ]
        );
        assert!(records.iter().all(|r| r.actor_id == "coach-1"));
    }

    #[test]
    fn cost_estimate_lands_in_apply_metadata() {
        let mut f = fixture(vec![]);
        f.engine = f
            .engine
            .with_cost_estimator(Arc::new(HourlyRate::new(50.0, "USD")));
        let d = draft(&f);
        let p = f.engine.create(&f.coach, d.draft_id, hours("tue", 2.0)).unwrap();
        f.engine.apply(&f.coach, p.proposal_id).unwrap();

        let records = f.audit.records_for(&proposal_ref(p.proposal_id)).unwrap();
        let applied = records
            .iter()
            .find(|r| r.action == AuditAction::ProposalApplied)
            .unwrap();
        assert_eq!(applied.metadata["cost_estimate"]["amount"], 100.0);
    }

    /// Store that lets a test move the draft underneath an apply a fixed
    /// number of times.
    struct MovingStore {
        inner: MemoryProposalStore,
        bumps: Mutex<HashMap<Uuid, u32>>,
    }

    impl ProposalStore for MovingStore {
        fn insert_draft(&self, draft: &Draft, audit: &mut [AuditRecord]) -> Result<(), StoreError> {
            self.inner.insert_draft(draft, audit)
        }
        fn draft(&self, draft_id: Uuid) -> Result<Option<Draft>, StoreError> {
            self.inner.draft(draft_id)
        }
        fn proposal(&self, proposal_id: Uuid) -> Result<Option<Proposal>, StoreError> {
            self.inner.proposal(proposal_id)
        }
        fn proposals_for_draft(&self, draft_id: Uuid) -> Result<Vec<Proposal>, StoreError> {
            self.inner.proposals_for_draft(draft_id)
        }
        fn commit(&self, unit: UnitOfWork) -> Result<Vec<AuditRecord>, StoreError> {
            if unit.draft.is_some() {
                let mut bumps = self.bumps.lock().unwrap();
                let remaining = bumps.entry(unit.draft_id).or_insert(0);
                if *remaining > 0 {
                    *remaining -= 1;
                    let current = self.inner.draft(unit.draft_id)?.unwrap();
                    let moved = current.revised(current.plan.clone());
                    self.inner.commit(
                        UnitOfWork::new(unit.draft_id).with_draft(current.plan_revision, moved),
                    )?;
                }
            }
            self.inner.commit(unit)
        }
    }

    fn moving_fixture(bumps: u32) -> (LifecycleEngine, Uuid, Principal) {
        let audit = Arc::new(MemoryAuditLog::new());
        let policy = Arc::new(MemoryPolicyStore::new(audit.clone()));
        let cache = Arc::new(PolicyRuntimeCache::load(policy).unwrap());
        let store = Arc::new(MovingStore {
            inner: MemoryProposalStore::new(audit),
            bumps: Mutex::new(HashMap::new()),
        });
        let engine = LifecycleEngine::new(store.clone(), Arc::new(SessionEdits), cache);
        let coach = Principal::coach("coach-1");
        let d = engine
            .create_draft(&coach, "a", "coach-1", json!({"sessions": {}}), None)
            .unwrap();
        let p = engine.create(&coach, d.draft_id, hours("mon", 1.0)).unwrap();
        store.bumps.lock().unwrap().insert(d.draft_id, bumps);
        (engine, p.proposal_id, coach)
    }

    #[test]
    fn apply_retries_when_draft_moves() {
        let (engine, proposal_id, coach) = moving_fixture(2);
        let applied = engine.apply(&coach, proposal_id).unwrap();
        assert_eq!(applied.state, ProposalState::Applied);
    }

    #[test]
    fn apply_gives_up_after_configured_attempts() {
        let (engine, proposal_id, coach) = moving_fixture(5);
        let err = engine.apply(&coach, proposal_id).unwrap_err();
        assert_eq!(err.code(), "conflict");
        assert_eq!(
            engine.get_proposal(proposal_id).unwrap().state,
            ProposalState::Pending
        );
    }
}
