// gateway.rs - The operation boundary for Stride.
//
// Gateway wires the stores, the policy cache, the lifecycle engine and the
// authorizer together, and exposes every externally visible operation.
// Each operation takes the acting Principal explicitly and checks it before
// touching the engine:
//
//   drafts, proposals, batches  - owning coach (reads: also the athlete, admins)
//   policy upsert, list, audit  - admins
//   policy get, refresh         - any authenticated principal
//
// Storage is either one SQLite file (drafts, proposals, policy and audit
// sharing a database) or in-memory stores sharing one audit log.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use stride_audit::{
    draft_ref, policy_ref, verify_chain, AuditLog, AuditRecord, AuditSink, MemoryAuditLog,
    Principal, Role,
};
use stride_policy::{
    MemoryPolicyStore, OverrideBundle, PolicyAdmin, PolicyProfile, PolicyRuntimeCache,
    PolicySnapshot, PolicyStore,
};
use stride_proposal::{
    BatchReport, BatchRequest, Draft, HourlyRate, LifecycleEngine, MemoryProposalStore, Preview,
    Proposal, ProposalStore, SessionEdits,
};
use stride_sqlite::SqliteStore;
use uuid::Uuid;

use crate::auth::{require_admin, require_coach_of, AuthError, Authorizer};
use crate::config::StrideConfig;
use crate::error::GatewayError;

pub struct Gateway {
    config: StrideConfig,
    authorizer: Arc<dyn Authorizer>,
    engine: LifecycleEngine,
    policy: PolicyAdmin,
    audit: Arc<dyn AuditSink>,
}

impl Gateway {
    /// Open (or create) the SQLite database named by `config`.
    pub fn open(config: StrideConfig, authorizer: Arc<dyn Authorizer>) -> Result<Self, GatewayError> {
        if let Some(parent) = config.database.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = Arc::new(SqliteStore::open(&config.database)?);
        tracing::debug!(database = %config.database.display(), "opened stride database");
        Self::assemble(config, authorizer, store.clone(), store.clone(), store)
    }

    /// Build a gateway over in-memory stores. State is lost on drop.
    pub fn in_memory(
        config: StrideConfig,
        authorizer: Arc<dyn Authorizer>,
    ) -> Result<Self, GatewayError> {
        let audit: Arc<dyn AuditSink> = Arc::new(MemoryAuditLog::new());
        let proposals = Arc::new(MemoryProposalStore::new(audit.clone()));
        let policy = Arc::new(MemoryPolicyStore::new(audit.clone()));
        Self::assemble(config, authorizer, proposals, policy, audit)
    }

    fn assemble(
        config: StrideConfig,
        authorizer: Arc<dyn Authorizer>,
        proposals: Arc<dyn ProposalStore>,
        policy: Arc<dyn PolicyStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, GatewayError> {
        let cache = Arc::new(PolicyRuntimeCache::load(policy.clone())?);
        let mut engine = LifecycleEngine::new(proposals, Arc::new(SessionEdits), cache.clone())
            .with_apply_attempts(config.apply_attempts);
        if let Some(rate) = config.cost.hourly_rate {
            engine = engine.with_cost_estimator(Arc::new(HourlyRate::new(
                rate,
                config.cost.currency.clone(),
            )));
        }

        Ok(Self {
            policy: PolicyAdmin::new(policy, cache),
            config,
            authorizer,
            engine,
            audit,
        })
    }

    pub fn config(&self) -> &StrideConfig {
        &self.config
    }

    /// Resolve a caller id to a principal.
    pub fn authenticate(&self, caller_id: &str) -> Result<Principal, GatewayError> {
        Ok(self.authorizer.authenticate(caller_id)?)
    }

    // ── Access checks ───────────────────────────────────────────

    fn require_writer(&self, actor: &Principal, draft: &Draft) -> Result<(), GatewayError> {
        require_coach_of(self.authorizer.as_ref(), actor, &draft.athlete_id)?;
        if draft.coach_id != actor.id {
            return Err(AuthError::Forbidden(format!(
                "draft {} belongs to coach '{}'",
                draft.draft_id, draft.coach_id
            ))
            .into());
        }
        Ok(())
    }

    fn require_reader(&self, actor: &Principal, draft: &Draft) -> Result<(), GatewayError> {
        let allowed = match actor.role {
            Role::Admin => true,
            Role::Athlete => actor.id == draft.athlete_id,
            Role::Coach => {
                actor.id == draft.coach_id
                    && self
                        .authorizer
                        .coach_owns_athlete(&actor.id, &draft.athlete_id)
            }
        };
        if allowed {
            Ok(())
        } else {
            Err(AuthError::Forbidden(format!(
                "{} may not read draft {}",
                actor, draft.draft_id
            ))
            .into())
        }
    }

    fn writable_draft(&self, actor: &Principal, draft_id: Uuid) -> Result<Draft, GatewayError> {
        let draft = self.engine.get_draft(draft_id)?;
        self.require_writer(actor, &draft)?;
        Ok(draft)
    }

    fn readable_draft(&self, actor: &Principal, draft_id: Uuid) -> Result<Draft, GatewayError> {
        let draft = self.engine.get_draft(draft_id)?;
        self.require_reader(actor, &draft)?;
        Ok(draft)
    }

    fn writable_proposal(&self, actor: &Principal, proposal_id: Uuid) -> Result<(), GatewayError> {
        let proposal = self.engine.get_proposal(proposal_id)?;
        self.writable_draft(actor, proposal.draft_id)?;
        Ok(())
    }

    // ── Drafts ──────────────────────────────────────────────────

    /// Open a draft for `athlete_id`, owned by the calling coach.
    pub fn create_draft(
        &self,
        actor: &Principal,
        athlete_id: &str,
        plan: Value,
        policy_profile: Option<&str>,
    ) -> Result<Draft, GatewayError> {
        require_coach_of(self.authorizer.as_ref(), actor, athlete_id)?;
        let profile = policy_profile.unwrap_or(&self.config.default_profile);
        Ok(self
            .engine
            .create_draft(actor, athlete_id, &actor.id, plan, Some(profile))?)
    }

    pub fn get_draft(&self, actor: &Principal, draft_id: Uuid) -> Result<Draft, GatewayError> {
        self.readable_draft(actor, draft_id)
    }

    pub fn publish_draft(&self, actor: &Principal, draft_id: Uuid) -> Result<Draft, GatewayError> {
        self.writable_draft(actor, draft_id)?;
        Ok(self.engine.publish_draft(actor, draft_id)?)
    }

    // ── Proposals ───────────────────────────────────────────────

    pub fn create_proposal(
        &self,
        actor: &Principal,
        draft_id: Uuid,
        content: Value,
    ) -> Result<Proposal, GatewayError> {
        self.writable_draft(actor, draft_id)?;
        Ok(self.engine.create(actor, draft_id, content)?)
    }

    pub fn get_proposal(
        &self,
        actor: &Principal,
        proposal_id: Uuid,
    ) -> Result<Proposal, GatewayError> {
        let proposal = self.engine.get_proposal(proposal_id)?;
        self.readable_draft(actor, proposal.draft_id)?;
        Ok(proposal)
    }

    pub fn list_proposals(
        &self,
        actor: &Principal,
        draft_id: Uuid,
    ) -> Result<Vec<Proposal>, GatewayError> {
        self.readable_draft(actor, draft_id)?;
        Ok(self.engine.list_proposals(draft_id)?)
    }

    pub fn preview_proposal(
        &self,
        actor: &Principal,
        proposal_id: Uuid,
    ) -> Result<Preview, GatewayError> {
        self.get_proposal(actor, proposal_id)?;
        Ok(self.engine.preview(proposal_id)?)
    }

    pub fn apply_proposal(
        &self,
        actor: &Principal,
        proposal_id: Uuid,
    ) -> Result<Proposal, GatewayError> {
        self.writable_proposal(actor, proposal_id)?;
        Ok(self.engine.apply(actor, proposal_id)?)
    }

    pub fn reject_proposal(
        &self,
        actor: &Principal,
        proposal_id: Uuid,
    ) -> Result<Proposal, GatewayError> {
        self.writable_proposal(actor, proposal_id)?;
        Ok(self.engine.reject(actor, proposal_id)?)
    }

    /// Request an undo of an applied proposal. Returns the new undo proposal.
    pub fn undo_proposal(
        &self,
        actor: &Principal,
        proposal_id: Uuid,
    ) -> Result<Proposal, GatewayError> {
        self.writable_proposal(actor, proposal_id)?;
        Ok(self.engine.undo(actor, proposal_id)?)
    }

    pub fn batch_approve(
        &self,
        actor: &Principal,
        request: &BatchRequest,
    ) -> Result<BatchReport, GatewayError> {
        self.writable_draft(actor, request.draft_id)?;
        Ok(self.engine.batch_approve(actor, request)?)
    }

    // ── Policy ──────────────────────────────────────────────────

    /// The cached bundle for `profile_id`. Does not refresh.
    pub fn get_policy_profile(
        &self,
        _actor: &Principal,
        profile_id: &str,
    ) -> Result<OverrideBundle, GatewayError> {
        stride_policy::profile::validate_profile_id(profile_id)?;
        Ok(self.policy.get(profile_id))
    }

    pub fn upsert_policy_profile(
        &self,
        actor: &Principal,
        profile_id: &str,
        overrides: OverrideBundle,
    ) -> Result<PolicyProfile, GatewayError> {
        require_admin(actor)?;
        Ok(self.policy.upsert(actor, profile_id, overrides)?)
    }

    /// Refresh the cache and return every stored profile.
    pub fn list_policy_profiles(
        &self,
        actor: &Principal,
    ) -> Result<Arc<PolicySnapshot>, GatewayError> {
        require_admin(actor)?;
        Ok(self.policy.list_profiles()?)
    }

    pub fn refresh_policy_cache(
        &self,
        actor: &Principal,
    ) -> Result<Arc<PolicySnapshot>, GatewayError> {
        let snapshot = self.policy.refresh()?;
        tracing::debug!(actor = %actor, generation = snapshot.generation, "policy cache refreshed");
        Ok(snapshot)
    }

    // ── Audit ───────────────────────────────────────────────────

    /// Audit records scoped to one draft, oldest first.
    pub fn draft_audit(
        &self,
        actor: &Principal,
        draft_id: Uuid,
    ) -> Result<Vec<AuditRecord>, GatewayError> {
        self.readable_draft(actor, draft_id)?;
        Ok(self.audit.records_for(&draft_ref(draft_id))?)
    }

    /// Audit records for one policy profile, oldest first.
    pub fn policy_audit(
        &self,
        actor: &Principal,
        profile_id: &str,
    ) -> Result<Vec<AuditRecord>, GatewayError> {
        require_admin(actor)?;
        Ok(self.audit.records_for(&policy_ref(profile_id))?)
    }

    /// Check the hash chain over the whole log. Returns the record count.
    pub fn verify_audit(&self, actor: &Principal) -> Result<usize, GatewayError> {
        require_admin(actor)?;
        let records = self.audit.all()?;
        verify_chain(&records)?;
        Ok(records.len())
    }

    /// Write the whole log as JSONL, to `path` or the configured export file.
    pub fn export_audit(
        &self,
        actor: &Principal,
        path: Option<&Path>,
    ) -> Result<(PathBuf, usize), GatewayError> {
        require_admin(actor)?;
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.audit_export.clone());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let records = self.audit.all()?;
        AuditLog::export(&path, &records)?;
        tracing::info!(path = %path.display(), records = records.len(), "audit log exported");
        Ok((path, records.len()))
    }
}
