// admin.rs - Administrator operations on policy profiles.
//
// Upserts go straight to the store together with their audit record and do
// not touch the cache. The administrative listing refreshes before reading,
// so administrators always see what is stored.

use std::sync::Arc;

use chrono::Utc;
use stride_audit::{policy_ref, AuditAction, AuditRecord, Principal};

use crate::cache::{PolicyRuntimeCache, PolicySnapshot};
use crate::error::PolicyError;
use crate::profile::{validate_profile_id, OverrideBundle, PolicyProfile};
use crate::store::PolicyStore;

pub struct PolicyAdmin {
    store: Arc<dyn PolicyStore>,
    cache: Arc<PolicyRuntimeCache>,
}

impl PolicyAdmin {
    pub fn new(store: Arc<dyn PolicyStore>, cache: Arc<PolicyRuntimeCache>) -> Self {
        Self { store, cache }
    }

    pub fn cache(&self) -> &Arc<PolicyRuntimeCache> {
        &self.cache
    }

    /// Create or replace a profile's override bundle.
    ///
    /// The new bundle replaces the old one entirely. The cache is not
    /// refreshed; evaluators keep seeing the previous values until someone
    /// calls [`PolicyRuntimeCache::refresh`].
    pub fn upsert(
        &self,
        actor: &Principal,
        profile_id: &str,
        overrides: OverrideBundle,
    ) -> Result<PolicyProfile, PolicyError> {
        validate_profile_id(profile_id)?;
        overrides.validate()?;

        let previous = self.store.read(profile_id)?;
        let profile =
            PolicyProfile::new(profile_id, overrides).modified(actor.id.clone(), Utc::now());

        let mut record = AuditRecord::new(actor, AuditAction::PolicyUpserted)
            .with_target(policy_ref(profile_id))
            .with_scope(policy_ref(profile_id))
            .with_after(serde_json::to_value(&profile.overrides).map_err(|e| {
                PolicyError::Validation(format!("override bundle is not serializable: {}", e))
            })?);
        if let Some(previous) = &previous {
            let before = serde_json::to_value(&previous.overrides).map_err(|e| {
                PolicyError::Validation(format!("override bundle is not serializable: {}", e))
            })?;
            record = record.with_before(before);
        }

        self.store.write(&profile, &mut record)?;

        tracing::info!(
            profile_id,
            actor = %actor,
            sequence = record.sequence,
            "policy profile upserted"
        );
        Ok(profile)
    }

    /// Refresh the cache, then return the fresh snapshot.
    pub fn list_profiles(&self) -> Result<Arc<PolicySnapshot>, PolicyError> {
        self.cache.refresh()
    }

    /// The cached bundle for `profile_id` (defaults when absent). No refresh.
    pub fn get(&self, profile_id: &str) -> OverrideBundle {
        self.cache.get(profile_id)
    }

    pub fn refresh(&self) -> Result<Arc<PolicySnapshot>, PolicyError> {
        self.cache.refresh()
    }
}
