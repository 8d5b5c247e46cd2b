// store.rs - The durable policy store contract (the "store adapter").
//
// The adapter is read/write only. `write` receives the audit record for the
// upsert and must commit both together: if the record cannot be appended,
// the profile is not written.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use stride_audit::{AuditRecord, AuditSink};

use crate::error::PolicyError;
use crate::profile::PolicyProfile;

/// Durable mapping from profile id to profile.
pub trait PolicyStore: Send + Sync {
    /// Every stored profile, keyed by id.
    fn read_all(&self) -> Result<BTreeMap<String, PolicyProfile>, PolicyError>;

    /// Create or replace `profile` and append `audit` in the same unit.
    fn write(&self, profile: &PolicyProfile, audit: &mut AuditRecord) -> Result<(), PolicyError>;

    /// A single profile, read straight from the store.
    fn read(&self, profile_id: &str) -> Result<Option<PolicyProfile>, PolicyError> {
        Ok(self.read_all()?.remove(profile_id))
    }
}

/// Process-local policy store. Audit records go to the supplied sink.
pub struct MemoryPolicyStore {
    profiles: RwLock<BTreeMap<String, PolicyProfile>>,
    audit: Arc<dyn AuditSink>,
}

impl MemoryPolicyStore {
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self {
            profiles: RwLock::new(BTreeMap::new()),
            audit,
        }
    }

    /// Seed profiles without auditing (fixtures and bootstrapping).
    pub fn with_profiles(mut self, profiles: impl IntoIterator<Item = PolicyProfile>) -> Self {
        // Nothing else can hold the lock while we own `self`.
        let map = self.profiles.get_mut().unwrap_or_else(PoisonError::into_inner);
        for profile in profiles {
            map.insert(profile.profile_id.clone(), profile);
        }
        self
    }
}

impl PolicyStore for MemoryPolicyStore {
    fn read_all(&self) -> Result<BTreeMap<String, PolicyProfile>, PolicyError> {
        self.profiles
            .read()
            .map(|map| map.clone())
            .map_err(|_| PolicyError::StoreUnavailable("policy store lock poisoned".to_string()))
    }

    fn write(&self, profile: &PolicyProfile, audit: &mut AuditRecord) -> Result<(), PolicyError> {
        let mut map = self
            .profiles
            .write()
            .map_err(|_| PolicyError::StoreUnavailable("policy store lock poisoned".to_string()))?;
        // Audit first: if it fails the map is never touched.
        self.audit.append(std::slice::from_mut(audit))?;
        map.insert(profile.profile_id.clone(), profile.clone());
        Ok(())
    }
}
