// cache.rs - Policy runtime cache.
//
// The cache holds an `Arc<PolicySnapshot>` behind an RwLock. Readers take
// the read lock only long enough to clone the Arc; after that they work
// against an immutable snapshot with no lock held. `refresh` reads the whole
// store, builds a new snapshot off to the side, and swaps the Arc in one
// assignment. Refreshes are serialized among themselves so an older read
// can never be swapped in over a newer one.
//
// The generation only advances when the stored content actually changed,
// so two refreshes with no intervening writes yield identical snapshots.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use stride_audit::hasher;

use crate::error::PolicyError;
use crate::profile::{OverrideBundle, PolicyProfile, Thresholds};
use crate::store::PolicyStore;

/// An immutable view of every profile as of one refresh.
#[derive(Debug, Clone, Serialize)]
pub struct PolicySnapshot {
    /// Bumped each time a refresh observes different content. 0 = never loaded.
    pub generation: u64,
    /// SHA-256 over the serialized profiles.
    pub fingerprint: String,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub profiles: BTreeMap<String, PolicyProfile>,
}

impl PolicySnapshot {
    fn empty() -> Self {
        Self {
            generation: 0,
            fingerprint: fingerprint(&BTreeMap::new()),
            refreshed_at: None,
            profiles: BTreeMap::new(),
        }
    }

    /// The profile's bundle, or the documented default bundle.
    pub fn bundle(&self, profile_id: &str) -> OverrideBundle {
        self.profiles
            .get(profile_id)
            .map(|p| p.overrides.clone())
            .unwrap_or_else(OverrideBundle::defaults)
    }

    pub fn thresholds(&self, profile_id: &str) -> Thresholds {
        Thresholds::resolve(profile_id, self.generation, &self.bundle(profile_id))
    }
}

fn fingerprint(profiles: &BTreeMap<String, PolicyProfile>) -> String {
    // A BTreeMap of plain serde structs cannot fail to serialize.
    hasher::hash_json(profiles).unwrap_or_default()
}

/// In-memory, explicitly refreshed view of the policy store.
pub struct PolicyRuntimeCache {
    store: Arc<dyn PolicyStore>,
    current: RwLock<Arc<PolicySnapshot>>,
    refresh_lock: Mutex<()>,
}

impl PolicyRuntimeCache {
    /// Create a cache with an empty snapshot. Reads return defaults until
    /// the first successful refresh.
    pub fn new(store: Arc<dyn PolicyStore>) -> Self {
        Self {
            store,
            current: RwLock::new(Arc::new(PolicySnapshot::empty())),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Create a cache and load it once.
    pub fn load(store: Arc<dyn PolicyStore>) -> Result<Self, PolicyError> {
        let cache = Self::new(store);
        cache.refresh()?;
        Ok(cache)
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<PolicySnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The override bundle for `profile_id` from the current snapshot, or the
    /// default bundle if the snapshot does not contain that profile.
    pub fn get(&self, profile_id: &str) -> OverrideBundle {
        self.snapshot().bundle(profile_id)
    }

    /// Thresholds for `profile_id`, resolved from one snapshot.
    pub fn thresholds(&self, profile_id: &str) -> Thresholds {
        self.snapshot().thresholds(profile_id)
    }

    /// Reload every profile from the store and publish a new snapshot.
    ///
    /// On error the previous snapshot stays visible.
    pub fn refresh(&self) -> Result<Arc<PolicySnapshot>, PolicyError> {
        let _guard = self.refresh_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let profiles = match self.store.read_all() {
            Ok(profiles) => profiles,
            Err(e) => {
                tracing::warn!(error = %e, "policy refresh failed, keeping previous snapshot");
                return Err(e);
            }
        };

        let previous = self.snapshot();
        let fingerprint = fingerprint(&profiles);
        let generation = if previous.refreshed_at.is_some() && previous.fingerprint == fingerprint
        {
            previous.generation
        } else {
            previous.generation + 1
        };

        let next = Arc::new(PolicySnapshot {
            generation,
            fingerprint,
            refreshed_at: Some(Utc::now()),
            profiles,
        });

        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next.clone();

        tracing::info!(
            generation = next.generation,
            profiles = next.profiles.len(),
            "policy cache refreshed"
        );
        Ok(next)
    }
}
