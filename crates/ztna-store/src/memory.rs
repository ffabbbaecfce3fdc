//! In-memory implementation of `PolicyStore`.
//!
//! `InMemoryPolicyStore` is the reference implementation of the
//! `PolicyStore` trait for either policy family. It keeps every policy in a
//! map protected by a `Mutex`, so clones of the store share one state and
//! may be used from several threads.
//!
//! Every write validates first and only then touches the map, so a failed
//! save leaves the store exactly as it was.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tracing::{debug, info};

use ztna_contracts::{
    error::{ZtnaError, ZtnaResult},
    policy::PolicyId,
};
use ztna_core::traits::{Envelope, PolicyStore};

// ── Internal mutable state ────────────────────────────────────────────────────

pub(crate) struct StoreState<P> {
    pub(crate) policies: BTreeMap<PolicyId, P>,
}

// ── Public store ──────────────────────────────────────────────────────────────

/// A validate-before-save policy store held entirely in memory.
///
/// ```rust,ignore
/// let store = InMemoryPolicyStore::<AccessPolicy>::new();
/// let saved = store.create(AccessPolicy::new("eng-vpn", 100))?;
/// assert_eq!(store.get(&saved.id)?, saved);
/// ```
#[derive(Clone)]
pub struct InMemoryPolicyStore<P> {
    pub(crate) state: Arc<Mutex<StoreState<P>>>,
}

impl<P: Envelope> InMemoryPolicyStore<P> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState {
                policies: BTreeMap::new(),
            })),
        }
    }

    /// Number of stored policies, enabled or not.
    pub fn len(&self) -> ZtnaResult<usize> {
        Ok(self.lock()?.policies.len())
    }

    pub fn is_empty(&self) -> ZtnaResult<bool> {
        Ok(self.len()? == 0)
    }

    fn lock(&self) -> ZtnaResult<MutexGuard<'_, StoreState<P>>> {
        self.state.lock().map_err(|e| ZtnaError::StoreError {
            reason: format!("{} store lock poisoned: {}", P::FAMILY, e),
        })
    }

    fn not_found(id: &PolicyId) -> ZtnaError {
        ZtnaError::PolicyNotFound { id: id.to_string() }
    }
}

impl<P: Envelope> Default for InMemoryPolicyStore<P> {
    fn default() -> Self {
        Self::new()
    }
}

// ── PolicyStore impl ──────────────────────────────────────────────────────────

impl<P: Envelope> PolicyStore<P> for InMemoryPolicyStore<P> {
    fn list(&self) -> ZtnaResult<Vec<P>> {
        let state = self.lock()?;
        let mut policies: Vec<P> = state.policies.values().cloned().collect();
        // The map is keyed by id, so a stable sort leaves equal priorities in
        // id order.
        policies.sort_by_key(|p| p.priority());
        Ok(policies)
    }

    fn get(&self, id: &PolicyId) -> ZtnaResult<P> {
        self.lock()?
            .policies
            .get(id)
            .cloned()
            .ok_or_else(|| Self::not_found(id))
    }

    fn create(&self, mut policy: P) -> ZtnaResult<P> {
        policy.validate().into_result(policy.name())?;

        let mut state = self.lock()?;
        if policy.id().is_unassigned() {
            policy.set_id(PolicyId::new());
        } else if state.policies.contains_key(policy.id()) {
            return Err(ZtnaError::StoreError {
                reason: format!("{} policy '{}' already exists", P::FAMILY, policy.id()),
            });
        }
        policy.stamp(1, Utc::now());
        state.policies.insert(policy.id().clone(), policy.clone());

        info!(
            family = P::FAMILY,
            policy_id = %policy.id(),
            policy = %policy.name(),
            priority = policy.priority(),
            "policy created"
        );
        Ok(policy)
    }

    fn update(&self, mut policy: P) -> ZtnaResult<P> {
        let mut state = self.lock()?;
        let stored = state
            .policies
            .get(policy.id())
            .ok_or_else(|| Self::not_found(policy.id()))?;

        if stored.version() != policy.version() {
            return Err(ZtnaError::VersionConflict {
                id: policy.id().to_string(),
                expected: policy.version(),
                actual: stored.version(),
            });
        }
        policy.validate().into_result(policy.name())?;

        let version = stored.version() + 1;
        policy.stamp(version, Utc::now());
        state.policies.insert(policy.id().clone(), policy.clone());

        info!(
            family = P::FAMILY,
            policy_id = %policy.id(),
            version,
            "policy updated"
        );
        Ok(policy)
    }

    fn set_enabled(&self, id: &PolicyId, enabled: bool) -> ZtnaResult<P> {
        let mut state = self.lock()?;
        let policy = state.policies.get_mut(id).ok_or_else(|| Self::not_found(id))?;

        if policy.enabled() == enabled {
            debug!(family = P::FAMILY, policy_id = %id, enabled, "enabled flag unchanged");
            return Ok(policy.clone());
        }

        let version = policy.version() + 1;
        policy.set_enabled(enabled);
        policy.stamp(version, Utc::now());

        info!(family = P::FAMILY, policy_id = %id, enabled, "policy toggled");
        Ok(policy.clone())
    }

    fn delete(&self, id: &PolicyId) -> ZtnaResult<()> {
        let removed = self.lock()?.policies.remove(id);
        if removed.is_none() {
            return Err(Self::not_found(id));
        }
        info!(family = P::FAMILY, policy_id = %id, "policy deleted");
        Ok(())
    }
}
