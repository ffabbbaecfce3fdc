//! Immutable policy snapshots for enforcement.
//!
//! Evaluation reads a `PolicySnapshot` through an `Arc`. A refresh builds a
//! complete new snapshot and swaps the `Arc` under a short write lock; a
//! snapshot is never mutated after construction, so readers holding the old
//! one finish against a consistent policy set.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tracing::info;

use ztna_contracts::{
    error::{ZtnaError, ZtnaResult},
    policy::{AccessPolicy, PolicyBundle, SignInPolicy},
};
use ztna_core::traits::{Envelope, PolicyStore};

/// Enabled policies of both families, each sorted by ascending priority
/// with ties broken by id.
#[derive(Debug, Clone)]
pub struct PolicySnapshot {
    access: Vec<AccessPolicy>,
    sign_in: Vec<SignInPolicy>,
    loaded_at: DateTime<Utc>,
}

fn enabled_in_priority_order<P: Envelope>(policies: Vec<P>) -> Vec<P> {
    let mut enabled: Vec<P> = policies.into_iter().filter(|p| p.enabled()).collect();
    enabled.sort_by(|a, b| {
        a.priority()
            .cmp(&b.priority())
            .then_with(|| a.id().0.cmp(&b.id().0))
    });
    enabled
}

impl PolicySnapshot {
    pub fn new(access: Vec<AccessPolicy>, sign_in: Vec<SignInPolicy>) -> Self {
        Self {
            access: enabled_in_priority_order(access),
            sign_in: enabled_in_priority_order(sign_in),
            loaded_at: Utc::now(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    pub fn from_bundle(bundle: &PolicyBundle) -> Self {
        Self::new(bundle.access_policies.clone(), bundle.sign_in_policies.clone())
    }

    pub fn access(&self) -> &[AccessPolicy] {
        &self.access
    }

    pub fn sign_in(&self) -> &[SignInPolicy] {
        &self.sign_in
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

/// Shared handle to the current snapshot.
#[derive(Debug)]
pub struct SnapshotHandle {
    current: RwLock<Arc<PolicySnapshot>>,
}

impl SnapshotHandle {
    pub fn new(snapshot: PolicySnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// The snapshot in force right now.
    pub fn current(&self) -> ZtnaResult<Arc<PolicySnapshot>> {
        let guard = self.current.read().map_err(|_| ZtnaError::StoreError {
            reason: "policy snapshot lock poisoned".to_string(),
        })?;
        Ok(Arc::clone(&guard))
    }

    /// Swap in `snapshot`. Readers already holding the previous snapshot are
    /// unaffected.
    pub fn replace(&self, snapshot: PolicySnapshot) -> ZtnaResult<()> {
        let access = snapshot.access.len();
        let sign_in = snapshot.sign_in.len();
        let mut guard = self.current.write().map_err(|_| ZtnaError::StoreError {
            reason: "policy snapshot lock poisoned".to_string(),
        })?;
        *guard = Arc::new(snapshot);
        drop(guard);

        info!(access, sign_in, "policy snapshot replaced");
        Ok(())
    }

    /// Rebuild the snapshot from both stores. If either listing fails the
    /// current snapshot stays in force and the error is returned.
    pub fn refresh_from(
        &self,
        access: &dyn PolicyStore<AccessPolicy>,
        sign_in: &dyn PolicyStore<SignInPolicy>,
    ) -> ZtnaResult<Arc<PolicySnapshot>> {
        let snapshot = PolicySnapshot::new(access.list()?, sign_in.list()?);
        self.replace(snapshot)?;
        self.current()
    }
}

impl Default for SnapshotHandle {
    fn default() -> Self {
        Self::new(PolicySnapshot::empty())
    }
}
