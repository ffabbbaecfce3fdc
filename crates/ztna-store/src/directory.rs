//! In-memory `ApplicationDirectory`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tracing::info;

use ztna_contracts::{
    error::{ZtnaError, ZtnaResult},
    policy::Application,
};
use ztna_core::{traits::ApplicationDirectory, validate::validate_application};

/// Applications keyed by id. Clones share the same directory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryApplicationDirectory {
    applications: Arc<Mutex<BTreeMap<String, Application>>>,
}

impl InMemoryApplicationDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory from `applications`, rejecting the first invalid one.
    pub fn from_applications(
        applications: impl IntoIterator<Item = Application>,
    ) -> ZtnaResult<Self> {
        let directory = Self::new();
        for app in applications {
            directory.upsert(app)?;
        }
        Ok(directory)
    }

    /// Validate and insert or replace an application. CIDRs are trimmed and
    /// de-duplicated, keeping first-seen order.
    pub fn upsert(&self, mut app: Application) -> ZtnaResult<()> {
        let mut cidrs: Vec<String> = Vec::with_capacity(app.cidrs.len());
        for cidr in app.cidrs.iter().map(|c| c.trim()) {
            if !cidrs.iter().any(|seen| seen == cidr) {
                cidrs.push(cidr.to_string());
            }
        }
        app.cidrs = cidrs;
        validate_application(&app).into_result(app.name.clone())?;

        let mut applications = self.applications.lock().map_err(|e| ZtnaError::StoreError {
            reason: format!("application directory lock poisoned: {}", e),
        })?;
        info!(app_id = %app.id, cidrs = app.cidrs.len(), "application saved");
        applications.insert(app.id.clone(), app);
        Ok(())
    }

    pub fn remove(&self, id: &str) -> ZtnaResult<Application> {
        let mut applications = self.applications.lock().map_err(|e| ZtnaError::StoreError {
            reason: format!("application directory lock poisoned: {}", e),
        })?;
        applications
            .remove(id)
            .ok_or_else(|| ZtnaError::ApplicationNotFound { id: id.to_string() })
    }
}

impl ApplicationDirectory for InMemoryApplicationDirectory {
    fn resolve(&self, id: &str) -> Option<Application> {
        // A poisoned lock reads as "not found", which evaluation treats as
        // an unresolvable destination.
        self.applications.lock().ok()?.get(id).cloned()
    }
}
