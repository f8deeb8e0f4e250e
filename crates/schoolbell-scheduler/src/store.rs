use std::collections::BTreeMap;
use std::sync::Mutex;

use tracing::{debug, warn};

use schoolbell_core::{TenantId, TenantSeed};

use crate::error::{Result, SchedulerError};

/// Durable per-tenant configuration. Only config is stored: timer progress,
/// pause state and next trigger instants are always recomputed on load.
pub trait DurableStore: Send + Sync {
    fn load(&self) -> Result<Vec<TenantSeed>>;

    /// Replace the stored record for `snapshot.tenant`. An empty snapshot
    /// (no timers, no breaks) removes the tenant.
    fn save(&self, snapshot: &TenantSeed) -> Result<()>;
}

/// Save and log; a failing store never aborts the operation that changed state.
pub(crate) fn save_logged(store: &dyn DurableStore, snapshot: &TenantSeed) {
    match store.save(snapshot) {
        Ok(()) => debug!(tenant = %snapshot.tenant, "tenant snapshot saved"),
        Err(e) => warn!(tenant = %snapshot.tenant, error = %e, "failed to save tenant snapshot"),
    }
}

/// Process-local store, seeded from config. Also the store used in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tenants: Mutex<BTreeMap<TenantId, TenantSeed>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seeds(seeds: impl IntoIterator<Item = TenantSeed>) -> Self {
        let tenants = seeds.into_iter().map(|s| (s.tenant, s)).collect();
        Self {
            tenants: Mutex::new(tenants),
        }
    }

    pub fn get(&self, tenant: TenantId) -> Option<TenantSeed> {
        self.tenants.lock().ok()?.get(&tenant).cloned()
    }
}

impl DurableStore for MemoryStore {
    fn load(&self) -> Result<Vec<TenantSeed>> {
        let tenants = self
            .tenants
            .lock()
            .map_err(|_| SchedulerError::Store("memory store lock poisoned".to_string()))?;
        Ok(tenants.values().cloned().collect())
    }

    fn save(&self, snapshot: &TenantSeed) -> Result<()> {
        let mut tenants = self
            .tenants
            .lock()
            .map_err(|_| SchedulerError::Store("memory store lock poisoned".to_string()))?;
        if snapshot.is_empty() {
            tenants.remove(&snapshot.tenant);
        } else {
            tenants.insert(snapshot.tenant, snapshot.clone());
        }
        Ok(())
    }
}
