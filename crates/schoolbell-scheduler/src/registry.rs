//! Process-wide map of tenants, each with its own lock and scheduler task.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono_tz::Tz;
use dashmap::DashMap;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use schoolbell_core::{config::PresetConfig, SchoolbellConfig, TenantId};

use crate::{
    actions::{Action, CommandContext, Reply},
    clock::Clock,
    engine::{EventSink, TenantLoop},
    error::{Result, SchedulerError},
    state::TenantState,
    status::render_status,
    store::{save_logged, DurableStore},
};

/// Settings shared by every tenant in a registry.
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    pub tz: Tz,
    pub tick: Duration,
    pub presets: Vec<PresetConfig>,
}

impl RegistryOptions {
    pub fn from_config(config: &SchoolbellConfig) -> schoolbell_core::Result<Self> {
        Ok(Self {
            tz: config.scheduler.tz()?,
            tick: config.scheduler.tick_interval(),
            presets: config.presets.clone(),
        })
    }
}

struct SchedulerTask {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

/// One tenant: its state behind the tenant lock, plus the slot for its
/// scheduler task.
pub struct TenantEntry {
    tenant: TenantId,
    state: Mutex<TenantState>,
    task: StdMutex<Option<SchedulerTask>>,
}

impl TenantEntry {
    fn new(tenant: TenantId, tz: Tz) -> Self {
        Self {
            tenant,
            state: Mutex::new(TenantState::new(tenant, tz)),
            task: StdMutex::new(None),
        }
    }

    pub fn tenant(&self) -> TenantId {
        self.tenant
    }

    /// The tenant lock. Every tick and every command holds it for its whole
    /// critical section.
    pub fn state(&self) -> &Mutex<TenantState> {
        &self.state
    }

    fn is_running(&self) -> bool {
        self.task_slot()
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Signal the loop (if any) and hand back its handle for joining.
    fn stop(&self) -> Option<JoinHandle<()>> {
        let task = self.task_slot().take()?;
        let _ = task.shutdown.send(true);
        Some(task.handle)
    }

    fn task_slot(&self) -> std::sync::MutexGuard<'_, Option<SchedulerTask>> {
        self.task.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct TenantRegistry {
    tenants: DashMap<TenantId, Arc<TenantEntry>>,
    options: RegistryOptions,
    clock: Arc<dyn Clock>,
    store: Arc<dyn DurableStore>,
    events: EventSink,
}

impl TenantRegistry {
    pub fn new(
        options: RegistryOptions,
        clock: Arc<dyn Clock>,
        store: Arc<dyn DurableStore>,
        events: EventSink,
    ) -> Self {
        Self {
            tenants: DashMap::new(),
            options,
            clock,
            store,
            events,
        }
    }

    /// The tenant's entry, created empty on first use.
    pub fn entry(&self, tenant: TenantId) -> Arc<TenantEntry> {
        let tz = self.options.tz;
        self.tenants
            .entry(tenant)
            .or_insert_with(|| Arc::new(TenantEntry::new(tenant, tz)))
            .clone()
    }

    pub fn get(&self, tenant: TenantId) -> Option<Arc<TenantEntry>> {
        self.tenants.get(&tenant).map(|e| Arc::clone(e.value()))
    }

    pub fn tenant_ids(&self) -> Vec<TenantId> {
        let mut ids: Vec<TenantId> = self.tenants.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    pub fn is_scheduler_running(&self, tenant: TenantId) -> bool {
        self.get(tenant).is_some_and(|e| e.is_running())
    }

    /// Start the tenant's loop unless one is already running. A loop that
    /// finished (or died) is replaced. Must be called inside a tokio runtime.
    pub fn ensure_scheduler(&self, tenant: TenantId) {
        let entry = self.entry(tenant);
        let mut slot = entry.task_slot();
        if let Some(task) = slot.as_ref() {
            if !task.handle.is_finished() {
                return;
            }
            debug!(%tenant, "previous scheduler finished, restarting");
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tenant_loop = TenantLoop::new(
            Arc::clone(&entry),
            Arc::clone(&self.clock),
            Arc::clone(&self.store),
            self.events.clone(),
            self.options.tick,
        );
        let handle = tokio::spawn(tenant_loop.run(shutdown_rx));
        *slot = Some(SchedulerTask {
            handle,
            shutdown: shutdown_tx,
        });
    }

    /// Apply a batch of actions from one command, atomically under the
    /// tenant lock. Returns one outcome per action, in order.
    pub async fn handle(
        &self,
        tenant: TenantId,
        ctx: CommandContext,
        actions: Vec<Action>,
    ) -> Vec<Result<Reply>> {
        let entry = self.entry(tenant);
        let mut outcomes = Vec::with_capacity(actions.len());
        let mut arm = false;
        {
            let mut state = entry.state().lock().await;
            // Shut down between lookup and lock: the entry is already gone.
            if state.is_closed() {
                debug!(%tenant, "command raced tenant shutdown");
                return actions
                    .iter()
                    .map(|_| Err(SchedulerError::TenantClosed { tenant }))
                    .collect();
            }
            state.observe(&ctx);
            for action in actions {
                let now = self.clock.now();
                let mut events = Vec::new();
                let outcome = state.apply(action, &self.options.presets, now, &mut events);
                self.events.emit_all(events);

                match &outcome {
                    Ok(reply) => {
                        if reply.is_durable() {
                            save_logged(self.store.as_ref(), &state.snapshot());
                        }
                        if matches!(reply, Reply::ShutDown) {
                            arm = false;
                            entry.stop();
                        } else if reply.arms_scheduler() {
                            arm = true;
                        }
                    }
                    Err(e) => debug!(%tenant, code = e.code(), error = %e, "action rejected"),
                }
                outcomes.push(outcome);
            }
        }
        if arm {
            self.ensure_scheduler(tenant);
        }
        outcomes
    }

    /// Status text for a tenant; unknown tenants render as empty.
    pub async fn status(&self, tenant: TenantId) -> String {
        let entry = self.entry(tenant);
        let state = entry.state().lock().await;
        render_status(&state, self.clock.now())
    }

    /// Recreate every stored tenant and start loops for the non-empty ones.
    /// Returns how many loops were started.
    pub async fn seed_from_store(&self) -> usize {
        let seeds = match self.store.load() {
            Ok(seeds) => seeds,
            Err(e) => {
                warn!(error = %e, "failed to load stored tenants, starting empty");
                return 0;
            }
        };
        let mut started = 0;
        for seed in seeds {
            let entry = self.entry(seed.tenant);
            let populated = {
                let mut state = entry.state().lock().await;
                state.seed(&seed, self.clock.now());
                state.has_schedulables()
            };
            if populated {
                self.ensure_scheduler(seed.tenant);
                started += 1;
            }
        }
        info!(started, "tenants restored from store");
        started
    }

    /// Close a tenant and drop it from the registry. Its stored config is left
    /// alone, so the next start recreates it.
    pub async fn shutdown_tenant(&self, tenant: TenantId) {
        let Some((_, entry)) = self.tenants.remove(&tenant) else {
            return;
        };
        entry.state().lock().await.close();
        if let Some(handle) = entry.stop() {
            if let Err(e) = handle.await {
                warn!(%tenant, error = %e, "scheduler task ended abnormally");
            }
        }
        info!(%tenant, "tenant shut down");
    }

    /// Process teardown: close every tenant and wait for the loops to exit.
    pub async fn shutdown_all(&self) {
        for tenant in self.tenant_ids() {
            self.shutdown_tenant(tenant).await;
        }
    }
}
