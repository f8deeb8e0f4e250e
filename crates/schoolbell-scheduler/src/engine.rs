use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use schoolbell_core::Notification;

use crate::{
    clock::Clock,
    error::{Result, SchedulerError},
    registry::TenantEntry,
    store::{save_logged, DurableStore},
};

/// Non-blocking producer side of the scheduler → delivery channel.
///
/// Emitting never waits: a full or closed channel drops the event with a
/// warning so neither ticks nor commands stall on delivery.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<Notification>,
}

impl EventSink {
    /// A sink plus the receiver the delivery task drains.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: Notification) {
        let tenant = event.tenant();
        let kind = event.kind();
        if self.tx.try_send(event).is_err() {
            warn!(%tenant, kind, "delivery channel full or closed, event dropped");
        }
    }

    pub fn emit_all(&self, events: impl IntoIterator<Item = Notification>) {
        for event in events {
            self.emit(event);
        }
    }
}

/// The polling loop driving one tenant.
pub struct TenantLoop {
    entry: Arc<TenantEntry>,
    clock: Arc<dyn Clock>,
    store: Arc<dyn DurableStore>,
    events: EventSink,
    period: Duration,
}

impl TenantLoop {
    pub fn new(
        entry: Arc<TenantEntry>,
        clock: Arc<dyn Clock>,
        store: Arc<dyn DurableStore>,
        events: EventSink,
        period: Duration,
    ) -> Self {
        Self {
            entry,
            clock,
            store,
            events,
            period,
        }
    }

    /// Tick every `period` until `shutdown` flips to true (or its sender is
    /// dropped) or the tenant is closed. Tick errors are logged and the loop
    /// carries on.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let tenant = self.entry.tenant();
        info!(%tenant, period_ms = self.period.as_millis() as u64, "tenant scheduler started");

        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.tick().await {
                        Ok(()) => {}
                        Err(SchedulerError::TenantClosed { .. }) => {
                            info!(%tenant, "tenant closed, scheduler exiting");
                            break;
                        }
                        Err(e) => error!(%tenant, error = %e, "scheduler tick error"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(%tenant, "tenant scheduler shutting down");
                        break;
                    }
                }
            }
        }

        self.teardown().await;
    }

    /// One pass under the tenant lock. Events are emitted before the lock is
    /// released so the delivery order matches the transition order.
    pub async fn tick(&self) -> Result<()> {
        let now = self.clock.now();
        let mut state = self.entry.state().lock().await;
        let report = state.tick(now)?;
        if report.timers_removed {
            save_logged(self.store.as_ref(), &state.snapshot());
        }
        self.events.emit_all(report.events);
        Ok(())
    }

    async fn teardown(&self) {
        let mut state = self.entry.state().lock().await;
        if let Some(event) = state.release_link() {
            debug!(tenant = %self.entry.tenant(), "releasing delivery link on exit");
            self.events.emit(event);
        }
    }
}
