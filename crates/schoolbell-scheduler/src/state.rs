//! Per-tenant aggregate: timers, break windows, the pause window and
//! notification targets. Guarded by the tenant lock in [`crate::registry`].

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use schoolbell_core::{BreakKind, ChannelId, Notification, TenantId, TenantSeed};

use crate::{
    breaks::{BreakList, BreakWindow, FiredBreak},
    error::{Result, SchedulerError},
    pause::{GlobalPause, PauseTransition, Timers},
    timer::{checked_duration, Timer},
};

/// Output of one scheduler tick.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Events in the order the transitions happened.
    pub events: Vec<Notification>,
    /// A timer was deleted by auto-stop, so the durable config changed.
    pub timers_removed: bool,
}

#[derive(Debug)]
pub struct TenantState {
    tenant: TenantId,
    tz: Tz,
    pub(crate) timers: Timers,
    pub(crate) one_shot: BreakList,
    pub(crate) recurring: BreakList,
    pub(crate) pause: GlobalPause,
    pub(crate) last_text_channel: Option<ChannelId>,
    pub(crate) voice_channel: Option<ChannelId>,
    /// An audible event went to the voice channel and no release followed yet.
    link_live: bool,
    closed: bool,
}

impl TenantState {
    pub fn new(tenant: TenantId, tz: Tz) -> Self {
        Self {
            tenant,
            tz,
            timers: Timers::new(),
            one_shot: BreakList::new(),
            recurring: BreakList::new(),
            pause: GlobalPause::default(),
            last_text_channel: None,
            voice_channel: None,
            link_live: false,
            closed: false,
        }
    }

    /// Recreate durable config. Timers restart at Active from `now`; windows
    /// arm for their next future occurrence. Invalid records are skipped.
    pub fn seed(&mut self, seed: &TenantSeed, now: DateTime<Utc>) {
        if seed.last_text_channel.is_some() {
            self.last_text_channel = seed.last_text_channel;
        }
        for t in &seed.timers {
            match Timer::from_seed(t, now) {
                Ok(timer) => {
                    self.timers.insert(t.name.clone(), timer);
                }
                Err(e) => warn!(
                    tenant = %self.tenant,
                    timer = %t.name,
                    error = %e,
                    "skipping invalid timer seed"
                ),
            }
        }
        for b in &seed.breaks {
            match BreakWindow::from_seed(b, self.tz, now) {
                Ok(window) => {
                    self.breaks_mut(b.kind).upsert(window);
                }
                Err(e) => warn!(
                    tenant = %self.tenant,
                    label = %b.label,
                    error = %e,
                    "skipping invalid break seed"
                ),
            }
        }
        info!(
            tenant = %self.tenant,
            timers = self.timers.len(),
            breaks = self.one_shot.len() + self.recurring.len(),
            "tenant seeded"
        );
    }

    /// Durable view of this tenant: configuration only, no progress.
    pub fn snapshot(&self) -> TenantSeed {
        TenantSeed {
            tenant: self.tenant,
            last_text_channel: self.last_text_channel,
            timers: self.timers.values().map(Timer::to_seed).collect(),
            breaks: self
                .one_shot
                .iter()
                .map(|w| w.to_seed(BreakKind::OneShot))
                .chain(self.recurring.iter().map(|w| w.to_seed(BreakKind::Recurring)))
                .collect(),
        }
    }

    pub fn tenant(&self) -> TenantId {
        self.tenant
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    pub fn timers(&self) -> &Timers {
        &self.timers
    }

    pub fn timer(&self, name: &str) -> Option<&Timer> {
        self.timers.get(name)
    }

    pub fn breaks(&self, kind: BreakKind) -> &BreakList {
        match kind {
            BreakKind::OneShot => &self.one_shot,
            BreakKind::Recurring => &self.recurring,
        }
    }

    pub(crate) fn breaks_mut(&mut self, kind: BreakKind) -> &mut BreakList {
        match kind {
            BreakKind::OneShot => &mut self.one_shot,
            BreakKind::Recurring => &mut self.recurring,
        }
    }

    pub fn pause_until(&self) -> Option<DateTime<Utc>> {
        self.pause.until()
    }

    pub fn last_text_channel(&self) -> Option<ChannelId> {
        self.last_text_channel
    }

    pub fn voice_channel(&self) -> Option<ChannelId> {
        self.voice_channel
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// True while any timer or break window exists.
    pub fn has_schedulables(&self) -> bool {
        !self.timers.is_empty() || !self.one_shot.is_empty() || !self.recurring.is_empty()
    }

    /// Forget every timer, window and the pause window. The link mark is kept
    /// so the caller can still release a live connection.
    pub(crate) fn clear(&mut self) {
        self.timers.clear();
        self.one_shot.clear();
        self.recurring.clear();
        self.pause.clear();
    }

    /// Tear down for good; the running loop exits on its next tick.
    pub(crate) fn close(&mut self) {
        self.clear();
        self.closed = true;
    }

    /// One scheduler pass. Order matters: windows fire first, then an elapsed
    /// pause resumes, then unpaused timers stop or advance.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<TickReport> {
        if self.closed {
            return Err(SchedulerError::TenantClosed {
                tenant: self.tenant,
            });
        }
        let mut report = TickReport::default();

        self.fire_breaks(now, &mut report.events);

        if self.pause.expire(&mut self.timers, now) {
            info!(tenant = %self.tenant, "break over, timers resumed");
            let event = self.resumed_event(false);
            report.events.push(event);
        }

        if !self.pause.is_active() {
            self.advance_timers(now, &mut report);
        }

        if let Some(event) = self.release_if_idle() {
            report.events.push(event);
        }
        Ok(report)
    }

    fn fire_breaks(&mut self, now: DateTime<Utc>, events: &mut Vec<Notification>) {
        let tz = self.tz;
        // Re-arm everything first, then arbitrate in list order: one-shot
        // windows before recurring ones.
        let fired: Vec<FiredBreak> = self
            .one_shot
            .iter_mut()
            .chain(self.recurring.iter_mut())
            .filter_map(|w| w.fire_if_due(tz, now))
            .collect();

        for brk in fired {
            let duration = match checked_duration(brk.duration_secs, "break duration") {
                Ok(d) => d,
                Err(e) => {
                    warn!(tenant = %self.tenant, label = %brk.label, error = %e, "skipping break");
                    continue;
                }
            };
            let (ends_at, extending) = match self.pause.trigger(&mut self.timers, duration, now) {
                Some(PauseTransition::Started { until }) => (until, false),
                Some(PauseTransition::Extended { until }) => (until, true),
                None => {
                    debug!(
                        tenant = %self.tenant,
                        label = %brk.label,
                        "break fired inside a longer pause"
                    );
                    continue;
                }
            };
            info!(
                tenant = %self.tenant,
                label = %brk.label,
                %ends_at,
                extending,
                "break window fired"
            );
            let voice = if extending { None } else { self.audible() };
            events.push(Notification::BreakStarted {
                tenant: self.tenant,
                label: brk.label,
                duration_secs: brk.duration_secs,
                ends_at,
                extending,
                channels: self.break_channels(),
                voice,
            });
        }
    }

    fn advance_timers(&mut self, now: DateTime<Utc>, report: &mut TickReport) {
        let names: Vec<String> = self.timers.keys().cloned().collect();
        for name in names {
            let Some(timer) = self.timers.get_mut(&name) else {
                debug!(tenant = %self.tenant, timer = %name, "timer removed mid-tick");
                continue;
            };
            if timer.is_personally_paused() {
                continue;
            }

            if let Some(reason) = timer.check_auto_stop(now) {
                let channel = timer.channel();
                self.timers.shift_remove(&name);
                report.timers_removed = true;
                info!(tenant = %self.tenant, timer = %name, ?reason, "timer auto-stopped");
                report.events.push(Notification::AutoStopped {
                    tenant: self.tenant,
                    timer: name,
                    reason,
                    channel,
                });
                continue;
            }

            if let Some(mode) = timer.advance_phase(now) {
                let channel = timer.channel();
                debug!(tenant = %self.tenant, timer = %name, %mode, "phase changed");
                let voice = self.audible();
                report.events.push(Notification::PhaseChanged {
                    tenant: self.tenant,
                    timer: name,
                    mode,
                    channel,
                    voice,
                });
            }
        }
    }

    /// The voice target for an audible event; marks the link as live.
    fn audible(&mut self) -> Option<ChannelId> {
        if self.voice_channel.is_some() {
            self.link_live = true;
        }
        self.voice_channel
    }

    /// Release a live link once nothing schedulable remains.
    fn release_if_idle(&mut self) -> Option<Notification> {
        if self.has_schedulables() {
            return None;
        }
        self.release_link()
    }

    /// Unconditionally release a live link (loop exit, shutdown).
    pub(crate) fn release_link(&mut self) -> Option<Notification> {
        if !self.link_live {
            return None;
        }
        self.link_live = false;
        Some(Notification::ReleaseLink {
            tenant: self.tenant,
        })
    }

    /// Every timer's channel plus the last command channel, de-duplicated in
    /// first-seen order.
    pub(crate) fn break_channels(&self) -> Vec<ChannelId> {
        let mut out: Vec<ChannelId> = Vec::new();
        let candidates = self
            .timers
            .values()
            .map(Timer::channel)
            .chain(self.last_text_channel);
        for channel in candidates {
            if !out.contains(&channel) {
                out.push(channel);
            }
        }
        out
    }

    pub(crate) fn resumed_event(&mut self, forced: bool) -> Notification {
        let voice = self.audible();
        Notification::Resumed {
            tenant: self.tenant,
            forced,
            channels: self.break_channels(),
            voice,
        }
    }
}
