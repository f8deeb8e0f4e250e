//! Structured commands applied to a tenant under its lock, and the replies
//! they produce.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::info;

use schoolbell_core::{config::PresetConfig, BreakKind, ChannelId, Notification, TimeOfDay};

use crate::{
    breaks::BreakWindow,
    error::{Result, SchedulerError},
    state::TenantState,
    status::{fmt_mm_ss, render_status},
    timer::{checked_duration, checked_instant, Timer, TimerSpec},
};

/// How a new timer gets its active/rest durations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimerDurations {
    Explicit { active_secs: u64, rest_secs: u64 },
    Preset { preset: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Create (or restart) a named timer in the command's text channel.
    StartTimer {
        name: String,
        #[serde(flatten)]
        durations: TimerDurations,
        #[serde(default)]
        auto_stop_cycles: Option<u32>,
        #[serde(default)]
        auto_stop_after_secs: Option<u64>,
    },
    StopTimer {
        name: String,
    },
    PauseTimer {
        name: String,
    },
    ResumeTimer {
        name: String,
    },
    SetRemaining {
        name: String,
        secs: u64,
    },
    AddBreak {
        #[serde(default = "default_break_kind")]
        kind: BreakKind,
        label: String,
        time_of_day: TimeOfDay,
        duration_secs: u64,
    },
    DeleteBreak {
        #[serde(default = "default_break_kind")]
        kind: BreakKind,
        label: String,
    },
    EndBreak,
    Shutdown,
    Status,
}

fn default_break_kind() -> BreakKind {
    BreakKind::Recurring
}

/// Where a command came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandContext {
    pub text_channel: ChannelId,
    /// The issuer's current voice channel, if they are in one.
    #[serde(default)]
    pub voice_channel: Option<ChannelId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    TimerStarted {
        name: String,
        spec: TimerSpec,
        /// `None` while a break holds the new timer.
        first_change: Option<DateTime<Tz>>,
    },
    TimerStopped {
        name: String,
    },
    TimerPaused {
        name: String,
        remaining: Duration,
    },
    TimerResumed {
        name: String,
        /// Rejoined a running break instead of counting down.
        held_by_break: bool,
    },
    RemainingSet {
        name: String,
        remaining: Duration,
    },
    BreakAdded {
        kind: BreakKind,
        label: String,
        next: DateTime<Tz>,
        duration_secs: u64,
        replaced: bool,
    },
    BreakDeleted {
        kind: BreakKind,
        label: String,
    },
    BreakEnded,
    ShutDown,
    Status(String),
}

impl Reply {
    /// The reply follows a change the durable store must see.
    pub fn is_durable(&self) -> bool {
        matches!(
            self,
            Reply::TimerStarted { .. }
                | Reply::TimerStopped { .. }
                | Reply::BreakAdded { .. }
                | Reply::BreakDeleted { .. }
                | Reply::ShutDown
        )
    }

    /// The reply follows the creation of something the loop must drive.
    pub fn arms_scheduler(&self) -> bool {
        matches!(self, Reply::TimerStarted { .. } | Reply::BreakAdded { .. })
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::TimerStarted {
                name,
                spec,
                first_change: Some(at),
            } => write!(
                f,
                "✅ **{name}** started: active {}m / rest {}m, first change {}",
                spec.active_secs / 60,
                spec.rest_secs / 60,
                at.format("%H:%M:%S")
            ),
            Reply::TimerStarted {
                name,
                spec,
                first_change: None,
            } => write!(
                f,
                "✅ **{name}** registered during a break (starts when it ends): \
                 active {}m / rest {}m",
                spec.active_secs / 60,
                spec.rest_secs / 60
            ),
            Reply::TimerStopped { name } => write!(f, "✅ **{name}** stopped"),
            Reply::TimerPaused { name, remaining } => {
                write!(f, "⏸️ **{name}** paused ({} left)", fmt_mm_ss(*remaining))
            }
            Reply::TimerResumed {
                name,
                held_by_break: true,
            } => write!(f, "▶️ **{name}** will resume with everyone after the break"),
            Reply::TimerResumed { name, .. } => write!(f, "▶️ **{name}** resumed"),
            Reply::RemainingSet { name, remaining } => {
                write!(f, "⏱️ **{name}** now has {} left", fmt_mm_ss(*remaining))
            }
            Reply::BreakAdded {
                kind,
                label,
                next,
                duration_secs,
                replaced,
            } => write!(
                f,
                "✅ {kind} break **{label}** {} for {}, next {} ({}m)",
                if *replaced { "updated" } else { "registered" },
                next.format("%H:%M"),
                next.format("%m/%d %H:%M"),
                duration_secs / 60
            ),
            Reply::BreakDeleted { kind, label } => {
                write!(f, "✅ {kind} break **{label}** removed")
            }
            Reply::BreakEnded => write!(f, "▶️ Break ended early, all timers resumed"),
            Reply::ShutDown => write!(f, "✅ Shut down: every timer and break stopped"),
            Reply::Status(text) => f.write_str(text),
        }
    }
}

/// Join a batch of outcomes into one reply text, one line per action.
pub fn render_replies(outcomes: &[Result<Reply>]) -> String {
    outcomes
        .iter()
        .map(|outcome| match outcome {
            Ok(reply) => reply.to_string(),
            Err(SchedulerError::NotOnBreak) => "ℹ️ No break is in progress".to_string(),
            Err(e) => format!("❌ {e}"),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

impl TenantState {
    /// Remember where the latest command came from.
    pub fn observe(&mut self, ctx: &CommandContext) {
        self.last_text_channel = Some(ctx.text_channel);
        if ctx.voice_channel.is_some() {
            self.voice_channel = ctx.voice_channel;
        }
    }

    /// Apply one action. Rejections leave the state untouched; events the
    /// action causes are appended to `events`.
    pub fn apply(
        &mut self,
        action: Action,
        presets: &[PresetConfig],
        now: DateTime<Utc>,
        events: &mut Vec<Notification>,
    ) -> Result<Reply> {
        let tenant = self.tenant();
        if self.is_closed() {
            return Err(SchedulerError::TenantClosed { tenant });
        }
        match action {
            Action::StartTimer {
                name,
                durations,
                auto_stop_cycles,
                auto_stop_after_secs,
            } => {
                let spec = resolve_durations(&durations, presets)?;
                let channel = self.last_text_channel.ok_or_else(|| {
                    SchedulerError::InvalidInput("no channel to report to".to_string())
                })?;
                let deadline = auto_stop_after_secs
                    .map(|s| {
                        checked_duration(s, "auto-stop delay").and_then(|d| checked_instant(now, d))
                    })
                    .transpose()?;
                let mut timer = Timer::new(name.clone(), spec, channel, now)
                    .with_auto_stop(auto_stop_cycles, deadline);
                if self.pause.is_active() {
                    timer.pause(now);
                }
                let first_change = timer
                    .phase_end_at()
                    .map(|at| at.with_timezone(&self.tz()));
                if self.timers.insert(name.clone(), timer).is_some() {
                    info!(%tenant, timer = %name, "timer restarted");
                } else {
                    info!(%tenant, timer = %name, "timer started");
                }
                Ok(Reply::TimerStarted {
                    name,
                    spec,
                    first_change,
                })
            }

            Action::StopTimer { name } => {
                self.timers
                    .shift_remove(&name)
                    .ok_or_else(|| SchedulerError::TimerNotFound { name: name.clone() })?;
                info!(%tenant, timer = %name, "timer stopped");
                Ok(Reply::TimerStopped { name })
            }

            Action::PauseTimer { name } => {
                let timer = self.timer_mut(&name)?;
                timer.personal_pause(now)?;
                let remaining = timer.remaining(now);
                Ok(Reply::TimerPaused { name, remaining })
            }

            Action::ResumeTimer { name } => {
                let held_by_break = self.pause.is_active();
                self.timer_mut(&name)?.personal_resume(held_by_break, now)?;
                Ok(Reply::TimerResumed {
                    name,
                    held_by_break,
                })
            }

            Action::SetRemaining { name, secs } => {
                let remaining = checked_duration(secs, "remaining time")?;
                self.timer_mut(&name)?.set_remaining(remaining, now);
                Ok(Reply::RemainingSet { name, remaining })
            }

            Action::AddBreak {
                kind,
                label,
                time_of_day,
                duration_secs,
            } => {
                let window =
                    BreakWindow::new(label.clone(), time_of_day, duration_secs, self.tz(), now)?;
                let next = window.next_trigger_at().with_timezone(&self.tz());
                let replaced = self.breaks_mut(kind).upsert(window);
                info!(
                    %tenant,
                    %label,
                    %kind,
                    %time_of_day,
                    duration_secs,
                    replaced,
                    "break registered"
                );
                Ok(Reply::BreakAdded {
                    kind,
                    label,
                    next,
                    duration_secs,
                    replaced,
                })
            }

            Action::DeleteBreak { kind, label } => {
                self.breaks_mut(kind)
                    .remove(&label)
                    .ok_or_else(|| SchedulerError::BreakNotFound {
                        kind,
                        label: label.clone(),
                    })?;
                info!(%tenant, %label, %kind, "break removed");
                Ok(Reply::BreakDeleted { kind, label })
            }

            Action::EndBreak => {
                self.pause.force_end(&mut self.timers, now)?;
                info!(%tenant, "break ended early");
                let event = self.resumed_event(true);
                events.push(event);
                Ok(Reply::BreakEnded)
            }

            Action::Shutdown => {
                self.clear();
                events.extend(self.release_link());
                info!(%tenant, "tenant shut down by command");
                Ok(Reply::ShutDown)
            }

            Action::Status => Ok(Reply::Status(render_status(self, now))),
        }
    }

    fn timer_mut(&mut self, name: &str) -> Result<&mut Timer> {
        self.timers
            .get_mut(name)
            .ok_or_else(|| SchedulerError::TimerNotFound {
                name: name.to_string(),
            })
    }
}

fn resolve_durations(durations: &TimerDurations, presets: &[PresetConfig]) -> Result<TimerSpec> {
    match durations {
        TimerDurations::Explicit {
            active_secs,
            rest_secs,
        } => TimerSpec::new(*active_secs, *rest_secs),
        TimerDurations::Preset { preset } => {
            let found = presets
                .iter()
                .find(|p| &p.name == preset)
                .ok_or_else(|| SchedulerError::PresetNotFound {
                    name: preset.clone(),
                })?;
            TimerSpec::new(found.active_secs, found.rest_secs)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schoolbell_core::{Mode, TenantId};

    use crate::timer::TimerClock;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn state() -> TenantState {
        let mut s = TenantState::new(TenantId(1), chrono_tz::UTC);
        s.observe(&CommandContext {
            text_channel: ChannelId(10),
            voice_channel: None,
        });
        s
    }

    fn start(name: &str, active: u64, rest: u64) -> Action {
        Action::StartTimer {
            name: name.into(),
            durations: TimerDurations::Explicit {
                active_secs: active,
                rest_secs: rest,
            },
            auto_stop_cycles: None,
            auto_stop_after_secs: None,
        }
    }

    fn apply(s: &mut TenantState, action: Action, now: DateTime<Utc>) -> Result<Reply> {
        s.apply(action, &[], now, &mut Vec::new())
    }

    #[test]
    fn start_timer_uses_command_channel() {
        let mut s = state();
        let reply = apply(&mut s, start("A", 600, 300), t(0)).unwrap();
        assert!(reply.is_durable() && reply.arms_scheduler());
        let timer = s.timer("A").unwrap();
        assert_eq!(timer.channel(), ChannelId(10));
        assert_eq!(timer.mode(), Mode::Active);
        assert_eq!(timer.phase_end_at(), Some(t(600)));
    }

    #[test]
    fn zero_durations_are_rejected_without_side_effects() {
        let mut s = state();
        let err = apply(&mut s, start("A", 0, 300), t(0)).unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
        assert!(s.timers().is_empty());
    }

    #[test]
    fn oversized_durations_are_rejected_without_side_effects() {
        let mut s = state();
        let huge = 10_000_000_000_000;
        assert_eq!(apply(&mut s, start("A", huge, 300), t(0)).unwrap_err().code(), "INVALID_INPUT");

        let mut with_deadline = start("A", 600, 300);
        if let Action::StartTimer {
            auto_stop_after_secs,
            ..
        } = &mut with_deadline
        {
            *auto_stop_after_secs = Some(u64::MAX);
        }
        assert_eq!(apply(&mut s, with_deadline, t(0)).unwrap_err().code(), "INVALID_INPUT");
        assert!(s.timers().is_empty());

        apply(&mut s, start("A", 600, 300), t(0)).unwrap();
        let set = Action::SetRemaining {
            name: "A".into(),
            secs: huge,
        };
        assert_eq!(apply(&mut s, set, t(10)).unwrap_err().code(), "INVALID_INPUT");
        assert_eq!(s.timer("A").unwrap().phase_end_at(), Some(t(600)));

        let add = Action::AddBreak {
            kind: BreakKind::OneShot,
            label: "x".into(),
            time_of_day: TimeOfDay::new(22, 13).unwrap(),
            duration_secs: huge,
        };
        assert_eq!(apply(&mut s, add, t(10)).unwrap_err().code(), "INVALID_INPUT");
        assert!(s.tick(t(100_000)).is_ok());
    }

    #[test]
    fn closed_tenant_rejects_actions() {
        let mut s = state();
        apply(&mut s, start("A", 600, 300), t(0)).unwrap();
        s.close();
        let err = apply(&mut s, start("B", 600, 300), t(1)).unwrap_err();
        assert_eq!(err.code(), "TENANT_CLOSED");
        assert!(s.timers().is_empty());
        assert_eq!(apply(&mut s, Action::Status, t(1)).unwrap_err().code(), "TENANT_CLOSED");
    }

    #[test]
    fn presets_resolve_or_reject() {
        let presets = [PresetConfig {
            name: "pomodoro".into(),
            active_secs: 1500,
            rest_secs: 300,
        }];
        let mut s = state();
        let mut events = Vec::new();
        let action = |preset: &str| Action::StartTimer {
            name: "A".into(),
            durations: TimerDurations::Preset {
                preset: preset.into(),
            },
            auto_stop_cycles: None,
            auto_stop_after_secs: None,
        };

        s.apply(action("pomodoro"), &presets, t(0), &mut events).unwrap();
        assert_eq!(s.timer("A").unwrap().spec().active_secs, 1500);

        let err = s.apply(action("deep-work"), &presets, t(0), &mut events).unwrap_err();
        assert_eq!(err.code(), "PRESET_NOT_FOUND");
    }

    #[test]
    fn timer_started_during_break_waits_for_resume() {
        let mut s = state();
        apply(&mut s, start("A", 600, 300), t(0)).unwrap();
        s.pause.trigger(&mut s.timers, Duration::seconds(120), t(100));

        let reply = apply(&mut s, start("B", 900, 300), t(110)).unwrap();
        assert!(matches!(reply, Reply::TimerStarted { first_change: None, .. }));
        assert_eq!(
            s.timer("B").unwrap().clock(),
            TimerClock::GloballyPaused { remaining: Duration::seconds(900) }
        );
        assert!(s.tick(t(220)).unwrap().events.len() == 1);
        assert_eq!(s.timer("B").unwrap().phase_end_at(), Some(t(1120)));
    }

    #[test]
    fn pause_and_resume_report_misuse() {
        let mut s = state();
        apply(&mut s, start("A", 600, 300), t(0)).unwrap();

        let err = apply(&mut s, Action::ResumeTimer { name: "A".into() }, t(10)).unwrap_err();
        assert_eq!(err.code(), "NOT_PAUSED");

        apply(&mut s, Action::PauseTimer { name: "A".into() }, t(100)).unwrap();
        let err = apply(&mut s, Action::PauseTimer { name: "A".into() }, t(110)).unwrap_err();
        assert_eq!(err.code(), "ALREADY_PAUSED");
        assert_eq!(s.timer("A").unwrap().remaining(t(500)), Duration::seconds(500));

        let reply = apply(&mut s, Action::ResumeTimer { name: "A".into() }, t(200)).unwrap();
        assert!(!reply.is_durable());
        assert_eq!(s.timer("A").unwrap().phase_end_at(), Some(t(700)));

        let err = apply(&mut s, Action::PauseTimer { name: "B".into() }, t(0)).unwrap_err();
        assert_eq!(err.code(), "TIMER_NOT_FOUND");
    }

    #[test]
    fn set_remaining_overwrites_the_active_clock() {
        let mut s = state();
        apply(&mut s, start("A", 600, 300), t(0)).unwrap();
        apply(&mut s, Action::SetRemaining { name: "A".into(), secs: 30 }, t(100)).unwrap();
        assert_eq!(s.timer("A").unwrap().phase_end_at(), Some(t(130)));

        apply(&mut s, Action::PauseTimer { name: "A".into() }, t(110)).unwrap();
        apply(&mut s, Action::SetRemaining { name: "A".into(), secs: 90 }, t(120)).unwrap();
        assert!(s.timer("A").unwrap().is_personally_paused());
        assert_eq!(s.timer("A").unwrap().remaining(t(999)), Duration::seconds(90));
    }

    #[test]
    fn break_lists_are_independent() {
        let mut s = state();
        let add = |kind| Action::AddBreak {
            kind,
            label: "lunch".into(),
            time_of_day: "12:00".parse().unwrap(),
            duration_secs: 3600,
        };
        apply(&mut s, add(BreakKind::OneShot), t(0)).unwrap();
        apply(&mut s, add(BreakKind::Recurring), t(0)).unwrap();
        let again = apply(&mut s, add(BreakKind::Recurring), t(0)).unwrap();
        assert!(matches!(again, Reply::BreakAdded { replaced: true, .. }));
        assert_eq!(s.breaks(BreakKind::Recurring).len(), 1);

        apply(
            &mut s,
            Action::DeleteBreak {
                kind: BreakKind::OneShot,
                label: "lunch".into(),
            },
            t(0),
        )
        .unwrap();
        assert!(s.breaks(BreakKind::OneShot).is_empty());
        assert_eq!(s.breaks(BreakKind::Recurring).len(), 1);

        let err = apply(
            &mut s,
            Action::DeleteBreak {
                kind: BreakKind::OneShot,
                label: "lunch".into(),
            },
            t(0),
        )
        .unwrap_err();
        assert_eq!(err.code(), "BREAK_NOT_FOUND");
    }

    #[test]
    fn end_break_forces_resume_or_informs() {
        let mut s = state();
        apply(&mut s, start("A", 600, 300), t(0)).unwrap();
        let err = apply(&mut s, Action::EndBreak, t(10)).unwrap_err();
        assert_eq!(render_replies(&[Err(err)]), "ℹ️ No break is in progress");

        s.pause.trigger(&mut s.timers, Duration::seconds(3600), t(100));
        let mut events = Vec::new();
        s.apply(Action::EndBreak, &[], t(160), &mut events).unwrap();
        assert!(matches!(events[0], Notification::Resumed { forced: true, .. }));
        assert_eq!(s.timer("A").unwrap().phase_end_at(), Some(t(660)));
        assert!(s.pause_until().is_none());
    }

    #[test]
    fn shutdown_clears_everything_and_releases_link() {
        let mut s = state();
        s.observe(&CommandContext {
            text_channel: ChannelId(10),
            voice_channel: Some(ChannelId(99)),
        });
        apply(&mut s, start("A", 60, 30), t(0)).unwrap();
        s.tick(t(60)).unwrap();

        let mut events = Vec::new();
        let reply = s.apply(Action::Shutdown, &[], t(61), &mut events).unwrap();
        assert!(reply.is_durable());
        assert!(!s.has_schedulables());
        assert!(matches!(events[..], [Notification::ReleaseLink { .. }]));
        assert!(s.snapshot().timers.is_empty());
    }

    #[test]
    fn actions_deserialize_from_json() {
        let json = r#"[
            {"type": "start_timer", "name": "A", "active_secs": 600, "rest_secs": 300},
            {"type": "start_timer", "name": "B", "preset": "pomodoro", "auto_stop_cycles": 4},
            {"type": "add_break", "label": "lunch", "time_of_day": "12:00", "duration_secs": 3600},
            {"type": "end_break"}
        ]"#;
        let actions: Vec<Action> = serde_json::from_str(json).unwrap();
        assert_eq!(actions[0], start("A", 600, 300));
        assert!(matches!(
            &actions[1],
            Action::StartTimer { durations: TimerDurations::Preset { preset }, auto_stop_cycles: Some(4), .. }
                if preset == "pomodoro"
        ));
        assert!(matches!(&actions[2], Action::AddBreak { kind: BreakKind::Recurring, .. }));
        assert_eq!(actions[3], Action::EndBreak);
    }
}
