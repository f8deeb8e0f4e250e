//! A single active/rest cycle with pause and auto-stop state.
//!
//! Every operation takes `now` explicitly and must be called with the owning
//! tenant's lock held.

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use schoolbell_core::{AutoStopReason, ChannelId, Mode, TimerSeed};

use crate::error::{Result, SchedulerError};

/// Where a timer's remaining time currently lives.
///
/// Exactly one variant applies at any instant, so "phase end", "global
/// remainder" and "personal remainder" can never be set together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerClock {
    /// Counting down toward `phase_end_at`.
    Running { phase_end_at: DateTime<Utc> },
    /// Frozen by a tenant-wide break.
    GloballyPaused { remaining: Duration },
    /// Frozen by the timer's own pause; ignored by global pause/resume.
    PersonallyPaused { remaining: Duration },
}

/// Upper bound on any user-supplied phase, break, remainder or deadline.
pub const MAX_DURATION_SECS: u64 = 366 * 24 * 60 * 60;

/// Turn user-supplied seconds into a duration, rejecting zero and anything
/// beyond [`MAX_DURATION_SECS`].
pub fn checked_duration(secs: u64, what: &str) -> Result<Duration> {
    if secs == 0 {
        return Err(SchedulerError::InvalidInput(format!("{what} must be positive")));
    }
    if secs > MAX_DURATION_SECS {
        return Err(SchedulerError::InvalidInput(format!(
            "{what} must be at most {} days ({secs}s given)",
            MAX_DURATION_SECS / 86_400
        )));
    }
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or_else(|| SchedulerError::InvalidInput(format!("{what} is out of range")))
}

/// `now + offset`, or `InvalidInput` when the instant is not representable.
pub fn checked_instant(now: DateTime<Utc>, offset: Duration) -> Result<DateTime<Utc>> {
    now.checked_add_signed(offset)
        .ok_or_else(|| SchedulerError::InvalidInput("instant out of range".to_string()))
}

/// Active and rest durations, both positive and within [`MAX_DURATION_SECS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSpec {
    pub active_secs: u64,
    pub rest_secs: u64,
}

impl TimerSpec {
    pub fn new(active_secs: u64, rest_secs: u64) -> Result<Self> {
        checked_duration(active_secs, "active duration")?;
        checked_duration(rest_secs, "rest duration")?;
        Ok(Self {
            active_secs,
            rest_secs,
        })
    }

    pub fn duration(&self, mode: Mode) -> Duration {
        let secs = match mode {
            Mode::Active => self.active_secs,
            Mode::Rest => self.rest_secs,
        };
        // Bounded by construction.
        Duration::seconds(secs.min(MAX_DURATION_SECS) as i64)
    }
}

#[derive(Debug, Clone)]
pub struct Timer {
    name: String,
    spec: TimerSpec,
    mode: Mode,
    clock: TimerClock,
    channel: ChannelId,
    /// Stop after this many Active→Rest→Active completions.
    auto_stop_cycles: Option<u32>,
    cycle_count: u32,
    auto_stop_at: Option<DateTime<Utc>>,
}

impl Timer {
    /// A fresh timer in the Active phase, ending one active duration from `now`.
    pub fn new(
        name: impl Into<String>,
        spec: TimerSpec,
        channel: ChannelId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            spec,
            mode: Mode::Active,
            clock: TimerClock::Running {
                phase_end_at: now + spec.duration(Mode::Active),
            },
            channel,
            auto_stop_cycles: None,
            cycle_count: 0,
            auto_stop_at: None,
        }
    }

    pub fn with_auto_stop(mut self, cycles: Option<u32>, at: Option<DateTime<Utc>>) -> Self {
        self.auto_stop_cycles = cycles.filter(|c| *c > 0);
        self.auto_stop_at = at;
        self
    }

    /// Recreate a timer from durable config. Progress restarts at Active.
    pub fn from_seed(seed: &TimerSeed, now: DateTime<Utc>) -> Result<Self> {
        let spec = TimerSpec::new(seed.active_secs, seed.rest_secs)?;
        Ok(Self::new(seed.name.clone(), spec, seed.channel, now)
            .with_auto_stop(seed.auto_stop_cycles, None))
    }

    pub fn to_seed(&self) -> TimerSeed {
        TimerSeed {
            name: self.name.clone(),
            active_secs: self.spec.active_secs,
            rest_secs: self.spec.rest_secs,
            channel: self.channel,
            auto_stop_cycles: self.auto_stop_cycles,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> TimerSpec {
        self.spec
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn clock(&self) -> TimerClock {
        self.clock
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn cycle_count(&self) -> u32 {
        self.cycle_count
    }

    pub fn auto_stop_cycles(&self) -> Option<u32> {
        self.auto_stop_cycles
    }

    pub fn auto_stop_at(&self) -> Option<DateTime<Utc>> {
        self.auto_stop_at
    }

    pub fn is_personally_paused(&self) -> bool {
        matches!(self.clock, TimerClock::PersonallyPaused { .. })
    }

    pub fn phase_end_at(&self) -> Option<DateTime<Utc>> {
        match self.clock {
            TimerClock::Running { phase_end_at } => Some(phase_end_at),
            _ => None,
        }
    }

    /// Time left in the current phase, never negative.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        match self.clock {
            TimerClock::Running { phase_end_at } => non_negative(phase_end_at - now),
            TimerClock::GloballyPaused { remaining }
            | TimerClock::PersonallyPaused { remaining } => remaining,
        }
    }

    /// Freeze for a tenant-wide break.
    ///
    /// No-op when personally paused (that pause owns the bookkeeping) or when
    /// already globally paused (the captured remainder must not be overwritten).
    pub fn pause(&mut self, now: DateTime<Utc>) {
        if let TimerClock::Running { phase_end_at } = self.clock {
            self.clock = TimerClock::GloballyPaused {
                remaining: non_negative(phase_end_at - now),
            };
        }
    }

    /// Thaw after a tenant-wide break. No-op unless globally paused.
    pub fn resume(&mut self, now: DateTime<Utc>) {
        if let TimerClock::GloballyPaused { remaining } = self.clock {
            self.clock = TimerClock::Running {
                phase_end_at: now + remaining,
            };
        }
    }

    /// Freeze this timer on its own.
    ///
    /// During a break the already-captured global remainder moves over, so the
    /// later global resume cannot apply it a second time.
    pub fn personal_pause(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.clock = match self.clock {
            TimerClock::PersonallyPaused { .. } => {
                return Err(SchedulerError::AlreadyPaused {
                    name: self.name.clone(),
                })
            }
            TimerClock::GloballyPaused { remaining } => TimerClock::PersonallyPaused { remaining },
            TimerClock::Running { phase_end_at } => TimerClock::PersonallyPaused {
                remaining: non_negative(phase_end_at - now),
            },
        };
        Ok(())
    }

    /// Undo [`Timer::personal_pause`]. During a break the timer rejoins the
    /// group and resumes with it.
    pub fn personal_resume(&mut self, global_pause_active: bool, now: DateTime<Utc>) -> Result<()> {
        let TimerClock::PersonallyPaused { remaining } = self.clock else {
            return Err(SchedulerError::NotPaused {
                name: self.name.clone(),
            });
        };
        self.clock = if global_pause_active {
            TimerClock::GloballyPaused { remaining }
        } else {
            TimerClock::Running {
                phase_end_at: now + remaining,
            }
        };
        Ok(())
    }

    /// Overwrite the time left in the current phase, whichever clock holds it.
    pub fn set_remaining(&mut self, remaining: Duration, now: DateTime<Utc>) {
        let remaining = non_negative(remaining);
        self.clock = match self.clock {
            TimerClock::Running { .. } => TimerClock::Running {
                phase_end_at: now + remaining,
            },
            TimerClock::GloballyPaused { .. } => TimerClock::GloballyPaused { remaining },
            TimerClock::PersonallyPaused { .. } => TimerClock::PersonallyPaused { remaining },
        };
    }

    /// Decide whether the timer terminates at `now`. Must run before
    /// [`Timer::advance_phase`]; never fires while paused.
    ///
    /// A cycle-count stop consumes the pending Rest→Active transition: the
    /// cycle is counted and the timer should be deleted instead of advanced.
    pub fn check_auto_stop(&mut self, now: DateTime<Utc>) -> Option<AutoStopReason> {
        let TimerClock::Running { phase_end_at } = self.clock else {
            return None;
        };
        if self.auto_stop_at.is_some_and(|at| now >= at) {
            return Some(AutoStopReason::Deadline);
        }
        let completes_cycle = self.mode == Mode::Rest && now >= phase_end_at;
        match self.auto_stop_cycles {
            Some(limit) if completes_cycle && self.cycle_count + 1 >= limit => {
                self.cycle_count += 1;
                Some(AutoStopReason::Cycles {
                    completed: self.cycle_count,
                })
            }
            _ => None,
        }
    }

    /// Flip to the next phase if the current one has ended.
    ///
    /// The amount by which `now` overshot the phase end is taken off the next
    /// phase, so tick latency never accumulates into drift. After a stall
    /// longer than the new phase the end is still in the past and the
    /// following ticks flip again until the timer is back on its schedule.
    /// Returns the new mode, or `None` when nothing was due.
    pub fn advance_phase(&mut self, now: DateTime<Utc>) -> Option<Mode> {
        let TimerClock::Running { phase_end_at } = self.clock else {
            return None;
        };
        if now < phase_end_at {
            return None;
        }

        let overshoot = now - phase_end_at;
        let next = self.mode.flip();
        let duration = self.spec.duration(next);
        let next_end = now + duration - overshoot;
        if next_end <= now {
            warn!(
                timer = %self.name,
                overshoot_secs = overshoot.num_seconds(),
                "timer fell a whole phase behind, catching up"
            );
        }

        if self.mode == Mode::Rest {
            self.cycle_count += 1;
        }
        self.mode = next;
        self.clock = TimerClock::Running {
            phase_end_at: next_end,
        };
        Some(next)
    }
}

fn non_negative(d: Duration) -> Duration {
    d.max(Duration::zero())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn timer(active: u64, rest: u64) -> Timer {
        Timer::new("a", TimerSpec::new(active, rest).unwrap(), ChannelId(1), t(0))
    }

    #[test]
    fn zero_durations_are_rejected() {
        assert_eq!(TimerSpec::new(0, 300).unwrap_err().code(), "INVALID_INPUT");
        assert_eq!(TimerSpec::new(600, 0).unwrap_err().code(), "INVALID_INPUT");
    }

    #[test]
    fn advance_subtracts_overshoot() {
        let mut a = timer(600, 300);
        assert_eq!(a.advance_phase(t(605)), Some(Mode::Rest));
        // now + rest - overshoot = 605 + 300 - 5
        assert_eq!(a.phase_end_at(), Some(t(900)));
        assert_eq!(a.mode(), Mode::Rest);
    }

    #[test]
    fn advance_is_idempotent_at_the_same_instant() {
        let mut a = timer(600, 300);
        assert_eq!(a.advance_phase(t(600)), Some(Mode::Rest));
        assert_eq!(a.advance_phase(t(600)), None);
        assert_eq!(a.mode(), Mode::Rest);
        assert_eq!(a.phase_end_at(), Some(t(900)));
    }

    #[test]
    fn advance_not_due_does_nothing() {
        let mut a = timer(600, 300);
        assert_eq!(a.advance_phase(t(599)), None);
        assert_eq!(a.phase_end_at(), Some(t(600)));
    }

    #[test]
    fn overshoot_longer_than_the_next_phase_is_still_subtracted() {
        let mut a = timer(600, 300);
        assert_eq!(a.advance_phase(t(1000)), Some(Mode::Rest));
        // 1000 + 300 - 400
        assert_eq!(a.phase_end_at(), Some(t(900)));
    }

    #[test]
    fn long_stall_catches_up_on_the_original_schedule() {
        let mut a = timer(600, 300);
        let mut flips = Vec::new();
        while let Some(mode) = a.advance_phase(t(2000)) {
            flips.push(mode);
        }
        assert_eq!(flips, vec![Mode::Rest, Mode::Active, Mode::Rest, Mode::Active]);
        // Ends at 600, 900, 1500, 1800, then 2400: no drift from the stall.
        assert_eq!(a.phase_end_at(), Some(t(2400)));
        assert_eq!(a.cycle_count(), 2);
    }

    #[test]
    fn oversized_durations_are_rejected() {
        let too_long = MAX_DURATION_SECS + 1;
        assert_eq!(TimerSpec::new(too_long, 300).unwrap_err().code(), "INVALID_INPUT");
        assert_eq!(TimerSpec::new(600, 10_000_000_000_000).unwrap_err().code(), "INVALID_INPUT");
        assert!(TimerSpec::new(MAX_DURATION_SECS, MAX_DURATION_SECS).is_ok());
        assert_eq!(checked_duration(u64::MAX, "x").unwrap_err().code(), "INVALID_INPUT");
    }

    #[test]
    fn global_pause_captures_and_resume_restores() {
        let mut a = timer(600, 300);
        a.pause(t(100));
        assert_eq!(a.clock(), TimerClock::GloballyPaused { remaining: Duration::seconds(500) });
        // A second capture must not overwrite the first.
        a.pause(t(200));
        assert_eq!(a.remaining(t(200)), Duration::seconds(500));
        a.resume(t(400));
        assert_eq!(a.phase_end_at(), Some(t(900)));
    }

    #[test]
    fn pause_after_phase_end_clamps_to_zero() {
        let mut a = timer(600, 300);
        a.pause(t(650));
        assert_eq!(a.remaining(t(650)), Duration::zero());
    }

    #[test]
    fn global_ops_skip_personally_paused_timer() {
        let mut a = timer(600, 300);
        a.personal_pause(t(100)).unwrap();
        a.pause(t(150));
        a.resume(t(300));
        assert_eq!(a.clock(), TimerClock::PersonallyPaused { remaining: Duration::seconds(500) });
    }

    #[test]
    fn double_personal_pause_is_rejected_without_effect() {
        let mut a = timer(600, 300);
        a.personal_pause(t(100)).unwrap();
        let err = a.personal_pause(t(200)).unwrap_err();
        assert_eq!(err.code(), "ALREADY_PAUSED");
        assert_eq!(a.remaining(t(200)), Duration::seconds(500));
    }

    #[test]
    fn personal_resume_requires_pause() {
        let mut a = timer(600, 300);
        assert_eq!(a.personal_resume(false, t(10)).unwrap_err().code(), "NOT_PAUSED");
        assert_eq!(a.phase_end_at(), Some(t(600)));
    }

    #[test]
    fn personal_pause_inside_break_is_not_double_counted() {
        let mut a = timer(600, 300);
        // Break at 100 captures 500s.
        a.pause(t(100));
        // Personal pause during the break takes over the captured 500s.
        a.personal_pause(t(150)).unwrap();
        // Break ends: global resume must leave the timer alone.
        a.resume(t(220));
        assert!(a.is_personally_paused());
        a.personal_resume(false, t(1000)).unwrap();
        assert_eq!(a.phase_end_at(), Some(t(1500)));
    }

    #[test]
    fn personal_resume_during_break_rejoins_the_group() {
        let mut a = timer(600, 300);
        a.personal_pause(t(100)).unwrap();
        a.personal_resume(true, t(200)).unwrap();
        assert_eq!(a.clock(), TimerClock::GloballyPaused { remaining: Duration::seconds(500) });
        a.resume(t(300));
        assert_eq!(a.phase_end_at(), Some(t(800)));
    }

    #[test]
    fn set_remaining_targets_the_active_clock() {
        let mut a = timer(600, 300);
        a.set_remaining(Duration::seconds(30), t(10));
        assert_eq!(a.phase_end_at(), Some(t(40)));

        a.personal_pause(t(20)).unwrap();
        a.set_remaining(Duration::seconds(90), t(25));
        assert_eq!(a.clock(), TimerClock::PersonallyPaused { remaining: Duration::seconds(90) });
    }

    #[test]
    fn auto_stop_after_configured_cycles() {
        let mut a = timer(60, 30).with_auto_stop(Some(2), None);
        let mut now = 0;
        let mut stopped = None;
        for _ in 0..10 {
            now += 60;
            if let Some(reason) = a.check_auto_stop(t(now)) {
                stopped = Some(reason);
                break;
            }
            a.advance_phase(t(now));
        }
        assert_eq!(stopped, Some(AutoStopReason::Cycles { completed: 2 }));
        assert_eq!(a.cycle_count(), 2);
    }

    #[test]
    fn auto_stop_never_fires_while_paused() {
        let mut a = timer(60, 30).with_auto_stop(None, Some(t(100)));
        a.personal_pause(t(50)).unwrap();
        assert_eq!(a.check_auto_stop(t(500)), None);
        a.personal_resume(false, t(500)).unwrap();
        assert_eq!(a.check_auto_stop(t(500)), Some(AutoStopReason::Deadline));
    }

    #[test]
    fn seed_round_trip_restarts_at_active() {
        let mut a = timer(600, 300).with_auto_stop(Some(3), None);
        a.advance_phase(t(600));
        let revived = Timer::from_seed(&a.to_seed(), t(5000)).unwrap();
        assert_eq!(revived.mode(), Mode::Active);
        assert_eq!(revived.phase_end_at(), Some(t(5600)));
        assert_eq!(revived.auto_stop_cycles(), Some(3));
    }
}
