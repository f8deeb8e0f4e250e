//! Tenant-wide pause window shared by every break window.
//!
//! | From   | Event                          | To               |
//! |--------|--------------------------------|------------------|
//! | Idle   | window fires                   | Paused (started) |
//! | Paused | window fires, ends later       | Paused (extended)|
//! | Paused | window fires, ends no later    | Paused (no-op)   |
//! | Paused | `now >= until`                 | Idle (resumed)   |
//! | Paused | forced end                     | Idle (resumed)   |

use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;

use crate::error::{Result, SchedulerError};
use crate::timer::Timer;

/// Timers of one tenant keyed by name, in creation order.
pub type Timers = IndexMap<String, Timer>;

/// Outcome of a break window firing against the pause window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseTransition {
    /// The tenant was idle; every running timer has been frozen.
    Started { until: DateTime<Utc> },
    /// The tenant was already paused; only the end instant moved later.
    Extended { until: DateTime<Utc> },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlobalPause {
    until: Option<DateTime<Utc>>,
}

impl GlobalPause {
    pub fn until(&self) -> Option<DateTime<Utc>> {
        self.until
    }

    pub fn is_active(&self) -> bool {
        self.until.is_some()
    }

    /// Apply a window of `duration` firing at `now`.
    ///
    /// Only the transition out of Idle captures timer remainders; an extension
    /// leaves the captured values alone. Returns `None` when the window ends
    /// no later than the pause already in effect.
    pub fn trigger(
        &mut self,
        timers: &mut Timers,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> Option<PauseTransition> {
        let end = now + duration;
        match self.until {
            None => {
                for timer in timers.values_mut() {
                    timer.pause(now);
                }
                self.until = Some(end);
                Some(PauseTransition::Started { until: end })
            }
            Some(current) if end > current => {
                self.until = Some(end);
                Some(PauseTransition::Extended { until: end })
            }
            Some(_) => None,
        }
    }

    /// Resume everything if the pause window has elapsed. Returns true when a
    /// resume happened.
    pub fn expire(&mut self, timers: &mut Timers, now: DateTime<Utc>) -> bool {
        match self.until {
            Some(until) if now >= until => {
                self.release(timers, now);
                true
            }
            _ => false,
        }
    }

    /// End the pause immediately regardless of its scheduled end. Break
    /// windows keep their own schedules.
    pub fn force_end(&mut self, timers: &mut Timers, now: DateTime<Utc>) -> Result<()> {
        if self.until.is_none() {
            return Err(SchedulerError::NotOnBreak);
        }
        self.release(timers, now);
        Ok(())
    }

    /// Drop the pause window without touching timers (tenant shutdown).
    pub fn clear(&mut self) {
        self.until = None;
    }

    fn release(&mut self, timers: &mut Timers, now: DateTime<Utc>) {
        self.until = None;
        for timer in timers.values_mut() {
            timer.resume(now);
        }
    }
}
