//! Break windows and the per-tenant lists that hold them.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::warn;

use schoolbell_core::{BreakKind, BreakSeed, TimeOfDay};

use crate::error::Result;
use crate::timer::{checked_duration, MAX_DURATION_SECS};

/// Compute the next UTC instant at which `at` (tenant-local) occurs strictly
/// after `now`: today if still ahead, else tomorrow.
///
/// Always computed from the current wall clock, never from a previous trigger,
/// so occurrences missed while the process was down are skipped rather than
/// replayed. Ambiguous local times (DST fall-back) take the earlier instant;
/// a day on which the time does not exist (DST spring-forward) is skipped.
pub fn next_occurrence(at: TimeOfDay, tz: Tz, now: DateTime<Utc>) -> DateTime<Utc> {
    let mut day = now.with_timezone(&tz).date_naive();
    for _ in 0..3 {
        if let Some(candidate) = local_instant(tz, day, at) {
            if candidate > now {
                return candidate;
            }
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    warn!(%at, tz = tz.name(), "no representable local occurrence found; falling back to 24h");
    now + Duration::days(1)
}

fn local_instant(tz: Tz, day: NaiveDate, at: TimeOfDay) -> Option<DateTime<Utc>> {
    let naive = day.and_hms_opt(at.hour(), at.minute(), 0)?;
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// A daily interval that pauses every timer in the tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakWindow {
    label: String,
    time_of_day: TimeOfDay,
    duration_secs: u64,
    next_trigger_at: DateTime<Utc>,
}

/// A window that fired during a tick, handed to the pause coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredBreak {
    pub label: String,
    pub duration_secs: u64,
}

impl BreakWindow {
    pub fn new(
        label: impl Into<String>,
        time_of_day: TimeOfDay,
        duration_secs: u64,
        tz: Tz,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        checked_duration(duration_secs, "break duration")?;
        Ok(Self {
            label: label.into(),
            time_of_day,
            duration_secs,
            next_trigger_at: next_occurrence(time_of_day, tz, now),
        })
    }

    pub fn from_seed(seed: &BreakSeed, tz: Tz, now: DateTime<Utc>) -> Result<Self> {
        Self::new(seed.label.clone(), seed.time_of_day, seed.duration_secs, tz, now)
    }

    pub fn to_seed(&self, kind: BreakKind) -> BreakSeed {
        BreakSeed {
            kind,
            label: self.label.clone(),
            time_of_day: self.time_of_day,
            duration_secs: self.duration_secs,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn time_of_day(&self) -> TimeOfDay {
        self.time_of_day
    }

    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }

    pub fn duration(&self) -> Duration {
        Duration::seconds(self.duration_secs.min(MAX_DURATION_SECS) as i64)
    }

    pub fn next_trigger_at(&self) -> DateTime<Utc> {
        self.next_trigger_at
    }

    /// If due, re-arm for the next occurrence after `now` and report the firing.
    pub fn fire_if_due(&mut self, tz: Tz, now: DateTime<Utc>) -> Option<FiredBreak> {
        if now < self.next_trigger_at {
            return None;
        }
        self.next_trigger_at = next_occurrence(self.time_of_day, tz, now);
        Some(FiredBreak {
            label: self.label.clone(),
            duration_secs: self.duration_secs,
        })
    }
}

/// Ordered windows with unique labels. Order is registration order and is the
/// order windows are evaluated in when several fire in the same tick.
#[derive(Debug, Clone, Default)]
pub struct BreakList {
    windows: Vec<BreakWindow>,
}

impl BreakList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a window, replacing (in place) any window with the same label.
    /// Returns true when an existing window was replaced.
    pub fn upsert(&mut self, window: BreakWindow) -> bool {
        match self.windows.iter_mut().find(|w| w.label == window.label) {
            Some(existing) => {
                *existing = window;
                true
            }
            None => {
                self.windows.push(window);
                false
            }
        }
    }

    pub fn remove(&mut self, label: &str) -> Option<BreakWindow> {
        let idx = self.windows.iter().position(|w| w.label == label)?;
        Some(self.windows.remove(idx))
    }

    pub fn get(&self, label: &str) -> Option<&BreakWindow> {
        self.windows.iter().find(|w| w.label == label)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BreakWindow> {
        self.windows.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut BreakWindow> {
        self.windows.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn clear(&mut self) {
        self.windows.clear();
    }
}
