use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SchoolbellError;

/// Identifies an isolated tenant (a guild, or a user for direct messages).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub u64);

impl TenantId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TenantId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Platform-native channel identifier (text or voice).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u64);

impl ChannelId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ChannelId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// The two phases a timer cycles between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Active,
    Rest,
}

impl Mode {
    pub fn flip(self) -> Self {
        match self {
            Mode::Active => Mode::Rest,
            Mode::Rest => Mode::Active,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Active => "active",
            Mode::Rest => "rest",
        };
        write!(f, "{s}")
    }
}

/// Wall-clock `HH:MM` in the tenant's local timezone.
///
/// Serialised as the `"HH:MM"` string so durable records stay human-editable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    pub fn hour(&self) -> u32 {
        self.hour as u32
    }

    pub fn minute(&self) -> u32 {
        self.minute as u32
    }
}

impl FromStr for TimeOfDay {
    type Err = SchoolbellError;

    /// Accepts `H:MM` and `HH:MM`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SchoolbellError::InvalidTimeOfDay(s.to_string());
        let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return Err(invalid());
        }
        let hour: u8 = h.parse().map_err(|_| invalid())?;
        let minute: u8 = m.parse().map_err(|_| invalid())?;
        Self::new(hour, minute).ok_or_else(invalid)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = SchoolbellError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(t: TimeOfDay) -> Self {
        t.to_string()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Which of the two independent break lists a window belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakKind {
    /// Registered ad hoc; re-arms daily until deleted.
    OneShot,
    /// Part of the tenant's standing daily timetable.
    Recurring,
}

impl fmt::Display for BreakKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BreakKind::OneShot => "one-shot",
            BreakKind::Recurring => "recurring",
        };
        write!(f, "{s}")
    }
}

/// Durable timer configuration. Phase progress is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSeed {
    pub name: String,
    pub active_secs: u64,
    pub rest_secs: u64,
    /// Text channel the timer was started from; phase changes are announced there.
    pub channel: ChannelId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_stop_cycles: Option<u32>,
}

/// Durable break-window configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakSeed {
    #[serde(default = "default_break_kind")]
    pub kind: BreakKind,
    pub label: String,
    pub time_of_day: TimeOfDay,
    pub duration_secs: u64,
}

fn default_break_kind() -> BreakKind {
    BreakKind::Recurring
}

/// Everything needed to recreate a tenant after a restart.
///
/// Also used as the snapshot handed to the durable store after every durable
/// mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantSeed {
    pub tenant: TenantId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_text_channel: Option<ChannelId>,
    #[serde(default)]
    pub timers: Vec<TimerSeed>,
    #[serde(default)]
    pub breaks: Vec<BreakSeed>,
}

impl TenantSeed {
    pub fn empty(tenant: TenantId) -> Self {
        Self {
            tenant,
            last_text_channel: None,
            timers: Vec::new(),
            breaks: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty() && self.breaks.is_empty()
    }
}
