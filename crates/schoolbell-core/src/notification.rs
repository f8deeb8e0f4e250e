//! Scheduler events shared between the scheduler engine and the delivery channels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ChannelId, Mode, TenantId};

/// Why a timer terminated itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AutoStopReason {
    /// The configured number of active/rest cycles completed.
    Cycles { completed: u32 },
    /// The configured deadline passed.
    Deadline,
}

/// A discrete event produced by the scheduler for the delivery side.
///
/// Events carry their own delivery targets so the dispatcher never needs to
/// read tenant state. The scheduler pushes them with `try_send` and never
/// waits for delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    /// A timer flipped to `mode`.
    PhaseChanged {
        tenant: TenantId,
        timer: String,
        mode: Mode,
        channel: ChannelId,
        voice: Option<ChannelId>,
    },
    /// A break window fired. `extending` is true when it lengthened an
    /// already-running pause instead of starting one.
    BreakStarted {
        tenant: TenantId,
        label: String,
        duration_secs: u64,
        ends_at: DateTime<Utc>,
        extending: bool,
        channels: Vec<ChannelId>,
        voice: Option<ChannelId>,
    },
    /// The global pause ended and every timer resumed.
    Resumed {
        tenant: TenantId,
        /// True when ended early by command.
        forced: bool,
        channels: Vec<ChannelId>,
        voice: Option<ChannelId>,
    },
    /// A timer reached its auto-stop condition and was deleted.
    AutoStopped {
        tenant: TenantId,
        timer: String,
        reason: AutoStopReason,
        channel: ChannelId,
    },
    /// Nothing schedulable remains; the delivery side should drop any live
    /// voice connection for the tenant.
    ReleaseLink { tenant: TenantId },
}

impl Notification {
    pub fn tenant(&self) -> TenantId {
        match self {
            Notification::PhaseChanged { tenant, .. }
            | Notification::BreakStarted { tenant, .. }
            | Notification::Resumed { tenant, .. }
            | Notification::AutoStopped { tenant, .. }
            | Notification::ReleaseLink { tenant } => *tenant,
        }
    }

    /// Short event name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::PhaseChanged { .. } => "phase_changed",
            Notification::BreakStarted { .. } => "break_started",
            Notification::Resumed { .. } => "resumed",
            Notification::AutoStopped { .. } => "auto_stopped",
            Notification::ReleaseLink { .. } => "release_link",
        }
    }
}
