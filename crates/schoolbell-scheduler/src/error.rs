use thiserror::Error;

use schoolbell_core::{BreakKind, TenantId};

/// Errors that can occur within the scheduler subsystem.
///
/// Everything except [`SchedulerError::TenantClosed`] and
/// [`SchedulerError::Store`] is a rejection of user input: it is reported back
/// to the caller and leaves tenant state unchanged.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No timer with the given name exists in the tenant.
    #[error("Timer not found: {name}")]
    TimerNotFound { name: String },

    /// No break window with the given label exists in the named list.
    #[error("No {kind} break window labelled {label}")]
    BreakNotFound { kind: BreakKind, label: String },

    /// The requested duration preset is not configured.
    #[error("Preset not found: {name}")]
    PresetNotFound { name: String },

    /// The timer is already personally paused.
    #[error("Timer {name} is already paused")]
    AlreadyPaused { name: String },

    /// The timer is not personally paused.
    #[error("Timer {name} is not paused")]
    NotPaused { name: String },

    /// An early break end was requested while no break is running.
    #[error("No break is in progress")]
    NotOnBreak,

    /// The supplied durations or schedule are unusable.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The tenant was shut down while an operation was in flight.
    #[error("Tenant {tenant} is closed")]
    TenantClosed { tenant: TenantId },

    /// The durable store rejected a snapshot.
    #[error("Store error: {0}")]
    Store(String),
}

impl SchedulerError {
    /// Short error code string, e.g. for structured replies.
    pub fn code(&self) -> &'static str {
        match self {
            SchedulerError::TimerNotFound { .. } => "TIMER_NOT_FOUND",
            SchedulerError::BreakNotFound { .. } => "BREAK_NOT_FOUND",
            SchedulerError::PresetNotFound { .. } => "PRESET_NOT_FOUND",
            SchedulerError::AlreadyPaused { .. } => "ALREADY_PAUSED",
            SchedulerError::NotPaused { .. } => "NOT_PAUSED",
            SchedulerError::NotOnBreak => "NOT_ON_BREAK",
            SchedulerError::InvalidInput(_) => "INVALID_INPUT",
            SchedulerError::TenantClosed { .. } => "TENANT_CLOSED",
            SchedulerError::Store(_) => "STORE_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
