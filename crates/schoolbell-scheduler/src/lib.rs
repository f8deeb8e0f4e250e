//! `schoolbell-scheduler`: per-tenant focus timers and break windows.
//!
//! # Overview
//!
//! Each tenant owns a [`state::TenantState`] behind a `tokio::sync::Mutex`
//! and one polling task ([`engine::TenantLoop`]). Every tick, under the lock:
//!
//! 1. due break windows fire and start or extend the tenant-wide pause;
//! 2. an elapsed pause resumes every timer it froze;
//! 3. unpaused timers auto-stop or flip between active and rest.
//!
//! Commands ([`actions::Action`]) take the same lock, so ticks and commands
//! never interleave. Resulting [`schoolbell_core::Notification`]s are pushed
//! onto a bounded channel without waiting.
//!
//! # Timer clocks
//!
//! | Variant            | Meaning                                       |
//! |--------------------|-----------------------------------------------|
//! | `Running`          | counting down to `phase_end_at`               |
//! | `GloballyPaused`   | frozen by a break window, resumes with it     |
//! | `PersonallyPaused` | frozen on its own, untouched by breaks        |

pub mod actions;
pub mod breaks;
pub mod clock;
pub mod engine;
pub mod error;
pub mod pause;
pub mod registry;
pub mod state;
pub mod status;
pub mod store;
pub mod timer;

pub use actions::{render_replies, Action, CommandContext, Reply, TimerDurations};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{EventSink, TenantLoop};
pub use error::{Result, SchedulerError};
pub use registry::{RegistryOptions, TenantRegistry};
pub use state::{TenantState, TickReport};
pub use store::{DurableStore, MemoryStore};
pub use timer::{Timer, TimerClock, TimerSpec};
