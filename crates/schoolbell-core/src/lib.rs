//! `schoolbell-core`: configuration, errors and the types shared between the
//! scheduler engine and the delivery channels.

pub mod config;
pub mod error;
pub mod notification;
pub mod types;

pub use config::SchoolbellConfig;
pub use error::{Result, SchoolbellError};
pub use notification::{AutoStopReason, Notification};
pub use types::{BreakKind, BreakSeed, ChannelId, Mode, TenantId, TenantSeed, TimeOfDay, TimerSeed};
