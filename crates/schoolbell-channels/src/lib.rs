//! `schoolbell-channels`: delivery of scheduler notifications.
//!
//! The scheduler never talks to a chat platform directly. It pushes
//! [`schoolbell_core::Notification`]s onto a bounded channel; the
//! [`delivery::run_delivery`] task renders each one ([`render::Renderer`])
//! and hands the result to every adapter registered in a
//! [`manager::ChannelManager`].

pub mod channel;
pub mod delivery;
pub mod error;
pub mod log_channel;
pub mod manager;
pub mod render;
pub mod send;
pub mod types;

pub use channel::Channel;
pub use delivery::run_delivery;
pub use error::ChannelError;
pub use log_channel::LogChannel;
pub use manager::ChannelManager;
pub use render::{Delivery, Language, Renderer};
pub use send::{send_chunked, split_chunks};
pub use types::{ChannelStatus, MessageFormat, OutboundMessage, VoiceCue};
