use async_trait::async_trait;

use schoolbell_core::TenantId;

use crate::{
    error::ChannelError,
    types::{ChannelStatus, OutboundMessage, VoiceCue},
};

/// Common interface implemented by every delivery adapter (chat platform,
/// console log, test recorder).
///
/// Implementations must be `Send + Sync` so one adapter can serve the
/// delivery task and the background voice tasks at the same time.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Stable lowercase identifier, unique within a
    /// [`ChannelManager`](crate::manager::ChannelManager).
    fn name(&self) -> &str;

    async fn connect(&mut self) -> Result<(), ChannelError>;

    async fn disconnect(&mut self) -> Result<(), ChannelError>;

    /// Deliver a single text message.
    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError>;

    /// Play a cue in a voice channel. Text-only adapters ignore it.
    async fn announce(&self, _cue: &VoiceCue) -> Result<(), ChannelError> {
        Ok(())
    }

    /// Drop any voice connection held for `tenant`.
    async fn release_voice(&self, _tenant: TenantId) -> Result<(), ChannelError> {
        Ok(())
    }

    fn status(&self) -> ChannelStatus;
}
