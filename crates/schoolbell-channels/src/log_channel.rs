use async_trait::async_trait;
use tracing::info;

use schoolbell_core::TenantId;

use crate::{
    channel::Channel,
    error::ChannelError,
    types::{ChannelStatus, OutboundMessage, VoiceCue},
};

/// Writes every delivery to the tracing log. Used when no chat platform is
/// configured, and handy alongside one when debugging.
#[derive(Debug)]
pub struct LogChannel {
    status: ChannelStatus,
}

impl LogChannel {
    pub fn new() -> Self {
        Self {
            status: ChannelStatus::Disconnected,
        }
    }
}

impl Default for LogChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn connect(&mut self) -> Result<(), ChannelError> {
        self.status = ChannelStatus::Connected;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ChannelError> {
        self.status = ChannelStatus::Disconnected;
        Ok(())
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError> {
        if self.status != ChannelStatus::Connected {
            return Err(ChannelError::SendFailed("log channel not connected".into()));
        }
        info!(tenant = %msg.tenant, channel = %msg.channel, content = %msg.content, "message");
        Ok(())
    }

    async fn announce(&self, cue: &VoiceCue) -> Result<(), ChannelError> {
        if self.status != ChannelStatus::Connected {
            return Err(ChannelError::Voice("log channel has no voice link".into()));
        }
        info!(tenant = %cue.tenant, voice = %cue.channel, sentence = %cue.sentence, "voice cue");
        Ok(())
    }

    async fn release_voice(&self, tenant: TenantId) -> Result<(), ChannelError> {
        info!(%tenant, "voice link released");
        Ok(())
    }

    fn status(&self) -> ChannelStatus {
        self.status.clone()
    }
}
