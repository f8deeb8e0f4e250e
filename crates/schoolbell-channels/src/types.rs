use serde::{Deserialize, Serialize};

use schoolbell_core::{ChannelId, TenantId};

/// A text message for one channel of one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub tenant: TenantId,
    pub channel: ChannelId,
    /// At most one chunk; longer texts are split before sending.
    pub content: String,
    pub format: MessageFormat,
}

/// Formatting hint for outbound message content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageFormat {
    #[default]
    PlainText,
    /// Bold markers and bullets as rendered by chat platforms.
    Markdown,
}

/// A sentence to be played (bell plus speech) in a voice channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceCue {
    pub tenant: TenantId,
    pub channel: ChannelId,
    pub sentence: String,
}

/// Runtime connection state of a channel adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Connected,
    Disconnected,
}
