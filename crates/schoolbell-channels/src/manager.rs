use std::collections::HashMap;

use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

use schoolbell_core::TenantId;

use crate::{
    channel::Channel,
    error::ChannelError,
    types::{ChannelStatus, OutboundMessage, VoiceCue},
};

const BACKOFF_BASE_SECS: u64 = 5;
const BACKOFF_MAX_SECS: u64 = 300;
const MAX_ATTEMPTS: u32 = 10;
/// Jitter fraction applied to each delay (±10 %).
const JITTER_FRACTION: f64 = 0.10;

/// The set of adapters notifications are delivered through.
///
/// Every text message, voice cue and link release goes to every registered
/// adapter; a failure in one adapter is logged and never stops the others.
pub struct ChannelManager {
    channels: HashMap<String, Box<dyn Channel>>,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
        }
    }

    /// Register an adapter, replacing any adapter with the same name.
    pub fn register(&mut self, channel: Box<dyn Channel>) {
        let name = channel.name().to_string();
        info!(channel = %name, "registering channel adapter");
        self.channels.insert(name, channel);
    }

    /// Connect every adapter, retrying each with exponential backoff. An
    /// adapter that never connects is logged and left registered.
    pub async fn connect_all(&mut self) {
        for (name, channel) in self.channels.iter_mut() {
            info!(channel = %name, "connecting channel");
            if let Err(e) = connect_with_backoff(name, channel.as_mut()).await {
                error!(channel = %name, error = %e, "failed to connect channel after retries");
            }
        }
    }

    pub async fn disconnect_all(&mut self) {
        for (name, channel) in self.channels.iter_mut() {
            info!(channel = %name, "disconnecting channel");
            if let Err(e) = channel.disconnect().await {
                warn!(channel = %name, error = %e, "error while disconnecting channel");
            }
        }
    }

    /// Send one message through every adapter. Returns how many accepted it.
    pub async fn send(&self, msg: &OutboundMessage) -> usize {
        let mut delivered = 0;
        for (name, channel) in &self.channels {
            match channel.send(msg).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    channel = %name,
                    tenant = %msg.tenant,
                    target = %msg.channel,
                    error = %e,
                    "message delivery failed"
                ),
            }
        }
        delivered
    }

    pub async fn announce(&self, cue: &VoiceCue) {
        for (name, channel) in &self.channels {
            if let Err(e) = channel.announce(cue).await {
                warn!(channel = %name, tenant = %cue.tenant, error = %e, "voice cue failed");
            }
        }
    }

    pub async fn release_voice(&self, tenant: TenantId) {
        for (name, channel) in &self.channels {
            match channel.release_voice(tenant).await {
                Ok(()) => debug!(channel = %name, %tenant, "voice link released"),
                Err(e) => warn!(channel = %name, %tenant, error = %e, "voice release failed"),
            }
        }
    }

    /// Status of every adapter, sorted by name.
    pub fn statuses(&self) -> Vec<(String, ChannelStatus)> {
        let mut result: Vec<(String, ChannelStatus)> = self
            .channels
            .iter()
            .map(|(name, ch)| (name.clone(), ch.status()))
            .collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

impl Default for ChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Schedule: 5 s → 10 s → 20 s → … → 300 s (cap), up to [`MAX_ATTEMPTS`] tries.
async fn connect_with_backoff(name: &str, channel: &mut dyn Channel) -> Result<(), ChannelError> {
    let mut delay_secs = BACKOFF_BASE_SECS;
    let mut attempt = 1;
    loop {
        match channel.connect().await {
            Ok(()) => {
                info!(channel = %name, attempt, "channel connected");
                return Ok(());
            }
            Err(e) if attempt >= MAX_ATTEMPTS => {
                return Err(ChannelError::ConnectionFailed(format!(
                    "gave up after {attempt} attempts: {e}"
                )))
            }
            Err(e) => {
                let total = delay_secs + jitter_secs(delay_secs);
                warn!(
                    channel = %name,
                    attempt,
                    max = MAX_ATTEMPTS,
                    error = %e,
                    retry_after_secs = total,
                    "channel connect failed, retrying with backoff"
                );
                sleep(Duration::from_secs(total)).await;
                delay_secs = (delay_secs * 2).min(BACKOFF_MAX_SECS);
                attempt += 1;
            }
        }
    }
}

/// A jitter offset in `0..JITTER_FRACTION * base_secs`, seeded from the
/// sub-second part of the wall clock.
fn jitter_secs(base_secs: u64) -> u64 {
    let max_jitter = ((base_secs as f64) * JITTER_FRACTION) as u64;
    if max_jitter == 0 {
        return 0;
    }
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    u64::from(nanos) % max_jitter
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use schoolbell_core::ChannelId;

    use super::*;
    use crate::types::MessageFormat;

    /// Fails to connect `failures` times, then succeeds.
    struct Flaky {
        name: &'static str,
        failures: u32,
        attempts: Arc<AtomicU32>,
        status: ChannelStatus,
        fail_sends: bool,
    }

    #[async_trait]
    impl Channel for Flaky {
        fn name(&self) -> &str {
            self.name
        }

        async fn connect(&mut self) -> Result<(), ChannelError> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failures {
                return Err(ChannelError::ConnectionFailed(format!("attempt {n}")));
            }
            self.status = ChannelStatus::Connected;
            Ok(())
        }

        async fn disconnect(&mut self) -> Result<(), ChannelError> {
            self.status = ChannelStatus::Disconnected;
            Ok(())
        }

        async fn send(&self, _msg: &OutboundMessage) -> Result<(), ChannelError> {
            if self.fail_sends {
                return Err(ChannelError::SendFailed("down".into()));
            }
            Ok(())
        }

        fn status(&self) -> ChannelStatus {
            self.status.clone()
        }
    }

    fn flaky(name: &'static str, failures: u32, fail_sends: bool) -> (Box<Flaky>, Arc<AtomicU32>) {
        let attempts = Arc::new(AtomicU32::new(0));
        let channel = Flaky {
            name,
            failures,
            attempts: attempts.clone(),
            status: ChannelStatus::Disconnected,
            fail_sends,
        };
        (Box::new(channel), attempts)
    }

    #[tokio::test(start_paused = true)]
    async fn connect_retries_until_success() {
        let (channel, attempts) = flaky("chat", 2, false);
        let mut manager = ChannelManager::new();
        manager.register(channel);
        manager.connect_all().await;
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(
            manager.statuses(),
            vec![("chat".to_string(), ChannelStatus::Connected)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn connect_gives_up_after_max_attempts() {
        let (channel, attempts) = flaky("chat", u32::MAX, false);
        let mut manager = ChannelManager::new();
        manager.register(channel);
        manager.connect_all().await;
        assert_eq!(attempts.load(Ordering::SeqCst), MAX_ATTEMPTS);
        assert_eq!(
            manager.statuses(),
            vec![("chat".to_string(), ChannelStatus::Disconnected)]
        );
        let err = connect_with_backoff("chat", &mut *flaky("chat", u32::MAX, false).0)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Connection failed: gave up after 10 attempts"));
    }

    #[tokio::test]
    async fn one_failing_adapter_does_not_block_others() {
        let mut manager = ChannelManager::new();
        manager.register(flaky("good", 0, false).0);
        manager.register(flaky("bad", 0, true).0);
        let msg = OutboundMessage {
            tenant: TenantId(1),
            channel: ChannelId(2),
            content: "hi".into(),
            format: MessageFormat::PlainText,
        };
        assert_eq!(manager.send(&msg).await, 1);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        assert_eq!(jitter_secs(5), 0);
        for _ in 0..100 {
            assert!(jitter_secs(300) < 30);
        }
    }
}
