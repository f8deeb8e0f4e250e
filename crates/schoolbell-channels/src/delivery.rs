//! Background task turning scheduler notifications into channel traffic.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use schoolbell_core::{Notification, TenantId};

use crate::{
    manager::ChannelManager,
    render::{Delivery, Renderer},
    send::send_chunked,
    types::VoiceCue,
};

/// Pending voice work per tenant before new cues are dropped.
const VOICE_QUEUE: usize = 32;

#[derive(Debug)]
enum VoiceJob {
    Cue(VoiceCue),
    Release,
}

/// One queue and worker per tenant. Cues for a tenant play one after another
/// and a link release waits for the cues queued before it.
struct VoiceLanes {
    manager: Arc<ChannelManager>,
    lanes: HashMap<TenantId, mpsc::Sender<VoiceJob>>,
    workers: Vec<JoinHandle<()>>,
}

impl VoiceLanes {
    fn new(manager: Arc<ChannelManager>) -> Self {
        Self {
            manager,
            lanes: HashMap::new(),
            workers: Vec::new(),
        }
    }

    fn push(&mut self, tenant: TenantId, job: VoiceJob) {
        let Self {
            manager,
            lanes,
            workers,
        } = self;
        let tx = lanes.entry(tenant).or_insert_with(|| {
            let (tx, rx) = mpsc::channel(VOICE_QUEUE);
            workers.push(tokio::spawn(run_voice_lane(Arc::clone(manager), tenant, rx)));
            tx
        });
        if let Err(e) = tx.try_send(job) {
            warn!(%tenant, error = %e, "voice queue full or closed, job dropped");
        }
    }

    /// Close every lane and wait for queued voice work to finish.
    async fn drain(self) {
        drop(self.lanes);
        for worker in self.workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "voice worker ended abnormally");
            }
        }
    }
}

async fn run_voice_lane(
    manager: Arc<ChannelManager>,
    tenant: TenantId,
    mut rx: mpsc::Receiver<VoiceJob>,
) {
    while let Some(job) = rx.recv().await {
        match job {
            VoiceJob::Cue(cue) => manager.announce(&cue).await,
            VoiceJob::Release => manager.release_voice(tenant).await,
        }
    }
    debug!(%tenant, "voice lane closed");
}

/// Drain `rx` until every sender is gone.
///
/// Text is sent inline, in event order. Voice cues and link releases go to a
/// per-tenant worker so slow audio never holds up the next message. Queued
/// voice work is finished before returning.
pub async fn run_delivery(
    manager: Arc<ChannelManager>,
    renderer: Renderer,
    chunk_max: usize,
    mut rx: mpsc::Receiver<Notification>,
) {
    info!(chunk_max, "delivery task started");
    let mut voice = VoiceLanes::new(Arc::clone(&manager));
    while let Some(event) = rx.recv().await {
        debug!(tenant = %event.tenant(), kind = event.kind(), "delivering notification");
        for delivery in renderer.render(&event) {
            match delivery {
                Delivery::Text(msg) => {
                    send_chunked(&manager, msg.tenant, msg.channel, &msg.content, chunk_max).await;
                }
                Delivery::Voice(cue) => voice.push(cue.tenant, VoiceJob::Cue(cue)),
                Delivery::Release(tenant) => voice.push(tenant, VoiceJob::Release),
            }
        }
    }
    voice.drain().await;
    info!("delivery task exiting (channel closed)");
}
