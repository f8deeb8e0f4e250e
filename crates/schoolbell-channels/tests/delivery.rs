use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use schoolbell_channels::{
    run_delivery, Channel, ChannelError, ChannelManager, ChannelStatus, Language, OutboundMessage,
    Renderer, VoiceCue,
};
use schoolbell_core::{ChannelId, Mode, Notification, TenantId};

#[derive(Debug, Clone, PartialEq)]
enum Seen {
    Text(u64, String),
    Voice(u64, String),
    Release(u64),
}

#[derive(Clone, Default)]
struct Recorder {
    seen: Arc<Mutex<Vec<Seen>>>,
    /// How long each cue "plays".
    voice_delay: Duration,
    playing: Arc<AtomicUsize>,
    max_playing: Arc<AtomicUsize>,
}

impl Recorder {
    fn take(&self) -> Vec<Seen> {
        std::mem::take(&mut *self.seen.lock().unwrap())
    }
}

#[async_trait]
impl Channel for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn connect(&mut self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError> {
        self.seen
            .lock()
            .unwrap()
            .push(Seen::Text(msg.channel.get(), msg.content.clone()));
        Ok(())
    }

    async fn announce(&self, cue: &VoiceCue) -> Result<(), ChannelError> {
        let now_playing = self.playing.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_playing.fetch_max(now_playing, Ordering::SeqCst);
        tokio::time::sleep(self.voice_delay).await;
        self.playing.fetch_sub(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push(Seen::Voice(cue.channel.get(), cue.sentence.clone()));
        Ok(())
    }

    async fn release_voice(&self, tenant: TenantId) -> Result<(), ChannelError> {
        self.seen.lock().unwrap().push(Seen::Release(tenant.get()));
        Ok(())
    }

    fn status(&self) -> ChannelStatus {
        ChannelStatus::Connected
    }
}

fn spawn_delivery(chunk_max: usize) -> (mpsc::Sender<Notification>, Recorder, tokio::task::JoinHandle<()>) {
    spawn_with(Recorder::default(), chunk_max)
}

fn spawn_with(
    recorder: Recorder,
    chunk_max: usize,
) -> (mpsc::Sender<Notification>, Recorder, tokio::task::JoinHandle<()>) {
    let mut manager = ChannelManager::new();
    manager.register(Box::new(recorder.clone()));
    let (tx, rx) = mpsc::channel(16);
    let renderer = Renderer::new(chrono_tz::UTC, Language::En);
    let task = tokio::spawn(run_delivery(Arc::new(manager), renderer, chunk_max, rx));
    (tx, recorder, task)
}

#[tokio::test]
async fn events_are_rendered_in_order_and_voice_runs_detached() {
    let (tx, recorder, task) = spawn_delivery(1900);
    let tenant = TenantId(1);
    let ends_at = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();

    tx.send(Notification::PhaseChanged {
        tenant,
        timer: "A".into(),
        mode: Mode::Rest,
        channel: ChannelId(5),
        voice: Some(ChannelId(9)),
    })
    .await
    .unwrap();
    tx.send(Notification::BreakStarted {
        tenant,
        label: "tea".into(),
        duration_secs: 600,
        ends_at,
        extending: false,
        channels: vec![ChannelId(5), ChannelId(6)],
        voice: None,
    })
    .await
    .unwrap();
    tx.send(Notification::ReleaseLink { tenant }).await.unwrap();
    drop(tx);
    task.await.unwrap();

    let seen = recorder.take();
    let texts: Vec<_> = seen.iter().filter(|s| matches!(s, Seen::Text(..))).cloned().collect();
    assert_eq!(
        texts,
        vec![
            Seen::Text(5, "🔔 Bell! **A** time to rest".into()),
            Seen::Text(5, "⏸️ **tea** break! Everyone paused for 10m (resumes 22:13:20)".into()),
            Seen::Text(6, "⏸️ **tea** break! Everyone paused for 10m (resumes 22:13:20)".into()),
        ]
    );
    assert!(seen.contains(&Seen::Voice(9, "A, rest time".into())));
    assert!(seen.contains(&Seen::Release(1)));
}

#[tokio::test]
async fn long_texts_are_chunked() {
    let (tx, recorder, task) = spawn_delivery(20);
    tx.send(Notification::AutoStopped {
        tenant: TenantId(1),
        timer: "a-very-long-timer-name".into(),
        reason: schoolbell_core::AutoStopReason::Deadline,
        channel: ChannelId(3),
    })
    .await
    .unwrap();
    drop(tx);
    task.await.unwrap();

    let seen = recorder.take();
    assert!(seen.len() > 1);
    let joined: String = seen
        .iter()
        .map(|s| match s {
            Seen::Text(3, text) => {
                assert!(text.chars().count() <= 20);
                text.clone()
            }
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(joined, "⏹️ **a-very-long-timer-name** reached its end time");
}

fn phase(timer: &str, mode: Mode) -> Notification {
    Notification::PhaseChanged {
        tenant: TenantId(1),
        timer: timer.into(),
        mode,
        channel: ChannelId(5),
        voice: Some(ChannelId(9)),
    }
}

#[tokio::test(start_paused = true)]
async fn voice_cues_play_one_at_a_time_and_release_waits_for_them() {
    let recorder = Recorder {
        voice_delay: Duration::from_secs(3),
        ..Recorder::default()
    };
    let (tx, recorder, task) = spawn_with(recorder, 1900);

    tx.send(phase("A", Mode::Rest)).await.unwrap();
    tx.send(phase("B", Mode::Active)).await.unwrap();
    tx.send(Notification::ReleaseLink { tenant: TenantId(1) }).await.unwrap();
    drop(tx);
    task.await.unwrap();

    let voice: Vec<_> = recorder
        .take()
        .into_iter()
        .filter(|s| !matches!(s, Seen::Text(..)))
        .collect();
    assert_eq!(
        voice,
        vec![
            Seen::Voice(9, "A, rest time".into()),
            Seen::Voice(9, "B, focus time".into()),
            Seen::Release(1),
        ]
    );
    assert_eq!(recorder.max_playing.load(Ordering::SeqCst), 1);
}
