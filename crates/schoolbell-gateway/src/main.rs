use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use schoolbell_channels::{run_delivery, ChannelManager, LogChannel, Renderer};
use schoolbell_core::SchoolbellConfig;
use schoolbell_scheduler::{EventSink, MemoryStore, RegistryOptions, SystemClock, TenantRegistry};

mod commands;

#[derive(Parser, Debug)]
#[command(author, version, about = "Per-tenant focus timers with shared break windows")]
struct Args {
    /// Config file (default: ~/.schoolbell/schoolbell.toml)
    #[arg(short, long, env = "SCHOOLBELL_CONFIG")]
    config: Option<String>,

    /// Do not read commands from stdin; only run stored tenants.
    #[arg(long)]
    no_stdin: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "schoolbell_gateway=info,schoolbell_scheduler=info,schoolbell_channels=info".into()
            }),
        )
        .init();

    let args = Args::parse();
    let config = SchoolbellConfig::load(args.config.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        SchoolbellConfig::default()
    });
    let options = RegistryOptions::from_config(&config)?;
    info!(
        timezone = %config.scheduler.timezone,
        tick_ms = config.scheduler.tick_ms,
        presets = config.presets.len(),
        "configuration loaded"
    );

    // Scheduler → delivery event channel.
    let (events, events_rx) = EventSink::channel(config.scheduler.event_buffer);

    let mut manager = ChannelManager::new();
    manager.register(Box::new(LogChannel::new()));
    manager.connect_all().await;
    for (name, status) in manager.statuses() {
        info!(channel = %name, ?status, "channel adapter ready");
    }
    let manager = Arc::new(manager);
    let renderer = Renderer::from_config(options.tz, &config.delivery);
    let delivery = tokio::spawn(run_delivery(
        Arc::clone(&manager),
        renderer,
        config.delivery.chunk_max,
        events_rx,
    ));

    let store = Arc::new(MemoryStore::with_seeds(config.tenants.clone()));
    let registry = Arc::new(TenantRegistry::new(
        options,
        Arc::new(SystemClock),
        store,
        events,
    ));
    registry.seed_from_store().await;

    let intake = (!args.no_stdin).then(|| {
        tokio::spawn(commands::run_stdin(
            Arc::clone(&registry),
            config.delivery.chunk_max,
        ))
    });

    info!("schoolbell running, press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    if let Some(intake) = intake {
        intake.abort();
        let _ = intake.await;
    }
    registry.shutdown_all().await;
    // Dropping the last registry handle closes the event channel.
    drop(registry);
    if tokio::time::timeout(Duration::from_secs(5), delivery).await.is_err() {
        warn!("delivery task did not drain in time");
    }

    match Arc::try_unwrap(manager) {
        Ok(mut manager) => manager.disconnect_all().await,
        Err(_) => warn!("channel adapters still in use, skipping disconnect"),
    }
    info!("schoolbell stopped");
    Ok(())
}
