//! Daemon entry point.
//!
//! Wires the task graph described in the crate docs: bus subscriber,
//! engine, the three drains, the refresh jobs, and the API server, all
//! under one cancellation token. SIGINT/SIGTERM cancels everything; the
//! telemetry drain flushes once more on the way out.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use frostline_engine::clock::SystemClock;
use frostline_engine::engine::Engine;
use frostline_engine::outbound::{
    run_drain, DoorSink, OutboundQueue, TelemetrySink, WebhookSink,
};
use frostline_engine::outbound::webhook::WebhookClient;
use frostline_engine::store::{RestStore, Store};
use frostline_engine::tracing::prelude::*;
use frostline_engine::{api, bus, config, jobs};

/// Depth of the bus → engine payload channel.
const PAYLOAD_CHANNEL_DEPTH: usize = 256;

/// Depth of the engine command channel.
const COMMAND_CHANNEL_DEPTH: usize = 32;

/// Grace period for tasks to wind down after cancellation.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = config::load_from_env()?;
    frostline_engine::tracing::init(&cfg.log_level);
    cfg.log_config();

    let clock = Arc::new(SystemClock);
    let store: Arc<dyn Store> =
        Arc::new(RestStore::new(cfg.store.url.clone(), cfg.store.key.clone()));

    let telemetry_queue = OutboundQueue::new();
    let door_queue = OutboundQueue::new();
    let alert_queue = OutboundQueue::new();

    let (payload_tx, payload_rx) = mpsc::channel(PAYLOAD_CHANNEL_DEPTH);
    let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_DEPTH);

    let cancellation = CancellationToken::new();
    let mut tasks = Vec::new();

    // Engine task: single owner of all processing state.
    let engine = Engine::new(
        &cfg,
        clock.clone(),
        telemetry_queue.clone(),
        door_queue.clone(),
        alert_queue.clone(),
    );
    tasks.push(tokio::spawn(engine.run(
        payload_rx,
        command_rx,
        cancellation.clone(),
    )));

    // Startup bootstrap + periodic refresh jobs.
    jobs::bootstrap_door_states(store.clone(), command_tx.clone()).await;
    tasks.push(tokio::spawn(jobs::run_config_refresh(
        store.clone(),
        command_tx.clone(),
        Duration::from_millis(cfg.timing.config_refresh_ms),
        cancellation.clone(),
    )));
    tasks.push(tokio::spawn(jobs::run_heartbeat_reseed(
        store.clone(),
        command_tx.clone(),
        clock.clone(),
        Duration::from_millis(cfg.timing.heartbeat_reseed_ms),
        cancellation.clone(),
    )));

    // Drain tasks.
    tasks.push(tokio::spawn(run_drain(
        "telemetry",
        telemetry_queue.clone(),
        TelemetrySink(store.clone()),
        Duration::from_millis(cfg.timing.telemetry_drain_ms),
        cfg.timing.sink_max_attempts,
        true,
        cancellation.clone(),
    )));
    tasks.push(tokio::spawn(run_drain(
        "door",
        door_queue.clone(),
        DoorSink(store.clone()),
        Duration::from_millis(cfg.timing.door_drain_ms),
        cfg.timing.sink_max_attempts,
        false,
        cancellation.clone(),
    )));
    tasks.push(tokio::spawn(run_drain(
        "alerts",
        alert_queue.clone(),
        WebhookSink(WebhookClient::new(cfg.webhook_url.clone())),
        Duration::from_millis(cfg.timing.webhook_drain_ms),
        cfg.timing.sink_max_attempts,
        false,
        cancellation.clone(),
    )));

    // Bus subscriber.
    tasks.push(tokio::spawn(bus::run(
        cfg.bus.clone(),
        payload_tx,
        cancellation.clone(),
    )));

    // API server.
    let api_cancellation = cancellation.clone();
    let api_port = cfg.api_port;
    let api_command_tx = command_tx.clone();
    tasks.push(tokio::spawn(async move {
        if let Err(e) = api::server::serve(api_port, api_command_tx, api_cancellation).await {
            error!("api server failed: {e:#}");
        }
    }));

    // Signal handling.
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("SIGINT received"),
        _ = sigterm.recv() => info!("SIGTERM received"),
    }

    info!("shutting down");
    cancellation.cancel();

    // Best-effort wind-down; the telemetry drain flushes on cancellation.
    let shutdown = async {
        for task in tasks {
            let _ = task.await;
        }
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, shutdown).await.is_err() {
        warn!("shutdown grace period expired, exiting anyway");
    }

    info!("shutdown complete");
    Ok(())
}
