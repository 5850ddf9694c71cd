//! Periodic store-backed refresh jobs.
//!
//! These tasks own the store I/O the engine task must never await: they
//! fetch on a timer and hand the result to the engine as a command, which
//! applies it as an atomic swap or merge. A failed fetch keeps the previous
//! state -- the engine never sees a partial or empty replacement.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::engine::EngineCommand;
use crate::store::Store;
use crate::tracing::prelude::*;
use crate::types::MacAddr;

/// How far back the heartbeat reseed looks for telemetry rows.
const RESEED_LOOKBACK_MS: u64 = 60 * 60 * 1000;

/// Refresh the configuration cache on a timer. The first fetch runs
/// immediately so the engine accepts readings as soon as possible.
pub async fn run_config_refresh(
    store: Arc<dyn Store>,
    engine_tx: mpsc::Sender<EngineCommand>,
    period: Duration,
    cancellation: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancellation.cancelled() => break,
            _ = interval.tick() => {
                match store.fetch_sensor_configs().await {
                    Ok(configs) => {
                        if engine_tx
                            .send(EngineCommand::SwapConfigs { configs })
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(e) => {
                        // Keep the previous cache; never swap in nothing.
                        error!("config refresh failed, keeping previous cache: {e}");
                    }
                }
            }
        }
    }

    trace!("config refresh task stopped");
}

/// Reseed gateway heartbeats from recent telemetry rows, capturing
/// gateways that were active before this process started.
pub async fn run_heartbeat_reseed(
    store: Arc<dyn Store>,
    engine_tx: mpsc::Sender<EngineCommand>,
    clock: Arc<dyn Clock>,
    period: Duration,
    cancellation: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancellation.cancelled() => break,
            _ = interval.tick() => {
                let since_ms = clock.now_ms().saturating_sub(RESEED_LOOKBACK_MS);
                let since_iso = Utc
                    .timestamp_millis_opt(since_ms as i64)
                    .single()
                    .unwrap_or_else(Utc::now)
                    .format("%Y-%m-%dT%H:%M:%S")
                    .to_string();

                match store.recent_telemetry(&since_iso).await {
                    Ok(rows) => {
                        let seen = seed_from_rows(
                            rows.iter().map(|r| (r.gw.as_str(), r.ts.as_str())),
                        );
                        if !seen.is_empty()
                            && engine_tx
                                .send(EngineCommand::SeedHeartbeats { seen })
                                .await
                                .is_err()
                        {
                            break;
                        }
                    }
                    Err(e) => error!("heartbeat reseed failed: {e}"),
                }
            }
        }
    }

    trace!("heartbeat reseed task stopped");
}

/// Reload the last door state per sensor once at startup, so the first
/// live reading does not produce a phantom transition.
pub async fn bootstrap_door_states(store: Arc<dyn Store>, engine_tx: mpsc::Sender<EngineCommand>) {
    match store.recent_door_logs().await {
        Ok(rows) => {
            // Rows come newest first; the first row per sensor wins.
            let mut states: Vec<(MacAddr, bool)> = Vec::new();
            let mut seen = std::collections::HashSet::new();
            for row in rows {
                let mac = MacAddr::canonicalize(&row.sensor_mac);
                if seen.insert(mac.clone()) {
                    states.push((mac, row.is_open));
                }
            }
            info!(sensors = states.len(), "door states reloaded from store");
            let _ = engine_tx.send(EngineCommand::SeedDoorStates { states }).await;
        }
        Err(e) => warn!("door state bootstrap failed, starting blank: {e}"),
    }
}

/// Newest timestamp per gateway MAC from telemetry rows.
fn seed_from_rows<'a>(rows: impl Iterator<Item = (&'a str, &'a str)>) -> Vec<(MacAddr, u64)> {
    let mut newest: std::collections::HashMap<MacAddr, u64> = std::collections::HashMap::new();

    for (gw, ts) in rows {
        let Some(ms) = parse_row_ts(ts) else { continue };
        let mac = MacAddr::canonicalize(gw);
        let entry = newest.entry(mac).or_insert(0);
        if ms > *entry {
            *entry = ms;
        }
    }

    newest.into_iter().collect()
}

/// Parse a store timestamp ("YYYY-MM-DDTHH:MM:SS[.sss]", optionally with a
/// zone suffix) into epoch milliseconds.
fn parse_row_ts(ts: &str) -> Option<u64> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(ts) {
        return Some(dt.timestamp_millis() as u64);
    }
    let naive = chrono::NaiveDateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S"))
        .ok()?;
    Some(naive.and_utc().timestamp_millis() as u64)
}
