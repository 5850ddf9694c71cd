//! The engine task: single owner of all per-sensor state.
//!
//! One task consumes bus deliveries, engine commands, and in-memory
//! maintenance timers through a single `select!` loop. Because every
//! mutation of the sensor map, config cache, heartbeat map, and watchlist
//! happens here, two samples for the same MAC can never race -- the
//! serialisation the detectors require comes from the task structure, not
//! from locks.
//!
//! Store and webhook I/O never happen on this task: rows and alerts are
//! pushed onto the outbound queues and drained elsewhere.

mod commands;

pub use commands::EngineCommand;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::alert::{Alert, AlertEngine, Watchlist};
use crate::api_client::types::{
    BufferDepths, DefrostSummary, DoorSummary, GatewaySummary, HealthState, IngestCounters,
    MetricsSummary, SensorSummary,
};
use crate::clock::Clock;
use crate::config::{Config, TimingConfig};
use crate::ingest::{parse_reports, Reading, HARDCODED_BLOCKLIST};
use crate::outbound::OutboundQueue;
use crate::sensor::SensorState;
use crate::store::{DoorRow, SensorConfigRow, TelemetryRow};
use crate::tracing::prelude::*;
use crate::types::MacAddr;

/// How often the gateway-offline check runs.
const GATEWAY_CHECK_PERIOD: Duration = Duration::from_secs(60);

/// How much of an undecodable payload to keep in the log line.
const PAYLOAD_PREVIEW_BYTES: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatSource {
    /// Seen on the bus since process start.
    Live,
    /// Recovered from recent telemetry rows.
    Db,
}

impl HeartbeatSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            HeartbeatSource::Live => "LIVE",
            HeartbeatSource::Db => "DB",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GatewayHeartbeat {
    pub last_seen_ms: u64,
    pub source: HeartbeatSource,
}

/// Single owner of all in-memory processing state.
pub struct Engine {
    clock: Arc<dyn Clock>,
    timing: TimingConfig,
    alert_engine: AlertEngine,

    /// Never-process list: burned-in entries plus operator-configured MACs.
    blocklist: HashSet<MacAddr>,
    /// Paired physical door sensors, derived from the config cache.
    secondary_blocklist: HashSet<MacAddr>,
    configs: HashMap<MacAddr, SensorConfigRow>,

    sensors: HashMap<MacAddr, SensorState>,
    heartbeats: HashMap<MacAddr, GatewayHeartbeat>,
    watchlist: Watchlist,

    /// Door states reloaded from the store, consumed on first reading.
    bootstrap_door: HashMap<MacAddr, bool>,
    /// Last SISTEMA alert per gateway.
    gateway_alert_ms: HashMap<MacAddr, u64>,

    telemetry_queue: OutboundQueue<TelemetryRow>,
    door_queue: OutboundQueue<DoorRow>,
    alert_queue: OutboundQueue<Alert>,

    started_ms: u64,
    messages_seen: u64,
    readings_accepted: u64,
    parse_failures: u64,
}

impl Engine {
    pub fn new(
        cfg: &Config,
        clock: Arc<dyn Clock>,
        telemetry_queue: OutboundQueue<TelemetryRow>,
        door_queue: OutboundQueue<DoorRow>,
        alert_queue: OutboundQueue<Alert>,
    ) -> Self {
        let mut blocklist: HashSet<MacAddr> = HARDCODED_BLOCKLIST
            .iter()
            .map(|raw| MacAddr::canonicalize(raw))
            .collect();
        blocklist.extend(cfg.blocklist.iter().map(|raw| MacAddr::canonicalize(raw)));

        let started_ms = clock.now_ms();

        Self {
            timing: cfg.timing.clone(),
            alert_engine: AlertEngine::new(cfg.limits.clone(), cfg.timing.clone(), cfg.timezone),
            clock,
            blocklist,
            secondary_blocklist: HashSet::new(),
            configs: HashMap::new(),
            sensors: HashMap::new(),
            heartbeats: HashMap::new(),
            watchlist: Watchlist::new(),
            bootstrap_door: HashMap::new(),
            gateway_alert_ms: HashMap::new(),
            telemetry_queue,
            door_queue,
            alert_queue,
            started_ms,
            messages_seen: 0,
            readings_accepted: 0,
            parse_failures: 0,
        }
    }

    /// Run until cancellation, consuming bus payloads and commands.
    pub async fn run(
        mut self,
        mut bus_rx: mpsc::Receiver<Vec<u8>>,
        mut command_rx: mpsc::Receiver<EngineCommand>,
        cancellation: CancellationToken,
    ) {
        trace!("engine task started");

        let mut gateway_tick = tokio::time::interval(GATEWAY_CHECK_PERIOD);
        let mut gc_tick =
            tokio::time::interval(Duration::from_millis(self.timing.state_gc_ms.max(1)));
        let mut watchlist_tick =
            tokio::time::interval(Duration::from_millis(self.timing.watchlist_prune_ms.max(1)));
        gateway_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        gc_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        watchlist_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    break;
                }
                Some(payload) = bus_rx.recv() => {
                    self.handle_payload(&payload);
                }
                Some(command) = command_rx.recv() => {
                    self.apply_command(command);
                }
                _ = gateway_tick.tick() => {
                    self.check_gateways();
                }
                _ = gc_tick.tick() => {
                    self.collect_garbage();
                }
                _ = watchlist_tick.tick() => {
                    let removed = self.watchlist.prune(self.clock.now_ms(), 2 * self.timing.soak_ms);
                    if removed > 0 {
                        debug!(removed, "pruned stale watchlist entries");
                    }
                }
            }
        }

        trace!("engine task stopped");
    }

    /// Decode and dispatch one bus delivery.
    pub fn handle_payload(&mut self, payload: &[u8]) {
        self.messages_seen += 1;

        let reports = match parse_reports(payload) {
            Ok(reports) => reports,
            Err(e) => {
                self.parse_failures += 1;
                let preview =
                    String::from_utf8_lossy(&payload[..payload.len().min(PAYLOAD_PREVIEW_BYTES)]);
                error!(preview = %preview, "dropping undecodable payload: {e}");
                return;
            }
        };

        let now_ms = self.clock.now_ms();

        for report in reports {
            let gateway = MacAddr::canonicalize(&report.gmac);
            if self.blocklist.contains(&gateway) {
                debug!(gateway = %gateway, "blocklisted gateway skipped");
                continue;
            }

            self.heartbeats.insert(
                gateway.clone(),
                GatewayHeartbeat {
                    last_seen_ms: now_ms,
                    source: HeartbeatSource::Live,
                },
            );

            for entry in &report.obj {
                if let Some(reading) = entry.to_reading(&gateway) {
                    self.process_reading(reading, now_ms);
                }
            }
        }
    }

    fn process_reading(&mut self, reading: Reading, now_ms: u64) {
        if self.blocklist.contains(&reading.sensor)
            || self.secondary_blocklist.contains(&reading.sensor)
        {
            return;
        }

        // Unknown MACs are expected during onboarding; stay quiet.
        let Some(cfg) = self.configs.get(&reading.sensor).cloned() else {
            return;
        };

        let bootstrap_door = self.bootstrap_door.remove(&reading.sensor);
        let state = self
            .sensors
            .entry(reading.sensor.clone())
            .or_insert_with(|| SensorState::new(reading.sensor.clone(), now_ms, bootstrap_door));

        let effects = state.apply(&reading, &cfg, &self.alert_engine, &mut self.watchlist, now_ms);
        self.readings_accepted += 1;

        if let Some(row) = effects.telemetry {
            self.telemetry_queue.push(row);
        }
        if let Some(event) = effects.door_event {
            self.door_queue.push(event);
        }
        if let Some(alert) = effects.alert {
            info!(
                sensor = %reading.sensor,
                priority = alert.priority.as_str(),
                "alert enqueued: {}",
                alert.messages.join("; ")
            );
            self.alert_queue.push(alert);
        }
    }

    pub fn apply_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            EngineCommand::SwapConfigs { configs } => {
                // Whole-map swap: the cache and the derived paired-door
                // blocklist are replaced together so readers never see a
                // mismatched pair.
                let mut map = HashMap::with_capacity(configs.len());
                let mut secondary = HashSet::new();
                for row in configs {
                    if let Some(paired) = row.sensor_porta_vinculado.as_deref() {
                        secondary.insert(MacAddr::canonicalize(paired));
                    }
                    map.insert(MacAddr::canonicalize(&row.mac), row);
                }
                info!(
                    sensors = map.len(),
                    paired_doors = secondary.len(),
                    "configuration cache refreshed"
                );
                self.configs = map;
                self.secondary_blocklist = secondary;
            }
            EngineCommand::SeedHeartbeats { seen } => {
                let mut adopted = 0usize;
                for (mac, last_seen_ms) in seen {
                    let entry = self.heartbeats.entry(mac);
                    match entry {
                        std::collections::hash_map::Entry::Occupied(mut slot) => {
                            // Never let a DB row mask fresher live data.
                            if last_seen_ms > slot.get().last_seen_ms {
                                slot.insert(GatewayHeartbeat {
                                    last_seen_ms,
                                    source: HeartbeatSource::Db,
                                });
                                adopted += 1;
                            }
                        }
                        std::collections::hash_map::Entry::Vacant(slot) => {
                            slot.insert(GatewayHeartbeat {
                                last_seen_ms,
                                source: HeartbeatSource::Db,
                            });
                            adopted += 1;
                        }
                    }
                }
                if adopted > 0 {
                    info!(adopted, "gateway heartbeats reseeded from telemetry");
                }
            }
            EngineCommand::SeedDoorStates { states } => {
                for (mac, open) in states {
                    // Only relevant before the sensor's first live reading.
                    if !self.sensors.contains_key(&mac) {
                        self.bootstrap_door.insert(mac, open);
                    }
                }
            }
        }
    }

    /// Enqueue a SISTEMA alert for every gateway silent past the offline
    /// threshold, at most once per cooldown window.
    pub fn check_gateways(&mut self) {
        let now_ms = self.clock.now_ms();
        let mut offline: Vec<(MacAddr, u64)> = Vec::new();

        for (mac, heartbeat) in &self.heartbeats {
            let silent_ms = now_ms.saturating_sub(heartbeat.last_seen_ms);
            if silent_ms <= self.timing.gateway_offline_ms {
                continue;
            }
            let recently_alerted = self
                .gateway_alert_ms
                .get(mac)
                .is_some_and(|t| now_ms.saturating_sub(*t) < self.timing.gateway_alert_cooldown_ms);
            if recently_alerted {
                continue;
            }
            offline.push((mac.clone(), silent_ms));
        }

        for (mac, silent_ms) in offline {
            warn!(gateway = %mac, silent_min = silent_ms / 60_000, "gateway offline");
            let timestamp = self.alert_engine.zoned_timestamp(self.clock.now_utc());
            self.alert_queue.push(Alert::system(
                mac.as_str(),
                format!("GATEWAY OFFLINE há {} min", silent_ms / 60_000),
                timestamp,
            ));
            self.gateway_alert_ms.insert(mac, now_ms);
        }
    }

    /// Evict sensors and gateways silent past their thresholds.
    pub fn collect_garbage(&mut self) {
        let now_ms = self.clock.now_ms();

        let sensors_before = self.sensors.len();
        let sensor_silence = self.timing.sensor_silence_ms;
        self.sensors
            .retain(|_, s| now_ms.saturating_sub(s.last_reading_ms) <= sensor_silence);

        let gateways_before = self.heartbeats.len();
        let gateway_silence = self.timing.gateway_silence_ms;
        self.heartbeats
            .retain(|_, h| now_ms.saturating_sub(h.last_seen_ms) <= gateway_silence);
        let heartbeats = &self.heartbeats;
        self.gateway_alert_ms
            .retain(|mac, _| heartbeats.contains_key(mac));

        let evicted_sensors = sensors_before - self.sensors.len();
        let evicted_gateways = gateways_before - self.heartbeats.len();
        if evicted_sensors > 0 || evicted_gateways > 0 {
            info!(evicted_sensors, evicted_gateways, "state garbage collected");
        }
    }

    /// Read-only projection for the health endpoint.
    pub fn snapshot(&self) -> HealthState {
        let now_ms = self.clock.now_ms();

        let mut sensors: Vec<SensorSummary> = self
            .sensors
            .values()
            .map(|s| {
                let cfg = self.configs.get(&s.mac);
                let status = if s.is_defrosting {
                    "DEGELO"
                } else if s.door_open {
                    "PORTA ABERTA"
                } else {
                    "NORMAL"
                };

                SensorSummary {
                    mac: s.mac.to_string(),
                    name: cfg
                        .and_then(|c| c.display_name.clone())
                        .unwrap_or_else(|| s.mac.to_string()),
                    temp: s.last_temp,
                    humidity: s.last_hum,
                    battery_percent: s.last_battery,
                    status: status.to_string(),
                    seconds_since_reading: now_ms.saturating_sub(s.last_reading_ms) / 1000,
                    profile: s.profile.as_str().to_string(),
                    metrics: s.last_metrics.as_ref().map(|m| MetricsSummary {
                        slope: m.slope,
                        r_squared: m.r_squared,
                        variance: m.variance,
                        acceleration: m.acceleration,
                        ema: m.ema,
                    }),
                    defrost: s.defrost_start_ms.map(|start| DefrostSummary {
                        active_for_secs: now_ms.saturating_sub(start) / 1000,
                        start_temp: s.defrost_start_temp,
                        peak_temp: s.defrost_peak_temp,
                    }),
                    door: if s.door_open {
                        s.last_analysis_ms.map(|since| DoorSummary {
                            open_for_secs: now_ms.saturating_sub(since) / 1000,
                        })
                    } else {
                        None
                    },
                    temp_min: cfg.and_then(|c| c.temp_min),
                    temp_max: cfg.and_then(|c| c.temp_max),
                }
            })
            .collect();
        sensors.sort_by(|a, b| a.mac.cmp(&b.mac));

        let mut gateways: Vec<GatewaySummary> = self
            .heartbeats
            .iter()
            .map(|(mac, h)| GatewaySummary {
                mac: mac.to_string(),
                seconds_since_seen: now_ms.saturating_sub(h.last_seen_ms) / 1000,
                source: h.source.as_str().to_string(),
            })
            .collect();
        gateways.sort_by(|a, b| a.mac.cmp(&b.mac));

        HealthState {
            status: "ok".to_string(),
            uptime_secs: now_ms.saturating_sub(self.started_ms) / 1000,
            defrosting: self.sensors.values().filter(|s| s.is_defrosting).count(),
            doors_open: self.sensors.values().filter(|s| s.door_open).count(),
            in_maintenance: self.configs.values().filter(|c| c.em_manutencao).count(),
            sensors,
            gateways,
            buffers: BufferDepths {
                telemetry: self.telemetry_queue.len(),
                door_events: self.door_queue.len(),
                alerts: self.alert_queue.len(),
            },
            counters: IngestCounters {
                messages_seen: self.messages_seen,
                readings_accepted: self.readings_accepted,
                parse_failures: self.parse_failures,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{BusConfig, LimitConfig, StoreConfig, TimingConfig};

    const T0: u64 = 1_748_865_600_000;
    const MIN: u64 = 60_000;

    fn test_config() -> Config {
        Config {
            bus: BusConfig {
                host: "127.0.0.1".into(),
                port: 1883,
                topic: "gw/telemetry".into(),
                client_id: "test".into(),
                username: None,
                password: None,
            },
            store: StoreConfig {
                url: "http://store.local".into(),
                key: "key".into(),
            },
            webhook_url: "http://hook.local".into(),
            api_port: 0,
            log_level: "info".into(),
            timezone: chrono_tz::America::Sao_Paulo,
            blocklist: vec!["DEADBEEF0001".into()],
            limits: LimitConfig::default(),
            timing: TimingConfig::default(),
        }
    }

    struct Fixture {
        engine: Engine,
        clock: Arc<ManualClock>,
        telemetry: OutboundQueue<TelemetryRow>,
        door: OutboundQueue<DoorRow>,
        alerts: OutboundQueue<Alert>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(T0));
        let telemetry = OutboundQueue::new();
        let door = OutboundQueue::new();
        let alerts = OutboundQueue::new();
        let engine = Engine::new(
            &test_config(),
            clock.clone(),
            telemetry.clone(),
            door.clone(),
            alerts.clone(),
        );
        Fixture {
            engine,
            clock,
            telemetry,
            door,
            alerts,
        }
    }

    fn sensor_config(mac: &str) -> SensorConfigRow {
        SensorConfigRow {
            mac: mac.into(),
            display_name: Some("Câmara 01".into()),
            temp_max: Some(-5.0),
            temp_min: Some(-25.0),
            ..SensorConfigRow::default()
        }
    }

    fn swap_configs(engine: &mut Engine, rows: Vec<SensorConfigRow>) {
        engine.apply_command(EngineCommand::SwapConfigs { configs: rows });
    }

    fn payload(gmac: &str, dmac: &str, temp: f64) -> Vec<u8> {
        serde_json::json!({
            "gmac": gmac,
            "obj": [{
                "dmac": dmac,
                "type": 1,
                "temp": temp,
                "humidity": 60.0,
                "vbatt": 3100,
                "rssi": -68
            }]
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn accepted_reading_creates_state_and_persists() {
        let mut f = fixture();
        swap_configs(&mut f.engine, vec![sensor_config("AC233FA04E21")]);

        f.engine.handle_payload(&payload("1122AABBCCDD", "ac233fa04e21", -18.2));

        let mac = MacAddr::canonicalize("AC233FA04E21");
        assert!(f.engine.sensors.contains_key(&mac));
        assert_eq!(f.telemetry.len(), 1);
        assert_eq!(f.engine.readings_accepted, 1);

        let gw = MacAddr::canonicalize("1122AABBCCDD");
        assert_eq!(
            f.engine.heartbeats.get(&gw).map(|h| h.source),
            Some(HeartbeatSource::Live)
        );
    }

    #[test]
    fn unknown_sensor_is_silently_ignored() {
        let mut f = fixture();
        f.engine.handle_payload(&payload("1122AABBCCDD", "ac233fa04e21", -18.2));

        assert!(f.engine.sensors.is_empty());
        assert!(f.telemetry.is_empty());
        assert_eq!(f.engine.readings_accepted, 0);
        // The gateway heartbeat still registers.
        assert_eq!(f.engine.heartbeats.len(), 1);
    }

    #[test]
    fn blocklisted_gateway_is_skipped_entirely() {
        let mut f = fixture();
        swap_configs(&mut f.engine, vec![sensor_config("AC233FA04E21")]);

        // DEADBEEF0001 comes from the operator blocklist in test_config.
        f.engine.handle_payload(&payload("DEADBEEF0001", "ac233fa04e21", -18.2));

        assert!(f.engine.heartbeats.is_empty());
        assert!(f.engine.sensors.is_empty());
    }

    #[test]
    fn paired_door_sensor_never_mutates_state() {
        let mut f = fixture();
        let mut cfg = sensor_config("AC233FA04E21");
        cfg.sensor_porta_vinculado = Some("AC233FA04E99".into());
        swap_configs(&mut f.engine, vec![cfg, sensor_config("AC233FA04E99")]);

        f.engine.handle_payload(&payload("1122AABBCCDD", "AC233FA04E99", -18.2));

        let paired = MacAddr::canonicalize("AC233FA04E99");
        assert!(!f.engine.sensors.contains_key(&paired));
        assert!(f.telemetry.is_empty());
    }

    #[test]
    fn parse_failure_drops_message_only() {
        let mut f = fixture();
        f.engine.handle_payload(b"definitely not json");

        assert_eq!(f.engine.parse_failures, 1);
        assert!(f.engine.sensors.is_empty());

        // The engine keeps working afterwards.
        swap_configs(&mut f.engine, vec![sensor_config("AC233FA04E21")]);
        f.engine.handle_payload(&payload("1122AABBCCDD", "AC233FA04E21", -18.2));
        assert_eq!(f.engine.readings_accepted, 1);
    }

    #[test]
    fn gateway_offline_alerts_once_per_cooldown() {
        let mut f = fixture();
        f.engine.handle_payload(&payload("1122AABBCCDD", "unknown", -18.0));
        assert_eq!(f.engine.heartbeats.len(), 1);

        // 16 minutes of silence: one SISTEMA alert.
        f.clock.advance_ms(16 * MIN);
        f.engine.check_gateways();
        assert_eq!(f.alerts.len(), 1);

        // Within the next hour: no repeat, however often the check runs.
        for _ in 0..50 {
            f.clock.advance_ms(MIN);
            f.engine.check_gateways();
        }
        assert_eq!(f.alerts.len(), 1);

        // Past the one-hour cooldown: a second alert.
        f.clock.advance_ms(15 * MIN);
        f.engine.check_gateways();
        assert_eq!(f.alerts.len(), 2);

        let drained = f.alerts.drain_all();
        assert_eq!(drained[0].priority, crate::alert::Priority::Sistema);
        assert!(drained[0].messages[0].contains("GATEWAY OFFLINE"));
    }

    #[test]
    fn live_traffic_resets_gateway_silence() {
        let mut f = fixture();
        f.engine.handle_payload(&payload("1122AABBCCDD", "unknown", -18.0));

        f.clock.advance_ms(10 * MIN);
        f.engine.handle_payload(&payload("1122AABBCCDD", "unknown", -18.0));

        f.clock.advance_ms(10 * MIN);
        f.engine.check_gateways();
        assert!(f.alerts.is_empty());
    }

    #[test]
    fn garbage_collection_evicts_silent_state() {
        let mut f = fixture();
        swap_configs(&mut f.engine, vec![sensor_config("AC233FA04E21")]);
        f.engine.handle_payload(&payload("1122AABBCCDD", "AC233FA04E21", -18.2));

        // 25 h silence: the sensor goes, the gateway (48 h threshold) stays.
        f.clock.advance_ms(25 * 60 * MIN);
        f.engine.collect_garbage();
        assert!(f.engine.sensors.is_empty());
        assert_eq!(f.engine.heartbeats.len(), 1);

        // 49 h total: the gateway goes too.
        f.clock.advance_ms(24 * 60 * MIN);
        f.engine.collect_garbage();
        assert!(f.engine.heartbeats.is_empty());
    }

    #[test]
    fn config_swap_replaces_cache_and_secondary_blocklist() {
        let mut f = fixture();
        let mut cfg = sensor_config("AC233FA04E21");
        cfg.sensor_porta_vinculado = Some("AC233FA04E99".into());
        swap_configs(&mut f.engine, vec![cfg]);
        assert_eq!(f.engine.secondary_blocklist.len(), 1);

        // A refresh dropping the pairing clears the derived blocklist with
        // the same swap.
        swap_configs(&mut f.engine, vec![sensor_config("AC233FA04E21")]);
        assert!(f.engine.secondary_blocklist.is_empty());
        assert_eq!(f.engine.configs.len(), 1);
    }

    #[test]
    fn door_bootstrap_prevents_phantom_transition() {
        let mut f = fixture();
        swap_configs(&mut f.engine, vec![sensor_config("AC233FA04E21")]);

        let mac = MacAddr::canonicalize("AC233FA04E21");
        f.engine.apply_command(EngineCommand::SeedDoorStates {
            states: vec![(mac.clone(), true)],
        });

        f.engine.handle_payload(&payload("1122AABBCCDD", "AC233FA04E21", -18.2));

        let state = f.engine.sensors.get(&mac).expect("state created");
        assert!(state.door_open, "bootstrapped door state adopted");
        assert!(f.door.is_empty(), "no phantom transition row");
    }

    #[test]
    fn heartbeat_reseed_fills_gaps_without_masking_live_data() {
        let mut f = fixture();
        f.engine.handle_payload(&payload("1122AABBCCDD", "unknown", -18.0));
        let live = MacAddr::canonicalize("1122AABBCCDD");
        let other = MacAddr::canonicalize("1122AABBCCEE");

        f.engine.apply_command(EngineCommand::SeedHeartbeats {
            seen: vec![(live.clone(), T0 - 60 * MIN), (other.clone(), T0 - 5 * MIN)],
        });

        // The live entry keeps its fresher timestamp and LIVE source.
        let kept = f.engine.heartbeats.get(&live).unwrap();
        assert_eq!(kept.last_seen_ms, T0);
        assert_eq!(kept.source, HeartbeatSource::Live);

        let seeded = f.engine.heartbeats.get(&other).unwrap();
        assert_eq!(seeded.source, HeartbeatSource::Db);
    }

    #[test]
    fn snapshot_reflects_engine_state() {
        let mut f = fixture();
        swap_configs(&mut f.engine, vec![sensor_config("AC233FA04E21")]);
        f.engine.handle_payload(&payload("1122AABBCCDD", "AC233FA04E21", -18.2));

        f.clock.advance_ms(30_000);
        let snapshot = f.engine.snapshot();

        assert_eq!(snapshot.status, "ok");
        assert_eq!(snapshot.uptime_secs, 30);
        assert_eq!(snapshot.sensors.len(), 1);
        assert_eq!(snapshot.gateways.len(), 1);
        assert_eq!(snapshot.buffers.telemetry, 1);

        let sensor = &snapshot.sensors[0];
        assert_eq!(sensor.mac, "AC:23:3F:A0:4E:21");
        assert_eq!(sensor.name, "Câmara 01");
        assert_eq!(sensor.status, "NORMAL");
        assert_eq!(sensor.seconds_since_reading, 30);
        assert_eq!(sensor.temp_max, Some(-5.0));
    }

    #[test]
    fn hardcoded_blocklist_applies_to_sensors() {
        let mut f = fixture();
        let blocked = HARDCODED_BLOCKLIST[0];
        swap_configs(&mut f.engine, vec![sensor_config(blocked)]);

        f.engine.handle_payload(&payload("1122AABBCCDD", blocked, -18.2));
        assert!(f.engine.sensors.is_empty());
    }
}
