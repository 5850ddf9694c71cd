//! Per-sensor state and the per-sample pipeline.
//!
//! Each accepted reading runs the same sequence: maintenance short-circuit,
//! window append, thermal analysis, defrost decision, door decision, alert
//! evaluation, deadband-filtered persistence. Defrost runs before the door
//! detector on purpose -- both watch warming, and a committed defrost
//! suppresses door detection for the rest of the sample.

use chrono::{TimeZone, Utc};

use crate::alert::{Alert, AlertControl, AlertEngine, AlertInputs, Watchlist};
use crate::ingest::Reading;
use crate::store::{DoorRow, SensorConfigRow, TelemetryRow};
use crate::thermal::{
    analyze, DefrostContext, DefrostDecision, DefrostDetector, DoorContext, DoorDecision,
    DoorDetector, SensorProfile, TemperatureWindow, ThermalMetrics,
};
use crate::tracing::prelude::*;
use crate::types::MacAddr;

/// Minimum temperature change that forces a telemetry row.
const DEADBAND_TEMP_C: f64 = 0.2;

/// Minimum humidity change that forces a telemetry row.
const DEADBAND_HUM_PCT: f64 = 2.0;

/// Maximum silence between persisted rows for a live sensor.
const REPERSIST_INTERVAL_MS: u64 = 10 * 60 * 1000;

/// Rows and alerts produced by one sample.
#[derive(Debug, Default)]
pub struct SampleEffects {
    pub door_event: Option<DoorRow>,
    pub telemetry: Option<TelemetryRow>,
    pub alert: Option<Alert>,
}

/// Everything the engine tracks for one sensor MAC.
#[derive(Debug)]
pub struct SensorState {
    pub mac: MacAddr,

    pub last_temp: f64,
    pub last_hum: f64,
    pub last_rssi: i32,
    pub last_battery: u8,
    pub last_reading_ms: u64,

    // Last-persisted reading, driving the deadband.
    pub db_temp: Option<f64>,
    pub db_hum: Option<f64>,
    pub db_ts_ms: Option<u64>,

    pub window: TemperatureWindow,

    pub is_defrosting: bool,
    pub defrost_start_ms: Option<u64>,
    pub defrost_start_temp: f64,
    pub defrost_peak_temp: f64,
    pub defrost_just_started: bool,

    /// Committed virtual door state (true = open).
    pub door_open: bool,
    pub door: DoorDetector,
    /// When the door last transitioned; doubles as the opened-since mark.
    pub last_analysis_ms: Option<u64>,

    pub alert_control: AlertControl,
    pub last_variance: Option<f64>,
    pub last_metrics: Option<ThermalMetrics>,

    pub profile: SensorProfile,
}

impl SensorState {
    /// Create state for a newly seen sensor. `bootstrap_door_open` carries
    /// the last door state reloaded from the store at startup, so a sensor
    /// that restarted mid-open does not produce a phantom transition.
    pub fn new(mac: MacAddr, now_ms: u64, bootstrap_door_open: Option<bool>) -> Self {
        Self {
            mac,
            last_temp: 0.0,
            last_hum: 0.0,
            last_rssi: 0,
            last_battery: 0,
            last_reading_ms: now_ms,
            db_temp: None,
            db_hum: None,
            db_ts_ms: None,
            window: TemperatureWindow::new(),
            is_defrosting: false,
            defrost_start_ms: None,
            defrost_start_temp: 0.0,
            defrost_peak_temp: 0.0,
            defrost_just_started: false,
            door_open: bootstrap_door_open.unwrap_or(false),
            door: DoorDetector::new(),
            last_analysis_ms: None,
            alert_control: AlertControl::default(),
            last_variance: None,
            last_metrics: None,
            profile: SensorProfile::Normal,
        }
    }

    /// Run one reading through the full pipeline.
    pub fn apply(
        &mut self,
        reading: &Reading,
        cfg: &SensorConfigRow,
        alert_engine: &AlertEngine,
        watchlist: &mut Watchlist,
        now_ms: u64,
    ) -> SampleEffects {
        let mut effects = SampleEffects::default();

        self.profile = SensorProfile::for_temp_min(cfg.temp_min);

        // Sensors under maintenance are tracked nowhere: pending soak and
        // alert pacing are wiped so nothing fires when the flag clears.
        if cfg.em_manutencao {
            watchlist.clear_sensor(&self.mac);
            self.alert_control.clear();
            return effects;
        }

        self.last_temp = reading.temp;
        self.last_hum = reading.humidity;
        self.last_rssi = reading.rssi;
        self.last_battery = reading.battery_percent;
        self.last_reading_ms = now_ms;

        self.window.append(now_ms, reading.temp);

        let tuning = self.profile.tuning();
        let metrics = analyze(&self.window, tuning);

        self.apply_defrost(&metrics, reading, &mut effects, now_ms);
        self.apply_door(&metrics, reading, cfg, alert_engine, &mut effects, now_ms);

        if metrics.ready {
            self.last_variance = Some(metrics.variance);
        }

        let name = cfg.display_name.as_deref().unwrap_or(self.mac.as_str());
        let inputs = AlertInputs {
            mac: &self.mac,
            name,
            temp: reading.temp,
            humidity: reading.humidity,
            temp_max: cfg.temp_max,
            temp_min: cfg.temp_min,
            hum_max: cfg.hum_max,
            hum_min: cfg.hum_min,
            profile: self.profile,
            is_defrosting: self.is_defrosting,
            door_open: self.door_open,
            door_open_since_ms: if self.door_open {
                self.last_analysis_ms
            } else {
                None
            },
            metrics: &metrics,
        };
        effects.alert = alert_engine.evaluate(&inputs, &mut self.alert_control, watchlist, now_ms);

        effects.telemetry = self.deadband_row(reading, now_ms);

        if metrics.ready {
            self.last_metrics = Some(metrics);
        }

        effects
    }

    fn apply_defrost(
        &mut self,
        metrics: &ThermalMetrics,
        reading: &Reading,
        effects: &mut SampleEffects,
        now_ms: u64,
    ) {
        let ctx = DefrostContext {
            is_defrosting: self.is_defrosting,
            just_started: self.defrost_just_started,
            start_ms: self.defrost_start_ms,
            start_temp: self.defrost_start_temp,
        };

        match DefrostDetector::evaluate(metrics, self.profile.tuning(), self.profile, ctx, reading.temp, now_ms)
        {
            DefrostDecision::Started => {
                info!(
                    sensor = %self.mac,
                    temp = reading.temp,
                    slope = metrics.slope,
                    "defrost cycle started"
                );
                self.is_defrosting = true;
                self.defrost_start_ms = Some(now_ms);
                self.defrost_start_temp = reading.temp;
                self.defrost_peak_temp = reading.temp;
                self.defrost_just_started = true;

                // Defrost and door-open are mutually exclusive; a defrost
                // commit closes the virtual door.
                if self.door_open {
                    self.door_open = false;
                    self.last_analysis_ms = Some(now_ms);
                    effects.door_event = Some(self.door_row(reading, false, now_ms));
                }
            }
            DefrostDecision::Ended => {
                let peak = self.defrost_peak_temp;
                info!(
                    sensor = %self.mac,
                    temp = reading.temp,
                    peak_temp = peak,
                    "defrost cycle ended"
                );
                self.is_defrosting = false;
                self.defrost_start_ms = None;
                self.defrost_start_temp = 0.0;
                self.defrost_peak_temp = 0.0;
                self.defrost_just_started = false;
            }
            DefrostDecision::NoChange => {
                if self.is_defrosting {
                    // The start-commit sample set the flag; the next sample
                    // clears it, re-arming the end criteria.
                    self.defrost_just_started = false;
                    if reading.temp > self.defrost_peak_temp {
                        self.defrost_peak_temp = reading.temp;
                    }
                }
            }
        }
    }

    fn apply_door(
        &mut self,
        metrics: &ThermalMetrics,
        reading: &Reading,
        cfg: &SensorConfigRow,
        alert_engine: &AlertEngine,
        effects: &mut SampleEffects,
        now_ms: u64,
    ) {
        let now_utc = Utc
            .timestamp_millis_opt(now_ms as i64)
            .single()
            .unwrap_or_else(Utc::now);
        let (limit_max, limit_min) = alert_engine.resolve_bounds(cfg.temp_max, cfg.temp_min, now_utc);

        let ctx = DoorContext {
            is_defrosting: self.is_defrosting,
            door_open: self.door_open,
            previous_variance: self.last_variance,
            temp: reading.temp,
            limit_min,
            limit_max,
        };

        match self.door.evaluate(metrics, self.profile.tuning(), ctx, now_ms) {
            DoorDecision::Opened => {
                info!(
                    sensor = %self.mac,
                    temp = reading.temp,
                    slope = metrics.slope,
                    variance = metrics.variance,
                    "virtual door opened"
                );
                self.door_open = true;
                self.last_analysis_ms = Some(now_ms);
                effects.door_event = Some(self.door_row(reading, true, now_ms));
            }
            DoorDecision::Closed => {
                info!(sensor = %self.mac, temp = reading.temp, "virtual door closed");
                self.door_open = false;
                self.last_analysis_ms = Some(now_ms);
                effects.door_event = Some(self.door_row(reading, false, now_ms));
            }
            DoorDecision::NoChange => {}
        }
    }

    fn door_row(&self, reading: &Reading, is_open: bool, now_ms: u64) -> DoorRow {
        DoorRow {
            gateway_mac: reading.gateway.to_string(),
            sensor_mac: self.mac.to_string(),
            timestamp_read: self.row_timestamp(reading, now_ms),
            is_open,
            alarm_code: 0,
            battery_percent: reading.battery_percent as i32,
            rssi: reading.rssi,
        }
    }

    fn row_timestamp(&self, reading: &Reading, now_ms: u64) -> String {
        reading.reported_at.clone().unwrap_or_else(|| {
            Utc.timestamp_millis_opt(now_ms as i64)
                .single()
                .unwrap_or_else(Utc::now)
                .format("%Y-%m-%dT%H:%M:%S%.3f")
                .to_string()
        })
    }

    fn deadband_row(&mut self, reading: &Reading, now_ms: u64) -> Option<TelemetryRow> {
        let due = match (self.db_temp, self.db_hum, self.db_ts_ms) {
            (Some(temp), Some(hum), Some(ts)) => {
                (reading.temp - temp).abs() >= DEADBAND_TEMP_C
                    || (reading.humidity - hum).abs() >= DEADBAND_HUM_PCT
                    || now_ms.saturating_sub(ts) >= REPERSIST_INTERVAL_MS
            }
            _ => true,
        };

        if !due {
            return None;
        }

        self.db_temp = Some(reading.temp);
        self.db_hum = Some(reading.humidity);
        self.db_ts_ms = Some(now_ms);

        Some(TelemetryRow {
            gw: reading.gateway.to_string(),
            mac: self.mac.to_string(),
            ts: self.row_timestamp(reading, now_ms),
            temp: reading.temp,
            hum: reading.humidity,
            batt: reading.battery_percent as i32,
            rssi: reading.rssi,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LimitConfig, TimingConfig};

    const STEP_MS: u64 = 10_000;

    // 2025-06-02 12:00 UTC, a Monday (weekday fallback not in play).
    const T0: u64 = 1_748_865_600_000;

    fn alert_engine() -> AlertEngine {
        AlertEngine::new(
            LimitConfig::default(),
            TimingConfig::default(),
            chrono_tz::America::Sao_Paulo,
        )
    }

    fn config(temp_min: f64, temp_max: f64) -> SensorConfigRow {
        SensorConfigRow {
            mac: "AC:23:3F:A0:4E:21".into(),
            display_name: Some("Câmara 01".into()),
            temp_max: Some(temp_max),
            temp_min: Some(temp_min),
            ..SensorConfigRow::default()
        }
    }

    fn reading(temp: f64) -> Reading {
        Reading {
            gateway: MacAddr::canonicalize("1122AABBCCDD"),
            sensor: MacAddr::canonicalize("AC233FA04E21"),
            temp,
            humidity: 60.0,
            battery_percent: 80,
            rssi: -70,
            reported_at: None,
        }
    }

    /// Feed a temperature sequence at 10-s spacing, collecting effects.
    struct Harness {
        state: SensorState,
        cfg: SensorConfigRow,
        engine: AlertEngine,
        watchlist: Watchlist,
        now_ms: u64,
        door_events: Vec<DoorRow>,
        telemetry: Vec<TelemetryRow>,
        alerts: Vec<Alert>,
        was_defrosting: bool,
    }

    impl Harness {
        fn new(cfg: SensorConfigRow) -> Self {
            Self {
                state: SensorState::new(MacAddr::canonicalize("AC233FA04E21"), T0, None),
                cfg,
                engine: alert_engine(),
                watchlist: Watchlist::new(),
                now_ms: T0,
                door_events: Vec::new(),
                telemetry: Vec::new(),
                alerts: Vec::new(),
                was_defrosting: false,
            }
        }

        fn feed(&mut self, temps: &[f64]) {
            for temp in temps {
                let effects = self.state.apply(
                    &reading(*temp),
                    &self.cfg,
                    &self.engine,
                    &mut self.watchlist,
                    self.now_ms,
                );
                if let Some(event) = effects.door_event {
                    self.door_events.push(event);
                }
                if let Some(row) = effects.telemetry {
                    self.telemetry.push(row);
                }
                if let Some(alert) = effects.alert {
                    self.alerts.push(alert);
                }
                self.was_defrosting |= self.state.is_defrosting;
                self.now_ms += STEP_MS;
            }
        }
    }

    #[test]
    fn steady_state_produces_no_events() {
        // Scenario: 30 samples at ±0.05 °C around −18, bounds [−25, −10].
        let mut harness = Harness::new(config(-25.0, -10.0));
        let temps: Vec<f64> = (0..30)
            .map(|i| if i % 2 == 0 { -18.05 } else { -17.95 })
            .collect();
        harness.feed(&temps);

        assert!(harness.alerts.is_empty());
        assert!(harness.door_events.is_empty());
        assert!(!harness.state.door_open);
        assert!(!harness.state.is_defrosting);
        assert!(!harness.was_defrosting);
        // Deadband: only the very first sample persists.
        assert_eq!(harness.telemetry.len(), 1);
        assert_eq!(harness.telemetry[0].temp, -18.05);
    }

    #[test]
    fn defrost_cycle_is_recognized_and_suppresses_alerts() {
        // Scenario: linear rise 0.3 °C/sample to −12, then fall 0.4 °C/sample
        // back to −18; temp_max −5 is never crossed and the cycle itself must
        // not alert.
        let mut harness = Harness::new(config(-25.0, -5.0));

        let mut temps = vec![-18.0];
        temps.extend((1..=20).map(|i| -18.0 + 0.3 * i as f64)); // to −12.0
        temps.extend((1..=15).map(|i| -12.0 - 0.4 * i as f64)); // to −18.0
        harness.feed(&temps);

        assert!(harness.was_defrosting, "defrost must be detected in the rise");
        assert!(
            !harness.state.is_defrosting,
            "defrost must end during/after the fall"
        );
        assert!(harness.alerts.is_empty(), "no alert during a defrost cycle");
        assert!(harness.door_events.is_empty(), "no door transitions");
    }

    #[test]
    fn defrost_tracks_peak_temperature() {
        let mut harness = Harness::new(config(-25.0, -5.0));
        let mut temps = vec![-18.0];
        temps.extend((1..=15).map(|i| -18.0 + 0.3 * i as f64));
        harness.feed(&temps);

        assert!(harness.state.is_defrosting);
        assert!((harness.state.defrost_peak_temp - -13.5).abs() < 1e-9);
        assert!((harness.state.defrost_start_temp - -15.3).abs() < 1e-9);
    }

    #[test]
    fn door_spike_opens_then_closes() {
        // Scenario: steady −18, an abrupt spike to −11 with turbulent
        // recovery, then steady again. Bounds [−25, −5].
        let mut harness = Harness::new(config(-25.0, -5.0));

        let mut temps = vec![-18.0; 11];
        temps.extend([-18.0, -17.0, -15.5, -13.0, -11.0, -12.5, -14.0, -16.0, -17.5]);
        temps.extend([-18.0; 15]);
        harness.feed(&temps);

        let opens: Vec<_> = harness.door_events.iter().filter(|e| e.is_open).collect();
        let closes: Vec<_> = harness.door_events.iter().filter(|e| !e.is_open).collect();

        assert_eq!(opens.len(), 1, "exactly one open transition");
        assert_eq!(closes.len(), 1, "exactly one close transition");
        assert!(!harness.state.door_open, "door closed at the end");
        assert!(!harness.was_defrosting, "spike must not read as defrost");
        assert!(harness.alerts.is_empty());
    }

    #[test]
    fn defrost_and_door_are_mutually_exclusive() {
        let cfg = config(-25.0, -5.0);
        let engine = alert_engine();
        let mut watchlist = Watchlist::new();
        let mut state = SensorState::new(MacAddr::canonicalize("AC233FA04E21"), T0, None);

        let mut temps = vec![-18.0];
        temps.extend((1..=20).map(|i| -18.0 + 0.3 * i as f64));
        temps.extend((1..=15).map(|i| -12.0 - 0.4 * i as f64));
        temps.extend([-18.0; 20]);

        let mut now_ms = T0;
        for temp in temps {
            let _ = state.apply(&reading(temp), &cfg, &engine, &mut watchlist, now_ms);
            assert!(
                !(state.is_defrosting && state.door_open),
                "defrost and door-open must never hold simultaneously"
            );
            now_ms += STEP_MS;
        }
    }

    #[test]
    fn maintenance_short_circuits_everything() {
        let mut cfg = config(-25.0, -5.0);
        cfg.em_manutencao = true;
        let mut harness = Harness::new(cfg);

        // Wildly out-of-bounds readings: nothing may happen.
        harness.feed(&[20.0; 15]);

        assert!(harness.alerts.is_empty());
        assert!(harness.telemetry.is_empty());
        assert!(harness.door_events.is_empty());
        assert!(harness.watchlist.is_empty());
        assert_eq!(harness.state.window.len(), 0);
    }

    #[test]
    fn deadband_repersists_on_temperature_change() {
        let mut harness = Harness::new(config(-25.0, -10.0));
        harness.feed(&[-18.0, -18.05, -18.3]);

        // First sample and the 0.3 °C move persist; the 0.05 °C one does not.
        assert_eq!(harness.telemetry.len(), 2);
        assert_eq!(harness.telemetry[1].temp, -18.3);
    }

    #[test]
    fn deadband_repersists_after_ten_minutes() {
        let mut harness = Harness::new(config(-25.0, -10.0));
        let temps = vec![-18.0; 62]; // 620 s > 10 min
        harness.feed(&temps);

        assert_eq!(harness.telemetry.len(), 2);
    }

    #[test]
    fn hard_high_alert_soaks_then_cools_down() {
        // Scenario: sustained 0 °C against temp_max −5. First alert at the
        // 10-min soak mark, none for the following 15-min cooldown.
        let mut harness = Harness::new(config(-25.0, -5.0));
        let temps = vec![0.0; 165]; // ~27.5 min at 10-s spacing
        harness.feed(&temps);

        assert_eq!(harness.alerts.len(), 2, "soak emission + one post-cooldown");
        let first = &harness.alerts[0];
        assert_eq!(first.priority, crate::alert::Priority::Alta);
        assert!(first.messages[0].contains("TEMPERATURA ALTA"));
    }
}
