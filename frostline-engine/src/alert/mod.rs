//! Alert evaluation: thresholds, defrost suppression, soak, and cooldown.
//!
//! The engine never alerts on a single bad sample. A problem first soaks on
//! the watchlist; once it persists past the soak period the alert fires,
//! and the per-sensor cooldown then spaces repeats. Extreme readings that
//! refuse to normalise are promoted to CRITICA.

mod watchlist;

pub use watchlist::{WatchEntry, Watchlist};

use chrono::{DateTime, Datelike, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::config::{LimitConfig, TimingConfig};
use crate::thermal::{SensorProfile, ThermalMetrics};
use crate::types::MacAddr;

/// Minutes ahead the predictive check projects the regression line.
const PROJECTION_MINUTES: f64 = 15.0;

/// Maximum minutes-to-limit for a predictive alert to be actionable.
const PROJECTION_HORIZON_MINUTES: f64 = 20.0;

/// Margin beyond a limit that marks a reading as extreme.
const EXTREME_MARGIN_C: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Preditiva,
    Alta,
    Critica,
    Sistema,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Preditiva => "PREDITIVA",
            Priority::Alta => "ALTA",
            Priority::Critica => "CRITICA",
            Priority::Sistema => "SISTEMA",
        }
    }
}

/// Problem kinds tracked on the watchlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProblemKind {
    TempHigh,
    TempLow,
    TempRising,
    HumidityHigh,
    HumidityLow,
    DoorOpen,
}

const ALL_KINDS: [ProblemKind; 6] = [
    ProblemKind::TempHigh,
    ProblemKind::TempLow,
    ProblemKind::TempRising,
    ProblemKind::HumidityHigh,
    ProblemKind::HumidityLow,
    ProblemKind::DoorOpen,
];

/// Analyzer context attached to an outbound alert.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertContext {
    pub temp: f64,
    pub humidity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projection: Option<f64>,
    pub limit_min: f64,
    pub limit_max: f64,
    pub status: String,
    pub slope: f64,
    pub r_squared: f64,
    pub variance: f64,
}

/// An outbound alert, shaped for the webhook body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub sensor_name: String,
    pub sensor_mac: String,
    pub priority: Priority,
    pub messages: Vec<String>,
    pub timestamp: String,
    pub context: AlertContext,
}

impl Alert {
    /// Build a SISTEMA alert (gateway offline and similar infrastructure
    /// problems). No sensor context applies.
    pub fn system(subject: &str, message: String, timestamp: String) -> Self {
        Self {
            sensor_name: subject.to_string(),
            sensor_mac: subject.to_string(),
            priority: Priority::Sistema,
            messages: vec![message],
            timestamp,
            context: AlertContext {
                status: "SISTEMA".to_string(),
                ..AlertContext::default()
            },
        }
    }
}

/// Per-sensor alert pacing, owned by the sensor state.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertControl {
    pub last_sent_ms: Option<u64>,
    pub last_priority: Option<Priority>,
}

impl AlertControl {
    pub fn clear(&mut self) {
        self.last_sent_ms = None;
        self.last_priority = None;
    }
}

/// One sample's worth of alert-relevant sensor data.
#[derive(Debug, Clone, Copy)]
pub struct AlertInputs<'a> {
    pub mac: &'a MacAddr,
    pub name: &'a str,
    pub temp: f64,
    pub humidity: f64,
    pub temp_max: Option<f64>,
    pub temp_min: Option<f64>,
    pub hum_max: Option<f64>,
    pub hum_min: Option<f64>,
    pub profile: SensorProfile,
    pub is_defrosting: bool,
    pub door_open: bool,
    /// When the door transitioned to open, if it is open.
    pub door_open_since_ms: Option<u64>,
    pub metrics: &'a ThermalMetrics,
}

#[derive(Debug, Clone)]
struct Problem {
    kind: ProblemKind,
    message: String,
    priority: Priority,
    extreme: bool,
}

/// Threshold checks + soak + cooldown. Stateless apart from configuration;
/// the mutable pieces (watchlist, per-sensor control) are passed in.
#[derive(Debug, Clone)]
pub struct AlertEngine {
    limits: LimitConfig,
    timing: TimingConfig,
    tz: Tz,
}

impl AlertEngine {
    pub fn new(limits: LimitConfig, timing: TimingConfig, tz: Tz) -> Self {
        Self { limits, timing, tz }
    }

    /// Evaluate one sample. Returns an alert when a soaked problem clears
    /// the cooldown gate.
    pub fn evaluate(
        &self,
        inp: &AlertInputs<'_>,
        control: &mut AlertControl,
        watchlist: &mut Watchlist,
        now_ms: u64,
    ) -> Option<Alert> {
        let now_utc = Utc
            .timestamp_millis_opt(now_ms as i64)
            .single()
            .unwrap_or_else(Utc::now);

        let (limit_max, limit_min) = self.resolve_bounds(inp.temp_max, inp.temp_min, now_utc);

        let problems = if inp.is_defrosting {
            let extremes = self.defrost_extremes(inp, limit_max, limit_min);
            if extremes.is_empty() {
                // Defrost explains the excursion; forget any pending soak.
                watchlist.clear_sensor(inp.mac);
                return None;
            }
            extremes
        } else {
            self.collect_problems(inp, limit_max, limit_min, now_ms)
        };

        // Normalised kinds fall off the watchlist.
        for kind in ALL_KINDS {
            if !problems.iter().any(|p| p.kind == kind) {
                watchlist.clear(inp.mac, kind);
            }
        }

        if problems.is_empty() {
            return None;
        }

        // Soak: every present problem is observed; only those past their
        // soak period may emit. Extremes that sat long enough promote.
        let mut emitting: Vec<Problem> = Vec::new();
        for mut problem in problems {
            let first_seen = watchlist.observe(inp.mac, problem.kind, &problem.message, now_ms);
            let soaked_for = now_ms.saturating_sub(first_seen);
            if soaked_for < self.soak_for(problem.kind) {
                continue;
            }
            if problem.extreme && soaked_for >= self.timing.extreme_promotion_ms {
                problem.priority = Priority::Critica;
            }
            emitting.push(problem);
        }

        if emitting.is_empty() {
            return None;
        }

        // Per-sensor cooldown keyed on the previously emitted priority.
        if let (Some(last_ms), Some(last_priority)) = (control.last_sent_ms, control.last_priority)
        {
            if now_ms.saturating_sub(last_ms) < self.cooldown_for(last_priority) {
                return None;
            }
        }

        let priority = emitting
            .iter()
            .map(|p| p.priority)
            .max()
            .unwrap_or(Priority::Alta);
        let messages: Vec<String> = emitting.into_iter().map(|p| p.message).collect();

        control.last_sent_ms = Some(now_ms);
        control.last_priority = Some(priority);

        let projection = self.projection(inp);
        let status = if inp.is_defrosting {
            "DEGELO"
        } else if inp.door_open {
            "PORTA ABERTA"
        } else {
            "NORMAL"
        };

        Some(Alert {
            sensor_name: inp.name.to_string(),
            sensor_mac: inp.mac.to_string(),
            priority,
            messages,
            timestamp: self.zoned_timestamp(now_utc),
            context: AlertContext {
                temp: inp.temp,
                humidity: inp.humidity,
                projection,
                limit_min,
                limit_max,
                status: status.to_string(),
                slope: inp.metrics.slope,
                r_squared: inp.metrics.r_squared,
                variance: inp.metrics.variance,
            },
        })
    }

    /// Format a wall-clock instant in the configured zone.
    pub fn zoned_timestamp(&self, now_utc: DateTime<Utc>) -> String {
        now_utc
            .with_timezone(&self.tz)
            .format("%Y-%m-%dT%H:%M:%S%:z")
            .to_string()
    }

    /// Resolve the effective (max, min) temperature bounds for a sensor,
    /// applying the weekday-dependent fallback for a null maximum.
    pub fn resolve_bounds(
        &self,
        configured_max: Option<f64>,
        configured_min: Option<f64>,
        now_utc: DateTime<Utc>,
    ) -> (f64, f64) {
        (
            self.resolve_limit_max(configured_max, now_utc),
            configured_min.unwrap_or(self.limits.default_temp_min),
        )
    }

    fn resolve_limit_max(&self, configured: Option<f64>, now_utc: DateTime<Utc>) -> f64 {
        if let Some(max) = configured {
            return max;
        }
        let weekday = now_utc
            .with_timezone(&self.tz)
            .weekday()
            .number_from_monday();
        if self.limits.high_traffic_weekdays.contains(&weekday) {
            self.limits.high_traffic_temp_max
        } else {
            self.limits.default_temp_max
        }
    }

    /// During defrost only anomalously extreme values alert.
    fn defrost_extremes(
        &self,
        inp: &AlertInputs<'_>,
        limit_max: f64,
        limit_min: f64,
    ) -> Vec<Problem> {
        let tolerance = inp.profile.tuning().defrost_tolerance;
        let mut problems = Vec::new();

        if inp.temp > limit_max + tolerance + 5.0 {
            problems.push(Problem {
                kind: ProblemKind::TempHigh,
                message: format!(
                    "TEMPERATURA ALTA durante degelo: {:.1}°C (limite {:.1}°C)",
                    inp.temp, limit_max
                ),
                priority: Priority::Alta,
                extreme: true,
            });
        } else if inp.temp < limit_min - 5.0 {
            problems.push(Problem {
                kind: ProblemKind::TempLow,
                message: format!(
                    "TEMPERATURA BAIXA durante degelo: {:.1}°C (limite {:.1}°C)",
                    inp.temp, limit_min
                ),
                priority: Priority::Alta,
                extreme: true,
            });
        }

        problems
    }

    fn collect_problems(
        &self,
        inp: &AlertInputs<'_>,
        limit_max: f64,
        limit_min: f64,
        now_ms: u64,
    ) -> Vec<Problem> {
        let mut problems = Vec::new();

        if inp.temp > limit_max {
            problems.push(Problem {
                kind: ProblemKind::TempHigh,
                message: format!(
                    "TEMPERATURA ALTA: {:.1}°C (limite {:.1}°C)",
                    inp.temp, limit_max
                ),
                priority: Priority::Alta,
                extreme: inp.temp > limit_max + EXTREME_MARGIN_C,
            });
        } else if inp.temp < limit_min {
            problems.push(Problem {
                kind: ProblemKind::TempLow,
                message: format!(
                    "TEMPERATURA BAIXA: {:.1}°C (limite {:.1}°C)",
                    inp.temp, limit_min
                ),
                priority: Priority::Alta,
                extreme: inp.temp < limit_min - EXTREME_MARGIN_C,
            });
        } else if let Some((projection, priority)) = self.predictive(inp, limit_max) {
            problems.push(Problem {
                kind: ProblemKind::TempRising,
                message: format!(
                    "TEMPERATURA SUBINDO: projeção {:.1}°C em {:.0} min (limite {:.1}°C)",
                    projection, PROJECTION_MINUTES, limit_max
                ),
                priority,
                extreme: false,
            });
        }

        // Humidity is secondary: only checked when temperature is sane.
        let temp_ok = !problems
            .iter()
            .any(|p| matches!(p.kind, ProblemKind::TempHigh | ProblemKind::TempLow));
        if temp_ok {
            if let Some(hum_max) = inp.hum_max {
                if inp.humidity > hum_max {
                    problems.push(Problem {
                        kind: ProblemKind::HumidityHigh,
                        message: format!(
                            "UMIDADE ALTA: {:.0}% (limite {:.0}%)",
                            inp.humidity, hum_max
                        ),
                        priority: Priority::Alta,
                        extreme: false,
                    });
                }
            }
            if let Some(hum_min) = inp.hum_min {
                if inp.humidity < hum_min {
                    problems.push(Problem {
                        kind: ProblemKind::HumidityLow,
                        message: format!(
                            "UMIDADE BAIXA: {:.0}% (limite {:.0}%)",
                            inp.humidity, hum_min
                        ),
                        priority: Priority::Alta,
                        extreme: false,
                    });
                }
            }
        }

        if inp.door_open {
            if let Some(open_since) = inp.door_open_since_ms {
                let open_for = now_ms.saturating_sub(open_since);
                if open_for > self.timing.door_max_open_ms {
                    problems.push(Problem {
                        kind: ProblemKind::DoorOpen,
                        message: format!("PORTA ABERTA há {} min", open_for / 60_000),
                        priority: Priority::Alta,
                        extreme: false,
                    });
                }
            }
        }

        problems
    }

    /// Project the regression line 15 min ahead; classify the overshoot.
    fn predictive(&self, inp: &AlertInputs<'_>, limit_max: f64) -> Option<(f64, Priority)> {
        let m = inp.metrics;
        if !m.ready || m.slope <= 0.1 || m.r_squared <= 0.6 || m.is_defrost_shaped() {
            return None;
        }

        let projection = inp.temp + m.slope * PROJECTION_MINUTES;
        let overshoot = projection - limit_max;
        let minutes_to_limit = (limit_max - inp.temp) / m.slope;

        if minutes_to_limit <= 0.0 || minutes_to_limit >= PROJECTION_HORIZON_MINUTES {
            return None;
        }

        if overshoot >= 10.0 {
            Some((projection, Priority::Critica))
        } else if overshoot >= 5.0 {
            Some((projection, Priority::Preditiva))
        } else {
            None
        }
    }

    fn projection(&self, inp: &AlertInputs<'_>) -> Option<f64> {
        let m = inp.metrics;
        if m.ready && m.slope > 0.1 {
            Some(inp.temp + m.slope * PROJECTION_MINUTES)
        } else {
            None
        }
    }

    fn soak_for(&self, kind: ProblemKind) -> u64 {
        match kind {
            ProblemKind::TempRising => self.timing.predictive_soak_ms,
            _ => self.timing.soak_ms,
        }
    }

    fn cooldown_for(&self, priority: Priority) -> u64 {
        match priority {
            Priority::Preditiva => self.timing.cooldown_preditiva_ms,
            Priority::Alta | Priority::Critica => self.timing.cooldown_alta_ms,
            Priority::Sistema => self.timing.gateway_alert_cooldown_ms,
        }
    }
}
