//! Runtime configuration.
//!
//! All knobs load from environment variables (a `.env`-less deployment is
//! the norm on the gateways' edge boxes). Centralizing the `env::var` calls
//! here keeps the rest of the crate free of ambient reads: components
//! receive the pieces of [`Config`] they need at construction.

use std::env;

use anyhow::{anyhow, Result};
use chrono_tz::Tz;

/// Parse an optional float environment variable with a default value.
macro_rules! parse_env_f64 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<f64>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u64 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u64>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in the environment", $var_name))?
    };
}

/// Message-bus connection settings.
#[derive(Debug, Clone)]
pub struct BusConfig {
    pub host: String,
    pub port: u16,
    pub topic: String,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Table-store connection settings (PostgREST-style: base URL + API key).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub url: String,
    pub key: String,
}

/// Alert threshold fallbacks applied when a sensor's configuration row
/// leaves a bound null.
#[derive(Debug, Clone)]
pub struct LimitConfig {
    /// Fallback upper temperature bound (°C).
    pub default_temp_max: f64,

    /// Fallback lower temperature bound (°C).
    pub default_temp_min: f64,

    /// Upper bound used instead of `default_temp_max` on high-traffic
    /// weekdays (doors open more often, rooms run warmer).
    pub high_traffic_temp_max: f64,

    /// Weekdays (1 = Monday .. 7 = Sunday) on which the high-traffic
    /// fallback applies, evaluated in [`Config::timezone`].
    pub high_traffic_weekdays: Vec<u32>,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            default_temp_max: -5.0,
            default_temp_min: -30.0,
            high_traffic_temp_max: -2.0,
            high_traffic_weekdays: vec![3, 4],
        }
    }
}

/// Soak, cooldown, drain, and garbage-collection periods, all in
/// milliseconds.
#[derive(Debug, Clone)]
pub struct TimingConfig {
    /// Soak before the first alert for a problem fires.
    pub soak_ms: u64,

    /// Soak for predictive alerts (half the standard soak).
    pub predictive_soak_ms: u64,

    /// Watchlist age past which an extreme reading promotes to CRITICA.
    pub extreme_promotion_ms: u64,

    /// Per-sensor cooldown after a CRITICA/ALTA alert.
    pub cooldown_alta_ms: u64,

    /// Per-sensor cooldown after a PREDITIVA alert.
    pub cooldown_preditiva_ms: u64,

    /// Continuous-open duration past which the door alert fires.
    pub door_max_open_ms: u64,

    /// Gateway silence past which it is considered offline.
    pub gateway_offline_ms: u64,

    /// Minimum spacing between SISTEMA alerts for the same gateway.
    pub gateway_alert_cooldown_ms: u64,

    pub telemetry_drain_ms: u64,
    pub door_drain_ms: u64,
    pub webhook_drain_ms: u64,
    pub config_refresh_ms: u64,
    pub heartbeat_reseed_ms: u64,
    pub state_gc_ms: u64,
    pub watchlist_prune_ms: u64,

    /// Sensor-state eviction threshold.
    pub sensor_silence_ms: u64,

    /// Gateway-heartbeat eviction threshold.
    pub gateway_silence_ms: u64,

    /// Consecutive failed deliveries after which a batch is dropped.
    pub sink_max_attempts: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            soak_ms: 10 * 60 * 1000,
            predictive_soak_ms: 5 * 60 * 1000,
            extreme_promotion_ms: 30 * 60 * 1000,
            cooldown_alta_ms: 15 * 60 * 1000,
            cooldown_preditiva_ms: 45 * 60 * 1000,
            door_max_open_ms: 5 * 60 * 1000,
            gateway_offline_ms: 15 * 60 * 1000,
            gateway_alert_cooldown_ms: 60 * 60 * 1000,
            telemetry_drain_ms: 10 * 1000,
            door_drain_ms: 10 * 1000,
            webhook_drain_ms: 5 * 60 * 1000,
            config_refresh_ms: 10 * 60 * 1000,
            heartbeat_reseed_ms: 30 * 60 * 1000,
            state_gc_ms: 24 * 60 * 60 * 1000,
            watchlist_prune_ms: 30 * 60 * 1000,
            sensor_silence_ms: 24 * 60 * 60 * 1000,
            gateway_silence_ms: 48 * 60 * 60 * 1000,
            sink_max_attempts: 10,
        }
    }
}

/// Strongly typed application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bus: BusConfig,
    pub store: StoreConfig,
    pub webhook_url: String,
    pub api_port: u16,
    pub log_level: String,
    pub timezone: Tz,
    /// Hardcoded + operator-supplied sensor/gateway blocklist (raw strings,
    /// canonicalized by the engine).
    pub blocklist: Vec<String>,
    pub limits: LimitConfig,
    pub timing: TimingConfig,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `FROSTLINE_STORE_URL` / `FROSTLINE_STORE_KEY` -- table store
/// - `FROSTLINE_WEBHOOK_URL` -- alert sink
///
/// Everything else has a default suitable for a local broker.
pub fn load_from_env() -> Result<Config> {
    let store_url = require_env!("FROSTLINE_STORE_URL");
    let store_key = require_env!("FROSTLINE_STORE_KEY");
    let webhook_url = require_env!("FROSTLINE_WEBHOOK_URL");

    let tz_name =
        env::var("FROSTLINE_TIMEZONE").unwrap_or_else(|_| "America/Sao_Paulo".to_string());
    let timezone: Tz = tz_name
        .parse()
        .map_err(|_| anyhow!("Invalid FROSTLINE_TIMEZONE: {tz_name}"))?;

    let high_traffic_weekdays = env::var("FROSTLINE_HIGH_TRAFFIC_WEEKDAYS")
        .unwrap_or_else(|_| "3,4".to_string())
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            s.trim()
                .parse::<u32>()
                .map_err(|e| anyhow!("Invalid FROSTLINE_HIGH_TRAFFIC_WEEKDAYS: {e}"))
        })
        .collect::<Result<Vec<_>>>()?;

    let blocklist = env::var("FROSTLINE_BLOCKLIST")
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let mut timing = TimingConfig::default();
    timing.soak_ms = parse_env_u64!("FROSTLINE_SOAK_MS", timing.soak_ms);
    timing.predictive_soak_ms =
        parse_env_u64!("FROSTLINE_PREDICTIVE_SOAK_MS", timing.predictive_soak_ms);
    timing.cooldown_alta_ms = parse_env_u64!("FROSTLINE_COOLDOWN_ALTA_MS", timing.cooldown_alta_ms);
    timing.cooldown_preditiva_ms = parse_env_u64!(
        "FROSTLINE_COOLDOWN_PREDITIVA_MS",
        timing.cooldown_preditiva_ms
    );
    timing.door_max_open_ms =
        parse_env_u64!("FROSTLINE_DOOR_MAX_OPEN_MS", timing.door_max_open_ms);
    timing.sink_max_attempts =
        parse_env_u64!("FROSTLINE_SINK_MAX_ATTEMPTS", timing.sink_max_attempts as u64) as u32;

    let mut limits = LimitConfig::default();
    limits.default_temp_max = parse_env_f64!("FROSTLINE_TEMP_MAX_DEFAULT", limits.default_temp_max);
    limits.default_temp_min = parse_env_f64!("FROSTLINE_TEMP_MIN_DEFAULT", limits.default_temp_min);
    limits.high_traffic_temp_max = parse_env_f64!(
        "FROSTLINE_HIGH_TRAFFIC_TEMP_MAX",
        limits.high_traffic_temp_max
    );
    limits.high_traffic_weekdays = high_traffic_weekdays;

    Ok(Config {
        bus: BusConfig {
            host: env::var("FROSTLINE_MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_env_u64!("FROSTLINE_MQTT_PORT", 1883) as u16,
            topic: env::var("FROSTLINE_MQTT_TOPIC").unwrap_or_else(|_| "gw/telemetry".to_string()),
            client_id: env::var("FROSTLINE_MQTT_CLIENT_ID")
                .unwrap_or_else(|_| "frostline-engine".to_string()),
            username: env::var("FROSTLINE_MQTT_USER").ok(),
            password: env::var("FROSTLINE_MQTT_PASS").ok(),
        },
        store: StoreConfig {
            url: store_url,
            key: store_key,
        },
        webhook_url,
        api_port: parse_env_u64!("FROSTLINE_API_PORT", 7944) as u16,
        log_level: env::var("FROSTLINE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        timezone,
        blocklist,
        limits,
        timing,
    })
}

impl Config {
    /// Log the loaded configuration, masking the store key.
    pub fn log_config(&self) {
        let masked_key = if self.store.key.len() > 8 {
            format!("{}****", &self.store.key[..4])
        } else {
            "****".to_string()
        };

        tracing::info!("Configuration loaded:");
        tracing::info!("  MQTT           : {}:{}", self.bus.host, self.bus.port);
        tracing::info!("  Topic          : {}", self.bus.topic);
        tracing::info!("  Store          : {} (key {})", self.store.url, masked_key);
        tracing::info!("  Webhook        : {}", self.webhook_url);
        tracing::info!("  API port       : {}", self.api_port);
        tracing::info!("  Timezone       : {}", self.timezone);
        tracing::info!("  Blocklist      : {} entries", self.blocklist.len());
    }
}
