//! Table-store access.
//!
//! The store is a PostgREST-style HTTP API addressed by base URL + API
//! key. Everything goes through the [`Store`] trait so the engine and the
//! drain tasks can be exercised against an in-memory implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How much of an error body to keep in logs.
const ERROR_BODY_PREVIEW: usize = 200;

/// Per-sensor configuration row (`sensor_configs`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SensorConfigRow {
    pub mac: String,
    pub display_name: Option<String>,
    pub temp_max: Option<f64>,
    pub temp_min: Option<f64>,
    pub hum_max: Option<f64>,
    pub hum_min: Option<f64>,
    #[serde(default)]
    pub em_manutencao: bool,
    /// Paired physical door sensor; blocklisted from direct processing.
    pub sensor_porta_vinculado: Option<String>,
}

/// Telemetry row (`telemetry_logs`), deadband-filtered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryRow {
    pub gw: String,
    pub mac: String,
    pub ts: String,
    pub temp: f64,
    pub hum: f64,
    pub batt: i32,
    pub rssi: i32,
}

/// Door transition row (`door_logs`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoorRow {
    pub gateway_mac: String,
    pub sensor_mac: String,
    pub timestamp_read: String,
    pub is_open: bool,
    pub alarm_code: i32,
    pub battery_percent: i32,
    pub rssi: i32,
}

/// Minimal projection of `telemetry_logs` used for heartbeat reseeding.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetrySeedRow {
    pub gw: String,
    pub ts: String,
}

/// Named interface over the backing tables.
#[async_trait]
pub trait Store: Send + Sync {
    async fn fetch_sensor_configs(&self) -> Result<Vec<SensorConfigRow>>;

    async fn insert_telemetry(&self, rows: &[TelemetryRow]) -> Result<()>;

    async fn insert_door_logs(&self, rows: &[DoorRow]) -> Result<()>;

    /// Telemetry rows newer than `since_iso`, newest first, for gateway
    /// heartbeat reseeding.
    async fn recent_telemetry(&self, since_iso: &str) -> Result<Vec<TelemetrySeedRow>>;

    /// Recent door rows, newest first; the caller keeps the first row per
    /// sensor as its last known state.
    async fn recent_door_logs(&self) -> Result<Vec<DoorRow>>;
}

/// HTTP implementation against the production table store.
pub struct RestStore {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RestStore {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url.trim_end_matches('/'))
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        let preview: String = body.chars().take(ERROR_BODY_PREVIEW).collect();
        Err(Error::Store(format!("{status}: {preview}")))
    }
}

#[async_trait]
impl Store for RestStore {
    async fn fetch_sensor_configs(&self) -> Result<Vec<SensorConfigRow>> {
        let resp = self
            .authed(self.http.get(self.table_url("sensor_configs")))
            .query(&[("select", "*")])
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    async fn insert_telemetry(&self, rows: &[TelemetryRow]) -> Result<()> {
        let resp = self
            .authed(self.http.post(self.table_url("telemetry_logs")))
            .header("prefer", "return=minimal")
            .json(rows)
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn insert_door_logs(&self, rows: &[DoorRow]) -> Result<()> {
        let resp = self
            .authed(self.http.post(self.table_url("door_logs")))
            .header("prefer", "return=minimal")
            .json(rows)
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn recent_telemetry(&self, since_iso: &str) -> Result<Vec<TelemetrySeedRow>> {
        let ts_filter = format!("gte.{since_iso}");
        let resp = self
            .authed(self.http.get(self.table_url("telemetry_logs")))
            .query(&[
                ("select", "gw,ts"),
                ("ts", ts_filter.as_str()),
                ("order", "ts.desc"),
                ("limit", "2000"),
            ])
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    async fn recent_door_logs(&self) -> Result<Vec<DoorRow>> {
        let resp = self
            .authed(self.http.get(self.table_url("door_logs")))
            .query(&[
                ("select", "*"),
                ("order", "timestamp_read.desc"),
                ("limit", "1000"),
            ])
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }
}
