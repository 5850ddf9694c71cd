//! API data transfer objects.
//!
//! These types define the API contract shared between the server and
//! clients (the status CLI and anything scraping the health endpoint).

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Full engine health snapshot.
#[derive(Clone, Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct HealthState {
    pub status: String,
    pub uptime_secs: u64,
    pub sensors: Vec<SensorSummary>,
    pub gateways: Vec<GatewaySummary>,
    pub buffers: BufferDepths,
    pub counters: IngestCounters,
    pub defrosting: usize,
    pub doors_open: usize,
    pub in_maintenance: usize,
}

/// Ingestion counters since process start.
#[derive(Clone, Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct IngestCounters {
    pub messages_seen: u64,
    pub readings_accepted: u64,
    pub parse_failures: u64,
}

/// Per-sensor projection.
#[derive(Clone, Debug, Deserialize, Serialize, ToSchema)]
pub struct SensorSummary {
    pub mac: String,
    pub name: String,
    pub temp: f64,
    pub humidity: f64,
    pub battery_percent: u8,
    /// Operational tag: NORMAL, DEGELO, or PORTA ABERTA.
    pub status: String,
    pub seconds_since_reading: u64,
    pub profile: String,
    pub metrics: Option<MetricsSummary>,
    pub defrost: Option<DefrostSummary>,
    pub door: Option<DoorSummary>,
    pub temp_min: Option<f64>,
    pub temp_max: Option<f64>,
}

/// Analyzer metrics of the last analyzed sample.
#[derive(Clone, Debug, Deserialize, Serialize, ToSchema)]
pub struct MetricsSummary {
    pub slope: f64,
    pub r_squared: f64,
    pub variance: f64,
    pub acceleration: f64,
    pub ema: f64,
}

/// Active defrost cycle details.
#[derive(Clone, Debug, Deserialize, Serialize, ToSchema)]
pub struct DefrostSummary {
    pub active_for_secs: u64,
    pub start_temp: f64,
    pub peak_temp: f64,
}

/// Open virtual door details.
#[derive(Clone, Debug, Deserialize, Serialize, ToSchema)]
pub struct DoorSummary {
    pub open_for_secs: u64,
}

/// Gateway heartbeat projection.
#[derive(Clone, Debug, Deserialize, Serialize, ToSchema)]
pub struct GatewaySummary {
    pub mac: String,
    pub seconds_since_seen: u64,
    /// LIVE (seen on the bus) or DB (reseeded from telemetry rows).
    pub source: String,
}

/// Outbound queue depths.
#[derive(Clone, Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct BufferDepths {
    pub telemetry: usize,
    pub door_events: usize,
    pub alerts: usize,
}
