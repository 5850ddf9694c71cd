//! Wire formats for gateway reports.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// One gateway's delivery: its MAC plus the sensor entries it heard.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayReport {
    pub gmac: String,
    #[serde(default)]
    pub obj: Vec<SensorEntry>,
}

/// One BLE advertisement relayed by a gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct SensorEntry {
    pub dmac: String,
    #[serde(rename = "type")]
    pub entry_type: i64,
    pub temp: Option<f64>,
    pub humidity: Option<f64>,
    /// Battery voltage in millivolts.
    pub vbatt: Option<f64>,
    pub rssi: Option<i64>,
    /// "YYYY-MM-DD HH:MM:SS.sss" capture time, when the gateway keeps a
    /// clock.
    pub time: Option<String>,
    /// Physical door-contact payload; carried through but not consumed by
    /// the thermal core.
    pub alarm: Option<Value>,
}

/// Decode a payload into gateway reports.
///
/// Accepts a single object, an array of objects, or the legacy
/// double-wrapped array; wrapping arrays are flattened until the first
/// element is an object.
pub fn parse_reports(payload: &[u8]) -> Result<Vec<GatewayReport>> {
    let mut value: Value =
        serde_json::from_slice(payload).map_err(|e| Error::Payload(e.to_string()))?;

    loop {
        match &value {
            Value::Array(items) if items.first().is_some_and(Value::is_array) => {
                let flattened: Vec<Value> = items
                    .iter()
                    .flat_map(|item| match item {
                        Value::Array(inner) => inner.clone(),
                        other => vec![other.clone()],
                    })
                    .collect();
                value = Value::Array(flattened);
            }
            _ => break,
        }
    }

    let items = match value {
        Value::Object(_) => vec![value],
        Value::Array(items) => items,
        other => {
            return Err(Error::Payload(format!(
                "expected object or array, got {other}"
            )))
        }
    };

    items
        .into_iter()
        .map(|item| serde_json::from_value(item).map_err(|e| Error::Payload(e.to_string())))
        .collect()
}

/// Battery millivolts to percent: linear between 2500 mV and 3600 mV,
/// saturating at the endpoints.
pub fn battery_percent(mv: f64) -> u8 {
    ((mv - 2500.0) / (3600.0 - 2500.0) * 100.0).clamp(0.0, 100.0).round() as u8
}

/// Gateway capture times arrive as "YYYY-MM-DD HH:MM:SS.sss"; the store
/// wants the T-separated form.
pub fn normalize_time(s: &str) -> String {
    s.replacen(' ', "T", 1)
}
