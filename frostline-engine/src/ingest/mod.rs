//! Inbound payload decoding and per-reading normalization.
//!
//! The engine consumes one topic. Each delivery carries one gateway report
//! or an array of them; a historical firmware revision double-wrapped the
//! array, so decoding flattens until the first element is an object.

mod message;

pub use message::{battery_percent, normalize_time, parse_reports, GatewayReport, SensorEntry};

use crate::types::MacAddr;

/// Entry type carrying temperature/humidity telemetry. Everything else on
/// the topic (buttons, physical door contacts) is ignored by the core.
pub const SENSOR_TYPE_TEMP: i64 = 1;

/// Devices never processed regardless of configuration: integrator bench
/// sensors that leak into production traffic from time to time.
pub const HARDCODED_BLOCKLIST: &[&str] = &["AC:23:3F:00:00:01", "AC:23:3F:00:00:02"];

/// A normalized, accepted sensor reading.
#[derive(Debug, Clone)]
pub struct Reading {
    pub gateway: MacAddr,
    pub sensor: MacAddr,
    pub temp: f64,
    pub humidity: f64,
    pub battery_percent: u8,
    pub rssi: i32,
    /// Capture time as reported by the gateway, ISO-normalized. `None`
    /// when the gateway omitted it.
    pub reported_at: Option<String>,
}

impl SensorEntry {
    /// Convert a wire entry into a [`Reading`], if it carries usable
    /// telemetry.
    pub fn to_reading(&self, gateway: &MacAddr) -> Option<Reading> {
        if self.entry_type != SENSOR_TYPE_TEMP {
            return None;
        }
        let temp = self.temp?;
        let humidity = self.humidity?;

        Some(Reading {
            gateway: gateway.clone(),
            sensor: MacAddr::canonicalize(&self.dmac),
            temp,
            humidity,
            battery_percent: self.vbatt.map(battery_percent).unwrap_or(0),
            rssi: self.rssi.unwrap_or(0) as i32,
            reported_at: self.time.as_deref().map(normalize_time),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_of_wrong_type_yields_no_reading() {
        let entry = SensorEntry {
            dmac: "AC233FA04E21".into(),
            entry_type: 4,
            temp: Some(-18.0),
            humidity: Some(60.0),
            vbatt: Some(3000.0),
            rssi: Some(-70),
            time: None,
            alarm: None,
        };
        assert!(entry.to_reading(&MacAddr::canonicalize("1122AABBCCDD")).is_none());
    }

    #[test]
    fn entry_without_temperature_yields_no_reading() {
        let entry = SensorEntry {
            dmac: "AC233FA04E21".into(),
            entry_type: 1,
            temp: None,
            humidity: Some(60.0),
            vbatt: None,
            rssi: None,
            time: None,
            alarm: None,
        };
        assert!(entry.to_reading(&MacAddr::canonicalize("1122AABBCCDD")).is_none());
    }

    #[test]
    fn reading_canonicalizes_sensor_mac() {
        let entry = SensorEntry {
            dmac: "ac233fa04e21".into(),
            entry_type: 1,
            temp: Some(-18.5),
            humidity: Some(55.0),
            vbatt: Some(3600.0),
            rssi: Some(-62),
            time: Some("2025-06-02 12:00:00.000".into()),
            alarm: None,
        };
        let reading = entry
            .to_reading(&MacAddr::canonicalize("1122AABBCCDD"))
            .expect("usable entry");

        assert_eq!(reading.sensor.as_str(), "AC:23:3F:A0:4E:21");
        assert_eq!(reading.battery_percent, 100);
        assert_eq!(
            reading.reported_at.as_deref(),
            Some("2025-06-02T12:00:00.000")
        );
    }
}
