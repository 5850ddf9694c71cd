//! Detector tuning profiles.
//!
//! Ultra-freezers (configured minimum below −15 °C) sit in denser, drier
//! air: door events produce sharper spikes, and defrost cycles climb
//! faster. The ULTRA bundle raises every detection threshold accordingly;
//! the decision logic itself is identical across profiles.

/// Per-profile detector constants.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorTuning {
    /// Door-open acceleration threshold (°C/min over window sections).
    pub door_accel: f64,

    /// Door-open slope threshold (°C/min).
    pub door_slope: f64,

    /// Variance level above which warming counts as turbulent.
    pub door_variance: f64,

    /// Door-open jerk threshold.
    pub door_jerk: f64,

    /// Minimum slope of a stable linear rise to count as defrost (°C/min).
    pub defrost_min_slope: f64,

    /// Variance/stdError ceiling for the "stable linear rise" criterion.
    pub defrost_variance: f64,

    /// Minimum R² for the "stable linear rise" criterion.
    pub defrost_min_r2: f64,

    /// Margin over the defrost start temperature that counts as returned
    /// to baseline (°C).
    pub defrost_end_margin: f64,

    /// Extra headroom over the alert limit tolerated during defrost (°C).
    pub defrost_tolerance: f64,

    /// Exponential moving average smoothing factor.
    pub ema_alpha: f64,
}

const NORMAL_TUNING: DetectorTuning = DetectorTuning {
    door_accel: 0.5,
    door_slope: 0.8,
    door_variance: 1.5,
    door_jerk: 0.5,
    defrost_min_slope: 0.15,
    defrost_variance: 0.8,
    defrost_min_r2: 0.85,
    defrost_end_margin: 2.0,
    defrost_tolerance: 15.0,
    ema_alpha: 0.3,
};

const ULTRA_TUNING: DetectorTuning = DetectorTuning {
    door_accel: 0.7,
    door_slope: 1.0,
    door_variance: 2.5,
    door_jerk: 0.8,
    defrost_min_slope: 0.2,
    defrost_variance: 1.2,
    defrost_min_r2: 0.8,
    defrost_end_margin: 3.0,
    defrost_tolerance: 25.0,
    ema_alpha: 0.2,
};

/// Configured `temp_min` below which a sensor is treated as an
/// ultra-freezer.
const ULTRA_TEMP_MIN_C: f64 = -15.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorProfile {
    Normal,
    Ultra,
}

impl SensorProfile {
    /// Derive the profile from a sensor's configured minimum temperature.
    pub fn for_temp_min(temp_min: Option<f64>) -> Self {
        match temp_min {
            Some(t) if t < ULTRA_TEMP_MIN_C => SensorProfile::Ultra,
            _ => SensorProfile::Normal,
        }
    }

    pub fn tuning(&self) -> &'static DetectorTuning {
        match self {
            SensorProfile::Normal => &NORMAL_TUNING,
            SensorProfile::Ultra => &ULTRA_TUNING,
        }
    }

    pub fn is_ultra(&self) -> bool {
        matches!(self, SensorProfile::Ultra)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorProfile::Normal => "NORMAL",
            SensorProfile::Ultra => "ULTRA",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ultra_when_configured_min_below_threshold() {
        assert_eq!(
            SensorProfile::for_temp_min(Some(-25.0)),
            SensorProfile::Ultra
        );
    }

    #[test]
    fn normal_at_exact_threshold() {
        assert_eq!(
            SensorProfile::for_temp_min(Some(-15.0)),
            SensorProfile::Normal
        );
    }

    #[test]
    fn normal_when_unconfigured() {
        assert_eq!(SensorProfile::for_temp_min(None), SensorProfile::Normal);
    }

    #[test]
    fn ultra_thresholds_are_strictly_higher() {
        let normal = SensorProfile::Normal.tuning();
        let ultra = SensorProfile::Ultra.tuning();

        assert!(ultra.door_accel > normal.door_accel);
        assert!(ultra.door_slope > normal.door_slope);
        assert!(ultra.door_variance > normal.door_variance);
        assert!(ultra.door_jerk > normal.door_jerk);
        assert!(ultra.defrost_tolerance > normal.defrost_tolerance);
    }
}
