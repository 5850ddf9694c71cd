//! Regression metrics over a sensor's temperature window.
//!
//! The analyzer is a pure function: window in, metrics out. Both detectors
//! consume the same record and disagree only in which metrics they weight --
//! defrost is linear and low-variance, a door event is non-linear and
//! high-variance with sharp jerk.
//!
//! All slopes are °C per minute, with time measured from the window's first
//! sample.

use super::profile::DetectorTuning;
use super::window::TemperatureWindow;

/// Minimum samples before the analyzer reports `ready`.
pub const MIN_READY_SAMPLES: usize = 10;

/// Minimum samples before jerk (third derivative) is computed.
const MIN_JERK_SAMPLES: usize = 9;

/// Where the defrost-cycle peak appears in the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Rising,
    Falling,
    Peak,
    Unknown,
}

impl CyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CyclePhase::Rising => "RISING",
            CyclePhase::Falling => "FALLING",
            CyclePhase::Peak => "PEAK",
            CyclePhase::Unknown => "UNKNOWN",
        }
    }
}

/// Defrost-shaped cycle tag.
///
/// Present only when the window carries the full shape: the warmest point
/// past 30 % of the window but not within the last three samples, a climb
/// toward it above the profile minimum, and a real decline after it. The
/// tag deliberately excludes a still-climbing window -- an unfinished rise
/// is indistinguishable from a door spike at this level, and the detectors
/// that consume the tag must not be fed one.
#[derive(Debug, Clone, PartialEq)]
pub struct DefrostCycle {
    /// Which half-pattern the window currently sits in, judged from the
    /// trend of the last three samples.
    pub phase: CyclePhase,
    /// Regression slope from the window start to the peak.
    pub rising_slope: f64,
    /// Regression slope from the peak to the window end.
    pub falling_slope: f64,
    pub peak_index: usize,
    pub trough_index: usize,
}

/// Half-window slopes around the change point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentAnalysis {
    pub first_slope: f64,
    pub second_slope: f64,
    pub slope_change: f64,
}

/// Output record of one analyzer pass.
#[derive(Debug, Clone, Default)]
pub struct ThermalMetrics {
    pub ready: bool,
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    /// √mean(residual²) against the regression line.
    pub std_error: f64,
    pub variance: f64,
    pub std_dev: f64,
    /// slope(last 30 % of window) − slope(first 70 %).
    pub acceleration: f64,
    /// Change in acceleration across window thirds.
    pub jerk: f64,
    pub ema: f64,
    pub cycle: Option<DefrostCycle>,
    pub change_point: Option<usize>,
    pub segment: Option<SegmentAnalysis>,
}

impl ThermalMetrics {
    pub fn not_ready() -> Self {
        Self::default()
    }

    pub fn is_defrost_shaped(&self) -> bool {
        self.cycle.is_some()
    }
}

struct LinearFit {
    slope: f64,
    intercept: f64,
    r_squared: f64,
}

/// Ordinary least squares over (minutes, °C) points. `None` when fewer
/// than two points or zero spread on the time axis.
fn linear_fit(pts: &[(f64, f64)]) -> Option<LinearFit> {
    let n = pts.len();
    if n < 2 {
        return None;
    }

    let nf = n as f64;
    let mean_x = pts.iter().map(|p| p.0).sum::<f64>() / nf;
    let mean_y = pts.iter().map(|p| p.1).sum::<f64>() / nf;

    let mut cov_xy = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in pts {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov_xy += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x <= f64::EPSILON {
        return None;
    }

    let slope = cov_xy / var_x;
    let intercept = mean_y - slope * mean_x;
    let r_squared = if var_y <= f64::EPSILON {
        0.0
    } else {
        (cov_xy * cov_xy) / (var_x * var_y)
    };

    Some(LinearFit {
        slope,
        intercept,
        r_squared,
    })
}

fn slope_of(pts: &[(f64, f64)]) -> f64 {
    linear_fit(pts).map(|f| f.slope).unwrap_or(0.0)
}

/// Population variance of the temperature values.
fn variance_of(pts: &[(f64, f64)]) -> f64 {
    let n = pts.len();
    if n == 0 {
        return 0.0;
    }
    let mean = pts.iter().map(|p| p.1).sum::<f64>() / n as f64;
    pts.iter().map(|p| (p.1 - mean).powi(2)).sum::<f64>() / n as f64
}

/// Analyze the window against a profile's tuning.
pub fn analyze(window: &TemperatureWindow, tuning: &DetectorTuning) -> ThermalMetrics {
    let n = window.len();
    if n < MIN_READY_SAMPLES {
        return ThermalMetrics::not_ready();
    }

    let t0 = window.samples().front().map(|s| s.ts_ms).unwrap_or(0);
    let pts: Vec<(f64, f64)> = window
        .samples()
        .iter()
        .map(|s| ((s.ts_ms - t0) as f64 / 60_000.0, s.temp))
        .collect();

    let fit = match linear_fit(&pts) {
        Some(fit) => fit,
        None => return ThermalMetrics::not_ready(),
    };

    let variance = variance_of(&pts);
    let std_dev = variance.sqrt();

    let residual_sq_sum: f64 = pts
        .iter()
        .map(|(x, y)| {
            let predicted = fit.slope * x + fit.intercept;
            (y - predicted).powi(2)
        })
        .sum();
    let std_error = (residual_sq_sum / n as f64).sqrt();

    // First 70 % vs last 30 % of the window.
    let split = ((n as f64) * 0.7).floor() as usize;
    let acceleration = if split >= 2 && n - split >= 2 {
        slope_of(&pts[split..]) - slope_of(&pts[..split])
    } else {
        0.0
    };

    let jerk = if n >= MIN_JERK_SAMPLES {
        let third = n / 3;
        let s1 = slope_of(&pts[..third]);
        let s2 = slope_of(&pts[third..2 * third]);
        let s3 = slope_of(&pts[2 * third..]);
        (s3 - s2) - (s2 - s1)
    } else {
        0.0
    };

    let mut ema = pts[0].1;
    for (_, temp) in &pts[1..] {
        ema = tuning.ema_alpha * temp + (1.0 - tuning.ema_alpha) * ema;
    }

    let cycle = locate_cycle(&pts, tuning);
    let (change_point, segment) = locate_change_point(&pts);

    ThermalMetrics {
        ready: true,
        slope: fit.slope,
        intercept: fit.intercept,
        r_squared: fit.r_squared,
        std_error,
        variance,
        std_dev,
        acceleration,
        jerk,
        ema,
        cycle,
        change_point,
        segment,
    }
}

/// Locate a defrost-shaped cycle in the window, if the full shape is
/// present: interior peak past 30 % of the window, a climb above the
/// profile minimum, and a real decline after the peak.
fn locate_cycle(pts: &[(f64, f64)], tuning: &DetectorTuning) -> Option<DefrostCycle> {
    let n = pts.len();

    let mut peak_index = 0;
    let mut trough_index = 0;
    for (i, (_, temp)) in pts.iter().enumerate() {
        if *temp > pts[peak_index].1 {
            peak_index = i;
        }
        if *temp < pts[trough_index].1 {
            trough_index = i;
        }
    }

    if (peak_index as f64) <= 0.3 * n as f64 {
        return None;
    }

    // A peak within the last three samples means the window is still
    // climbing -- no complete cycle to tag.
    if peak_index >= n.saturating_sub(3) {
        return None;
    }

    let rising_slope = slope_of(&pts[..=peak_index]);
    if rising_slope <= tuning.defrost_min_slope {
        return None;
    }

    let falling_slope = slope_of(&pts[peak_index..]);
    if falling_slope >= -0.1 {
        return None;
    }

    // The instantaneous half-pattern: judged from the last three samples,
    // not the whole post-peak stretch, so a rebound after the trough reads
    // as RISING again.
    let tail = &pts[n - 3..];
    let tail_slope = slope_of(tail);
    let phase = if tail_slope > 0.1 {
        CyclePhase::Rising
    } else if tail_slope < -0.1 {
        CyclePhase::Falling
    } else {
        CyclePhase::Peak
    };

    Some(DefrostCycle {
        phase,
        rising_slope,
        falling_slope,
        peak_index,
        trough_index,
    })
}

/// Index in [3, len−3] minimising variance(left) + variance(right), with
/// the slopes of the two segments around it.
fn locate_change_point(pts: &[(f64, f64)]) -> (Option<usize>, Option<SegmentAnalysis>) {
    let n = pts.len();
    if n < 7 {
        return (None, None);
    }

    let mut best_index = 3;
    let mut best_cost = f64::INFINITY;
    for i in 3..=(n - 3) {
        let cost = variance_of(&pts[..i]) + variance_of(&pts[i..]);
        if cost < best_cost {
            best_cost = cost;
            best_index = i;
        }
    }

    let first_slope = slope_of(&pts[..best_index]);
    let second_slope = slope_of(&pts[best_index..]);

    (
        Some(best_index),
        Some(SegmentAnalysis {
            first_slope,
            second_slope,
            slope_change: second_slope - first_slope,
        }),
    )
}
