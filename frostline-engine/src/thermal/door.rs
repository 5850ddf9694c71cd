//! Virtual door-open detection.
//!
//! No physical contact sensor is assumed: a door event is inferred from the
//! temperature dynamics alone -- abrupt turbulent warming opens, settling
//! closes. A candidate transition is committed either immediately on high
//! confidence (several criteria agreeing at once) or after two consistent
//! detections inside a short confirmation window, which keeps single noisy
//! samples from flapping the state.

use super::analyzer::ThermalMetrics;
use super::profile::DetectorTuning;

/// Confirmation window for an open candidate.
const OPEN_CONFIRM_WINDOW_MS: u64 = 30_000;

/// Confirmation window for a close candidate.
const CLOSE_CONFIRM_WINDOW_MS: u64 = 60_000;

/// Open criteria agreeing at once that commit without confirmation.
const OPEN_HIGH_CONFIDENCE: usize = 3;

/// Close criteria agreeing at once that commit without confirmation.
const CLOSE_HIGH_CONFIDENCE: usize = 2;

/// Inputs the detector reads from the owning sensor state.
#[derive(Debug, Clone, Copy)]
pub struct DoorContext {
    pub is_defrosting: bool,
    /// Current committed door state (true = open).
    pub door_open: bool,
    /// Variance observed on the previous analyzed sample.
    pub previous_variance: Option<f64>,
    pub temp: f64,
    pub limit_min: f64,
    pub limit_max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorDecision {
    NoChange,
    Opened,
    Closed,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    open: bool,
    first_ms: u64,
}

/// Door transition detector with confirmation state.
#[derive(Debug, Clone, Default)]
pub struct DoorDetector {
    pending: Option<Pending>,
}

impl DoorDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluate(
        &mut self,
        m: &ThermalMetrics,
        tuning: &DetectorTuning,
        ctx: DoorContext,
        now_ms: u64,
    ) -> DoorDecision {
        if !m.ready {
            return DoorDecision::NoChange;
        }

        // Defrost owns the thermal signature; door state is forced closed
        // by the state machine while it runs.
        if ctx.is_defrosting {
            self.pending = None;
            return DoorDecision::NoChange;
        }

        // Forced-close override: in bounds, flat, quiet, and well explained
        // by the regression line. Commits regardless of prior state.
        let in_bounds = ctx.temp >= ctx.limit_min && ctx.temp <= ctx.limit_max;
        if in_bounds
            && m.slope.abs() < 0.1
            && m.variance < 0.5 * tuning.door_variance
            && m.r_squared > 0.7
        {
            self.pending = None;
            return if ctx.door_open {
                DoorDecision::Closed
            } else {
                DoorDecision::NoChange
            };
        }

        if ctx.door_open {
            let hits = close_criteria_hits(m, tuning, ctx.previous_variance);
            self.resolve(hits, false, CLOSE_HIGH_CONFIDENCE, CLOSE_CONFIRM_WINDOW_MS, now_ms)
        } else {
            // A window still carrying a defrost bump reads turbulent long
            // after the cycle commits or ends; that signature belongs to
            // the defrost detector and must never open the door.
            let hits = if m.is_defrost_shaped() {
                0
            } else {
                open_criteria_hits(m, tuning)
            };
            self.resolve(hits, true, OPEN_HIGH_CONFIDENCE, OPEN_CONFIRM_WINDOW_MS, now_ms)
        }
    }

    fn resolve(
        &mut self,
        hits: usize,
        open: bool,
        high_confidence: usize,
        confirm_window_ms: u64,
        now_ms: u64,
    ) -> DoorDecision {
        if hits == 0 {
            return DoorDecision::NoChange;
        }

        let committed = if open {
            DoorDecision::Opened
        } else {
            DoorDecision::Closed
        };

        if hits >= high_confidence {
            self.pending = None;
            return committed;
        }

        match self.pending {
            Some(p)
                if p.open == open
                    && now_ms > p.first_ms
                    && now_ms - p.first_ms <= confirm_window_ms =>
            {
                self.pending = None;
                committed
            }
            _ => {
                self.pending = Some(Pending {
                    open,
                    first_ms: now_ms,
                });
                DoorDecision::NoChange
            }
        }
    }
}

fn open_criteria_hits(m: &ThermalMetrics, tuning: &DetectorTuning) -> usize {
    let mut hits = 0;

    if m.acceleration > tuning.door_accel {
        hits += 1;
    }
    if m.slope > tuning.door_slope {
        hits += 1;
    }
    // Turbulent rise: high variance poorly explained by a line.
    if m.variance > tuning.door_variance && m.slope > 0.5 && m.r_squared < 0.6 {
        hits += 1;
    }
    if m.change_point.is_some()
        && m.segment
            .as_ref()
            .is_some_and(|s| s.slope_change.abs() > 1.0)
        && m.variance > tuning.door_variance
    {
        hits += 1;
    }
    if m.jerk.abs() > tuning.door_jerk && m.slope > 0.3 {
        hits += 1;
    }

    hits
}

fn close_criteria_hits(
    m: &ThermalMetrics,
    tuning: &DetectorTuning,
    previous_variance: Option<f64>,
) -> usize {
    let mut hits = 0;

    if m.slope < -0.1 && m.r_squared > 0.5 {
        hits += 1;
    }
    if m.slope < 0.1 && m.acceleration < -0.1 {
        hits += 1;
    }
    if let Some(prev) = previous_variance {
        if m.variance < 0.7 * prev && m.variance < 0.8 * tuning.door_variance {
            hits += 1;
        }
    }

    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thermal::profile::SensorProfile;

    fn tuning() -> &'static DetectorTuning {
        SensorProfile::Normal.tuning()
    }

    fn quiet_metrics() -> ThermalMetrics {
        ThermalMetrics {
            ready: true,
            slope: 0.0,
            r_squared: 0.9,
            variance: 0.01,
            ..ThermalMetrics::default()
        }
    }

    fn spike_metrics() -> ThermalMetrics {
        // Satisfies acceleration, slope, and turbulent-rise criteria.
        ThermalMetrics {
            ready: true,
            slope: 2.0,
            r_squared: 0.3,
            variance: 3.0,
            acceleration: 1.5,
            jerk: 0.1,
            ..ThermalMetrics::default()
        }
    }

    fn closed_ctx() -> DoorContext {
        DoorContext {
            is_defrosting: false,
            door_open: false,
            previous_variance: None,
            temp: -18.0,
            limit_min: -25.0,
            limit_max: -10.0,
        }
    }

    fn open_ctx(previous_variance: f64) -> DoorContext {
        DoorContext {
            door_open: true,
            previous_variance: Some(previous_variance),
            // Keep temp out of bounds so the forced-close override stays out
            // of the way of the criteria under test.
            temp: -8.0,
            ..closed_ctx()
        }
    }

    #[test]
    fn no_decision_when_not_ready() {
        let mut detector = DoorDetector::new();
        let m = ThermalMetrics::not_ready();
        assert_eq!(
            detector.evaluate(&m, tuning(), closed_ctx(), 0),
            DoorDecision::NoChange
        );
    }

    #[test]
    fn defrost_suppresses_detection() {
        let mut detector = DoorDetector::new();
        let ctx = DoorContext {
            is_defrosting: true,
            ..closed_ctx()
        };
        assert_eq!(
            detector.evaluate(&spike_metrics(), tuning(), ctx, 0),
            DoorDecision::NoChange
        );
    }

    #[test]
    fn high_confidence_spike_opens_immediately() {
        let mut detector = DoorDetector::new();
        assert_eq!(
            detector.evaluate(&spike_metrics(), tuning(), closed_ctx(), 0),
            DoorDecision::Opened
        );
    }

    #[test]
    fn single_criterion_requires_confirmation() {
        let mut detector = DoorDetector::new();
        let m = ThermalMetrics {
            ready: true,
            slope: 1.0, // only the slope criterion
            r_squared: 0.9,
            variance: 0.2,
            ..ThermalMetrics::default()
        };

        assert_eq!(
            detector.evaluate(&m, tuning(), closed_ctx(), 0),
            DoorDecision::NoChange
        );
        assert_eq!(
            detector.evaluate(&m, tuning(), closed_ctx(), 10_000),
            DoorDecision::Opened
        );
    }

    #[test]
    fn stale_candidate_restarts_confirmation() {
        let mut detector = DoorDetector::new();
        let m = ThermalMetrics {
            ready: true,
            slope: 1.0,
            r_squared: 0.9,
            variance: 0.2,
            ..ThermalMetrics::default()
        };

        assert_eq!(
            detector.evaluate(&m, tuning(), closed_ctx(), 0),
            DoorDecision::NoChange
        );
        // Second detection outside the 30-s window: no commit, new candidate.
        assert_eq!(
            detector.evaluate(&m, tuning(), closed_ctx(), 40_000),
            DoorDecision::NoChange
        );
        assert_eq!(
            detector.evaluate(&m, tuning(), closed_ctx(), 50_000),
            DoorDecision::Opened
        );
    }

    #[test]
    fn forced_close_commits_from_open() {
        let mut detector = DoorDetector::new();
        let ctx = DoorContext {
            door_open: true,
            previous_variance: Some(2.0),
            ..closed_ctx()
        };
        assert_eq!(
            detector.evaluate(&quiet_metrics(), tuning(), ctx, 0),
            DoorDecision::Closed
        );
    }

    #[test]
    fn forced_close_is_noop_when_already_closed() {
        let mut detector = DoorDetector::new();
        assert_eq!(
            detector.evaluate(&quiet_metrics(), tuning(), closed_ctx(), 0),
            DoorDecision::NoChange
        );
    }

    #[test]
    fn closes_on_decline_and_variance_drop() {
        let mut detector = DoorDetector::new();
        // Declining with good fit + variance collapse: two criteria.
        let m = ThermalMetrics {
            ready: true,
            slope: -0.5,
            r_squared: 0.8,
            variance: 0.5,
            ..ThermalMetrics::default()
        };
        assert_eq!(
            detector.evaluate(&m, tuning(), open_ctx(2.0), 0),
            DoorDecision::Closed
        );
    }

    #[test]
    fn single_close_criterion_requires_confirmation() {
        let mut detector = DoorDetector::new();
        let m = ThermalMetrics {
            ready: true,
            slope: -0.5,
            r_squared: 0.8,
            variance: 2.0, // no variance-drop hit
            ..ThermalMetrics::default()
        };

        assert_eq!(
            detector.evaluate(&m, tuning(), open_ctx(2.0), 0),
            DoorDecision::NoChange
        );
        assert_eq!(
            detector.evaluate(&m, tuning(), open_ctx(2.0), 30_000),
            DoorDecision::Closed
        );
    }

    #[test]
    fn defrost_shaped_window_never_opens() {
        use crate::thermal::analyzer::{CyclePhase, DefrostCycle, SegmentAnalysis};

        // The tail of a defrost cycle: turbulent enough to satisfy several
        // open criteria, but tagged as a cycle.
        let m = ThermalMetrics {
            ready: true,
            slope: 1.4,
            r_squared: 0.9,
            variance: 3.0,
            jerk: -2.1,
            change_point: Some(17),
            segment: Some(SegmentAnalysis {
                first_slope: 1.8,
                second_slope: -0.7,
                slope_change: -2.5,
            }),
            cycle: Some(DefrostCycle {
                phase: CyclePhase::Falling,
                rising_slope: 1.8,
                falling_slope: -0.7,
                peak_index: 20,
                trough_index: 0,
            }),
            ..ThermalMetrics::default()
        };

        let mut detector = DoorDetector::new();
        for i in 0..5u64 {
            assert_eq!(
                detector.evaluate(&m, tuning(), closed_ctx(), i * 10_000),
                DoorDecision::NoChange
            );
        }
    }

    #[test]
    fn quiet_window_never_opens() {
        let mut detector = DoorDetector::new();
        for i in 0..20u64 {
            assert_eq!(
                detector.evaluate(&quiet_metrics(), tuning(), closed_ctx(), i * 10_000),
                DoorDecision::NoChange
            );
        }
    }
}
