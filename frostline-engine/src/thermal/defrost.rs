//! Defrost cycle detection.
//!
//! A defrost is a deliberate, gradual warming episode: the compressor stops
//! and a heater clears the evaporator coil. Thermally it reads as a stable
//! linear rise followed by a recovery fall -- the opposite texture of a
//! door event, which is turbulent. The detector leans on fit quality
//! (R², stdError) where the door detector leans on variance and jerk.

use super::analyzer::{CyclePhase, ThermalMetrics};
use super::profile::{DetectorTuning, SensorProfile};

/// A cycle younger than this cannot end (start transient protection).
const MIN_CYCLE_MS: u64 = 2 * 60 * 1000;

/// Minimum cycle age for the return-to-start-temperature end criterion.
const RETURN_MIN_CYCLE_MS: u64 = 5 * 60 * 1000;

/// Safety timeout: no defrost runs longer than this.
const MAX_CYCLE_MS: u64 = 60 * 60 * 1000;

/// Inputs the detector reads from the owning sensor state.
#[derive(Debug, Clone, Copy)]
pub struct DefrostContext {
    pub is_defrosting: bool,
    /// True for exactly the first sample after a start commit.
    pub just_started: bool,
    pub start_ms: Option<u64>,
    pub start_temp: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefrostDecision {
    NoChange,
    Started,
    Ended,
}

/// Stateless decision function over metrics and prior state.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefrostDetector;

impl DefrostDetector {
    pub fn evaluate(
        m: &ThermalMetrics,
        tuning: &DetectorTuning,
        profile: SensorProfile,
        ctx: DefrostContext,
        temp: f64,
        now_ms: u64,
    ) -> DefrostDecision {
        if !m.ready {
            return DefrostDecision::NoChange;
        }

        if ctx.is_defrosting {
            Self::evaluate_end(m, tuning, ctx, temp, now_ms)
        } else if Self::start_detected(m, tuning, profile) {
            DefrostDecision::Started
        } else {
            DefrostDecision::NoChange
        }
    }

    fn start_detected(m: &ThermalMetrics, tuning: &DetectorTuning, profile: SensorProfile) -> bool {
        // 1. Stable linear rise.
        if m.slope > tuning.defrost_min_slope
            && m.std_error < tuning.defrost_variance
            && m.r_squared > tuning.defrost_min_r2
            && m.variance < tuning.defrost_variance
        {
            return true;
        }

        // 2. Whole-cycle shape, still climbing.
        if let Some(cycle) = &m.cycle {
            if cycle.phase == CyclePhase::Rising && cycle.rising_slope > tuning.defrost_min_slope {
                return true;
            }
        }

        // 3. Ultra-freezer shortcut: steeper heaters, near-perfect fit.
        if profile.is_ultra() && m.slope > 0.3 && m.r_squared > 0.88 && m.std_error < 0.6 {
            return true;
        }

        // 4. Regime shift into a rise.
        if m.segment.as_ref().is_some_and(|s| s.slope_change > 0.5)
            && m.slope > tuning.defrost_min_slope
            && m.r_squared > 0.75
        {
            return true;
        }

        false
    }

    fn evaluate_end(
        m: &ThermalMetrics,
        tuning: &DetectorTuning,
        ctx: DefrostContext,
        temp: f64,
        now_ms: u64,
    ) -> DefrostDecision {
        if ctx.just_started {
            return DefrostDecision::NoChange;
        }

        let elapsed = ctx
            .start_ms
            .map(|start| now_ms.saturating_sub(start))
            .unwrap_or(0);
        if elapsed < MIN_CYCLE_MS {
            return DefrostDecision::NoChange;
        }

        // 1. Clean decline.
        if m.slope < -0.3 && m.r_squared > 0.7 {
            return DefrostDecision::Ended;
        }

        // 2. Cycle shape past the peak. The phase != RISING re-check guards
        // against a miscoded cycle tag; keep it even though FALLING already
        // excludes RISING.
        if let Some(cycle) = &m.cycle {
            if cycle.phase == CyclePhase::Falling
                && cycle.falling_slope < -0.15
                && cycle.phase != CyclePhase::Rising
            {
                return DefrostDecision::Ended;
            }
        }

        // 3. Safety timeout.
        if elapsed > MAX_CYCLE_MS {
            return DefrostDecision::Ended;
        }

        // 4. Returned near the start temperature after a real cycle.
        let rising_now = m
            .cycle
            .as_ref()
            .is_some_and(|c| c.phase == CyclePhase::Rising);
        if temp <= ctx.start_temp + tuning.defrost_end_margin
            && elapsed >= RETURN_MIN_CYCLE_MS
            && m.slope < -0.1
            && !rising_now
        {
            return DefrostDecision::Ended;
        }

        // 5. Regime shift into a fall.
        if m.segment.as_ref().is_some_and(|s| s.slope_change < -0.3)
            && m.slope < -0.15
            && m.r_squared > 0.6
        {
            return DefrostDecision::Ended;
        }

        DefrostDecision::NoChange
    }
}
