mod analyzer;
mod defrost;
mod door;
mod profile;
mod window;

pub use analyzer::{
    analyze, CyclePhase, DefrostCycle, SegmentAnalysis, ThermalMetrics, MIN_READY_SAMPLES,
};
pub use defrost::{DefrostContext, DefrostDecision, DefrostDetector};
pub use door::{DoorContext, DoorDecision, DoorDetector};
pub use profile::{DetectorTuning, SensorProfile};
pub use window::{Sample, TemperatureWindow};
