//! Commands sent into the engine task.
//!
//! Everything that mutates engine-owned maps goes through this channel, so
//! per-sensor state only ever changes on the engine task. Queries carry a
//! oneshot reply channel.

use tokio::sync::oneshot;

use crate::api_client::types::HealthState;
use crate::store::SensorConfigRow;
use crate::types::MacAddr;

pub enum EngineCommand {
    /// Read-only projection of in-memory state for the health endpoint.
    Snapshot { reply: oneshot::Sender<HealthState> },

    /// Replace the configuration cache (and the derived paired-door
    /// blocklist) wholesale. Sent by the periodic refresh job.
    SwapConfigs { configs: Vec<SensorConfigRow> },

    /// Merge gateway last-seen timestamps recovered from recent telemetry
    /// rows. Sent by the reseed job.
    SeedHeartbeats { seen: Vec<(MacAddr, u64)> },

    /// Last known door state per sensor, reloaded from the store once at
    /// startup.
    SeedDoorStates { states: Vec<(MacAddr, bool)> },
}
