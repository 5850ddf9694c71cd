//! frostline-engine: cold-chain telemetry processor.
//!
//! Ingests BLE sensor readings relayed by field gateways over the message
//! bus, infers per-sensor operational state (steady refrigeration, defrost
//! cycle, virtual door-open) from a rolling regression over the temperature
//! series, and emits soaked, deduplicated alerts to a downstream webhook
//! while persisting deadband-filtered telemetry and door events to the
//! table store.
//!
//! # Architecture
//!
//! ```text
//! bus ──► engine task ──► telemetry queue ──► store   (drain, 10 s)
//!              │     ├──► door queue      ──► store   (drain, 10 s)
//!              │     └──► alert queue     ──► webhook (drain, 5 min)
//!              ▲
//!   commands ──┘  (config refresh, heartbeat reseed, door bootstrap,
//!                  health snapshots)
//! ```
//!
//! The engine task is the single owner of all per-sensor state; everything
//! that blocks on I/O lives in the drain and refresh tasks.

pub mod alert;
pub mod api;
pub mod api_client;
pub mod bus;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod jobs;
pub mod outbound;
pub mod sensor;
pub mod store;
pub mod thermal;
pub mod tracing;
pub mod types;

pub use config::Config;
