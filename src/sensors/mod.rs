//! Telemetry module - machine snapshots and their sources

mod client;
mod simulator;
mod traits;

pub use client::HttpTelemetryClient;
pub use simulator::SnapshotSimulator;
pub use traits::{
    EngineStatus, EnvironmentReadings, GpsFix, Location, SafetyReadings, Snapshot,
    SnapshotIdentity, TelemetrySource,
};
