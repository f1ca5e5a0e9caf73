//! Core engine module - orchestrates live status cycles across shifts

mod engine;
mod event_bus;
mod scheduler;

pub use engine::Engine;
pub use event_bus::{EngineEvent, Envelope, EventBus};
pub use scheduler::Poller;

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::detection::AlertEvent;
use crate::model::ShiftId;
use crate::sensors::Snapshot;

/// Result of one live status cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveStatus {
    pub shift_id: ShiftId,
    pub cycle_id: String,
    pub snapshot: Snapshot,
    /// Alerts committed for this cycle, in rule order
    pub alerts: Vec<AlertEvent>,
}

/// Running engine counters
#[derive(Debug, Default)]
pub struct EngineStats {
    cycles: AtomicU64,
    alerts: AtomicU64,
    telemetry_failures: AtomicU64,
    scoring_degraded: AtomicU64,
    persistence_failures: AtomicU64,
}

impl EngineStats {
    pub(crate) fn record_cycle(&self, alerts: usize) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.alerts.fetch_add(alerts as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_telemetry_failure(&self) {
        self.telemetry_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_scoring_degraded(&self) {
        self.scoring_degraded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_persistence_failure(&self) {
        self.persistence_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, uptime_seconds: u64) -> SystemState {
        SystemState {
            cycles: self.cycles.load(Ordering::Relaxed),
            alerts: self.alerts.load(Ordering::Relaxed),
            telemetry_failures: self.telemetry_failures.load(Ordering::Relaxed),
            scoring_degraded: self.scoring_degraded.load(Ordering::Relaxed),
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
            uptime_seconds,
        }
    }
}

/// Point-in-time view of the engine counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemState {
    pub cycles: u64,
    pub alerts: u64,
    pub telemetry_failures: u64,
    pub scoring_degraded: u64,
    pub persistence_failures: u64,
    pub uptime_seconds: u64,
}
