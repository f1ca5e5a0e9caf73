// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Telemetry traits and snapshot types

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::geofence::GeoPoint;

/// Machine/operator identity reported by the telemetry source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotIdentity {
    pub machine_id: String,
    #[serde(default)]
    pub operator_id: Option<String>,
}

/// Engine status block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    #[serde(default)]
    pub ignition_on: bool,
    #[serde(default)]
    pub is_idling: bool,
    pub engine_hours: f64,
    pub fuel_percent: f64,
    pub engine_temperature_celsius: f64,
    #[serde(default)]
    pub engine_rpm: f64,
    /// Fuel burnt this shift, when the machine reports it directly
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuel_used_litres: Option<f64>,
    /// Minutes spent idling this shift, when reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idling_minutes: Option<f64>,
}

/// Safety block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyReadings {
    #[serde(default)]
    pub seatbelt_buckled: bool,
    /// Distance in metres per sensor position (front_left, rear_right, ...)
    pub proximity_meters: BTreeMap<String, f64>,
}

/// Environmental block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentReadings {
    pub noise_db: f64,
    pub dust_aqi: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub air_quality_ppm: Option<f64>,
}

/// GPS fix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
}

/// Location block
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub gps: GpsFix,
}

/// One synchronous read of a machine's live state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<SnapshotIdentity>,
    pub status: EngineStatus,
    pub safety: SafetyReadings,
    pub environment: EnvironmentReadings,
    pub location: Location,
    #[serde(default = "Utc::now")]
    pub captured_at: DateTime<Utc>,
}

impl Snapshot {
    /// Machine position as (lon, lat)
    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.location.gps.longitude, self.location.gps.latitude)
    }

    /// Closest proximity reading, if any sensor reported
    pub fn closest_object(&self) -> Option<(&str, f64)> {
        self.safety
            .proximity_meters
            .iter()
            .filter(|(_, d)| d.is_finite())
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(k, d)| (k.as_str(), *d))
    }

    /// Machine id reported by the source, if any
    pub fn machine_id(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.machine_id.as_str())
    }
}

/// Source of machine snapshots
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Fetch the current snapshot for a machine.
    ///
    /// Fails with `TelemetryUnavailable`; never substitutes a default reading.
    async fn fetch_snapshot(&self, machine_id: &str) -> Result<Snapshot>;
}
