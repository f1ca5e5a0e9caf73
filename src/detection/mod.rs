//! Detection module - alert rules evaluated against machine snapshots

mod proximity;
mod rules;

pub use proximity::{classify_zones, ProximityZone, ZoneReading};
pub use rules::{Evaluation, RuleEvaluator};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::ShiftId;

/// Alert type, in rule declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    ProximityNear,
    HighNoise,
    HighAqi,
    HighEngineTemp,
    GeofenceBreach,
    MachineAnomaly,
}

impl AlertType {
    pub const ALL: [AlertType; 6] = [
        AlertType::ProximityNear,
        AlertType::HighNoise,
        AlertType::HighAqi,
        AlertType::HighEngineTemp,
        AlertType::GeofenceBreach,
        AlertType::MachineAnomaly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::ProximityNear => "PROXIMITY_NEAR",
            AlertType::HighNoise => "HIGH_NOISE",
            AlertType::HighAqi => "HIGH_AQI",
            AlertType::HighEngineTemp => "HIGH_ENGINE_TEMP",
            AlertType::GeofenceBreach => "GEOFENCE_BREACH",
            AlertType::MachineAnomaly => "MACHINE_ANOMALY",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert raised during one evaluation cycle of one shift
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: String,
    pub shift_id: ShiftId,
    pub cycle_id: String,
    pub alert_type: AlertType,
    pub message: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AlertEvent {
    pub fn new(
        shift_id: ShiftId,
        cycle_id: &str,
        alert_type: AlertType,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            shift_id,
            cycle_id: cycle_id.to_string(),
            alert_type,
            message: message.into(),
            details,
            created_at: Utc::now(),
        }
    }
}
