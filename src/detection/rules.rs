// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Alert rule evaluation
//!
//! Rules are independent and each yields at most one alert per cycle. Output
//! follows declaration order: proximity, noise, air quality, engine
//! temperature, geofence, machine anomaly. Limits are strict (`<` for
//! proximity, `>` for the others).

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, warn};

use super::{classify_zones, AlertEvent, AlertType};
use crate::config::AlertThresholds;
use crate::error::{Error, Result};
use crate::geofence::Containment;
use crate::model::{ScheduledTask, Shift};
use crate::scoring::{HealthClassifier, HealthRequest};
use crate::sensors::Snapshot;

/// Outcome of one evaluation cycle
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    /// Alerts in rule declaration order
    pub alerts: Vec<AlertEvent>,
    /// Why the anomaly rule was skipped, when the classifier could not answer
    pub scoring_degraded: Option<String>,
}

/// Applies the alert rule set to a snapshot
pub struct RuleEvaluator {
    thresholds: AlertThresholds,
    classifier: Option<Arc<dyn HealthClassifier>>,
    scoring_timeout: Duration,
    tank_capacity_litres: f64,
}

impl RuleEvaluator {
    /// Evaluator without an anomaly classifier
    pub fn new(thresholds: AlertThresholds) -> Self {
        Self {
            thresholds,
            classifier: None,
            scoring_timeout: Duration::from_secs(3),
            tank_capacity_litres: 400.0,
        }
    }

    pub fn with_classifier(
        mut self,
        classifier: Arc<dyn HealthClassifier>,
        timeout: Duration,
        tank_capacity_litres: f64,
    ) -> Self {
        self.classifier = Some(classifier);
        self.scoring_timeout = timeout;
        self.tank_capacity_litres = tank_capacity_litres;
        self
    }

    pub fn thresholds(&self) -> &AlertThresholds {
        &self.thresholds
    }

    /// Run every rule for one cycle.
    ///
    /// A classifier failure only disables the anomaly rule. `task` must be the
    /// shift's active task.
    pub async fn evaluate(
        &self,
        shift: &Shift,
        task: Option<&ScheduledTask>,
        snapshot: &Snapshot,
        cycle_id: &str,
    ) -> Result<Evaluation> {
        if let Some(task) = task {
            if task.machine_id != shift.machine_id || task.operator_id != shift.operator_id {
                return Err(Error::TaskMismatch {
                    shift_id: shift.id,
                    task_id: task.id,
                    reason: "active task does not belong to the shift".to_string(),
                });
            }
        }

        let mut evaluation = Evaluation::default();
        let mut raise = |alert_type: AlertType, message: &str, details: serde_json::Value| {
            evaluation
                .alerts
                .push(AlertEvent::new(shift.id, cycle_id, alert_type, message, details));
        };

        if let Some(details) = self.check_proximity(snapshot) {
            raise(AlertType::ProximityNear, "Proximity Breach! Object too close.", details);
        }

        let noise = snapshot.environment.noise_db;
        if noise > self.thresholds.noise_db {
            raise(
                AlertType::HighNoise,
                "Noise levels exceed safety threshold.",
                json!({"noise_db": noise, "threshold_db": self.thresholds.noise_db}),
            );
        }

        let aqi = snapshot.environment.dust_aqi;
        if aqi > self.thresholds.dust_aqi {
            raise(
                AlertType::HighAqi,
                "Dust levels exceed air quality threshold.",
                json!({"dust_aqi": aqi, "threshold": self.thresholds.dust_aqi}),
            );
        }

        let temp = snapshot.status.engine_temperature_celsius;
        if temp > self.thresholds.engine_temp_c {
            raise(
                AlertType::HighEngineTemp,
                "Engine temperature exceeds safe operating limit.",
                json!({"engine_temperature_c": temp, "threshold_c": self.thresholds.engine_temp_c}),
            );
        }

        if let Some(task) = task {
            let position = snapshot.position();
            if task.geofence.contains(position) == Containment::Outside {
                raise(
                    AlertType::GeofenceBreach,
                    "Machine is outside designated work area.",
                    json!({
                        "task_id": task.id,
                        "longitude": position.lon,
                        "latitude": position.lat,
                    }),
                );
            }
        }

        let mut degraded = None;
        match self.check_health(snapshot, task).await {
            Ok(Some((message, details))) => raise(AlertType::MachineAnomaly, &message, details),
            Ok(None) => {}
            Err(e) => {
                warn!(shift_id = shift.id, error = %e, "Anomaly rule skipped");
                degraded = Some(e.to_string());
            }
        }
        evaluation.scoring_degraded = degraded;

        debug!(
            shift_id = shift.id,
            cycle_id,
            alerts = evaluation.alerts.len(),
            "Rules evaluated"
        );
        Ok(evaluation)
    }

    fn check_proximity(&self, snapshot: &Snapshot) -> Option<serde_json::Value> {
        let near = self.thresholds.proximity_near_m;
        let breaching: Vec<&str> = snapshot
            .safety
            .proximity_meters
            .iter()
            .filter(|(_, d)| **d < near)
            .map(|(sensor, _)| sensor.as_str())
            .collect();

        if breaching.is_empty() {
            return None;
        }

        let (closest, distance) = snapshot.closest_object()?;
        Some(json!({
            "closest_sensor": closest,
            "distance_m": distance,
            "threshold_m": near,
            "breaching_sensors": breaching,
            "zones": classify_zones(&snapshot.safety.proximity_meters, &self.thresholds),
        }))
    }

    async fn check_health(
        &self,
        snapshot: &Snapshot,
        task: Option<&ScheduledTask>,
    ) -> Result<Option<(String, serde_json::Value)>> {
        let Some(classifier) = &self.classifier else {
            return Ok(None);
        };

        let request = HealthRequest::from_snapshot(snapshot, task, self.tank_capacity_litres);
        let assessment = tokio::time::timeout(self.scoring_timeout, classifier.classify(&request))
            .await
            .map_err(|_| {
                Error::ScoringUnavailable(format!(
                    "no answer within {} ms",
                    self.scoring_timeout.as_millis()
                ))
            })??;

        if !assessment.is_anomaly {
            return Ok(None);
        }

        Ok(Some((
            assessment.insight_or_default().to_string(),
            json!({"anomaly_score": assessment.anomaly_score, "features": request}),
        )))
    }
}
