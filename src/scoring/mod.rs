// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Scoring module - clients for the external analytics models
//!
//! Two contracts are consumed: the machine health classifier (used by the
//! anomaly rule on every cycle) and the task duration estimator (on demand).

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::config::ScoringConfig;
use crate::error::{Error, Result};
use crate::model::ScheduledTask;
use crate::sensors::Snapshot;

/// Insight used when the classifier flags an anomaly without explanation
pub const GENERIC_INSIGHT: &str =
    "General machine health anomaly detected. Recommend a standard systems check.";

/// Machine health classifier request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthRequest {
    #[serde(rename = "RPM")]
    pub rpm: f64,
    #[serde(rename = "Engine_Hours")]
    pub engine_hours: f64,
    #[serde(rename = "Fuel_Used")]
    pub fuel_used: f64,
    #[serde(rename = "Load_Cycles")]
    pub load_cycles: u32,
    #[serde(rename = "Idling_Time")]
    pub idling_time: f64,
    #[serde(rename = "Temperature_C")]
    pub temperature_c: f64,
    #[serde(rename = "Precipitation_mm")]
    pub precipitation_mm: f64,
}

impl HealthRequest {
    /// Build the classifier features from a snapshot and the shift's task.
    ///
    /// Ambient temperature and precipitation come from the task inputs; fuel
    /// used falls back to the gauge drop times the tank capacity.
    pub fn from_snapshot(
        snapshot: &Snapshot,
        task: Option<&ScheduledTask>,
        tank_capacity_litres: f64,
    ) -> Self {
        let status = &snapshot.status;
        let fuel_used = status.fuel_used_litres.unwrap_or_else(|| {
            ((100.0 - status.fuel_percent).clamp(0.0, 100.0) / 100.0) * tank_capacity_litres
        });
        let inputs = task.map(|t| &t.task_inputs);

        Self {
            rpm: status.engine_rpm,
            engine_hours: status.engine_hours,
            fuel_used,
            load_cycles: task.map(|t| t.load_cycles_planned).unwrap_or(0),
            idling_time: status.idling_minutes.unwrap_or(0.0),
            temperature_c: inputs.and_then(|i| i.temperature_c).unwrap_or(0.0),
            precipitation_mm: inputs.and_then(|i| i.precipitation_mm).unwrap_or(0.0),
        }
    }
}

/// Raw classifier response; both known service variants are accepted
#[derive(Debug, Clone, Deserialize)]
struct HealthResponse {
    anomaly_score: f64,
    #[serde(default)]
    is_anomaly: Option<bool>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    actionable_insight: Option<String>,
}

/// Health classification outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthAssessment {
    /// Lower is more anomalous
    pub anomaly_score: f64,
    pub is_anomaly: bool,
    pub actionable_insight: Option<String>,
}

impl HealthAssessment {
    fn from_response(response: HealthResponse, threshold: f64) -> Self {
        let is_anomaly = match (response.is_anomaly, response.status.as_deref()) {
            (Some(flag), _) => flag,
            (None, Some(status)) => status.eq_ignore_ascii_case("anomaly"),
            (None, None) => response.anomaly_score < threshold,
        };
        let insight = response
            .actionable_insight
            .filter(|s| !s.trim().is_empty());

        Self {
            anomaly_score: response.anomaly_score,
            is_anomaly,
            actionable_insight: insight,
        }
    }

    /// Message for a machine anomaly alert
    pub fn insight_or_default(&self) -> &str {
        self.actionable_insight.as_deref().unwrap_or(GENERIC_INSIGHT)
    }
}

/// Task duration estimator request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationRequest {
    #[serde(rename = "Machine_ID")]
    pub machine_id: String,
    #[serde(rename = "Operator_ID")]
    pub operator_id: String,
    #[serde(rename = "RPM")]
    pub rpm: f64,
    #[serde(rename = "Task_Type")]
    pub task_type: String,
    #[serde(rename = "Soil_Type")]
    pub soil_type: Option<String>,
    #[serde(rename = "Terrain")]
    pub terrain: Option<String>,
    #[serde(rename = "Load_Cycles")]
    pub load_cycles: u32,
    #[serde(rename = "Temperature_C")]
    pub temperature_c: Option<f64>,
    #[serde(rename = "Precipitation_mm")]
    pub precipitation_mm: Option<f64>,
}

impl From<&ScheduledTask> for DurationRequest {
    fn from(task: &ScheduledTask) -> Self {
        let inputs = &task.task_inputs;
        Self {
            machine_id: task.machine_id.clone(),
            operator_id: task.operator_id.clone(),
            rpm: inputs.rpm_or_default(),
            task_type: task.task_type.clone(),
            soil_type: inputs.soil_type.clone(),
            terrain: inputs.terrain.clone(),
            load_cycles: task.load_cycles_planned,
            temperature_c: inputs.temperature_c,
            precipitation_mm: inputs.precipitation_mm,
        }
    }
}

/// Task duration estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationEstimate {
    pub predicted_duration_hours: f64,
    #[serde(default)]
    pub readable_duration: Option<String>,
}

impl DurationEstimate {
    /// "H hours and M minutes"
    pub fn readable(&self) -> String {
        self.readable_duration.clone().unwrap_or_else(|| {
            let hours = self.predicted_duration_hours.trunc() as i64;
            let minutes = ((self.predicted_duration_hours * 60.0) % 60.0).trunc() as i64;
            format!("{} hours and {} minutes", hours, minutes)
        })
    }
}

/// Machine health classifier seam
#[async_trait]
pub trait HealthClassifier: Send + Sync {
    async fn classify(&self, request: &HealthRequest) -> Result<HealthAssessment>;
}

/// Task duration estimator seam
#[async_trait]
pub trait DurationEstimator: Send + Sync {
    async fn estimate(&self, request: &DurationRequest) -> Result<DurationEstimate>;
}

/// HTTP client for the analytics service
pub struct ScoringClient {
    http: reqwest::Client,
    config: ScoringConfig,
}

impl ScoringClient {
    pub fn new(config: ScoringConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::ScoringUnavailable(e.to_string()))?;

        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post<Req: Serialize + Sync, Resp: DeserializeOwned>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp> {
        let url = self.url(path);
        debug!(url = %url, "Calling scoring service");

        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::ScoringUnavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::ScoringUnavailable(e.to_string()))?;

        response
            .json()
            .await
            .map_err(|e| Error::ScoringUnavailable(format!("invalid response: {}", e)))
    }
}

#[async_trait]
impl HealthClassifier for ScoringClient {
    async fn classify(&self, request: &HealthRequest) -> Result<HealthAssessment> {
        let response: HealthResponse = self.post(&self.config.health_path, request).await?;
        Ok(HealthAssessment::from_response(response, self.config.anomaly_threshold))
    }
}

#[async_trait]
impl DurationEstimator for ScoringClient {
    async fn estimate(&self, request: &DurationRequest) -> Result<DurationEstimate> {
        self.post(&self.config.duration_path, request).await
    }
}
