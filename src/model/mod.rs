// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Domain entities: reference data, scheduled tasks and shifts

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::geofence::Polygon;

/// Shift identifier
pub type ShiftId = i64;

/// Scheduled task identifier
pub type TaskId = i64;

/// RPM assumed for duration estimates when a task does not plan one
pub const DEFAULT_TASK_RPM: f64 = 1800.0;

/// Machine operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operator {
    pub id: String,
    pub name: String,
}

/// Machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    pub id: String,
    #[serde(default)]
    pub model: Option<String>,
}

/// Task inputs supplied by the scheduler
///
/// Known keys are typed; anything else is preserved verbatim in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskInputs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soil_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terrain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_rpm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature_c: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precipitation_mm: Option<f64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl TaskInputs {
    pub fn rpm_or_default(&self) -> f64 {
        self.average_rpm.unwrap_or(DEFAULT_TASK_RPM)
    }
}

/// Task submitted by the scheduling collaborator, before it has an id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub assigned_date: NaiveDate,
    pub operator_id: String,
    pub machine_id: String,
    pub task_type: String,
    pub load_cycles_planned: u32,
    #[serde(alias = "geofence_points")]
    pub geofence: Polygon,
    #[serde(default)]
    pub task_inputs: TaskInputs,
}

/// Persisted scheduled task, read-only to the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: TaskId,
    pub assigned_date: NaiveDate,
    pub operator_id: String,
    pub machine_id: String,
    pub task_type: String,
    pub load_cycles_planned: u32,
    pub geofence: Polygon,
    pub task_inputs: TaskInputs,
}

/// Shift lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShiftStatus {
    Open,
    Closed,
}

impl ShiftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShiftStatus::Open => "open",
            ShiftStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(ShiftStatus::Open),
            "closed" => Some(ShiftStatus::Closed),
            _ => None,
        }
    }
}

/// Work session binding one operator to one machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shift {
    pub id: ShiftId,
    pub operator_id: String,
    pub machine_id: String,
    pub created_at: DateTime<Utc>,
    pub active_task_id: Option<TaskId>,
    pub status: ShiftStatus,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Shift {
    pub fn is_open(&self) -> bool {
        self.status == ShiftStatus::Open
    }
}
