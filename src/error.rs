// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Error taxonomy shared by every engine component

use thiserror::Error;

use crate::model::{ShiftId, TaskId};

/// Engine error
#[derive(Debug, Error)]
pub enum Error {
    /// An open shift already exists for the (operator, machine) pair
    #[error("shift {existing} is already open for operator {operator_id} on machine {machine_id}")]
    ShiftAlreadyOpen {
        operator_id: String,
        machine_id: String,
        existing: ShiftId,
    },

    /// The shift exists but has been closed
    #[error("shift {0} is not open")]
    ShiftNotOpen(ShiftId),

    /// The task does not belong to the shift's operator/machine
    #[error("task {task_id} cannot be assigned to shift {shift_id}: {reason}")]
    TaskMismatch {
        shift_id: ShiftId,
        task_id: TaskId,
        reason: String,
    },

    /// No scheduled task with this id
    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    /// No open shift with this id
    #[error("no active shift {0}")]
    NoActiveShift(ShiftId),

    /// Operator or machine is not registered
    #[error("unknown {kind} '{id}'")]
    UnknownReference { kind: &'static str, id: String },

    /// Telemetry source timed out, failed or returned garbage
    #[error("telemetry unavailable for machine {machine_id}: {reason}")]
    TelemetryUnavailable { machine_id: String, reason: String },

    /// Scoring service timed out, failed or returned garbage
    #[error("scoring service unavailable: {0}")]
    ScoringUnavailable(String),

    /// Storage failure; the enclosing transaction was rolled back
    #[error("persistence failure: {0}")]
    Persistence(#[from] rusqlite::Error),

    /// Filesystem failure around the database or config files
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Polygon violates the geofence invariants
    #[error("malformed geofence: {0}")]
    MalformedGeofence(String),

    /// JSON encoding/decoding failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Stable outcome name, used for CLI exit codes and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Error::ShiftAlreadyOpen { .. } => "ShiftAlreadyOpen",
            Error::ShiftNotOpen(_) => "ShiftNotOpen",
            Error::TaskMismatch { .. } => "TaskMismatch",
            Error::TaskNotFound(_) => "TaskNotFound",
            Error::NoActiveShift(_) => "NoActiveShift",
            Error::UnknownReference { .. } => "UnknownReference",
            Error::TelemetryUnavailable { .. } => "TelemetryUnavailable",
            Error::ScoringUnavailable(_) => "ScoringUnavailable",
            Error::Persistence(_) | Error::Serialization(_) | Error::Io(_) => "PersistenceFailure",
            Error::MalformedGeofence(_) => "MalformedGeofence",
        }
    }

    pub(crate) fn telemetry(machine_id: &str, reason: impl ToString) -> Self {
        Error::TelemetryUnavailable {
            machine_id: machine_id.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;
