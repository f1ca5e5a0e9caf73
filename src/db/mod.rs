// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Database module - shifts, scheduled tasks and the append-only event log

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::detection::{AlertEvent, AlertType};
use crate::error::{Error, Result};
use crate::geofence::{GeoPoint, Polygon};
use crate::model::{
    Machine, NewTask, Operator, ScheduledTask, Shift, ShiftId, ShiftStatus, TaskId, TaskInputs,
};

const SCHEMA: &str = r#"
    -- Reference data
    CREATE TABLE IF NOT EXISTS operators (
        operator_id TEXT PRIMARY KEY,
        name TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS machines (
        machine_id TEXT PRIMARY KEY,
        model TEXT
    );

    -- Tasks produced by the scheduler
    CREATE TABLE IF NOT EXISTS scheduled_tasks (
        task_id INTEGER PRIMARY KEY AUTOINCREMENT,
        assigned_date TEXT NOT NULL,
        operator_id TEXT NOT NULL REFERENCES operators(operator_id),
        machine_id TEXT NOT NULL REFERENCES machines(machine_id),
        task_type TEXT NOT NULL,
        load_cycles_planned INTEGER NOT NULL,
        geofence_polygon TEXT NOT NULL,
        task_inputs_json TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_tasks_assignee ON scheduled_tasks(operator_id, machine_id);

    -- Work shifts
    CREATE TABLE IF NOT EXISTS shifts (
        shift_id INTEGER PRIMARY KEY AUTOINCREMENT,
        operator_id TEXT NOT NULL REFERENCES operators(operator_id),
        machine_id TEXT NOT NULL REFERENCES machines(machine_id),
        active_task_id INTEGER REFERENCES scheduled_tasks(task_id),
        status TEXT NOT NULL DEFAULT 'open' CHECK (status IN ('open', 'closed')),
        created_at TEXT NOT NULL,
        closed_at TEXT
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_shifts_one_open
        ON shifts(operator_id, machine_id) WHERE status = 'open';

    -- Alert events, insert-only
    CREATE TABLE IF NOT EXISTS events (
        event_id TEXT PRIMARY KEY,
        shift_id INTEGER NOT NULL REFERENCES shifts(shift_id),
        cycle_id TEXT NOT NULL,
        event_type TEXT NOT NULL,
        message TEXT NOT NULL,
        details_json TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_events_shift ON events(shift_id);
    CREATE INDEX IF NOT EXISTS idx_events_type ON events(event_type);
"#;

const SHIFT_COLUMNS: &str =
    "shift_id, operator_id, machine_id, active_task_id, status, created_at, closed_at";

/// Database manager
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&config.path)?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        "#,
        )?;

        let db = Self::init(conn)?;
        info!("Database opened at {:?}", config.path);
        Ok(db)
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.lock().execute_batch(sql)?;
        Ok(())
    }

    /// Register an operator; re-registering the same id is a no-op
    pub fn register_operator(&self, operator: &Operator) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO operators (operator_id, name) VALUES (?1, ?2) ON CONFLICT DO NOTHING",
            params![operator.id, operator.name],
        )?;
        Ok(())
    }

    /// Register a machine; re-registering the same id is a no-op
    pub fn register_machine(&self, machine: &Machine) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO machines (machine_id, model) VALUES (?1, ?2) ON CONFLICT DO NOTHING",
            params![machine.id, machine.model],
        )?;
        Ok(())
    }

    /// Persist scheduled tasks in one transaction
    pub fn insert_tasks(&self, tasks: &[NewTask]) -> Result<Vec<TaskId>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut ids = Vec::with_capacity(tasks.len());

        for task in tasks {
            ensure_reference(&tx, &task.operator_id, &task.machine_id)?;

            let polygon = serde_json::to_string(&task.geofence)?;
            let inputs = serde_json::to_string(&task.task_inputs)?;
            tx.execute(
                r#"INSERT INTO scheduled_tasks
                   (assigned_date, operator_id, machine_id, task_type, load_cycles_planned,
                    geofence_polygon, task_inputs_json)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
                params![
                    task.assigned_date.to_string(),
                    task.operator_id,
                    task.machine_id,
                    task.task_type,
                    task.load_cycles_planned,
                    polygon,
                    inputs
                ],
            )?;
            ids.push(tx.last_insert_rowid());
        }

        tx.commit()?;
        debug!("Stored {} scheduled tasks", ids.len());
        Ok(ids)
    }

    /// Fetch a scheduled task
    pub fn get_task(&self, task_id: TaskId) -> Result<Option<ScheduledTask>> {
        let conn = self.conn.lock();

        let row = conn
            .query_row(
                r#"SELECT task_id, assigned_date, operator_id, machine_id, task_type,
                          load_cycles_planned, geofence_polygon, task_inputs_json
                   FROM scheduled_tasks WHERE task_id = ?1"#,
                params![task_id],
                |row| {
                    Ok(TaskRow {
                        id: row.get(0)?,
                        assigned_date: row.get(1)?,
                        operator_id: row.get(2)?,
                        machine_id: row.get(3)?,
                        task_type: row.get(4)?,
                        load_cycles_planned: row.get(5)?,
                        geofence: row.get(6)?,
                        inputs: row.get(7)?,
                    })
                },
            )
            .optional()?;

        row.map(TaskRow::into_task).transpose()
    }

    /// Open a shift unless the pair already has one open
    pub fn open_shift(&self, operator_id: &str, machine_id: &str) -> Result<Shift> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        ensure_reference(&tx, operator_id, machine_id)?;

        let existing: Option<ShiftId> = tx
            .query_row(
                "SELECT shift_id FROM shifts WHERE operator_id = ?1 AND machine_id = ?2 AND status = 'open'",
                params![operator_id, machine_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(existing) = existing {
            return Err(Error::ShiftAlreadyOpen {
                operator_id: operator_id.to_string(),
                machine_id: machine_id.to_string(),
                existing,
            });
        }

        let created_at = Utc::now();
        tx.execute(
            "INSERT INTO shifts (operator_id, machine_id, status, created_at) VALUES (?1, ?2, 'open', ?3)",
            params![operator_id, machine_id, created_at.to_rfc3339()],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(Shift {
            id,
            operator_id: operator_id.to_string(),
            machine_id: machine_id.to_string(),
            created_at,
            active_task_id: None,
            status: ShiftStatus::Open,
            closed_at: None,
        })
    }

    /// Fetch a shift in any status
    pub fn get_shift(&self, shift_id: ShiftId) -> Result<Option<Shift>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {} FROM shifts WHERE shift_id = ?1", SHIFT_COLUMNS);
        Ok(conn.query_row(&sql, params![shift_id], shift_from_row).optional()?)
    }

    /// All open shifts, oldest first
    pub fn list_open_shifts(&self) -> Result<Vec<Shift>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM shifts WHERE status = 'open' ORDER BY shift_id",
            SHIFT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], shift_from_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Point an open shift at a task
    pub fn set_shift_task(&self, shift_id: ShiftId, task_id: TaskId) -> Result<()> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE shifts SET active_task_id = ?1 WHERE shift_id = ?2 AND status = 'open'",
            params![task_id, shift_id],
        )?;
        if updated == 0 {
            return Err(Error::ShiftNotOpen(shift_id));
        }
        Ok(())
    }

    /// Close an open shift
    pub fn close_shift(&self, shift_id: ShiftId) -> Result<DateTime<Utc>> {
        let conn = self.conn.lock();
        let closed_at = Utc::now();
        let updated = conn.execute(
            "UPDATE shifts SET status = 'closed', closed_at = ?1 WHERE shift_id = ?2 AND status = 'open'",
            params![closed_at.to_rfc3339(), shift_id],
        )?;
        if updated == 0 {
            return Err(Error::ShiftNotOpen(shift_id));
        }
        Ok(closed_at)
    }

    /// Append one cycle's alerts atomically.
    ///
    /// The shift must exist and be open when the batch is written; on any
    /// failure nothing from the batch is kept.
    pub fn append_alerts(&self, shift_id: ShiftId, alerts: &[AlertEvent]) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let status: Option<String> = tx
            .query_row(
                "SELECT status FROM shifts WHERE shift_id = ?1",
                params![shift_id],
                |row| row.get(0),
            )
            .optional()?;
        match status.as_deref().and_then(ShiftStatus::parse) {
            Some(ShiftStatus::Open) => {}
            Some(ShiftStatus::Closed) => return Err(Error::ShiftNotOpen(shift_id)),
            None => return Err(Error::NoActiveShift(shift_id)),
        }

        for alert in alerts {
            if alert.shift_id != shift_id {
                return Err(Error::NoActiveShift(alert.shift_id));
            }
            tx.execute(
                r#"INSERT INTO events
                   (event_id, shift_id, cycle_id, event_type, message, details_json, created_at)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
                params![
                    alert.id,
                    alert.shift_id,
                    alert.cycle_id,
                    alert.alert_type.as_str(),
                    alert.message,
                    serde_json::to_string(&alert.details)?,
                    alert.created_at.to_rfc3339()
                ],
            )?;
        }

        tx.commit()?;
        Ok(alerts.len())
    }

    /// A shift's events in append order
    pub fn events_for_shift(&self, shift_id: ShiftId) -> Result<Vec<AlertEvent>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"SELECT event_id, shift_id, cycle_id, event_type, message, details_json, created_at
               FROM events WHERE shift_id = ?1 ORDER BY rowid"#,
        )?;

        let rows = stmt.query_map(params![shift_id], |row| {
            let event_type: String = row.get(3)?;
            let alert_type = AlertType::parse(&event_type).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    3,
                    Type::Text,
                    format!("unknown event type {}", event_type).into(),
                )
            })?;
            let details: String = row.get(5)?;
            let details = serde_json::from_str(&details).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e))
            })?;

            Ok(AlertEvent {
                id: row.get(0)?,
                shift_id: row.get(1)?,
                cycle_id: row.get(2)?,
                alert_type,
                message: row.get(4)?,
                details,
                created_at: parse_timestamp(row.get(6)?, 6)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Alert counts per registered operator, busiest first
    pub fn operator_summary(&self) -> Result<Vec<OperatorSummary>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"SELECT
                   op.operator_id,
                   op.name,
                   COUNT(DISTINCT ws.shift_id) AS shifts,
                   COUNT(ev.event_id) AS total_alerts,
                   COALESCE(SUM(CASE WHEN ev.event_type = 'PROXIMITY_NEAR' THEN 1 ELSE 0 END), 0),
                   COALESCE(SUM(CASE WHEN ev.event_type = 'GEOFENCE_BREACH' THEN 1 ELSE 0 END), 0)
               FROM operators op
               LEFT JOIN shifts ws ON op.operator_id = ws.operator_id
               LEFT JOIN events ev ON ws.shift_id = ev.shift_id
               GROUP BY op.operator_id, op.name
               ORDER BY total_alerts DESC, op.operator_id ASC"#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(OperatorSummary {
                operator_id: row.get(0)?,
                name: row.get(1)?,
                shifts: row.get(2)?,
                total_alerts: row.get(3)?,
                proximity_alerts: row.get(4)?,
                geofence_breaches: row.get(5)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Get database statistics
    pub fn get_stats(&self) -> Result<DatabaseStats> {
        let conn = self.conn.lock();

        let count = |table: &str| -> Result<u64> {
            let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })?;
            Ok(n as u64)
        };

        Ok(DatabaseStats {
            task_count: count("scheduled_tasks")?,
            shift_count: count("shifts")?,
            open_shift_count: conn.query_row(
                "SELECT COUNT(*) FROM shifts WHERE status = 'open'",
                [],
                |row| row.get::<_, i64>(0),
            )? as u64,
            event_count: count("events")?,
        })
    }
}

fn ensure_reference(tx: &Transaction<'_>, operator_id: &str, machine_id: &str) -> Result<()> {
    let operator: Option<String> = tx
        .query_row(
            "SELECT operator_id FROM operators WHERE operator_id = ?1",
            params![operator_id],
            |row| row.get(0),
        )
        .optional()?;
    if operator.is_none() {
        return Err(Error::UnknownReference {
            kind: "operator",
            id: operator_id.to_string(),
        });
    }

    let machine: Option<String> = tx
        .query_row(
            "SELECT machine_id FROM machines WHERE machine_id = ?1",
            params![machine_id],
            |row| row.get(0),
        )
        .optional()?;
    if machine.is_none() {
        return Err(Error::UnknownReference {
            kind: "machine",
            id: machine_id.to_string(),
        });
    }

    Ok(())
}

fn parse_timestamp(raw: String, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}

fn shift_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Shift> {
    let status: String = row.get(4)?;
    let status = ShiftStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            Type::Text,
            format!("unknown shift status {}", status).into(),
        )
    })?;
    let closed_at: Option<String> = row.get(6)?;

    Ok(Shift {
        id: row.get(0)?,
        operator_id: row.get(1)?,
        machine_id: row.get(2)?,
        active_task_id: row.get(3)?,
        status,
        created_at: parse_timestamp(row.get(5)?, 5)?,
        closed_at: closed_at.map(|raw| parse_timestamp(raw, 6)).transpose()?,
    })
}

/// Raw task columns before geometry validation
struct TaskRow {
    id: TaskId,
    assigned_date: String,
    operator_id: String,
    machine_id: String,
    task_type: String,
    load_cycles_planned: u32,
    geofence: String,
    inputs: String,
}

impl TaskRow {
    fn into_task(self) -> Result<ScheduledTask> {
        let vertices: Vec<GeoPoint> = serde_json::from_str(&self.geofence)
            .map_err(|e| Error::MalformedGeofence(format!("task {}: {}", self.id, e)))?;
        let geofence = Polygon::new(vertices)?;
        let task_inputs: TaskInputs = serde_json::from_str(&self.inputs)?;
        let assigned_date = NaiveDate::parse_from_str(&self.assigned_date, "%Y-%m-%d").map_err(|e| {
            Error::Persistence(rusqlite::Error::FromSqlConversionFailure(
                1,
                Type::Text,
                Box::new(e),
            ))
        })?;

        Ok(ScheduledTask {
            id: self.id,
            assigned_date,
            operator_id: self.operator_id,
            machine_id: self.machine_id,
            task_type: self.task_type,
            load_cycles_planned: self.load_cycles_planned,
            geofence,
            task_inputs,
        })
    }
}

/// Per-operator alert summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorSummary {
    pub operator_id: String,
    pub name: String,
    pub shifts: i64,
    pub total_alerts: i64,
    pub proximity_alerts: i64,
    pub geofence_breaches: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseStats {
    pub task_count: u64,
    pub shift_count: u64,
    pub open_shift_count: u64,
    pub event_count: u64,
}
