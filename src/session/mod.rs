// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Shift sessions
//!
//! Lifecycle of a shift: `login` opens it, `set_active_task` binds the task
//! (and with it the geofence) in force, `close` ends it. State lives in the
//! database and is re-read on every call; the only in-process state is one
//! async lock per shift that serialises status cycles and task changes.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::model::{ScheduledTask, Shift, ShiftId, ShiftStatus, TaskId};

/// Shift together with the task currently in force
#[derive(Debug, Clone)]
pub struct ShiftContext {
    pub shift: Shift,
    pub task: Option<ScheduledTask>,
}

/// Keyed shift session state
pub struct SessionManager {
    db: Arc<Database>,
    locks: Mutex<HashMap<ShiftId, Arc<AsyncMutex<()>>>>,
}

impl SessionManager {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Exclusive access to one shift; other shifts are unaffected.
    ///
    /// The map entry lives only while someone holds or waits for the lock.
    pub async fn lock_shift(&self, shift_id: ShiftId) -> ShiftLock<'_> {
        // Declared first so it drops last, also when the wait is cancelled
        let mut held = ShiftLock {
            manager: self,
            shift_id,
            guard: None,
        };
        let lock = {
            let mut locks = self.locks.lock();
            locks
                .entry(shift_id)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        held.guard = Some(lock.lock_owned().await);
        held
    }

    fn release(&self, shift_id: ShiftId) {
        let mut locks = self.locks.lock();
        if let Some(lock) = locks.get(&shift_id) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(&shift_id);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn lock_entries(&self) -> usize {
        self.locks.lock().len()
    }

    /// Open a shift for an operator on a machine
    pub fn login(&self, operator_id: &str, machine_id: &str) -> Result<Shift> {
        let shift = self.db.open_shift(operator_id, machine_id)?;
        info!(shift_id = shift.id, operator_id, machine_id, "Shift opened");
        Ok(shift)
    }

    /// Bind a scheduled task to an open shift.
    ///
    /// Assigning the task that is already active is a no-op.
    pub async fn set_active_task(&self, shift_id: ShiftId, task_id: TaskId) -> Result<Shift> {
        let _guard = self.lock_shift(shift_id).await;

        let mut shift = self.open_shift(shift_id)?;
        if shift.active_task_id == Some(task_id) {
            return Ok(shift);
        }

        let task = self
            .db
            .get_task(task_id)?
            .ok_or(Error::TaskNotFound(task_id))?;
        check_assignment(&shift, &task)?;

        self.db.set_shift_task(shift_id, task_id)?;
        shift.active_task_id = Some(task_id);
        info!(shift_id, task_id, task_type = %task.task_type, "Active task set");
        Ok(shift)
    }

    /// Close an open shift
    pub async fn close(&self, shift_id: ShiftId) -> Result<Shift> {
        let _guard = self.lock_shift(shift_id).await;

        let mut shift = self.open_shift(shift_id)?;
        let closed_at = self.db.close_shift(shift_id)?;
        shift.status = ShiftStatus::Closed;
        shift.closed_at = Some(closed_at);

        info!(shift_id, "Shift closed");
        Ok(shift)
    }

    /// Shift and active task as stored right now.
    ///
    /// Fails with `NoActiveShift` unless the shift exists and is open.
    pub fn active_context(&self, shift_id: ShiftId) -> Result<ShiftContext> {
        let shift = self
            .db
            .get_shift(shift_id)?
            .filter(Shift::is_open)
            .ok_or(Error::NoActiveShift(shift_id))?;

        let task = match shift.active_task_id {
            Some(task_id) => {
                let task = self
                    .db
                    .get_task(task_id)?
                    .ok_or(Error::TaskNotFound(task_id))?;
                check_assignment(&shift, &task)?;
                Some(task)
            }
            None => None,
        };

        debug!(shift_id, task_id = ?shift.active_task_id, "Resolved shift context");
        Ok(ShiftContext { shift, task })
    }

    pub fn shift(&self, shift_id: ShiftId) -> Result<Option<Shift>> {
        self.db.get_shift(shift_id)
    }

    pub fn open_shifts(&self) -> Result<Vec<Shift>> {
        self.db.list_open_shifts()
    }

    fn open_shift(&self, shift_id: ShiftId) -> Result<Shift> {
        let shift = self
            .db
            .get_shift(shift_id)?
            .ok_or(Error::NoActiveShift(shift_id))?;
        if !shift.is_open() {
            return Err(Error::ShiftNotOpen(shift_id));
        }
        Ok(shift)
    }
}

/// Held lock on one shift, released from the map on drop
pub struct ShiftLock<'a> {
    manager: &'a SessionManager,
    shift_id: ShiftId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ShiftLock<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.manager.release(self.shift_id);
    }
}

fn check_assignment(shift: &Shift, task: &ScheduledTask) -> Result<()> {
    let reason = if task.machine_id != shift.machine_id {
        format!(
            "task is for machine {}, shift is on {}",
            task.machine_id, shift.machine_id
        )
    } else if task.operator_id != shift.operator_id {
        format!(
            "task is for operator {}, shift belongs to {}",
            task.operator_id, shift.operator_id
        )
    } else {
        return Ok(());
    };

    Err(Error::TaskMismatch {
        shift_id: shift.id,
        task_id: task.id,
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Machine, NewTask, Operator};
    use std::time::Duration;

    fn manager() -> SessionManager {
        let db = Database::open_in_memory().unwrap();
        db.register_operator(&Operator {
            id: "OP1002".to_string(),
            name: "Asha".to_string(),
        })
        .unwrap();
        for id in ["EXC001", "DOZ042"] {
            db.register_machine(&Machine {
                id: id.to_string(),
                model: None,
            })
            .unwrap();
        }
        SessionManager::new(Arc::new(db))
    }

    fn schedule(manager: &SessionManager, machine_id: &str) -> TaskId {
        let task: NewTask = serde_json::from_value(serde_json::json!({
            "assigned_date": "2025-09-14",
            "operator_id": "OP1002",
            "machine_id": machine_id,
            "task_type": "Excavation",
            "load_cycles_planned": 40,
            "geofence": [[0, 0], [0, 10], [10, 10], [10, 0]]
        }))
        .unwrap();
        manager.db.insert_tasks(&[task]).unwrap()[0]
    }

    #[tokio::test]
    async fn test_second_login_rejected() {
        let manager = manager();
        let shift = manager.login("OP1002", "EXC001").unwrap();
        assert_eq!(shift.status, ShiftStatus::Open);
        assert!(shift.active_task_id.is_none());

        let err = manager.login("OP1002", "EXC001").unwrap_err();
        assert_eq!(err.kind(), "ShiftAlreadyOpen");
    }

    #[tokio::test]
    async fn test_set_active_task_is_idempotent() {
        let manager = manager();
        let shift = manager.login("OP1002", "EXC001").unwrap();
        let task_id = schedule(&manager, "EXC001");

        let first = manager.set_active_task(shift.id, task_id).await.unwrap();
        let second = manager.set_active_task(shift.id, task_id).await.unwrap();
        assert_eq!(first.active_task_id, Some(task_id));
        assert_eq!(second.active_task_id, Some(task_id));

        let context = manager.active_context(shift.id).unwrap();
        assert_eq!(context.task.map(|t| t.id), Some(task_id));
    }

    #[tokio::test]
    async fn test_foreign_task_leaves_shift_unchanged() {
        let manager = manager();
        let shift = manager.login("OP1002", "EXC001").unwrap();
        let own = schedule(&manager, "EXC001");
        let foreign = schedule(&manager, "DOZ042");
        manager.set_active_task(shift.id, own).await.unwrap();

        let err = manager.set_active_task(shift.id, foreign).await.unwrap_err();
        assert!(matches!(err, Error::TaskMismatch { task_id, .. } if task_id == foreign));

        let stored = manager.shift(shift.id).unwrap().unwrap();
        assert_eq!(stored.active_task_id, Some(own));
    }

    #[tokio::test]
    async fn test_unknown_task_and_shift() {
        let manager = manager();
        let shift = manager.login("OP1002", "EXC001").unwrap();

        let err = manager.set_active_task(shift.id, 77).await.unwrap_err();
        assert!(matches!(err, Error::TaskNotFound(77)));

        let err = manager.set_active_task(999, 1).await.unwrap_err();
        assert!(matches!(err, Error::NoActiveShift(999)));
        assert!(matches!(manager.active_context(999), Err(Error::NoActiveShift(999))));
    }

    #[tokio::test]
    async fn test_close_lifecycle() {
        let manager = manager();
        let shift = manager.login("OP1002", "EXC001").unwrap();
        let task_id = schedule(&manager, "EXC001");

        let closed = manager.close(shift.id).await.unwrap();
        assert_eq!(closed.status, ShiftStatus::Closed);
        assert!(closed.closed_at.is_some());

        assert!(matches!(manager.close(shift.id).await, Err(Error::ShiftNotOpen(_))));
        assert!(matches!(
            manager.set_active_task(shift.id, task_id).await,
            Err(Error::ShiftNotOpen(_))
        ));
        assert!(matches!(manager.active_context(shift.id), Err(Error::NoActiveShift(_))));
        assert!(manager.open_shifts().unwrap().is_empty());

        // The pair may log in again
        manager.login("OP1002", "EXC001").unwrap();
    }

    #[tokio::test]
    async fn test_shift_lock_is_per_shift() {
        let manager = manager();
        let a = manager.login("OP1002", "EXC001").unwrap();
        let b = manager.login("OP1002", "DOZ042").unwrap();

        let held = manager.lock_shift(a.id).await;

        // Another shift is not blocked
        tokio::time::timeout(Duration::from_millis(100), manager.lock_shift(b.id))
            .await
            .unwrap();

        // The same shift is
        let same = tokio::time::timeout(Duration::from_millis(50), manager.lock_shift(a.id)).await;
        assert!(same.is_err());

        // A cancelled wait leaves only the held entry behind
        assert_eq!(manager.lock_entries(), 1);
        drop(held);
        assert_eq!(manager.lock_entries(), 0);
    }

    #[tokio::test]
    async fn test_lock_map_empty_after_calls() {
        let manager = manager();
        let shift = manager.login("OP1002", "EXC001").unwrap();
        let task_id = schedule(&manager, "EXC001");

        for unknown in 1000..1500 {
            assert!(manager.set_active_task(unknown, task_id).await.is_err());
            assert!(manager.close(unknown).await.is_err());
        }
        assert_eq!(manager.lock_entries(), 0);

        manager.set_active_task(shift.id, task_id).await.unwrap();
        manager.close(shift.id).await.unwrap();
        assert!(manager.close(shift.id).await.is_err());
        assert!(manager.set_active_task(shift.id, task_id).await.is_err());
        assert_eq!(manager.lock_entries(), 0);
    }
}
