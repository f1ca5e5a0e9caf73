// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Main alerting engine

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{EngineEvent, EngineStats, EventBus, LiveStatus, SystemState};
use crate::config::Config;
use crate::db::{Database, DatabaseStats, OperatorSummary};
use crate::detection::{AlertEvent, RuleEvaluator};
use crate::error::{Error, Result};
use crate::model::{Machine, NewTask, Operator, Shift, ShiftId, TaskId};
use crate::scoring::{
    DurationEstimate, DurationEstimator, DurationRequest, HealthClassifier, ScoringClient,
};
use crate::sensors::{HttpTelemetryClient, Snapshot, SnapshotSimulator, TelemetrySource};
use crate::session::SessionManager;

/// Shift and telemetry alerting engine
pub struct Engine {
    pub config: Arc<Config>,
    db: Arc<Database>,
    sessions: Arc<SessionManager>,
    telemetry: Arc<dyn TelemetrySource>,
    evaluator: RuleEvaluator,
    estimator: Option<Arc<dyn DurationEstimator>>,
    event_bus: Arc<EventBus>,
    stats: EngineStats,
    start_time: Instant,
}

impl Engine {
    /// Engine over explicit collaborators, without scoring services
    pub fn new(config: Config, db: Arc<Database>, telemetry: Arc<dyn TelemetrySource>) -> Self {
        let event_bus = Arc::new(EventBus::new(config.polling.event_bus_capacity));
        let evaluator = RuleEvaluator::new(config.thresholds.clone());

        Self {
            config: Arc::new(config),
            sessions: Arc::new(SessionManager::new(db.clone())),
            db,
            telemetry,
            evaluator,
            estimator: None,
            event_bus,
            stats: EngineStats::default(),
            start_time: Instant::now(),
        }
    }

    /// Attach the health classifier and duration estimator
    pub fn with_scoring(
        mut self,
        classifier: Arc<dyn HealthClassifier>,
        estimator: Arc<dyn DurationEstimator>,
    ) -> Self {
        let scoring = &self.config.scoring;
        self.evaluator = RuleEvaluator::new(self.config.thresholds.clone()).with_classifier(
            classifier,
            scoring.timeout(),
            scoring.tank_capacity_litres,
        );
        self.estimator = Some(estimator);
        self
    }

    /// Build the engine and its collaborators from configuration
    pub fn from_config(config: Config) -> Result<Self> {
        let db = Arc::new(Database::open(&config.resolved_database())?);

        let telemetry: Arc<dyn TelemetrySource> = if config.demo_mode {
            info!("Demo mode: serving simulated snapshots");
            Arc::new(SnapshotSimulator::from_config(&config.simulator)?)
        } else {
            Arc::new(HttpTelemetryClient::new(&config.telemetry)?)
        };

        let scoring = if config.scoring.enabled {
            Some(Arc::new(ScoringClient::new(config.scoring.clone())?))
        } else {
            info!("Scoring disabled; anomaly rule and duration estimates unavailable");
            None
        };

        let engine = Self::new(config, db, telemetry);
        Ok(match scoring {
            Some(client) => engine.with_scoring(client.clone(), client),
            None => engine,
        })
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn state(&self) -> SystemState {
        self.stats.snapshot(self.uptime())
    }

    pub fn uptime(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn register_operator(&self, operator: &Operator) -> Result<()> {
        self.db.register_operator(operator)
    }

    pub fn register_machine(&self, machine: &Machine) -> Result<()> {
        self.db.register_machine(machine)
    }

    /// Persist tasks handed over by the scheduler
    pub fn schedule_tasks(&self, tasks: &[NewTask]) -> Result<Vec<TaskId>> {
        let ids = self.db.insert_tasks(tasks)?;
        info!(count = ids.len(), "Tasks scheduled");
        Ok(ids)
    }

    pub fn login(&self, operator_id: &str, machine_id: &str) -> Result<Shift> {
        let shift = self.sessions.login(operator_id, machine_id)?;
        self.event_bus.publish(EngineEvent::ShiftOpened {
            shift_id: shift.id,
            operator_id: shift.operator_id.clone(),
            machine_id: shift.machine_id.clone(),
        });
        Ok(shift)
    }

    pub async fn set_active_task(&self, shift_id: ShiftId, task_id: TaskId) -> Result<Shift> {
        self.sessions.set_active_task(shift_id, task_id).await
    }

    pub async fn close_shift(&self, shift_id: ShiftId) -> Result<Shift> {
        let shift = self.sessions.close(shift_id).await?;
        self.event_bus
            .publish(EngineEvent::ShiftClosed { shift_id: shift.id });
        Ok(shift)
    }

    /// Run one status cycle for a shift.
    ///
    /// Fetches the bound machine's snapshot, evaluates every rule and commits
    /// the cycle's alerts as one batch before returning them. Nothing is
    /// written when the snapshot cannot be fetched or the commit fails.
    pub async fn live_status(&self, shift_id: ShiftId) -> Result<LiveStatus> {
        let _guard = self.sessions.lock_shift(shift_id).await;
        let context = self.sessions.active_context(shift_id)?;
        let cycle_id = Uuid::new_v4().to_string();

        let snapshot = match self.fetch_snapshot(&context.shift.machine_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.stats.record_telemetry_failure();
                warn!(shift_id, machine_id = %context.shift.machine_id, "Telemetry unavailable: {}", e);
                self.event_bus.publish(EngineEvent::TelemetryUnavailable {
                    shift_id,
                    machine_id: context.shift.machine_id.clone(),
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        let evaluation = self
            .evaluator
            .evaluate(&context.shift, context.task.as_ref(), &snapshot, &cycle_id)
            .await?;

        if let Some(reason) = evaluation.scoring_degraded {
            self.stats.record_scoring_degraded();
            self.event_bus
                .publish(EngineEvent::ScoringDegraded { shift_id, reason });
        }

        let alerts: Vec<AlertEvent> = evaluation.alerts;
        if let Err(e) = self.db.append_alerts(shift_id, &alerts) {
            self.stats.record_persistence_failure();
            warn!(shift_id, cycle_id = %cycle_id, "Alert batch not stored: {}", e);
            return Err(e);
        }

        self.stats.record_cycle(alerts.len());
        self.event_bus.publish_alerts(&alerts);
        debug!(shift_id, cycle_id = %cycle_id, alerts = alerts.len(), "Status cycle complete");

        Ok(LiveStatus {
            shift_id,
            cycle_id,
            snapshot,
            alerts,
        })
    }

    /// Ask the duration estimator how long a scheduled task will take
    pub async fn estimate_task_duration(&self, task_id: TaskId) -> Result<DurationEstimate> {
        let estimator = self.estimator.as_ref().ok_or_else(|| {
            Error::ScoringUnavailable("duration estimator not configured".to_string())
        })?;
        let task = self
            .db
            .get_task(task_id)?
            .ok_or(Error::TaskNotFound(task_id))?;

        let request = DurationRequest::from(&task);
        let timeout = self.config.scoring.timeout();
        tokio::time::timeout(timeout, estimator.estimate(&request))
            .await
            .map_err(|_| {
                Error::ScoringUnavailable(format!("no answer within {} ms", timeout.as_millis()))
            })?
    }

    pub fn events_for_shift(&self, shift_id: ShiftId) -> Result<Vec<AlertEvent>> {
        self.db.events_for_shift(shift_id)
    }

    pub fn operator_summary(&self) -> Result<Vec<OperatorSummary>> {
        self.db.operator_summary()
    }

    pub fn stats(&self) -> Result<DatabaseStats> {
        self.db.get_stats()
    }

    async fn fetch_snapshot(&self, machine_id: &str) -> Result<Snapshot> {
        let timeout = self.config.telemetry.timeout();
        let snapshot = tokio::time::timeout(timeout, self.telemetry.fetch_snapshot(machine_id))
            .await
            .map_err(|_| {
                Error::telemetry(
                    machine_id,
                    format!(
                        "{} gave no answer within {} ms",
                        self.telemetry.name(),
                        timeout.as_millis()
                    ),
                )
            })??;

        match snapshot.machine_id() {
            Some(reported) if reported != machine_id => Err(Error::telemetry(
                machine_id,
                format!("snapshot is for machine {}", reported),
            )),
            _ => Ok(snapshot),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AlertThresholds;
    use crate::detection::AlertType;
    use crate::scoring::{HealthAssessment, HealthRequest};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;

    /// Telemetry source replaying a fixed snapshot, or failing
    struct FixedSource {
        snapshot: Mutex<Option<Snapshot>>,
        delay: Duration,
    }

    impl FixedSource {
        fn new(snapshot: Snapshot) -> Arc<Self> {
            Arc::new(Self {
                snapshot: Mutex::new(Some(snapshot)),
                delay: Duration::ZERO,
            })
        }

        fn set(&self, snapshot: Option<Snapshot>) {
            *self.snapshot.lock() = snapshot;
        }
    }

    #[async_trait]
    impl TelemetrySource for FixedSource {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn fetch_snapshot(&self, machine_id: &str) -> Result<Snapshot> {
            tokio::time::sleep(self.delay).await;
            self.snapshot
                .lock()
                .clone()
                .ok_or_else(|| Error::telemetry(machine_id, "connection refused"))
        }
    }

    struct SlowScoring;

    #[async_trait]
    impl HealthClassifier for SlowScoring {
        async fn classify(&self, _request: &HealthRequest) -> Result<HealthAssessment> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(HealthAssessment {
                anomaly_score: -1.0,
                is_anomaly: true,
                actionable_insight: None,
            })
        }
    }

    #[async_trait]
    impl DurationEstimator for SlowScoring {
        async fn estimate(&self, _request: &DurationRequest) -> Result<DurationEstimate> {
            Ok(DurationEstimate {
                predicted_duration_hours: 2.5,
                readable_duration: None,
            })
        }
    }

    fn snapshot(lon: f64, lat: f64) -> Snapshot {
        serde_json::from_value(serde_json::json!({
            "identity": {"machine_id": "EXC001", "operator_id": "OP1002"},
            "status": {"engine_hours": 435.2, "fuel_percent": 65, "engine_temperature_celsius": 95.5, "engine_rpm": 1500},
            "safety": {"seatbelt_buckled": true, "proximity_meters": {"front_left": 15.0, "rear_right": 20.0}},
            "environment": {"noise_db": 68, "dust_aqi": 45},
            "location": {"gps": {"latitude": lat, "longitude": lon}}
        }))
        .unwrap()
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.telemetry.timeout_ms = 200;
        config.scoring.timeout_ms = 50;
        config.thresholds = AlertThresholds::default();
        config
    }

    fn engine(source: Arc<FixedSource>) -> Engine {
        let engine = Engine::new(config(), Arc::new(Database::open_in_memory().unwrap()), source);
        engine
            .register_operator(&Operator {
                id: "OP1002".to_string(),
                name: "Asha".to_string(),
            })
            .unwrap();
        for id in ["EXC001", "DOZ042"] {
            engine
                .register_machine(&Machine {
                    id: id.to_string(),
                    model: Some("CAT 320".to_string()),
                })
                .unwrap();
        }
        engine
    }

    fn task(machine_id: &str) -> NewTask {
        serde_json::from_value(serde_json::json!({
            "assigned_date": "2025-09-14",
            "operator_id": "OP1002",
            "machine_id": machine_id,
            "task_type": "Excavation",
            "load_cycles_planned": 40,
            "geofence_points": [[0, 0], [0, 10], [10, 10], [10, 0]],
            "task_inputs": {"soil_type": "Clay", "terrain": "Flat"}
        }))
        .unwrap()
    }

    /// Engine with an open shift on EXC001 working the square task
    async fn working_shift(source: Arc<FixedSource>) -> (Engine, ShiftId) {
        let engine = engine(source);
        let shift = engine.login("OP1002", "EXC001").unwrap();
        let task_id = engine.schedule_tasks(&[task("EXC001")]).unwrap()[0];
        engine.set_active_task(shift.id, task_id).await.unwrap();
        (engine, shift.id)
    }

    fn types(alerts: &[AlertEvent]) -> Vec<AlertType> {
        alerts.iter().map(|a| a.alert_type).collect()
    }

    #[tokio::test]
    async fn test_calm_cycle_stores_nothing() {
        let (engine, shift_id) = working_shift(FixedSource::new(snapshot(5.0, 5.0))).await;

        let status = engine.live_status(shift_id).await.unwrap();
        assert!(status.alerts.is_empty());
        assert_eq!(status.snapshot.machine_id(), Some("EXC001"));
        assert!(engine.events_for_shift(shift_id).unwrap().is_empty());
        assert_eq!(engine.state().cycles, 1);
    }

    #[tokio::test]
    async fn test_single_proximity_breach() {
        let mut reading = snapshot(5.0, 5.0);
        reading.safety.proximity_meters.insert("side_left_1".to_string(), 2.5);
        let (engine, shift_id) = working_shift(FixedSource::new(reading)).await;

        let status = engine.live_status(shift_id).await.unwrap();
        assert_eq!(types(&status.alerts), vec![AlertType::ProximityNear]);

        let stored = engine.events_for_shift(shift_id).unwrap();
        assert_eq!(stored, status.alerts);
    }

    #[tokio::test]
    async fn test_geofence_breach_outside_square() {
        let (engine, shift_id) = working_shift(FixedSource::new(snapshot(20.0, 20.0))).await;

        let status = engine.live_status(shift_id).await.unwrap();
        assert_eq!(types(&status.alerts), vec![AlertType::GeofenceBreach]);
    }

    #[tokio::test]
    async fn test_no_geofence_rule_without_task() {
        let engine = engine(FixedSource::new(snapshot(20.0, 20.0)));
        let shift = engine.login("OP1002", "EXC001").unwrap();

        let status = engine.live_status(shift.id).await.unwrap();
        assert!(status.alerts.is_empty());
    }

    #[tokio::test]
    async fn test_identical_cycles_are_not_deduplicated() {
        let (engine, shift_id) = working_shift(FixedSource::new(snapshot(20.0, 20.0))).await;

        let first = engine.live_status(shift_id).await.unwrap();
        let second = engine.live_status(shift_id).await.unwrap();

        assert_ne!(first.cycle_id, second.cycle_id);
        let stored = engine.events_for_shift(shift_id).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].cycle_id, first.cycle_id);
        assert_eq!(stored[1].cycle_id, second.cycle_id);
    }

    #[tokio::test]
    async fn test_telemetry_failure_writes_nothing() {
        let source = FixedSource::new(snapshot(20.0, 20.0));
        let (engine, shift_id) = working_shift(source.clone()).await;
        let mut events = engine.event_bus().subscribe();
        source.set(None);

        let err = engine.live_status(shift_id).await.unwrap_err();
        assert_eq!(err.kind(), "TelemetryUnavailable");
        assert_eq!(engine.stats().unwrap().event_count, 0);
        assert_eq!(engine.state().telemetry_failures, 1);

        let envelope = events.recv().await.unwrap();
        assert!(matches!(envelope.event, EngineEvent::TelemetryUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_slow_telemetry_times_out() {
        let source = Arc::new(FixedSource {
            snapshot: Mutex::new(Some(snapshot(5.0, 5.0))),
            delay: Duration::from_secs(5),
        });
        let (engine, shift_id) = working_shift(source).await;

        let err = engine.live_status(shift_id).await.unwrap_err();
        assert!(matches!(err, Error::TelemetryUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_snapshot_for_other_machine_rejected() {
        let mut reading = snapshot(5.0, 5.0);
        reading.identity.as_mut().unwrap().machine_id = "DOZ042".to_string();
        let (engine, shift_id) = working_shift(FixedSource::new(reading)).await;

        let err = engine.live_status(shift_id).await.unwrap_err();
        assert_eq!(err.kind(), "TelemetryUnavailable");
    }

    #[tokio::test]
    async fn test_scoring_timeout_keeps_other_alerts() {
        let mut reading = snapshot(20.0, 20.0);
        reading.environment.noise_db = 95.0;
        let (engine, shift_id) = working_shift(FixedSource::new(reading)).await;
        let engine = engine.with_scoring(Arc::new(SlowScoring), Arc::new(SlowScoring));

        let status = engine.live_status(shift_id).await.unwrap();
        assert_eq!(
            types(&status.alerts),
            vec![AlertType::HighNoise, AlertType::GeofenceBreach]
        );
        assert_eq!(engine.state().scoring_degraded, 1);
    }

    #[tokio::test]
    async fn test_failed_commit_stores_no_alerts() {
        let mut reading = snapshot(20.0, 20.0);
        reading.environment.noise_db = 95.0;
        let (engine, shift_id) = working_shift(FixedSource::new(reading)).await;
        let mut events = engine.event_bus().subscribe();

        // Noise row goes in first, then the geofence row aborts the batch
        engine
            .database()
            .execute_batch(
                "CREATE TRIGGER fail_geofence BEFORE INSERT ON events
                 WHEN NEW.event_type = 'GEOFENCE_BREACH'
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();

        let err = engine.live_status(shift_id).await.unwrap_err();
        assert_eq!(err.kind(), "PersistenceFailure");
        assert_eq!(engine.stats().unwrap().event_count, 0);
        assert!(engine.events_for_shift(shift_id).unwrap().is_empty());

        let state = engine.state();
        assert_eq!(state.persistence_failures, 1);
        assert_eq!(state.cycles, 0);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_shift_leaves_no_lock() {
        let (engine, shift_id) = working_shift(FixedSource::new(snapshot(5.0, 5.0))).await;

        for unknown in 500..600 {
            assert!(engine.live_status(unknown).await.is_err());
        }
        engine.live_status(shift_id).await.unwrap();
        engine.close_shift(shift_id).await.unwrap();
        assert!(engine.live_status(shift_id).await.is_err());

        assert_eq!(engine.sessions().lock_entries(), 0);
    }

    #[tokio::test]
    async fn test_closed_shift_has_no_status() {
        let (engine, shift_id) = working_shift(FixedSource::new(snapshot(20.0, 20.0))).await;
        engine.close_shift(shift_id).await.unwrap();

        let err = engine.live_status(shift_id).await.unwrap_err();
        assert!(matches!(err, Error::NoActiveShift(id) if id == shift_id));
        assert_eq!(engine.stats().unwrap().event_count, 0);
    }

    #[tokio::test]
    async fn test_concurrent_shifts_do_not_interfere() {
        let engine = engine(FixedSource::new(snapshot(20.0, 20.0)));
        let ids = engine
            .schedule_tasks(&[task("EXC001"), task("DOZ042")])
            .unwrap();
        let a = engine.login("OP1002", "EXC001").unwrap();
        let b = engine.login("OP1002", "DOZ042").unwrap();
        engine.set_active_task(a.id, ids[0]).await.unwrap();

        // Only `a` has a geofence; `b` rejects snapshots tagged for EXC001
        let (ra, rb) = tokio::join!(engine.live_status(a.id), engine.live_status(b.id));
        assert_eq!(types(&ra.unwrap().alerts), vec![AlertType::GeofenceBreach]);
        assert_eq!(rb.unwrap_err().kind(), "TelemetryUnavailable");

        let context = engine.sessions().active_context(b.id).unwrap();
        assert!(context.task.is_none());
    }

    #[tokio::test]
    async fn test_alerts_are_published() {
        let (engine, shift_id) = working_shift(FixedSource::new(snapshot(20.0, 20.0))).await;
        let mut events = engine.event_bus().subscribe();

        engine.live_status(shift_id).await.unwrap();
        let envelope = events.recv().await.unwrap();
        assert!(matches!(envelope.event, EngineEvent::AlertRaised(ref a) if a.alert_type == AlertType::GeofenceBreach));
    }

    #[tokio::test]
    async fn test_from_config_demo_with_pinned_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let pinned = dir.path().join("exc001.json");
        let mut reading = snapshot(20.0, 20.0);
        reading.environment.noise_db = 95.0;
        std::fs::write(&pinned, serde_json::to_string(&reading).unwrap()).unwrap();

        let mut config = config();
        config.demo_mode = true;
        config.scoring.enabled = false;
        config.data_dir = dir.path().to_path_buf();
        config.simulator.seed = Some(3);
        config.simulator.pinned.insert("EXC001".to_string(), pinned);

        let engine = Engine::from_config(config).unwrap();
        assert!(dir.path().join("shiftguard.db").exists());
        engine
            .register_operator(&Operator {
                id: "OP1002".to_string(),
                name: "Asha".to_string(),
            })
            .unwrap();
        engine
            .register_machine(&Machine {
                id: "EXC001".to_string(),
                model: None,
            })
            .unwrap();
        let shift = engine.login("OP1002", "EXC001").unwrap();

        let status = engine.live_status(shift.id).await.unwrap();
        assert_eq!(types(&status.alerts), vec![AlertType::HighNoise]);
    }

    #[tokio::test]
    async fn test_estimate_task_duration() {
        let engine = engine(FixedSource::new(snapshot(5.0, 5.0)));
        let task_id = engine.schedule_tasks(&[task("EXC001")]).unwrap()[0];

        let err = engine.estimate_task_duration(task_id).await.unwrap_err();
        assert_eq!(err.kind(), "ScoringUnavailable");

        let engine = engine.with_scoring(Arc::new(SlowScoring), Arc::new(SlowScoring));
        let estimate = engine.estimate_task_duration(task_id).await.unwrap();
        assert_eq!(estimate.readable(), "2 hours and 30 minutes");

        let err = engine.estimate_task_duration(404).await.unwrap_err();
        assert!(matches!(err, Error::TaskNotFound(404)));
    }
}
