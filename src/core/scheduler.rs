// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Fixed-interval status polling for every open shift

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::{Engine, LiveStatus};
use crate::error::Result;
use crate::model::ShiftId;

/// Drives live status cycles on a timer
pub struct Poller {
    engine: Arc<Engine>,
    interval: Duration,
}

impl Poller {
    pub fn new(engine: Arc<Engine>) -> Self {
        let interval = Duration::from_secs(engine.config.polling.interval_secs.max(1));
        Self { engine, interval }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// One status cycle for each open shift, run concurrently
    pub async fn tick(&self) -> Result<Vec<(ShiftId, Result<LiveStatus>)>> {
        let shifts = self.engine.sessions().open_shifts()?;
        debug!("Polling {} open shifts", shifts.len());

        let cycles = shifts.iter().map(|shift| {
            let engine = &self.engine;
            async move { (shift.id, engine.live_status(shift.id).await) }
        });
        let results = join_all(cycles).await;

        for (shift_id, result) in &results {
            match result {
                Ok(status) if !status.alerts.is_empty() => {
                    for alert in &status.alerts {
                        warn!(shift_id, alert_type = %alert.alert_type, "{}", alert.message);
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(shift_id, kind = e.kind(), "Status cycle failed: {}", e),
            }
        }

        Ok(results)
    }

    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        info!("Starting poller, interval {:?}", self.interval);

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("Could not list open shifts: {}", e);
                    }
                }
                _ = shutdown.recv() => {
                    info!("Poller shutting down...");
                    break;
                }
            }
        }

        Ok(())
    }
}
