// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Event bus for alert and shift notifications

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

use crate::detection::AlertEvent;
use crate::model::ShiftId;

/// Engine notification payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineEvent {
    AlertRaised(AlertEvent),
    ShiftOpened {
        shift_id: ShiftId,
        operator_id: String,
        machine_id: String,
    },
    ShiftClosed {
        shift_id: ShiftId,
    },
    TelemetryUnavailable {
        shift_id: ShiftId,
        machine_id: String,
        reason: String,
    },
    ScoringDegraded {
        shift_id: ShiftId,
        reason: String,
    },
}

/// Sequenced envelope around an engine event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub event: EngineEvent,
}

/// Central event bus for pub/sub communication
pub struct EventBus {
    event_tx: broadcast::Sender<Envelope>,
    event_counter: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity.max(1));

        Self {
            event_tx,
            event_counter: AtomicU64::new(0),
        }
    }

    pub fn publish_alerts(&self, alerts: &[AlertEvent]) {
        for alert in alerts {
            self.publish(EngineEvent::AlertRaised(alert.clone()));
        }
    }

    /// Broadcast an event; dropped silently when nobody is subscribed
    pub fn publish(&self, event: EngineEvent) {
        let id = self.event_counter.fetch_add(1, Ordering::Relaxed);
        let _ = self.event_tx.send(Envelope {
            id,
            timestamp: Utc::now(),
            event,
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.event_tx.subscribe()
    }
}
