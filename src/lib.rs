// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! ShiftGuard - Shift & Telemetry Alerting Engine
//!
//! Watches heavy-equipment machines during operator shifts:
//! - Shift sessions binding one operator to one machine, with the active task
//!   and its geofence keyed per shift
//! - Live telemetry snapshots from an HTTP source or the built-in simulator
//! - Safety rules for proximity, noise, dust, engine temperature and geofence
//!   breaches, plus an optional machine-health anomaly classifier
//! - Append-only SQLite event log with one atomic batch per status cycle
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      ShiftGuard Engine                       │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────┐  ┌───────────┐  ┌────────────┐  ┌───────────┐   │
//! │  │ Session │→ │ Telemetry │→ │   Rule     │→ │  Event    │   │
//! │  │ Manager │  │  Source   │  │ Evaluator  │  │  Store    │   │
//! │  └─────────┘  └───────────┘  └────────────┘  └───────────┘   │
//! │       ↓                        ↓    ↓              ↓         │
//! │  ┌──────────┐           ┌─────────┐ ┌─────────┐ ┌─────────┐  │
//! │  │  Poller  │           │Geofence │ │ Scoring │ │Event Bus│  │
//! │  └──────────┘           └─────────┘ └─────────┘ └─────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod core;
pub mod db;
pub mod detection;
pub mod error;
pub mod geofence;
pub mod model;
pub mod scoring;
pub mod sensors;
pub mod session;

// Re-exports for convenience
pub use config::Config;
pub use core::{Engine, EngineEvent, EventBus, LiveStatus, Poller};
pub use db::Database;
pub use detection::{AlertEvent, AlertType, RuleEvaluator};
pub use error::{Error, Result};
pub use geofence::{Containment, GeoPoint, Polygon};
pub use sensors::{Snapshot, TelemetrySource};
pub use session::{SessionManager, ShiftContext};

/// ShiftGuard version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// ShiftGuard name
pub const NAME: &str = "ShiftGuard";
