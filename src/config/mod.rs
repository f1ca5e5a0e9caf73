// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Configuration module

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory; relative database paths resolve against it
    pub data_dir: PathBuf,

    /// Log filter directive, e.g. `info` or `shiftguard=debug`
    pub log_level: String,

    /// Use the built-in snapshot simulator instead of a telemetry service
    pub demo_mode: bool,

    /// Telemetry source configuration
    pub telemetry: TelemetryConfig,

    /// Scoring services configuration
    pub scoring: ScoringConfig,

    /// Alert rule thresholds
    pub thresholds: AlertThresholds,

    /// Status polling configuration
    pub polling: PollingConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Demo-mode simulator settings
    pub simulator: SimulatorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            log_level: "info".to_string(),
            demo_mode: false,
            telemetry: TelemetryConfig::default(),
            scoring: ScoringConfig::default(),
            thresholds: AlertThresholds::default(),
            polling: PollingConfig::default(),
            database: DatabaseConfig::default(),
            simulator: SimulatorConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Database settings with the path resolved against `data_dir`
    pub fn resolved_database(&self) -> DatabaseConfig {
        DatabaseConfig {
            path: self.data_dir.join(&self.database.path),
            ..self.database.clone()
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("shiftguard"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

/// Telemetry source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Base URL of the telemetry service
    pub base_url: String,

    /// Path of the snapshot endpoint, queried with `?machine_id=`
    pub snapshot_path: String,

    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl TelemetryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5001".to_string(),
            snapshot_path: "/get_current_data".to_string(),
            timeout_ms: 3000,
        }
    }
}

/// Scoring services configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Enable the machine-anomaly rule
    pub enabled: bool,

    /// Base URL of the analytics service
    pub base_url: String,

    /// Machine health classifier endpoint
    pub health_path: String,

    /// Task duration estimator endpoint
    pub duration_path: String,

    /// Request timeout in milliseconds
    pub timeout_ms: u64,

    /// Scores below this value are anomalous when the service omits a verdict
    pub anomaly_threshold: f64,

    /// Fuel tank capacity used to turn a fuel gauge reading into litres used
    pub tank_capacity_litres: f64,
}

impl ScoringConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://127.0.0.1:5002".to_string(),
            health_path: "/api/check_health".to_string(),
            duration_path: "/api/estimate_time".to_string(),
            timeout_ms: 3000,
            anomaly_threshold: -0.07,
            tank_capacity_litres: 400.0,
        }
    }
}

/// Alert rule thresholds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlertThresholds {
    /// Proximity distance below which an object is NEAR (metres)
    pub proximity_near_m: f64,

    /// Proximity distance below which an object is MEDIUM (metres)
    pub proximity_medium_m: f64,

    /// Ambient noise limit (dB)
    pub noise_db: f64,

    /// Dust / AQI limit
    pub dust_aqi: f64,

    /// Engine temperature limit (°C)
    pub engine_temp_c: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            proximity_near_m: 3.0,
            proximity_medium_m: 5.0,
            noise_db: 90.0,
            dust_aqi: 200.0,
            engine_temp_c: 115.0,
        }
    }
}

/// Status polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Interval between live-status cycles, in seconds
    pub interval_secs: u64,

    /// Capacity of the engine event bus
    pub event_bus_capacity: usize,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            event_bus_capacity: 1000,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database path, absolute or relative to the data directory
    pub path: PathBuf,

    /// SQLite busy timeout in milliseconds
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("shiftguard.db"),
            busy_timeout_ms: 5000,
        }
    }
}

/// Demo-mode simulator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,

    /// Probability per reading that one channel jumps past its limit
    pub excursion_probability: f64,

    /// Machine id to snapshot JSON file served verbatim instead of simulated data
    pub pinned: BTreeMap<String, PathBuf>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: None,
            excursion_probability: 0.05,
            pinned: BTreeMap::new(),
        }
    }
}
