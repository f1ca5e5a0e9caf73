// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Snapshot simulator for demo/testing

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::info;
use rand::prelude::*;
use rand_distr::StandardNormal;

use super::{
    EngineStatus, EnvironmentReadings, GpsFix, Location, SafetyReadings, Snapshot,
    SnapshotIdentity, TelemetrySource,
};
use crate::config::SimulatorConfig;
use crate::error::Result;

const PROXIMITY_SENSORS: [&str; 8] = [
    "front_left",
    "front_right",
    "side_left_1",
    "side_left_2",
    "side_right_1",
    "side_right_2",
    "rear_left",
    "rear_right",
];

/// Per-machine simulation state
struct MachineState {
    engine_hours: f64,
    fuel_percent: f64,
    temperature: f64,
    lat: f64,
    lon: f64,
}

struct SimState {
    rng: StdRng,
    machines: HashMap<String, MachineState>,
    pinned: HashMap<String, Snapshot>,
}

/// Simulates realistic machine telemetry, one drifting state per machine
pub struct SnapshotSimulator {
    state: Mutex<SimState>,
    excursion_probability: f64,
    origin: (f64, f64),
}

impl SnapshotSimulator {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic simulator for reproducible runs
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    /// Simulator from demo-mode settings, with pinned snapshots loaded from disk
    pub fn from_config(config: &SimulatorConfig) -> Result<Self> {
        let sim = match config.seed {
            Some(seed) => Self::seeded(seed),
            None => Self::new(),
        }
        .with_excursion_probability(config.excursion_probability);

        for (machine_id, path) in &config.pinned {
            let raw = std::fs::read_to_string(path).map_err(|e| {
                std::io::Error::new(e.kind(), format!("{}: {}", path.display(), e))
            })?;
            let snapshot: Snapshot = serde_json::from_str(&raw)?;
            info!(machine_id = %machine_id, "Pinned snapshot from {:?}", path);
            sim.pin(machine_id, snapshot);
        }

        Ok(sim)
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            state: Mutex::new(SimState {
                rng,
                machines: HashMap::new(),
                pinned: HashMap::new(),
            }),
            excursion_probability: 0.05,
            origin: (11.0173, 76.9563),
        }
    }

    /// Probability per reading that one channel jumps past its alert threshold
    pub fn with_excursion_probability(mut self, p: f64) -> Self {
        self.excursion_probability = p.clamp(0.0, 1.0);
        self
    }

    /// Serve `snapshot` for `machine_id` instead of simulated readings
    pub fn pin(&self, machine_id: &str, snapshot: Snapshot) {
        self.state.lock().pinned.insert(machine_id.to_string(), snapshot);
    }

    fn generate(&self, machine_id: &str) -> Snapshot {
        let mut guard = self.state.lock();
        let SimState { rng, machines, .. } = &mut *guard;
        let (lat0, lon0) = self.origin;

        let machine = machines.entry(machine_id.to_string()).or_insert_with(|| MachineState {
            engine_hours: 400.0 + rng.gen_range(0.0..100.0),
            fuel_percent: rng.gen_range(50.0..100.0),
            temperature: 90.0,
            lat: lat0,
            lon: lon0,
        });

        machine.engine_hours += 1.0 / 720.0;
        machine.fuel_percent = (machine.fuel_percent - rng.gen_range(0.0..0.05)).max(0.0);
        machine.temperature = (machine.temperature + gauss(rng, 0.4)).clamp(70.0, 110.0);
        machine.lat += gauss(rng, 0.00002);
        machine.lon += gauss(rng, 0.00002);

        let idling = rng.gen::<f64>() < 0.15;
        let rpm = if idling {
            750.0 + gauss(rng, 20.0)
        } else {
            1600.0 + gauss(rng, 150.0)
        };

        let mut proximity = BTreeMap::new();
        for sensor in PROXIMITY_SENSORS {
            let d = 12.0 + gauss(rng, 2.0);
            proximity.insert(sensor.to_string(), d.max(3.5));
        }

        let mut noise_db = 70.0 + gauss(rng, 4.0);
        let mut dust_aqi = (60.0 + gauss(rng, 15.0)).max(0.0);
        let mut temperature = machine.temperature;

        // Occasional excursion past a limit
        if rng.gen::<f64>() < self.excursion_probability {
            match rng.gen_range(0..4) {
                0 => {
                    let sensor = PROXIMITY_SENSORS[rng.gen_range(0..PROXIMITY_SENSORS.len())];
                    proximity.insert(sensor.to_string(), rng.gen_range(0.5..2.9));
                }
                1 => noise_db = rng.gen_range(91.0..105.0),
                2 => dust_aqi = rng.gen_range(201.0..300.0),
                _ => temperature = rng.gen_range(116.0..130.0),
            }
        }

        Snapshot {
            identity: Some(SnapshotIdentity {
                machine_id: machine_id.to_string(),
                operator_id: None,
            }),
            status: EngineStatus {
                ignition_on: true,
                is_idling: idling,
                engine_hours: machine.engine_hours,
                fuel_percent: machine.fuel_percent,
                engine_temperature_celsius: temperature,
                engine_rpm: rpm,
                fuel_used_litres: None,
                idling_minutes: None,
            },
            safety: SafetyReadings {
                seatbelt_buckled: true,
                proximity_meters: proximity,
            },
            environment: EnvironmentReadings {
                noise_db,
                dust_aqi,
                air_quality_ppm: Some(dust_aqi * 0.6),
            },
            location: Location {
                gps: GpsFix {
                    latitude: machine.lat,
                    longitude: machine.lon,
                },
            },
            captured_at: Utc::now(),
        }
    }
}

impl Default for SnapshotSimulator {
    fn default() -> Self {
        Self::new()
    }
}

fn gauss(rng: &mut StdRng, sd: f64) -> f64 {
    let z: f64 = rng.sample(StandardNormal);
    z * sd
}

#[async_trait]
impl TelemetrySource for SnapshotSimulator {
    fn name(&self) -> &str {
        "simulator"
    }

    async fn fetch_snapshot(&self, machine_id: &str) -> Result<Snapshot> {
        if let Some(pinned) = self.state.lock().pinned.get(machine_id) {
            let mut snapshot = pinned.clone();
            snapshot.captured_at = Utc::now();
            return Ok(snapshot);
        }
        Ok(self.generate(machine_id))
    }
}
