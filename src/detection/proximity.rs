// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Proximity zone classification

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::AlertThresholds;

/// Distance band of a proximity reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProximityZone {
    Near,
    Medium,
    Far,
}

impl ProximityZone {
    pub fn classify(distance_m: f64, thresholds: &AlertThresholds) -> Self {
        if distance_m < thresholds.proximity_near_m {
            ProximityZone::Near
        } else if distance_m < thresholds.proximity_medium_m {
            ProximityZone::Medium
        } else {
            ProximityZone::Far
        }
    }
}

/// One sensor's distance and zone
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneReading {
    pub distance_m: f64,
    pub zone: ProximityZone,
}

/// Zone of every proximity sensor, keyed by sensor position
pub fn classify_zones(
    readings: &BTreeMap<String, f64>,
    thresholds: &AlertThresholds,
) -> BTreeMap<String, ZoneReading> {
    readings
        .iter()
        .map(|(sensor, &distance_m)| {
            (
                sensor.clone(),
                ZoneReading {
                    distance_m,
                    zone: ProximityZone::classify(distance_m, thresholds),
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_bands() {
        let t = AlertThresholds::default();
        assert_eq!(ProximityZone::classify(2.99, &t), ProximityZone::Near);
        assert_eq!(ProximityZone::classify(3.0, &t), ProximityZone::Medium);
        assert_eq!(ProximityZone::classify(4.9, &t), ProximityZone::Medium);
        assert_eq!(ProximityZone::classify(5.0, &t), ProximityZone::Far);
    }

    #[test]
    fn test_classify_all_sensors() {
        let mut readings = BTreeMap::new();
        readings.insert("front_left".to_string(), 1.0);
        readings.insert("rear_right".to_string(), 20.0);

        let zones = classify_zones(&readings, &AlertThresholds::default());
        assert_eq!(zones["front_left"].zone, ProximityZone::Near);
        assert_eq!(zones["rear_right"].zone, ProximityZone::Far);
        assert_eq!(
            serde_json::to_value(zones["front_left"]).unwrap(),
            serde_json::json!({"distance_m": 1.0, "zone": "NEAR"})
        );
    }
}
