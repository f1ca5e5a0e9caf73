// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Geofence engine - flat-plane point-in-polygon over unprojected lon/lat
//!
//! Containment uses even-odd ray casting with a ray running in +longitude
//! direction from the tested point. A point lying exactly on an edge or a
//! vertex is reported as [`Containment::Outside`]: a machine must stay strictly
//! inside its work zone.
//!
//! Polygons spanning more than 180° of longitude are read as crossing the
//! antimeridian; their longitudes (and the point's) are shifted into
//! `[0, 360)` before testing.

use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{Area, Coord, Line, LineString};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Tolerance for collinearity and boundary tests, in degrees
const EPSILON: f64 = 1e-12;

/// A (longitude, latitude) pair, serialised as `[lon, lat]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

impl From<[f64; 2]> for GeoPoint {
    fn from(p: [f64; 2]) -> Self {
        Self { lon: p[0], lat: p[1] }
    }
}

impl From<GeoPoint> for [f64; 2] {
    fn from(p: GeoPoint) -> Self {
        [p.lon, p.lat]
    }
}

/// Result of a containment test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Containment {
    Inside,
    Outside,
}

/// Simple closed polygon with at least three vertices
///
/// The closing edge from the last vertex back to the first is implicit.
/// Construction (and deserialisation) validates the shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<GeoPoint>", into = "Vec<GeoPoint>")]
pub struct Polygon {
    vertices: Vec<GeoPoint>,
}

impl Polygon {
    /// Validate and build a polygon. A trailing vertex equal to the first one
    /// (WKT-style explicit closure) is dropped.
    pub fn new(mut vertices: Vec<GeoPoint>) -> Result<Self> {
        if vertices.len() > 3 && vertices.first() == vertices.last() {
            vertices.pop();
        }

        if vertices.len() < 3 {
            return Err(Error::MalformedGeofence(format!(
                "polygon needs at least 3 vertices, got {}",
                vertices.len()
            )));
        }

        for (i, v) in vertices.iter().enumerate() {
            if !v.lon.is_finite() || !v.lat.is_finite() {
                return Err(Error::MalformedGeofence(format!("vertex {} is not finite", i)));
            }
            if !(-180.0..=180.0).contains(&v.lon) || !(-90.0..=90.0).contains(&v.lat) {
                return Err(Error::MalformedGeofence(format!(
                    "vertex {} ({}, {}) is out of range",
                    i, v.lon, v.lat
                )));
            }
        }

        let polygon = Self { vertices };
        let ring = polygon.planar_ring();
        validate_ring(&ring)?;
        Ok(polygon)
    }

    pub fn vertices(&self) -> &[GeoPoint] {
        &self.vertices
    }

    /// True when the polygon is read as crossing the antimeridian
    pub fn crosses_antimeridian(&self) -> bool {
        let (min, max) = self
            .vertices
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v.lon), hi.max(v.lon)));
        max - min > 180.0
    }

    /// Even-odd containment test, boundary counts as outside
    pub fn contains(&self, point: GeoPoint) -> Containment {
        contains(self, point)
    }

    fn planar_ring(&self) -> Vec<GeoPoint> {
        if self.crosses_antimeridian() {
            self.vertices.iter().map(|v| GeoPoint::new(unwrap_lon(v.lon), v.lat)).collect()
        } else {
            self.vertices.clone()
        }
    }
}

impl TryFrom<Vec<GeoPoint>> for Polygon {
    type Error = Error;

    fn try_from(vertices: Vec<GeoPoint>) -> Result<Self> {
        Polygon::new(vertices)
    }
}

impl From<Polygon> for Vec<GeoPoint> {
    fn from(p: Polygon) -> Self {
        p.vertices
    }
}

/// Even-odd point-in-polygon test; points on the boundary are outside
pub fn contains(polygon: &Polygon, point: GeoPoint) -> Containment {
    let ring = polygon.planar_ring();
    let p = if polygon.crosses_antimeridian() {
        GeoPoint::new(unwrap_lon(point.lon), point.lat)
    } else {
        point
    };

    if !p.lon.is_finite() || !p.lat.is_finite() {
        return Containment::Outside;
    }

    let n = ring.len();
    let mut inside = false;

    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];

        if on_segment(a, b, p) {
            return Containment::Outside;
        }

        // Half-open rule on latitude so a vertex shared by two edges is counted once
        if (a.lat > p.lat) != (b.lat > p.lat) {
            let x = a.lon + (p.lat - a.lat) * (b.lon - a.lon) / (b.lat - a.lat);
            if p.lon < x {
                inside = !inside;
            }
        }
    }

    if inside {
        Containment::Inside
    } else {
        Containment::Outside
    }
}

fn unwrap_lon(lon: f64) -> f64 {
    if lon < 0.0 {
        lon + 360.0
    } else {
        lon
    }
}

fn on_segment(a: GeoPoint, b: GeoPoint, p: GeoPoint) -> bool {
    let cross = (b.lon - a.lon) * (p.lat - a.lat) - (b.lat - a.lat) * (p.lon - a.lon);
    cross.abs() <= EPSILON
        && p.lon >= a.lon.min(b.lon) - EPSILON
        && p.lon <= a.lon.max(b.lon) + EPSILON
        && p.lat >= a.lat.min(b.lat) - EPSILON
        && p.lat <= a.lat.max(b.lat) + EPSILON
}

/// Reject repeated vertices, zero area and self-intersecting edges
fn validate_ring(ring: &[GeoPoint]) -> Result<()> {
    let n = ring.len();

    for i in 0..n {
        if ring[i] == ring[(i + 1) % n] {
            return Err(Error::MalformedGeofence(format!("vertex {} repeats its successor", i)));
        }
    }

    let coords: Vec<Coord<f64>> = ring.iter().map(|v| Coord { x: v.lon, y: v.lat }).collect();
    let shape = geo::Polygon::new(LineString::from(coords.clone()), vec![]);
    if shape.unsigned_area() <= EPSILON {
        return Err(Error::MalformedGeofence("polygon has zero area".to_string()));
    }

    let edges: Vec<Line<f64>> = (0..n)
        .map(|i| Line::new(coords[i], coords[(i + 1) % n]))
        .collect();

    for i in 0..n {
        for j in (i + 1)..n {
            // Neighbouring edges share a vertex; they may only overlap if they fold back
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            match line_intersection(edges[i], edges[j]) {
                Some(LineIntersection::Collinear { .. }) => {
                    return Err(Error::MalformedGeofence(format!(
                        "edges {} and {} overlap",
                        i, j
                    )));
                }
                Some(LineIntersection::SinglePoint { .. }) if !adjacent => {
                    return Err(Error::MalformedGeofence(format!(
                        "edges {} and {} intersect",
                        i, j
                    )));
                }
                _ => {}
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Polygon {
        Polygon::new(vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 10.0),
            GeoPoint::new(10.0, 10.0),
            GeoPoint::new(10.0, 0.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_square_inside_outside() {
        let sq = square();
        assert_eq!(sq.contains(GeoPoint::new(5.0, 5.0)), Containment::Inside);
        assert_eq!(sq.contains(GeoPoint::new(0.001, 9.999)), Containment::Inside);
        assert_eq!(sq.contains(GeoPoint::new(20.0, 20.0)), Containment::Outside);
        assert_eq!(sq.contains(GeoPoint::new(-1.0, 5.0)), Containment::Outside);
        assert_eq!(sq.contains(GeoPoint::new(5.0, 10.5)), Containment::Outside);
    }

    #[test]
    fn test_boundary_is_outside() {
        let sq = square();
        assert_eq!(sq.contains(GeoPoint::new(0.0, 5.0)), Containment::Outside);
        assert_eq!(sq.contains(GeoPoint::new(10.0, 5.0)), Containment::Outside);
        assert_eq!(sq.contains(GeoPoint::new(5.0, 0.0)), Containment::Outside);
        assert_eq!(sq.contains(GeoPoint::new(10.0, 10.0)), Containment::Outside);
        assert_eq!(sq.contains(GeoPoint::new(0.0, 0.0)), Containment::Outside);
    }

    #[test]
    fn test_concave_polygon() {
        // U shape opening upward
        let u = Polygon::new(vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(6.0, 0.0),
            GeoPoint::new(6.0, 6.0),
            GeoPoint::new(4.0, 6.0),
            GeoPoint::new(4.0, 2.0),
            GeoPoint::new(2.0, 2.0),
            GeoPoint::new(2.0, 6.0),
            GeoPoint::new(0.0, 6.0),
        ])
        .unwrap();

        assert_eq!(u.contains(GeoPoint::new(1.0, 4.0)), Containment::Inside);
        assert_eq!(u.contains(GeoPoint::new(5.0, 4.0)), Containment::Inside);
        assert_eq!(u.contains(GeoPoint::new(3.0, 4.0)), Containment::Outside);
        assert_eq!(u.contains(GeoPoint::new(3.0, 1.0)), Containment::Inside);
        // Ray through the notch vertices at lat 2.0
        assert_eq!(u.contains(GeoPoint::new(1.0, 2.0)), Containment::Inside);
    }

    #[test]
    fn test_ray_through_vertex() {
        let diamond = Polygon::new(vec![
            GeoPoint::new(0.0, 5.0),
            GeoPoint::new(5.0, 10.0),
            GeoPoint::new(10.0, 5.0),
            GeoPoint::new(5.0, 0.0),
        ])
        .unwrap();

        assert_eq!(diamond.contains(GeoPoint::new(5.0, 5.0)), Containment::Inside);
        assert_eq!(diamond.contains(GeoPoint::new(-1.0, 5.0)), Containment::Outside);
        assert_eq!(diamond.contains(GeoPoint::new(4.0, 10.0)), Containment::Outside);
    }

    #[test]
    fn test_city_block_coordinates() {
        let site = Polygon::new(vec![
            GeoPoint::new(76.9550, 11.0160),
            GeoPoint::new(76.9580, 11.0160),
            GeoPoint::new(76.9580, 11.0185),
            GeoPoint::new(76.9550, 11.0185),
        ])
        .unwrap();

        assert_eq!(site.contains(GeoPoint::new(76.9563, 11.0173)), Containment::Inside);
        assert_eq!(site.contains(GeoPoint::new(76.9590, 11.0173)), Containment::Outside);
    }

    #[test]
    fn test_antimeridian() {
        let pacific = Polygon::new(vec![
            GeoPoint::new(179.0, -1.0),
            GeoPoint::new(-179.0, -1.0),
            GeoPoint::new(-179.0, 1.0),
            GeoPoint::new(179.0, 1.0),
        ])
        .unwrap();

        assert!(pacific.crosses_antimeridian());
        assert_eq!(pacific.contains(GeoPoint::new(180.0, 0.0)), Containment::Inside);
        assert_eq!(pacific.contains(GeoPoint::new(-179.5, 0.0)), Containment::Inside);
        assert_eq!(pacific.contains(GeoPoint::new(179.5, 0.5)), Containment::Inside);
        assert_eq!(pacific.contains(GeoPoint::new(0.0, 0.0)), Containment::Outside);
        assert_eq!(pacific.contains(GeoPoint::new(178.0, 0.0)), Containment::Outside);
    }

    #[test]
    fn test_rejects_malformed() {
        let too_few = Polygon::new(vec![GeoPoint::new(0.0, 0.0), GeoPoint::new(1.0, 1.0)]);
        assert!(matches!(too_few, Err(Error::MalformedGeofence(_))));

        let bow_tie = Polygon::new(vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(10.0, 10.0),
            GeoPoint::new(10.0, 0.0),
            GeoPoint::new(0.0, 10.0),
        ]);
        assert!(matches!(bow_tie, Err(Error::MalformedGeofence(_))));

        let collinear = Polygon::new(vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(1.0, 1.0),
            GeoPoint::new(2.0, 2.0),
        ]);
        assert!(matches!(collinear, Err(Error::MalformedGeofence(_))));

        let nan = Polygon::new(vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(f64::NAN, 1.0),
            GeoPoint::new(2.0, 0.0),
        ]);
        assert!(matches!(nan, Err(Error::MalformedGeofence(_))));

        let out_of_range = Polygon::new(vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 95.0),
            GeoPoint::new(2.0, 0.0),
        ]);
        assert!(matches!(out_of_range, Err(Error::MalformedGeofence(_))));

        // Second edge folds back over the first
        let spike = Polygon::new(vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(10.0, 0.0),
            GeoPoint::new(5.0, 0.0),
            GeoPoint::new(5.0, 5.0),
        ]);
        assert!(matches!(spike, Err(Error::MalformedGeofence(_))));

        // Vertex touching a non-neighbouring edge
        let pinched = Polygon::new(vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(10.0, 0.0),
            GeoPoint::new(10.0, 10.0),
            GeoPoint::new(5.0, 0.0),
            GeoPoint::new(0.0, 10.0),
        ]);
        assert!(matches!(pinched, Err(Error::MalformedGeofence(_))));
    }

    #[test]
    fn test_straight_run_of_vertices_accepted() {
        let site = Polygon::new(vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(5.0, 0.0),
            GeoPoint::new(10.0, 0.0),
            GeoPoint::new(10.0, 10.0),
            GeoPoint::new(0.0, 10.0),
        ])
        .unwrap();
        assert_eq!(site.contains(GeoPoint::new(5.0, 5.0)), Containment::Inside);
        assert_eq!(site.contains(GeoPoint::new(5.0, 0.0)), Containment::Outside);
    }

    #[test]
    fn test_explicit_closure_dropped() {
        let closed = Polygon::new(vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 10.0),
            GeoPoint::new(10.0, 10.0),
            GeoPoint::new(10.0, 0.0),
            GeoPoint::new(0.0, 0.0),
        ])
        .unwrap();
        assert_eq!(closed.vertices().len(), 4);
        assert_eq!(closed, square());
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Polygon = serde_json::from_str("[[0,0],[0,10],[10,10],[10,0]]").unwrap();
        assert_eq!(ok, square());

        let bad: std::result::Result<Polygon, _> = serde_json::from_str("[[0,0],[1,1]]");
        assert!(bad.is_err());

        assert_eq!(serde_json::to_string(&ok).unwrap(), "[[0.0,0.0],[0.0,10.0],[10.0,10.0],[10.0,0.0]]");
    }
}
