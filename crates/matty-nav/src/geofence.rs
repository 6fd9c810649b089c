//! Operational boundary polygon.
//!
//! Geometry runs in planar (lon, lat) degree space; distances reported to
//! callers are great-circle metres to the nearest boundary point.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::debug;

use matty_proto::Coordinate;

use crate::geo::haversine_m;

const SAMPLE_ATTEMPTS: usize = 10;
const SAMPLE_SEED: u64 = 0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeofenceError {
    #[error("invalid polygon: {0}")]
    InvalidPolygon(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl Bounds {
    pub fn center(&self) -> Coordinate {
        Coordinate::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }
}

/// Closed polygon with its own sampling stream.
///
/// Interior sampling is seeded with a fixed value, so the same sequence of
/// calls always yields the same waypoints.
#[derive(Debug, Clone)]
pub struct Geofence {
    // (x = lon, y = lat)
    ring: Vec<(f64, f64)>,
    bounds: Bounds,
    rng: StdRng,
}

impl Geofence {
    pub fn new(vertices: &[Coordinate]) -> Result<Self, GeofenceError> {
        if vertices.len() < 3 {
            return Err(GeofenceError::InvalidPolygon(format!(
                "a polygon needs at least 3 points, got {}",
                vertices.len()
            )));
        }
        if let Some(bad) = vertices.iter().find(|c| !c.is_finite()) {
            return Err(GeofenceError::InvalidPolygon(format!("non-finite vertex {:?}", bad)));
        }

        let ring: Vec<(f64, f64)> = vertices.iter().map(|c| (c.lon, c.lat)).collect();
        let bounds = ring.iter().fold(
            Bounds {
                min_lat: f64::INFINITY,
                min_lon: f64::INFINITY,
                max_lat: f64::NEG_INFINITY,
                max_lon: f64::NEG_INFINITY,
            },
            |b, &(x, y)| Bounds {
                min_lat: b.min_lat.min(y),
                min_lon: b.min_lon.min(x),
                max_lat: b.max_lat.max(y),
                max_lon: b.max_lon.max(x),
            },
        );
        if bounds.min_lat == bounds.max_lat || bounds.min_lon == bounds.max_lon {
            return Err(GeofenceError::InvalidPolygon("polygon has no area".into()));
        }

        debug!("geofence: {} vertices, bounds {:?}", ring.len(), bounds);
        Ok(Self { ring, bounds, rng: StdRng::seed_from_u64(SAMPLE_SEED) })
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn vertices(&self) -> impl Iterator<Item = Coordinate> + '_ {
        self.ring.iter().map(|&(lon, lat)| Coordinate::new(lat, lon))
    }

    /// Strictly inside; boundary points are not contained.
    pub fn contains(&self, c: Coordinate) -> bool {
        let p = (c.lon, c.lat);
        !self.on_boundary(p) && self.ray_cast(p)
    }

    /// Signed distance to the border in metres: positive inside, negative
    /// outside, exactly 0.0 on the border.
    pub fn border_distance(&self, c: Coordinate) -> f64 {
        let p = (c.lon, c.lat);
        if self.on_boundary(p) {
            return 0.0;
        }
        let (lon, lat) = self.nearest_on_boundary(p);
        let d = haversine_m(c, Coordinate::new(lat, lon));
        if self.ray_cast(p) {
            d
        } else {
            -d
        }
    }

    /// Random point at least `min_dist_from_border` metres inside the fence,
    /// or the bounding-box centre when no candidate qualifies.
    pub fn random_interior_waypoint(&mut self, min_dist_from_border: f64) -> Coordinate {
        let b = self.bounds;
        for _ in 0..SAMPLE_ATTEMPTS {
            let t: f64 = self.rng.gen();
            let u: f64 = self.rng.gen();
            let candidate = Coordinate::new(
                t * b.min_lat + (1.0 - t) * b.max_lat,
                u * b.min_lon + (1.0 - u) * b.max_lon,
            );
            if self.border_distance(candidate) > min_dist_from_border {
                return candidate;
            }
        }
        debug!("geofence: sampling failed, using bounding box centre");
        b.center()
    }

    fn edges(&self) -> impl Iterator<Item = ((f64, f64), (f64, f64))> + '_ {
        let n = self.ring.len();
        (0..n).map(move |i| (self.ring[i], self.ring[(i + 1) % n]))
    }

    fn on_boundary(&self, p: (f64, f64)) -> bool {
        self.edges().any(|(a, b)| on_segment(p, a, b))
    }

    // Even-odd ray casting
    fn ray_cast(&self, (x, y): (f64, f64)) -> bool {
        let mut inside = false;
        for ((xi, yi), (xj, yj)) in self.edges() {
            if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
        }
        inside
    }

    fn nearest_on_boundary(&self, p: (f64, f64)) -> (f64, f64) {
        let mut best = self.ring[0];
        let mut best_d2 = f64::INFINITY;
        for (a, b) in self.edges() {
            let q = closest_on_segment(p, a, b);
            let d2 = (q.0 - p.0).powi(2) + (q.1 - p.1).powi(2);
            if d2 < best_d2 {
                best_d2 = d2;
                best = q;
            }
        }
        best
    }
}

fn on_segment(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> bool {
    let cross = (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0);
    cross == 0.0
        && p.0 >= a.0.min(b.0)
        && p.0 <= a.0.max(b.0)
        && p.1 >= a.1.min(b.1)
        && p.1 <= a.1.max(b.1)
}

fn closest_on_segment(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> (f64, f64) {
    let (vx, vy) = (b.0 - a.0, b.1 - a.1);
    let (wx, wy) = (p.0 - a.0, p.1 - a.1);
    let c1 = wx * vx + wy * vy;
    if c1 <= 0.0 {
        return a;
    }
    let c2 = vx * vx + vy * vy;
    if c2 <= c1 {
        return b;
    }
    let t = c1 / c2;
    (a.0 + t * vx, a.1 + t * vy)
}
