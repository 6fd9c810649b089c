//! Short-range distance and bearing on fixed-point coordinates.
//!
//! Positions are packed as [`GeoPoint`] with `x` = longitude and
//! `y` = latitude, both in 1/3_600_000 degree. The longitude delta is
//! flattened with the cosine of the *first* point's latitude.

use std::f64::consts::PI;

use matty_proto::{Coordinate, UNITS_PER_DEGREE};

/// Metres per fixed-point unit along a meridian (40 000 km circumference).
pub const METERS_PER_UNIT: f64 = 40_000_000.0 / (360.0 * UNITS_PER_DEGREE);

/// Below this separation two points have no usable bearing.
pub const MIN_BEARING_DIST_M: f64 = 1.0;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeoPoint {
    /// Longitude units.
    pub x: i64,
    /// Latitude units.
    pub y: i64,
}

impl GeoPoint {
    fn cos_lat(&self) -> f64 {
        (self.y as f64 / UNITS_PER_DEGREE).to_radians().cos()
    }
}

impl From<Coordinate> for GeoPoint {
    fn from(c: Coordinate) -> Self {
        latlon2xy(c.lat, c.lon)
    }
}

pub fn latlon2xy(lat: f64, lon: f64) -> GeoPoint {
    let (y, x) = Coordinate::new(lat, lon).to_units();
    GeoPoint { x, y }
}

/// Planar approximation of the distance in metres; good for tens of metres.
pub fn geo_length(p1: GeoPoint, p2: GeoPoint) -> f64 {
    let dx = (p2.x - p1.x) as f64 * p1.cos_lat();
    let dy = (p2.y - p1.y) as f64;
    dx.hypot(dy) * METERS_PER_UNIT
}

/// Bearing from `p1` to `p2` in radians, 0 = east, counter-clockwise.
pub fn geo_angle(p1: GeoPoint, p2: GeoPoint) -> Option<f64> {
    if geo_length(p1, p2) < MIN_BEARING_DIST_M {
        return None;
    }
    let dx = (p2.x - p1.x) as f64 * p1.cos_lat();
    let dy = (p2.y - p1.y) as f64;
    Some(dy.atan2(dx))
}

/// Wraps an angle into (-pi, pi].
pub fn normalize_angle_pi(angle: f64) -> f64 {
    let a = angle.rem_euclid(2.0 * PI);
    if a > PI {
        a - 2.0 * PI
    } else {
        a
    }
}

/// Great-circle distance in metres.
pub fn haversine_m(a: Coordinate, b: Coordinate) -> f64 {
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}
