use serde::Deserialize;
use tracing::{debug, info};

use matty_proto::Coordinate;

use crate::geo::{geo_angle, geo_length, normalize_angle_pi, GeoPoint};

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Beyond this distance the waypoint bearing biases the steering.
    pub near_dist_m: f64,
    /// Magnitude of the steering bias.
    pub bias_deg: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self { near_dist_m: 20.0, bias_deg: 10.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadingSource {
    Gps,
    Imu,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Heading {
    /// Radians, 0 = east, counter-clockwise.
    pub rad: f64,
    pub source: HeadingSource,
}

/// Closest-waypoint bookkeeping for the navigation loop.
#[derive(Debug, Clone)]
pub struct WaypointTracker {
    cfg: TrackerConfig,
    waypoints: Vec<Coordinate>,
    closest: Option<usize>,
    closest_dist: Option<f64>,
    position: Option<Coordinate>,
    last_position: Option<Coordinate>,
    heading: Option<Heading>,
}

impl WaypointTracker {
    pub fn new(waypoints: Vec<Coordinate>, cfg: TrackerConfig) -> Self {
        Self {
            cfg,
            waypoints,
            closest: None,
            closest_dist: None,
            position: None,
            last_position: None,
            heading: None,
        }
    }

    pub fn waypoints(&self) -> &[Coordinate] {
        &self.waypoints
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn closest_index(&self) -> Option<usize> {
        self.closest
    }

    pub fn closest_distance(&self) -> Option<f64> {
        self.closest_dist
    }

    pub fn closest_waypoint(&self) -> Option<Coordinate> {
        self.closest.map(|i| self.waypoints[i])
    }

    /// Most recent fix.
    pub fn position(&self) -> Option<Coordinate> {
        self.position
    }

    /// Anchor of the GPS heading; trails the latest fix by up to
    /// `MIN_BEARING_DIST_M`.
    pub fn last_position(&self) -> Option<Coordinate> {
        self.last_position
    }

    pub fn heading(&self) -> Option<Heading> {
        self.heading
    }

    pub fn update_on_position(&mut self, pos: Coordinate) {
        let here = GeoPoint::from(pos);
        let dists: Vec<f64> = self
            .waypoints
            .iter()
            .map(|wp| geo_length(here, GeoPoint::from(*wp)))
            .collect();

        let mut best: Option<(usize, f64)> = None;
        for (i, &d) in dists.iter().enumerate() {
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((i, d));
            }
        }
        // A tie does not move the selection away from the current waypoint.
        if let (Some(cur), Some((_, bd))) = (self.closest, best) {
            if let Some(&dc) = dists.get(cur) {
                if dc <= bd {
                    best = Some((cur, dc));
                }
            }
        }

        let best_i = best.map(|(i, _)| i);
        if best_i != self.closest {
            match best {
                Some((i, d)) => info!("waypoints: switching to #{} at {:.1}m", i, d),
                None => info!("waypoints: no waypoint left"),
            }
            for (i, (wp, d)) in self.waypoints.iter().zip(&dists).enumerate() {
                debug!("waypoints:   #{} {:?} {:.1}m", i, wp, d);
            }
        }
        self.closest = best_i;
        self.closest_dist = best.map(|(_, d)| d);
        self.position = Some(pos);

        // Only a real displacement gives a usable GPS heading.
        match self.last_position {
            Some(prev) => {
                if let Some(angle) = geo_angle(GeoPoint::from(prev), here) {
                    self.last_position = Some(pos);
                    self.heading = Some(Heading { rad: angle, source: HeadingSource::Gps });
                }
            }
            None => self.last_position = Some(pos),
        }
    }

    pub fn update_imu_yaw(&mut self, yaw_rad: f64) {
        self.heading = Some(Heading { rad: normalize_angle_pi(yaw_rad), source: HeadingSource::Imu });
    }

    /// Drops the waypoint the robot has reported at.
    pub fn remove_closest(&mut self) -> Option<Coordinate> {
        let i = self.closest.take()?;
        self.closest_dist = None;
        let wp = self.waypoints.remove(i);
        info!("waypoints: removed #{} {:?}, {} left", i, wp, self.waypoints.len());
        Some(wp)
    }

    /// Inserts a waypoint; selection is recomputed on the next position.
    pub fn insert(&mut self, index: usize, wp: Coordinate) {
        let index = index.min(self.waypoints.len());
        self.waypoints.insert(index, wp);
        self.closest = None;
        self.closest_dist = None;
    }

    /// Replaces the closest waypoint, keeping its slot in the list.
    pub fn replace_closest(&mut self, wp: Coordinate) -> Option<Coordinate> {
        let i = self.closest?;
        let old = std::mem::replace(&mut self.waypoints[i], wp);
        if let Some(pos) = self.position {
            self.closest_dist = Some(geo_length(GeoPoint::from(pos), GeoPoint::from(wp)));
        }
        Some(old)
    }

    /// Constant-magnitude correction towards the closest waypoint, zero when
    /// it is near (local avoidance has priority) or the bearing is unknown.
    pub fn steering_bias(&self, current_heading: f64) -> f64 {
        let (Some(dist), Some(wp), Some(pos)) =
            (self.closest_dist, self.closest_waypoint(), self.position)
        else {
            return 0.0;
        };
        if dist <= self.cfg.near_dist_m {
            return 0.0;
        }
        let Some(to_waypoint) = geo_angle(GeoPoint::from(pos), GeoPoint::from(wp)) else {
            return 0.0;
        };
        let diff = normalize_angle_pi(to_waypoint - current_heading);
        if diff == 0.0 {
            return 0.0;
        }
        self.cfg.bias_deg.to_radians().copysign(diff)
    }
}
