//! Geofenced waypoint navigation for the Matty robots.

pub mod doctor;
pub mod geo;
pub mod geofence;
pub mod gnss;
pub mod nav;
pub mod waypoints;

pub use geofence::{Bounds, Geofence, GeofenceError};
pub use gnss::{FixQuality, GnssFix, GnssSource, NmeaParser};
pub use nav::{Command, ControlOutcome, Mode, NavConfig, NavEngine, NavEvent};
pub use waypoints::{Heading, HeadingSource, TrackerConfig, WaypointTracker};
