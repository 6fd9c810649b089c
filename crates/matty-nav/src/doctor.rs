use anyhow::{Context, Result};
use tracing::warn;

use matty_proto::Coordinate;

use crate::geofence::Geofence;
use crate::nav::NavConfig;

pub fn check_geofence(polygon: &[Coordinate], min_dist_from_border: f64) -> Result<Geofence> {
    let fence = Geofence::new(polygon).context("geofence.polygon")?;
    anyhow::ensure!(min_dist_from_border >= 0.0, "geofence.min_dist_from_border is negative");
    let center = fence.bounds().center();
    if !fence.contains(center) {
        // concave fence: sampling fallback would land outside
        warn!("doctor: geofence bounding box centre {:?} lies outside the polygon", center);
    }
    Ok(fence)
}

pub fn check_waypoints(waypoints: &[Coordinate], fence: Option<&Geofence>, margin_m: f64) -> Result<()> {
    anyhow::ensure!(!waypoints.is_empty(), "nav.waypoints must not be empty");
    for (i, wp) in waypoints.iter().enumerate() {
        anyhow::ensure!(
            wp.lat.abs() <= 90.0 && wp.lon.abs() <= 180.0,
            "nav.waypoints[{}] coordinates invalid: {:?}",
            i,
            wp
        );
        let Some(fence) = fence else { continue };
        let d = fence.border_distance(*wp);
        anyhow::ensure!(d > 0.0, "nav.waypoints[{}] {:?} is outside the geofence", i, wp);
        if d < margin_m {
            warn!("doctor: waypoint #{} is only {:.1}m from the border and will be replaced", i, d);
        }
    }
    Ok(())
}

pub fn check_nav(cfg: &NavConfig) -> Result<()> {
    cfg.validate()?;
    anyhow::ensure!(cfg.max_speed <= 2.0, "nav.max_speed above 2 m/s");
    anyhow::ensure!(
        cfg.remove_dist_m >= cfg.report_dist,
        "nav.remove_dist_m should cover nav.report_dist"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<Coordinate> {
        vec![
            Coordinate::new(50.11, 14.36),
            Coordinate::new(50.11, 14.52),
            Coordinate::new(50.04, 14.52),
            Coordinate::new(50.04, 14.36),
        ]
    }

    #[test]
    fn geofence_checks() {
        assert!(check_geofence(&square(), 2.0).is_ok());
        assert!(check_geofence(&square()[..2], 2.0).is_err());
        assert!(check_geofence(&square(), -1.0).is_err());
    }

    #[test]
    fn waypoints_must_be_inside() {
        let fence = check_geofence(&square(), 2.0).unwrap();
        assert!(check_waypoints(&[Coordinate::new(50.08, 14.42)], Some(&fence), 2.0).is_ok());
        assert!(check_waypoints(&[Coordinate::new(50.13, 14.40)], Some(&fence), 2.0).is_err());
        assert!(check_waypoints(&[Coordinate::new(50.13, 14.40)], None, 2.0).is_ok());
        assert!(check_waypoints(&[], None, 2.0).is_err());
        assert!(check_waypoints(&[Coordinate::new(95.0, 14.0)], None, 2.0).is_err());
    }

    #[test]
    fn nav_thresholds() {
        assert!(check_nav(&NavConfig::default()).is_ok());
        assert!(check_nav(&NavConfig { max_speed: 5.0, ..NavConfig::default() }).is_err());
        assert!(check_nav(&NavConfig { remove_dist_m: 1.0, ..NavConfig::default() }).is_err());
    }
}
