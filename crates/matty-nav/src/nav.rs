//! Per-tick navigation control.
//!
//! [`NavEngine`] consumes position fixes and control ticks and produces
//! drive commands. Behaviour is selected by a single [`Mode`]; there is one
//! dispatch point per tick.

use anyhow::Result;
use serde::Deserialize;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use matty_proto::Coordinate;

use crate::geofence::Geofence;
use crate::gnss::GnssFix;
use crate::waypoints::{TrackerConfig, WaypointTracker};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    pub max_speed: f64,
    /// A casualty closer than this triggers a report stop.
    pub report_dist: f64,
    /// During the hold phase, the closest waypoint is dropped when nearer than this.
    pub remove_dist_m: f64,
    pub report_stop_s: f64,
    pub report_hold_s: f64,
    pub backup_s: f64,
    pub backup_speed: f64,
    pub backup_steering_deg: f64,
    /// Target waypoints closer than this to the geofence border get replaced.
    pub fence_margin_m: f64,
    pub terminate_on_stop: bool,
    pub waypoints: Vec<Coordinate>,
    pub tracker: TrackerConfig,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            max_speed: 0.2,
            report_dist: 2.0,
            remove_dist_m: 10.0,
            report_stop_s: 3.0,
            report_hold_s: 10.0,
            backup_s: 5.0,
            backup_speed: 0.2,
            backup_steering_deg: 10.0,
            fence_margin_m: 2.0,
            terminate_on_stop: true,
            waypoints: Vec::new(),
            tracker: TrackerConfig::default(),
        }
    }
}

impl NavConfig {
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.max_speed > 0.0, "nav.max_speed must be positive");
        anyhow::ensure!(self.report_dist > 0.0, "nav.report_dist must be positive");
        anyhow::ensure!(self.remove_dist_m > 0.0, "nav.remove_dist_m must be positive");
        anyhow::ensure!(self.report_stop_s >= 0.0, "nav.report_stop_s is negative");
        anyhow::ensure!(
            self.report_hold_s >= self.report_stop_s,
            "nav.report_hold_s must not be shorter than nav.report_stop_s"
        );
        anyhow::ensure!(self.backup_s >= 0.0, "nav.backup_s is negative");
        anyhow::ensure!(self.backup_speed > 0.0, "nav.backup_speed must be positive (reverse is implied)");
        anyhow::ensure!(self.fence_margin_m >= 0.0, "nav.fence_margin_m is negative");
        anyhow::ensure!(self.tracker.near_dist_m >= 0.0, "nav.tracker.near_dist_m is negative");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    FollowPath,
    /// Stopped at a casualty, then ignoring new ones while the reached
    /// waypoint is dropped.
    Reporting { since: OffsetDateTime },
    /// Reversing after a bumper hit. `resume` holds the start of an
    /// interrupted report, which continues once the backup ends.
    Backup { since: OffsetDateTime, resume: Option<OffsetDateTime> },
    Finished,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NavEvent {
    Position(GnssFix),
    /// `local_steering` is the obstacle-avoidance angle in radians (left
    /// positive), `None` when there is no free way. `casualty_dist` is the
    /// distance to the nearest detected casualty in metres.
    Tick {
        time: OffsetDateTime,
        local_steering: Option<f64>,
        casualty_dist: Option<f64>,
    },
    Bumper { time: OffsetDateTime },
    EmergencyStop(bool),
    ImuYaw(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Command {
    pub speed_mps: f64,
    pub steering_rad: f64,
    /// Casualty location to report, set on the tick a report stop begins.
    pub report: Option<Coordinate>,
}

impl Command {
    pub fn halt() -> Self {
        Self { speed_mps: 0.0, steering_rad: 0.0, report: None }
    }

    pub fn drive(speed_mps: f64, steering_rad: f64) -> Self {
        Self { speed_mps, steering_rad, report: None }
    }

    /// Motor controller units: mm/s and hundredths of a degree.
    pub fn desired_steering(&self) -> (i32, i32) {
        (
            (self.speed_mps * 1000.0).round() as i32,
            (self.steering_rad.to_degrees() * 100.0).round() as i32,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControlOutcome {
    Continue(Option<Command>),
    /// Emergency stop requested; the control loop should terminate.
    Stop,
}

pub struct NavEngine {
    cfg: NavConfig,
    tracker: WaypointTracker,
    fence: Option<Geofence>,
    mode: Mode,
    // interior waypoint inserted while the robot was outside the fence
    detour: Option<Coordinate>,
}

impl NavEngine {
    pub fn new(cfg: NavConfig, fence: Option<Geofence>) -> Result<Self> {
        cfg.validate()?;
        let tracker = WaypointTracker::new(cfg.waypoints.clone(), cfg.tracker);
        let mode = if tracker.is_empty() { Mode::Finished } else { Mode::FollowPath };
        info!("nav: {} waypoints, geofence={}", tracker.waypoints().len(), fence.is_some());
        Ok(Self { cfg, tracker, fence, mode, detour: None })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn tracker(&self) -> &WaypointTracker {
        &self.tracker
    }

    pub fn fence(&self) -> Option<&Geofence> {
        self.fence.as_ref()
    }

    pub fn handle(&mut self, event: NavEvent) -> ControlOutcome {
        match event {
            NavEvent::Position(fix) => {
                self.on_position(fix.position);
                ControlOutcome::Continue(None)
            }
            NavEvent::Tick { time, local_steering, casualty_dist } => {
                ControlOutcome::Continue(Some(self.on_tick(time, local_steering, casualty_dist)))
            }
            NavEvent::Bumper { time } => {
                let resume = match self.mode {
                    Mode::Finished => return ControlOutcome::Continue(None),
                    Mode::Reporting { since } => Some(since),
                    Mode::Backup { resume, .. } => resume,
                    Mode::FollowPath => None,
                };
                info!("nav: bumper hit, backing up for {}s", self.cfg.backup_s);
                self.mode = Mode::Backup { since: time, resume };
                ControlOutcome::Continue(None)
            }
            NavEvent::EmergencyStop(active) => {
                if active && self.cfg.terminate_on_stop {
                    warn!("nav: emergency stop");
                    return ControlOutcome::Stop;
                }
                debug!("nav: emergency stop={} ignored", active);
                ControlOutcome::Continue(None)
            }
            NavEvent::ImuYaw(yaw) => {
                self.tracker.update_imu_yaw(yaw);
                ControlOutcome::Continue(None)
            }
        }
    }

    fn on_position(&mut self, pos: Coordinate) {
        self.tracker.update_on_position(pos);
        if self.mode == Mode::Finished {
            return;
        }
        self.keep_inside_fence(pos);

        if let (Some(detour), Some(wp), Some(d)) =
            (self.detour, self.tracker.closest_waypoint(), self.tracker.closest_distance())
        {
            if wp == detour && d < self.cfg.remove_dist_m {
                info!("nav: detour waypoint reached");
                self.tracker.remove_closest();
                self.detour = None;
            }
        }
    }

    fn keep_inside_fence(&mut self, pos: Coordinate) {
        let Some(fence) = self.fence.as_mut() else { return };
        let margin = self.cfg.fence_margin_m;

        if self.detour.is_none() && fence.border_distance(pos) < 0.0 {
            let wp = fence.random_interior_waypoint(margin);
            warn!("nav: robot at {:?} is outside the geofence, detour via {:?}", pos, wp);
            self.tracker.insert(0, wp);
            self.tracker.update_on_position(pos);
            self.detour = Some(wp);
        }

        let Some(target) = self.tracker.closest_waypoint() else { return };
        if Some(target) == self.detour {
            return;
        }
        let d = fence.border_distance(target);
        if d < margin {
            let wp = fence.random_interior_waypoint(margin);
            warn!("nav: waypoint {:?} is {:.1}m from the geofence border, replaced by {:?}", target, d, wp);
            self.tracker.replace_closest(wp);
        }
    }

    fn on_tick(
        &mut self,
        time: OffsetDateTime,
        local_steering: Option<f64>,
        casualty_dist: Option<f64>,
    ) -> Command {
        if self.mode == Mode::Finished {
            return Command::halt();
        }
        if let Mode::Backup { since, resume } = self.mode {
            if seconds_since(since, time) < self.cfg.backup_s {
                return Command::drive(
                    -self.cfg.backup_speed,
                    self.cfg.backup_steering_deg.to_radians(),
                );
            }
            debug!("nav: backup finished");
            self.mode = match resume {
                Some(since) => Mode::Reporting { since },
                None => Mode::FollowPath,
            };
        }
        if let Mode::Reporting { since } = self.mode {
            let elapsed = seconds_since(since, time);
            if elapsed < self.cfg.report_stop_s {
                return Command::halt();
            }
            if elapsed < self.cfg.report_hold_s {
                self.drop_reported_waypoint();
                if self.mode == Mode::Finished {
                    return Command::halt();
                }
            } else {
                debug!("nav: report finished");
                self.mode = Mode::FollowPath;
            }
        }

        if self.mode == Mode::FollowPath {
            if let Some(d) = casualty_dist.filter(|d| *d < self.cfg.report_dist) {
                return self.start_report(time, d);
            }
        }

        let Some(mut steering) = local_steering else {
            warn!("nav: no free space, stopping");
            return Command::halt();
        };
        if steering == 0.0 {
            if let Some(h) = self.tracker.heading() {
                steering = self.tracker.steering_bias(h.rad);
            }
        }
        Command::drive(self.cfg.max_speed, steering)
    }

    fn start_report(&mut self, time: OffsetDateTime, dist: f64) -> Command {
        self.mode = Mode::Reporting { since: time };
        let location = self.tracker.position();
        match location {
            Some(pos) => info!("nav: casualty at {:.1}m, reporting {:?}", dist, pos),
            None => warn!("nav: casualty at {:.1}m but no position fix to report", dist),
        }
        Command { report: location, ..Command::halt() }
    }

    fn drop_reported_waypoint(&mut self) {
        let near = self
            .tracker
            .closest_distance()
            .map_or(false, |d| d < self.cfg.remove_dist_m);
        if !near {
            return;
        }
        let removed = self.tracker.remove_closest();
        if removed.is_some() && removed == self.detour {
            self.detour = None;
        }
        if self.tracker.is_empty() {
            info!("nav: all waypoints visited");
            self.mode = Mode::Finished;
        }
    }
}

fn seconds_since(since: OffsetDateTime, now: OffsetDateTime) -> f64 {
    (now - since).as_seconds_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;
    use time::macros::datetime;
    use time::Duration;

    const T0: OffsetDateTime = datetime!(2025-06-01 10:00 UTC);

    fn cfg(waypoints: Vec<Coordinate>) -> NavConfig {
        NavConfig { waypoints, ..NavConfig::default() }
    }

    fn engine(waypoints: Vec<Coordinate>) -> NavEngine {
        NavEngine::new(cfg(waypoints), None).unwrap()
    }

    fn two_waypoints() -> Vec<Coordinate> {
        vec![Coordinate::new(50.000, 14.0), Coordinate::new(50.001, 14.0)]
    }

    fn position(lat: f64, lon: f64) -> NavEvent {
        NavEvent::Position(GnssFix { position: Coordinate::new(lat, lon), quality: None, ts: T0 })
    }

    fn tick(nav: &mut NavEngine, secs: i64, steering: Option<f64>, casualty: Option<f64>) -> Command {
        let ev = NavEvent::Tick {
            time: T0 + Duration::seconds(secs),
            local_steering: steering,
            casualty_dist: casualty,
        };
        match nav.handle(ev) {
            ControlOutcome::Continue(Some(cmd)) => cmd,
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    // ~330m x 290m box around the test waypoints
    fn fence() -> Geofence {
        Geofence::new(&[
            Coordinate::new(49.999, 13.998),
            Coordinate::new(49.999, 14.002),
            Coordinate::new(50.002, 14.002),
            Coordinate::new(50.002, 13.998),
        ])
        .unwrap()
    }

    #[test]
    fn report_stop_then_waypoint_removal() {
        let mut nav = engine(two_waypoints());
        nav.handle(position(50.0, 14.0));
        assert_eq!(nav.tracker().closest_index(), Some(0));

        let cmd = tick(&mut nav, 0, Some(0.0), Some(1.5));
        assert_eq!(cmd.speed_mps, 0.0);
        assert_eq!(cmd.report, Some(Coordinate::new(50.0, 14.0)));
        assert_eq!(nav.mode(), Mode::Reporting { since: T0 });

        // stop phase: halted, no repeated report
        let cmd = tick(&mut nav, 1, Some(0.0), Some(1.5));
        assert_eq!(cmd, Command::halt());
        assert_eq!(nav.tracker().waypoints().len(), 2);

        // hold phase: reached waypoint is dropped, driving resumes
        let cmd = tick(&mut nav, 4, Some(0.0), Some(1.5));
        assert_eq!(cmd.speed_mps, 0.2);
        assert_eq!(cmd.report, None);
        assert_eq!(nav.tracker().waypoints(), &[Coordinate::new(50.001, 14.0)]);

        let cmd = tick(&mut nav, 11, Some(0.0), None);
        assert_eq!(nav.mode(), Mode::FollowPath);
        assert_eq!(cmd.speed_mps, 0.2);
    }

    #[test]
    fn far_waypoint_is_kept_after_report() {
        let mut nav = engine(two_waypoints());
        nav.handle(position(50.0005, 14.0005));
        tick(&mut nav, 0, Some(0.0), Some(1.0));
        tick(&mut nav, 5, Some(0.0), None);
        assert_eq!(nav.tracker().waypoints().len(), 2);
    }

    #[test]
    fn last_waypoint_finishes() {
        let mut nav = engine(vec![Coordinate::new(50.0, 14.0)]);
        nav.handle(position(50.00001, 14.0));
        tick(&mut nav, 0, Some(0.0), Some(0.5));
        assert_eq!(tick(&mut nav, 3, Some(0.0), None), Command::halt());
        assert_eq!(nav.mode(), Mode::Finished);
        assert!(nav.tracker().is_empty());
        assert_eq!(tick(&mut nav, 20, Some(0.1), Some(0.5)), Command::halt());
    }

    #[test]
    fn report_uses_latest_fix() {
        let mut nav = engine(two_waypoints());
        nav.handle(position(50.0, 14.0));
        // 0.5m: below the heading threshold
        nav.handle(position(50.0000045, 14.0));
        let cmd = tick(&mut nav, 0, Some(0.0), Some(1.0));
        assert_eq!(cmd.report, Some(Coordinate::new(50.0000045, 14.0)));
    }

    #[test]
    fn bumper_triggers_backup() {
        let mut nav = engine(two_waypoints());
        let out = nav.handle(NavEvent::Bumper { time: T0 });
        assert_eq!(out, ControlOutcome::Continue(None));

        let cmd = tick(&mut nav, 1, Some(0.0), None);
        assert_eq!(cmd.speed_mps, -0.2);
        assert_abs_diff_eq!(cmd.steering_rad, 10f64.to_radians(), epsilon = 1e-12);
        assert_eq!(cmd.desired_steering(), (-200, 1000));

        let cmd = tick(&mut nav, 6, Some(0.0), None);
        assert_eq!(nav.mode(), Mode::FollowPath);
        assert_eq!(cmd.speed_mps, 0.2);
    }

    #[test]
    fn report_survives_a_bumper_hit() {
        let mut nav = engine(two_waypoints());
        nav.handle(position(50.0, 14.0));
        assert!(tick(&mut nav, 0, Some(0.0), Some(1.0)).report.is_some());

        nav.handle(NavEvent::Bumper { time: T0 + Duration::seconds(1) });
        assert_eq!(
            nav.mode(),
            Mode::Backup { since: T0 + Duration::seconds(1), resume: Some(T0) }
        );
        assert!(tick(&mut nav, 3, Some(0.0), Some(1.0)).speed_mps < 0.0);

        // backup over, still inside the hold window: no second report,
        // the reached waypoint goes away
        let cmd = tick(&mut nav, 7, Some(0.0), Some(1.0));
        assert_eq!(cmd.report, None);
        assert_eq!(nav.mode(), Mode::Reporting { since: T0 });
        assert_eq!(nav.tracker().waypoints(), &[Coordinate::new(50.001, 14.0)]);

        tick(&mut nav, 11, Some(0.0), None);
        assert_eq!(nav.mode(), Mode::FollowPath);
    }

    #[test]
    fn emergency_stop() {
        let mut nav = engine(two_waypoints());
        assert_eq!(nav.handle(NavEvent::EmergencyStop(false)), ControlOutcome::Continue(None));
        assert_eq!(nav.handle(NavEvent::EmergencyStop(true)), ControlOutcome::Stop);

        let mut nav =
            NavEngine::new(NavConfig { terminate_on_stop: false, ..cfg(two_waypoints()) }, None).unwrap();
        assert_eq!(nav.handle(NavEvent::EmergencyStop(true)), ControlOutcome::Continue(None));
    }

    #[test]
    fn no_free_space_halts() {
        let mut nav = engine(two_waypoints());
        assert_eq!(tick(&mut nav, 0, None, None), Command::halt());
    }

    #[test]
    fn steering_bias_only_without_local_steering() {
        let mut nav = engine(two_waypoints());
        // ~100m west of the waypoints, facing north
        nav.handle(position(50.001, 13.9986));
        nav.handle(NavEvent::ImuYaw(FRAC_PI_2));

        let cmd = tick(&mut nav, 0, Some(0.0), None);
        assert_abs_diff_eq!(cmd.steering_rad, -10f64.to_radians(), epsilon = 1e-12);

        let cmd = tick(&mut nav, 1, Some(0.3), None);
        assert_eq!(cmd.steering_rad, 0.3);
    }

    #[test]
    fn waypoint_near_border_is_replaced() {
        let outside = Coordinate::new(50.005, 14.0);
        let mut nav = NavEngine::new(cfg(vec![outside]), Some(fence())).unwrap();
        nav.handle(position(50.0, 14.0));

        let wp = nav.tracker().closest_waypoint().unwrap();
        assert_ne!(wp, outside);
        assert_eq!(nav.tracker().waypoints().len(), 1);
        assert!(nav.fence().unwrap().border_distance(wp) > 2.0);
    }

    #[test]
    fn robot_outside_gets_detour() {
        let mut nav = NavEngine::new(cfg(vec![Coordinate::new(50.0, 14.0)]), Some(fence())).unwrap();
        nav.handle(position(50.003, 14.0));
        assert_eq!(nav.tracker().waypoints().len(), 2);
        let detour = nav.tracker().waypoints()[0];
        assert!(nav.fence().unwrap().contains(detour));

        // still outside: no second detour
        nav.handle(position(50.0031, 14.0));
        assert_eq!(nav.tracker().waypoints().len(), 2);

        // arriving at the detour drops it
        nav.handle(position(detour.lat, detour.lon));
        assert_eq!(nav.tracker().waypoints(), &[Coordinate::new(50.0, 14.0)]);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let bad = NavConfig { report_hold_s: 1.0, ..NavConfig::default() };
        assert!(bad.validate().is_err());
        let bad = NavConfig { max_speed: 0.0, ..NavConfig::default() };
        assert!(NavEngine::new(bad, None).is_err());
        let empty = NavEngine::new(NavConfig::default(), None).unwrap();
        assert_eq!(empty.mode(), Mode::Finished);
    }
}
