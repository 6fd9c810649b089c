use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};

use matty_nav::doctor as nav_doctor;
use matty_nav::{ControlOutcome, Geofence, GnssSource, Mode, NavConfig, NavEngine, NavEvent};
use matty_proto::{codec, Assessment, Coordinate, ReportView, SystemId, TriageReport};

#[derive(Debug, Parser)]
#[command(name = "matty", version, about = "Matty - casualty triage reporting and geofenced navigation")]
struct Cli {
    #[arg(long)]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Doctor,
    Report { #[command(subcommand)] cmd: ReportCmd },
    Fence { #[command(subcommand)] cmd: FenceCmd },
    /// Replay position fixes through the navigation engine.
    Run {
        /// Pretend a casualty lies at every waypoint.
        #[arg(long)]
        simulate_casualties: bool,
    },
}

#[derive(Debug, Subcommand)]
enum ReportCmd {
    /// Pack a JSON report view into the radio payload (hex).
    Encode { view: String },
    /// Unpack a hex radio payload into the JSON report view.
    Decode { hex: String },
    /// Turn an evaluator assessment (JSON) into a radio payload.
    Assess {
        assessment: String,
        #[arg(long, allow_negative_numbers = true, requires = "lon")]
        lat: Option<f64>,
        #[arg(long, allow_negative_numbers = true, requires = "lat")]
        lon: Option<f64>,
    },
}

#[derive(Debug, Subcommand)]
enum FenceCmd {
    /// Signed distance to the border in metres (negative = outside).
    Dist {
        #[arg(allow_negative_numbers = true)]
        lat: f64,
        #[arg(allow_negative_numbers = true)]
        lon: f64,
    },
    /// Random waypoints inside the fence.
    Sample {
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
}

#[derive(Debug, serde::Deserialize)]
struct Config {
    robot: RobotCfg,
    gnss: GnssCfg,
    #[serde(default)]
    nav: NavConfig,
    geofence: Option<GeofenceCfg>,
}

#[derive(Debug, serde::Deserialize)]
struct RobotCfg {
    system: SystemId,
    team: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct GnssCfg {
    source: String,
    nmea_device: Option<String>,
    nmea_file: Option<String>,
    #[serde(default = "default_baud")]
    baud: u32,
}

fn default_baud() -> u32 {
    9600
}

#[derive(Debug, serde::Deserialize)]
struct GeofenceCfg {
    polygon: Vec<Coordinate>,
}

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).context("read config")?;
    toml::from_str(&s).context("parse config toml")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.cmd {
        Command::Doctor => doctor(&cfg).await?,
        Command::Report { cmd } => report_cmd(&cfg, cmd).await?,
        Command::Fence { cmd } => fence_cmd(&cfg, cmd)?,
        Command::Run { simulate_casualties } => run(&cfg, simulate_casualties).await?,
    }
    Ok(())
}

async fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");

    nav_doctor::check_nav(&cfg.nav)?;
    let fence = match &cfg.geofence {
        Some(g) => Some(nav_doctor::check_geofence(&g.polygon, cfg.nav.fence_margin_m)?),
        None => {
            warn!("doctor: no [geofence] section, robot is not contained");
            None
        }
    };
    nav_doctor::check_waypoints(&cfg.nav.waypoints, fence.as_ref(), cfg.nav.fence_margin_m)?;

    match cfg.gnss.source.as_str() {
        "nmea-serial" => {
            anyhow::ensure!(
                cfg.gnss.nmea_device.as_ref().map(|s| !s.is_empty()).unwrap_or(false),
                "gnss.nmea_device missing"
            );
            anyhow::ensure!(cfg.gnss.baud > 0, "gnss.baud invalid");
        }
        "nmea-file" => {
            let path = cfg.gnss.nmea_file.as_ref().context("gnss.nmea_file missing")?;
            anyhow::ensure!(std::path::Path::new(path).exists(), "gnss.nmea_file {} not found", path);
        }
        other => anyhow::bail!("unknown gnss.source: {}", other),
    }

    // radio payload must survive a round trip for this robot
    let probe = TriageReport::new(cfg.robot.system, cfg.nav.waypoints.first().copied());
    let packet = codec::encode(&probe).context("codec self-test encode")?;
    let back = codec::decode(&packet).context("codec self-test decode")?;
    anyhow::ensure!(back.system == probe.system, "codec self-test: system mismatch");

    info!("doctor: OK");
    Ok(())
}

async fn report_cmd(cfg: &Config, cmd: ReportCmd) -> Result<()> {
    match cmd {
        ReportCmd::Encode { view } => {
            let s = tokio::fs::read_to_string(&view).await.with_context(|| format!("read {}", view))?;
            let view: ReportView = serde_json::from_str(&s).context("parse report view json")?;
            let report = TriageReport::try_from(view)?;
            let packet = codec::encode(&report)?;
            info!("report: {} bytes for {}", packet.len(), report.system);
            println!("{}", hex::encode(&packet));
        }
        ReportCmd::Decode { hex } => {
            let packet = match hex::decode(hex.trim()) {
                Ok(p) => p,
                Err(e) => {
                    warn!("report: not a hex payload: {}", e);
                    return Ok(());
                }
            };
            match codec::decode(&packet) {
                Ok(report) => println!("{}", view_json(cfg, &report)?),
                Err(e) => warn!("report: dropping packet {}: {}", hex::encode(&packet), e),
            }
        }
        ReportCmd::Assess { assessment, lat, lon } => {
            let s = tokio::fs::read_to_string(&assessment)
                .await
                .with_context(|| format!("read {}", assessment))?;
            let a: Assessment = serde_json::from_str(&s).context("parse assessment json")?;
            let location = lat.zip(lon).map(|(lat, lon)| Coordinate::new(lat, lon));
            let report = a.into_report(cfg.robot.system, location)?;
            let packet = codec::encode(&report)?;
            println!("{}", hex::encode(&packet));
            println!("{}", view_json(cfg, &report)?);
        }
    }
    Ok(())
}

fn view_json(cfg: &Config, report: &TriageReport) -> Result<String> {
    let mut view = report.to_view(0);
    if let Some(team) = &cfg.robot.team {
        view = view.with_team(team.clone());
    }
    serde_json::to_string_pretty(&view).context("serialize report view")
}

fn load_fence(cfg: &Config) -> Result<Geofence> {
    let g = cfg.geofence.as_ref().context("no [geofence] config section")?;
    Geofence::new(&g.polygon).context("geofence.polygon")
}

fn fence_cmd(cfg: &Config, cmd: FenceCmd) -> Result<()> {
    let mut fence = load_fence(cfg)?;
    match cmd {
        FenceCmd::Dist { lat, lon } => {
            let d = fence.border_distance(Coordinate::new(lat, lon));
            println!("{:.2}", d);
        }
        FenceCmd::Sample { count } => {
            for _ in 0..count {
                let wp = fence.random_interior_waypoint(cfg.nav.fence_margin_m);
                println!("{:.7} {:.7}", wp.lat, wp.lon);
            }
        }
    }
    Ok(())
}

async fn run(cfg: &Config, simulate_casualties: bool) -> Result<()> {
    info!("run: starting as {}", cfg.robot.system);

    let mut src = match cfg.gnss.source.as_str() {
        "nmea-serial" => GnssSource::serial(
            cfg.gnss.nmea_device.as_ref().context("gnss.nmea_device missing")?,
            cfg.gnss.baud,
        )?,
        "nmea-file" => {
            GnssSource::file(cfg.gnss.nmea_file.as_ref().context("gnss.nmea_file missing")?).await?
        }
        other => anyhow::bail!("unknown gnss.source: {}", other),
    };

    let fence = match &cfg.geofence {
        Some(_) => Some(load_fence(cfg)?),
        None => None,
    };
    let mut engine = NavEngine::new(cfg.nav.clone(), fence)?;
    let mut reports = 0usize;

    loop {
        let fix = tokio::select! {
            fix = src.next_fix() => fix?,
            _ = tokio::signal::ctrl_c() => {
                info!("run: interrupted");
                break;
            }
        };
        let Some(fix) = fix else {
            info!("run: end of position input");
            break;
        };
        let time = fix.ts;
        engine.handle(NavEvent::Position(fix));

        let casualty_dist = if simulate_casualties { engine.tracker().closest_distance() } else { None };
        let tick = NavEvent::Tick { time, local_steering: Some(0.0), casualty_dist };
        match engine.handle(tick) {
            ControlOutcome::Stop => {
                warn!("run: stopped by the navigation engine");
                break;
            }
            ControlOutcome::Continue(Some(cmd)) => {
                let (speed, steering) = cmd.desired_steering();
                debug!("run: {:?} desired_steering=[{}, {}]", engine.mode(), speed, steering);
                if let Some(location) = cmd.report {
                    let report = TriageReport::new(cfg.robot.system, Some(location));
                    match codec::encode(&report) {
                        Ok(packet) => {
                            reports += 1;
                            info!("run: report #{} {}", reports, hex::encode(&packet));
                        }
                        Err(e) => warn!("run: cannot pack report at {:?}: {}", location, e),
                    }
                }
            }
            ControlOutcome::Continue(None) => {}
        }

        if engine.mode() == Mode::Finished {
            info!("run: all waypoints visited");
            break;
        }
    }

    info!("run: {} reports, {} waypoints left", reports, engine.tracker().waypoints().len());
    Ok(())
}
