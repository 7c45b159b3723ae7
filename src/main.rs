//! # Swarm Flock
//!
//! Run one vehicle of the swarm, or watch the shared snapshot.
//!
//! ```bash
//! swarm-flock --config config/default.toml run --id 2
//! swarm-flock --config config/default.toml monitor
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use swarm_flock::config::{Config, LoggingConfig};
use swarm_flock::flight::sim::SimVehicle;
use swarm_flock::node::VehicleNode;
use swarm_flock::snapshot::channel::{ChannelOptions, SharedSnapshotChannel};
use swarm_flock::snapshot::liveness::{LivenessTracker, VehicleStatus};
use swarm_flock::snapshot::region::MmapRegion;
use swarm_flock::telemetry::state::{GpsReading, NOT_AVAILABLE};

/// Log file name prefix inside `logging.directory`
const LOG_FILE_PREFIX: &str = "swarm-flock.log";

/// Swarm Flock - flocking and collision avoidance for vehicle swarms
#[derive(Parser, Debug)]
#[command(name = "swarm-flock")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/default.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fly one simulated vehicle of the swarm
    Run {
        /// Vehicle id (overrides `vehicle.id`)
        #[arg(long)]
        id: Option<String>,
    },
    /// Print every vehicle in the shared snapshot with its liveness
    Monitor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    // Only a flying vehicle needs an identity
    if let Commands::Run { id } = &cli.command {
        if let Some(id) = id {
            config.vehicle.id = id.clone();
        }
        config.validate_vehicle()?;
    }

    let _guard = init_tracing(&config.logging)?;

    info!("Swarm Flock v{} starting...", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Run { .. } => run_vehicle(config).await,
        Commands::Monitor => monitor(config).await,
    }
}

/// Initialize stdout logging, plus a daily log file when configured
///
/// `RUST_LOG` takes precedence over `logging.level`.
fn init_tracing(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let (file_layer, guard) = match &logging.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    Ok(guard)
}

fn open_channel(config: &Config) -> Result<SharedSnapshotChannel> {
    let region = MmapRegion::attach(
        &config.channel.directory,
        &config.channel.name,
        config.channel.capacity,
    )
    .context("Failed to attach shared snapshot region")?;

    Ok(SharedSnapshotChannel::new(
        Arc::new(region),
        ChannelOptions::from(&config.channel),
    ))
}

async fn run_vehicle(config: Config) -> Result<()> {
    let channel = Arc::new(open_channel(&config)?);

    let sim = SimVehicle::new(&config.sim);
    let physics = sim.spawn_physics();

    let vehicle_id = config.vehicle.id.clone();
    let node = VehicleNode::new(config, channel, Arc::new(sim.clone()), Arc::new(sim));

    info!("Vehicle {} joining swarm", vehicle_id);
    info!("Press Ctrl+C to exit");

    let result = tokio::select! {
        result = node.run() => result.context("Vehicle startup failed"),
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            Ok(())
        }
    };

    physics.abort();
    result
}

async fn monitor(config: Config) -> Result<()> {
    let channel = open_channel(&config)?;
    let mut tracker =
        LivenessTracker::new(Duration::from_millis(config.liveness.stale_after_ms));
    let mut ticker =
        tokio::time::interval(Duration::from_millis(config.liveness.monitor_interval_ms));

    info!(
        "Monitoring {} (stale after {}ms)",
        config.channel.name, config.liveness.stale_after_ms
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Instant::now();
                match channel.read_frame().await {
                    Some(frame) => tracker.observe(&frame.snapshot, now),
                    None => warn!("Snapshot unreadable, showing last known state"),
                }

                let report = tracker.report(now);
                if report.is_empty() {
                    info!("No vehicles in snapshot");
                }
                for status in &report {
                    info!("{}", format_status(status));
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    Ok(())
}

fn format_opt(value: Option<f64>, precision: usize) -> String {
    value.map_or_else(|| NOT_AVAILABLE.to_string(), |v| format!("{:.*}", precision, v))
}

fn format_gps(value: Option<GpsReading>) -> String {
    match value {
        Some(GpsReading::Value(v)) => v.to_string(),
        _ => NOT_AVAILABLE.to_string(),
    }
}

/// One monitor line for a vehicle
fn format_status(status: &VehicleStatus) -> String {
    let s = &status.state;
    format!(
        "[{}] vehicle {} age {:.1}s pos {},{} alt {}m speed {}m/s yaw {} batt {}% sats {} mode {} up {}",
        status.liveness,
        status.vehicle_id,
        status.age.as_secs_f64(),
        format_opt(s.latitude, 6),
        format_opt(s.longitude, 6),
        format_opt(s.relative_altitude, 1),
        format_opt(s.speed, 1),
        format_opt(s.yaw, 0),
        format_opt(s.battery_percent, 0),
        format_gps(s.satellites_visible),
        s.flight_mode.as_deref().unwrap_or(NOT_AVAILABLE),
        s.uptime.as_deref().unwrap_or(NOT_AVAILABLE),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm_flock::snapshot::liveness::Liveness;
    use swarm_flock::telemetry::state::VehicleState;

    #[test]
    fn test_cli_run_with_id() {
        let cli = Cli::try_parse_from(["swarm-flock", "--config", "swarm.toml", "run", "--id", "4"])
            .unwrap();
        assert_eq!(cli.config, PathBuf::from("swarm.toml"));
        assert!(matches!(cli.command, Commands::Run { id: Some(ref id) } if id == "4"));
    }

    #[test]
    fn test_cli_monitor_default_config() {
        let cli = Cli::try_parse_from(["swarm-flock", "monitor"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("config/default.toml"));
        assert!(matches!(cli.command, Commands::Monitor));
    }

    #[test]
    fn test_cli_requires_command() {
        assert!(Cli::try_parse_from(["swarm-flock"]).is_err());
    }

    #[test]
    fn test_format_status_full() {
        let status = VehicleStatus {
            vehicle_id: "2".to_string(),
            liveness: Liveness::Active,
            age: Duration::from_millis(300),
            state: VehicleState {
                latitude: Some(47.397742),
                longitude: Some(8.545594),
                relative_altitude: Some(10.04),
                speed: Some(1.2),
                yaw: Some(135.4),
                battery_percent: Some(97.6),
                satellites_visible: Some(GpsReading::Value(12)),
                flight_mode: Some("OFFBOARD".to_string()),
                uptime: Some("01:05".to_string()),
                ..VehicleState::default()
            },
        };

        assert_eq!(
            format_status(&status),
            "[ACTIVE] vehicle 2 age 0.3s pos 47.397742,8.545594 alt 10.0m speed 1.2m/s \
             yaw 135 batt 98% sats 12 mode OFFBOARD up 01:05"
        );
    }

    #[test]
    fn test_format_status_missing_fields() {
        let status = VehicleStatus {
            vehicle_id: "9".to_string(),
            liveness: Liveness::Stale,
            age: Duration::from_secs(4),
            state: VehicleState::default(),
        };

        let line = format_status(&status);
        assert!(line.starts_with("[STALE] vehicle 9 age 4.0s pos N/A,N/A"));
        assert!(line.ends_with("mode N/A up N/A"));
    }
}
