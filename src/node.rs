//! # Vehicle Node
//!
//! Everything one vehicle process runs: the startup sequence, then the
//! telemetry aggregator, the snapshot publisher and the flocking controller,
//! interleaved on one task. The optional telemetry recorder does file I/O and
//! runs on its own blocking task, fed by the publisher.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::controller::FlockingController;
use crate::error::Result;
use crate::flight::{FlightActuator, VelocityCommand};
use crate::snapshot::channel::SharedSnapshotChannel;
use crate::snapshot::publisher::SnapshotPublisher;
use crate::telemetry::recorder::{record_channel, TelemetryRecorder};
use crate::telemetry::source::TelemetrySource;
use crate::telemetry::{TelemetryAggregator, VehicleStateStore};

/// One vehicle of the swarm
pub struct VehicleNode {
    config: Config,
    channel: Arc<SharedSnapshotChannel>,
    actuator: Arc<dyn FlightActuator>,
    source: Arc<dyn TelemetrySource>,
    store: VehicleStateStore,
}

impl VehicleNode {
    pub fn new(
        config: Config,
        channel: Arc<SharedSnapshotChannel>,
        actuator: Arc<dyn FlightActuator>,
        source: Arc<dyn TelemetrySource>,
    ) -> Self {
        Self {
            config,
            channel,
            actuator,
            source,
            store: VehicleStateStore::new(),
        }
    }

    pub fn vehicle_id(&self) -> &str {
        &self.config.vehicle.id
    }

    /// Local state as merged by the aggregator
    pub fn store(&self) -> &VehicleStateStore {
        &self.store
    }

    /// Arm, prime a zero setpoint and enter offboard mode
    ///
    /// # Errors
    ///
    /// Any actuator failure here is returned; the vehicle cannot fly the
    /// swarm without it.
    pub async fn start(&self) -> Result<()> {
        info!("Vehicle {}: arming", self.vehicle_id());
        self.actuator.arm().await?;

        if self.config.vehicle.start_offboard {
            self.actuator.set_velocity(VelocityCommand::ZERO).await?;
            self.actuator.start_offboard().await?;
            info!("Vehicle {}: offboard mode started", self.vehicle_id());
        }

        Ok(())
    }

    /// Start the vehicle, then run every task until cancelled
    ///
    /// # Errors
    ///
    /// Returns the startup error, if any
    pub async fn run(&self) -> Result<()> {
        self.start().await?;

        let aggregator = TelemetryAggregator::new(self.store.clone());
        let mut publisher = SnapshotPublisher::new(
            Arc::clone(&self.channel),
            self.vehicle_id(),
            self.store.clone(),
            Duration::from_millis(self.config.channel.publish_interval_ms),
        );

        let mut recorder = None;
        if self.config.recorder.enabled {
            match TelemetryRecorder::new(self.config.recorder.clone(), self.vehicle_id()) {
                Ok(r) => {
                    let (tx, rx) = record_channel();
                    publisher = publisher.with_recorder(tx);
                    recorder = Some((r, rx));
                }
                Err(e) => warn!("Telemetry recorder disabled: {}", e),
            }
        }

        let controller = FlockingController::new(
            self.vehicle_id(),
            Arc::clone(&self.channel),
            Arc::clone(&self.actuator),
            &self.config.controller,
        );

        // Ends once the publisher, and with it the record sender, is dropped
        let recorder = recorder.map(|(recorder, records)| tokio::spawn(recorder.run(records)));

        tokio::join!(
            aggregator.run(self.source.as_ref()),
            publisher.run(),
            controller.run(),
        );

        if let Some(handle) = recorder {
            if let Err(e) = handle.await {
                warn!("Telemetry recorder task failed: {}", e);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        ChannelConfig, ControllerConfig, LivenessConfig, LoggingConfig, RecorderConfig,
        SimConfig, VehicleConfig,
    };
    use crate::error::SwarmError;
    use crate::flight::mocks::{Issued, RecordingActuator};
    use crate::flight::sim::{modes, SimVehicle};
    use crate::flight::MockFlightActuator;
    use crate::snapshot::channel::ChannelOptions;
    use crate::snapshot::region::MemoryRegion;

    fn config(id: &str, start_offboard: bool) -> Config {
        Config {
            vehicle: VehicleConfig {
                id: id.to_string(),
                start_offboard,
            },
            channel: ChannelConfig::default(),
            controller: ControllerConfig::default(),
            liveness: LivenessConfig::default(),
            recorder: RecorderConfig::default(),
            sim: SimConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    fn channel() -> Arc<SharedSnapshotChannel> {
        Arc::new(SharedSnapshotChannel::new(
            Arc::new(MemoryRegion::new("swarm", 4096)),
            ChannelOptions::default(),
        ))
    }

    #[tokio::test]
    async fn test_start_sequence() {
        let actuator = RecordingActuator::new();
        let sim = Arc::new(SimVehicle::new(&SimConfig::default()));
        let node = VehicleNode::new(config("1", true), channel(), Arc::new(actuator.clone()), sim);

        node.start().await.unwrap();

        assert_eq!(
            actuator.get_issued(),
            vec![
                Issued::Arm,
                Issued::Velocity(VelocityCommand::ZERO),
                Issued::StartOffboard
            ]
        );
    }

    #[tokio::test]
    async fn test_start_without_offboard() {
        let actuator = RecordingActuator::new();
        let sim = Arc::new(SimVehicle::new(&SimConfig::default()));
        let node = VehicleNode::new(config("1", false), channel(), Arc::new(actuator.clone()), sim);

        node.start().await.unwrap();
        assert_eq!(actuator.get_issued(), vec![Issued::Arm]);
    }

    #[tokio::test]
    async fn test_arm_failure_is_fatal() {
        let mut mock = MockFlightActuator::new();
        mock.expect_arm()
            .times(1)
            .returning(|| Err(SwarmError::Actuator("pre-arm check failed".to_string())));
        mock.expect_start_offboard().never();

        let sim = Arc::new(SimVehicle::new(&SimConfig::default()));
        let node = VehicleNode::new(config("1", true), channel(), Arc::new(mock), sim);

        assert!(matches!(node.run().await, Err(SwarmError::Actuator(_))));
    }

    #[tokio::test]
    async fn test_start_sim_vehicle_enters_offboard() {
        let sim = SimVehicle::new(&SimConfig::default());
        let node = VehicleNode::new(
            config("1", true),
            channel(),
            Arc::new(sim.clone()),
            Arc::new(sim.clone()),
        );

        node.start().await.unwrap();
        assert_eq!(sim.mode(), modes::OFFBOARD);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_publishes_local_vehicle() {
        let sim = SimVehicle::new(&SimConfig::default());
        let channel = channel();
        let node = Arc::new(VehicleNode::new(
            config("7", true),
            Arc::clone(&channel),
            Arc::new(sim.clone()),
            Arc::new(sim.clone()),
        ));

        let runner = Arc::clone(&node);
        let handle = tokio::spawn(async move { runner.run().await });
        tokio::time::sleep(Duration::from_millis(550)).await;
        handle.abort();

        let snapshot = channel.read().await;
        let entry = &snapshot["7"];
        assert_eq!(entry.latitude, Some(SimConfig::default().home_latitude));
        assert_eq!(entry.flight_mode.as_deref(), Some(modes::OFFBOARD));
        assert_eq!(entry.battery_percent, Some(100.0));
        assert!(entry.uptime.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_with_recorder_keeps_publishing() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = config("8", true);
        config.recorder = RecorderConfig {
            enabled: true,
            log_dir: dir.path().to_string_lossy().to_string(),
            record_interval_ms: 0,
            ..RecorderConfig::default()
        };

        let sim = SimVehicle::new(&SimConfig::default());
        let channel = channel();
        let node = Arc::new(VehicleNode::new(
            config,
            Arc::clone(&channel),
            Arc::new(sim.clone()),
            Arc::new(sim.clone()),
        ));

        let runner = Arc::clone(&node);
        let handle = tokio::spawn(async move { runner.run().await });
        tokio::time::sleep(Duration::from_millis(600)).await;
        handle.abort();
        // Let the recorder drain and close its file
        tokio::time::sleep(Duration::from_millis(100)).await;

        let snapshot = channel.read().await;
        assert_eq!(snapshot["8"].flight_mode.as_deref(), Some(modes::OFFBOARD));

        let logs: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(logs.len(), 1);
        let contents = std::fs::read_to_string(&logs[0]).unwrap();
        assert!(contents.lines().count() > 0);
        assert!(contents.lines().all(|l| l.contains("\"vehicle_id\":\"8\"")));
    }
}
