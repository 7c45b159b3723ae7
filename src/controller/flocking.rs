//! # Flocking Controller Loop
//!
//! Reads the swarm snapshot on a fixed tick, decides a command and sends it
//! to the flight actuator. Actuator failures are logged and the loop moves
//! on to the next tick; the failed command is not retried and no fallback
//! command is sent.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::regime::{decide, Command, Decision, FlockingParams, Regime};
use crate::config::ControllerConfig;
use crate::error::Result;
use crate::flight::FlightActuator;
use crate::snapshot::channel::SharedSnapshotChannel;
use crate::telemetry::state::VehicleId;

/// Reactive flocking/avoidance controller for one vehicle
pub struct FlockingController {
    vehicle_id: VehicleId,
    channel: Arc<SharedSnapshotChannel>,
    actuator: Arc<dyn FlightActuator>,
    params: FlockingParams,
    tick: Duration,
    escape_hold: Duration,
}

impl FlockingController {
    pub fn new(
        vehicle_id: &str,
        channel: Arc<SharedSnapshotChannel>,
        actuator: Arc<dyn FlightActuator>,
        config: &ControllerConfig,
    ) -> Self {
        Self {
            vehicle_id: vehicle_id.to_string(),
            channel,
            actuator,
            params: FlockingParams::from(config),
            tick: Duration::from_millis(config.tick_ms),
            escape_hold: Duration::from_millis(config.escape_hold_ms),
        }
    }

    pub fn params(&self) -> &FlockingParams {
        &self.params
    }

    /// Run one tick: read, decide, command
    ///
    /// Never fails; an actuator error is logged and reported only through
    /// the log.
    pub async fn step(&self) -> Decision {
        let snapshot = self.channel.read().await;
        let decision = decide(&snapshot, &self.vehicle_id, &self.params);

        let neighbor = decision.neighbor_id.as_deref().unwrap_or("-");
        match decision.regime {
            Regime::Escape => warn!(
                "Escape from vehicle {} at {:.1}m",
                neighbor, decision.distance_m
            ),
            Regime::Flocking => info!(
                "Flocking with vehicle {} at {:.1}m",
                neighbor, decision.distance_m
            ),
            Regime::FreeFlight => debug!(
                "Free flight, nearest vehicle {} at {:.1}m",
                neighbor, decision.distance_m
            ),
            Regime::FreeFlightDefault => debug!("Free flight, no other vehicle known"),
        }

        if let Err(e) = self.issue(&decision.command).await {
            error!("Failed to send {} command: {}", decision.regime, e);
        }

        decision
    }

    async fn issue(&self, command: &Command) -> Result<()> {
        match *command {
            Command::Velocity(velocity) => self.actuator.set_velocity(velocity).await,
            Command::Goto(target) => self.actuator.goto_location(target).await,
        }
    }

    /// Time to wait after `decision` before the next tick
    pub fn dwell(&self, decision: &Decision) -> Duration {
        match decision.regime {
            Regime::Escape => self.escape_hold,
            _ => self.tick,
        }
    }

    /// Control loop; runs until the task is cancelled
    pub async fn run(&self) {
        info!(
            "Flocking controller for vehicle {} running every {}ms (escape < {}m, flock <= {}m)",
            self.vehicle_id,
            self.tick.as_millis(),
            self.params.escape_distance_m,
            self.params.flock_radius_m
        );

        loop {
            let decision = self.step().await;
            tokio::time::sleep(self.dwell(&decision)).await;
        }
    }
}
