//! # Simulated Vehicle
//!
//! Kinematic stand-in for a real flight stack. One [`SimVehicle`] is both
//! the [`FlightActuator`] the controller commands and the
//! [`TelemetrySource`] the aggregator follows, so a swarm can be flown
//! without autopilot software.
//!
//! The model is point-mass: commanded velocity is applied
//! instantly and integrated into latitude/longitude with the same
//! equirectangular constants as [`crate::geo`].

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info};

use super::{FlightActuator, GotoTarget, VelocityCommand};
use crate::config::SimConfig;
use crate::error::{Result, SwarmError};
use crate::geo::{heading_deg, offset_position, planar_offset};
use crate::telemetry::source::{
    AttitudeSample, BatterySample, FlightModeSample, GpsSample, PositionSample, TelemetrySource,
    VelocitySample,
};

/// Distance at which a goto target counts as reached
pub const ARRIVAL_RADIUS_M: f64 = 0.5;

/// Battery fraction drained per second while armed
const BATTERY_DRAIN_PER_S: f64 = 0.0005;

/// Vertical speed used to reach a goto altitude
const CLIMB_RATE_M_S: f64 = 1.0;

const POSITION_PERIOD: Duration = Duration::from_millis(100);
const VELOCITY_PERIOD: Duration = Duration::from_millis(100);
const ATTITUDE_PERIOD: Duration = Duration::from_millis(50);
const FLIGHT_MODE_PERIOD: Duration = Duration::from_millis(500);
const BATTERY_PERIOD: Duration = Duration::from_secs(1);
const GPS_PERIOD: Duration = Duration::from_secs(1);

/// Flight mode labels reported by the simulator
pub mod modes {
    pub const DISARMED: &str = "DISARMED";
    pub const HOLD: &str = "HOLD";
    pub const OFFBOARD: &str = "OFFBOARD";
    pub const GOTO: &str = "GOTO";
}

#[derive(Debug, Clone)]
struct SimState {
    latitude: f64,
    longitude: f64,
    altitude_abs: f64,
    home_altitude: f64,
    yaw_deg: f64,
    /// Current NED velocity
    velocity: (f64, f64, f64),
    armed: bool,
    offboard: bool,
    setpoint: Option<VelocityCommand>,
    target: Option<GotoTarget>,
    battery_fraction: f64,
}

impl SimState {
    fn flight_mode(&self) -> &'static str {
        if !self.armed {
            modes::DISARMED
        } else if self.target.is_some() {
            modes::GOTO
        } else if self.offboard {
            modes::OFFBOARD
        } else {
            modes::HOLD
        }
    }
}

fn lock_state(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Point-mass simulated vehicle
#[derive(Debug, Clone)]
pub struct SimVehicle {
    state: Arc<Mutex<SimState>>,
    goto_speed_m_s: f64,
    physics_rate_hz: u32,
}

impl SimVehicle {
    /// Create a disarmed vehicle resting at the configured home position
    pub fn new(config: &SimConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                latitude: config.home_latitude,
                longitude: config.home_longitude,
                altitude_abs: config.home_altitude_m,
                home_altitude: config.home_altitude_m,
                yaw_deg: config.initial_yaw_deg,
                velocity: (0.0, 0.0, 0.0),
                armed: false,
                offboard: false,
                setpoint: None,
                target: None,
                battery_fraction: 1.0,
            })),
            goto_speed_m_s: config.goto_speed_m_s,
            physics_rate_hz: config.physics_rate_hz.max(1),
        }
    }

    /// Same vehicle placed at another position (swarm layouts in tests and demos)
    #[must_use]
    pub fn at(self, latitude: f64, longitude: f64) -> Self {
        {
            let mut state = lock_state(&self.state);
            state.latitude = latitude;
            state.longitude = longitude;
        }
        self
    }

    /// Current `(latitude, longitude)`
    pub fn location(&self) -> (f64, f64) {
        let state = lock_state(&self.state);
        (state.latitude, state.longitude)
    }

    pub fn is_armed(&self) -> bool {
        lock_state(&self.state).armed
    }

    pub fn mode(&self) -> &'static str {
        lock_state(&self.state).flight_mode()
    }

    /// Advance the simulation by `dt`
    pub fn step(&self, dt: Duration) {
        let dt_s = dt.as_secs_f64();
        let mut state = lock_state(&self.state);

        let velocity = if !state.armed {
            (0.0, 0.0, 0.0)
        } else if let Some(target) = state.target {
            let (east, north) = planar_offset(
                target.latitude,
                target.longitude,
                state.latitude,
                state.longitude,
            );
            let distance = east.hypot(north);
            let down = (state.altitude_abs - target.altitude_abs_m)
                .clamp(-CLIMB_RATE_M_S, CLIMB_RATE_M_S);

            if !distance.is_finite() || distance <= ARRIVAL_RADIUS_M.max(self.goto_speed_m_s * dt_s) {
                state.latitude = target.latitude;
                state.longitude = target.longitude;
                state.yaw_deg = target.heading_deg;
                state.target = None;
                debug!("Goto target reached");
                (0.0, 0.0, down)
            } else {
                state.yaw_deg = heading_deg(north, east);
                let scale = self.goto_speed_m_s / distance;
                (north * scale, east * scale, down)
            }
        } else if let (true, Some(setpoint)) = (state.offboard, state.setpoint) {
            state.yaw_deg = setpoint.yaw_deg;
            (setpoint.vx, setpoint.vy, setpoint.vz)
        } else {
            (0.0, 0.0, 0.0)
        };
        state.velocity = velocity;

        let (north, east, down) = velocity;
        let (latitude, longitude) =
            offset_position(state.latitude, state.longitude, east * dt_s, north * dt_s);
        state.latitude = latitude;
        state.longitude = longitude;
        state.altitude_abs -= down * dt_s;

        if state.armed {
            state.battery_fraction = (state.battery_fraction - BATTERY_DRAIN_PER_S * dt_s).max(0.0);
        }
    }

    /// Run the physics loop at the configured rate until the task is aborted
    pub fn spawn_physics(&self) -> JoinHandle<()> {
        let vehicle = self.clone();
        let period = Duration::from_secs_f64(1.0 / f64::from(self.physics_rate_hz));

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("Simulated vehicle physics running at {} Hz", vehicle.physics_rate_hz);
            loop {
                ticker.tick().await;
                vehicle.step(period);
            }
        })
    }

    /// Stream that samples the state every `period`
    fn sampled<T, F>(&self, period: Duration, sample: F) -> BoxStream<'static, T>
    where
        T: Send + 'static,
        F: Fn(&SimState) -> T + Send + Sync + 'static,
    {
        let state = Arc::clone(&self.state);
        // Interval is created on first poll so streams can be built outside a runtime
        stream::unfold(
            (None::<Interval>, state, sample),
            move |(ticker, state, sample)| async move {
                let mut ticker = ticker.unwrap_or_else(|| interval(period));
                ticker.tick().await;
                let value = sample(&lock_state(&state));
                Some((value, (Some(ticker), state, sample)))
            },
        )
        .boxed()
    }
}

#[async_trait]
impl FlightActuator for SimVehicle {
    async fn arm(&self) -> Result<()> {
        let mut state = lock_state(&self.state);
        if !state.armed {
            state.armed = true;
            info!("Simulated vehicle armed");
        }
        Ok(())
    }

    async fn start_offboard(&self) -> Result<()> {
        let mut state = lock_state(&self.state);
        if !state.armed {
            return Err(SwarmError::Actuator(
                "Cannot start offboard: vehicle is disarmed".to_string(),
            ));
        }
        if state.setpoint.is_none() {
            return Err(SwarmError::Actuator(
                "Cannot start offboard: no setpoint sent".to_string(),
            ));
        }
        state.offboard = true;
        info!("Simulated vehicle in offboard mode");
        Ok(())
    }

    async fn set_velocity(&self, command: VelocityCommand) -> Result<()> {
        let mut state = lock_state(&self.state);
        // Accepted before offboard so the startup sequence can prime a setpoint
        state.setpoint = Some(command);
        if state.offboard {
            state.target = None;
        }
        Ok(())
    }

    async fn goto_location(&self, target: GotoTarget) -> Result<()> {
        let mut state = lock_state(&self.state);
        if !state.armed {
            return Err(SwarmError::Actuator(
                "Cannot goto: vehicle is disarmed".to_string(),
            ));
        }
        state.target = Some(target);
        Ok(())
    }
}

impl TelemetrySource for SimVehicle {
    fn position(&self) -> BoxStream<'static, PositionSample> {
        self.sampled(POSITION_PERIOD, |s| PositionSample {
            latitude_deg: s.latitude,
            longitude_deg: s.longitude,
            absolute_altitude_m: s.altitude_abs,
            relative_altitude_m: s.altitude_abs - s.home_altitude,
        })
    }

    fn velocity(&self) -> BoxStream<'static, VelocitySample> {
        self.sampled(VELOCITY_PERIOD, |s| VelocitySample {
            north_m_s: s.velocity.0,
            east_m_s: s.velocity.1,
            down_m_s: s.velocity.2,
        })
    }

    fn attitude(&self) -> BoxStream<'static, AttitudeSample> {
        self.sampled(ATTITUDE_PERIOD, |s| AttitudeSample {
            roll_deg: 0.0,
            pitch_deg: 0.0,
            yaw_deg: s.yaw_deg,
        })
    }

    fn flight_mode(&self) -> BoxStream<'static, FlightModeSample> {
        self.sampled(FLIGHT_MODE_PERIOD, |s| {
            FlightModeSample(s.flight_mode().to_string())
        })
    }

    fn battery(&self) -> BoxStream<'static, BatterySample> {
        // 3S pack: 10.5 V empty, 12.6 V full
        self.sampled(BATTERY_PERIOD, |s| BatterySample {
            remaining_fraction: s.battery_fraction,
            voltage_v: 10.5 + 2.1 * s.battery_fraction,
        })
    }

    fn gps(&self) -> BoxStream<'static, GpsSample> {
        self.sampled(GPS_PERIOD, |_| GpsSample {
            satellites_visible: Some(12),
            fix_type: Some(3),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::haversine_distance;

    fn vehicle() -> SimVehicle {
        SimVehicle::new(&SimConfig::default())
    }

    async fn armed_offboard() -> SimVehicle {
        let v = vehicle();
        v.arm().await.unwrap();
        v.set_velocity(VelocityCommand::ZERO).await.unwrap();
        v.start_offboard().await.unwrap();
        v
    }

    #[tokio::test]
    async fn test_starts_disarmed_at_home() {
        let v = vehicle();
        let config = SimConfig::default();
        assert!(!v.is_armed());
        assert_eq!(v.mode(), modes::DISARMED);
        assert_eq!(v.location(), (config.home_latitude, config.home_longitude));
    }

    #[tokio::test]
    async fn test_offboard_requires_arm() {
        let v = vehicle();
        v.set_velocity(VelocityCommand::ZERO).await.unwrap();
        assert!(matches!(v.start_offboard().await, Err(SwarmError::Actuator(_))));
    }

    #[tokio::test]
    async fn test_offboard_requires_setpoint() {
        let v = vehicle();
        v.arm().await.unwrap();
        assert!(matches!(v.start_offboard().await, Err(SwarmError::Actuator(_))));
    }

    #[tokio::test]
    async fn test_goto_requires_arm() {
        let v = vehicle();
        let target = GotoTarget { latitude: 47.0, longitude: 8.0, altitude_abs_m: 500.0, heading_deg: 0.0 };
        assert!(v.goto_location(target).await.is_err());
    }

    #[tokio::test]
    async fn test_velocity_ignored_before_offboard() {
        let v = vehicle();
        v.arm().await.unwrap();
        v.set_velocity(VelocityCommand::forward(5.0, 0.0)).await.unwrap();

        let before = v.location();
        v.step(Duration::from_secs(1));
        assert_eq!(v.location(), before);
        assert_eq!(v.mode(), modes::HOLD);
    }

    #[tokio::test]
    async fn test_velocity_moves_vehicle_north() {
        let v = armed_offboard().await;
        assert_eq!(v.mode(), modes::OFFBOARD);
        v.set_velocity(VelocityCommand::forward(2.0, 0.0)).await.unwrap();

        let (lat0, lon0) = v.location();
        for _ in 0..50 {
            v.step(Duration::from_millis(20));
        }
        let (lat1, lon1) = v.location();

        assert!(lat1 > lat0);
        assert!((lon1 - lon0).abs() < 1e-9);
        let moved = haversine_distance(lat0, lon0, lat1, lon1);
        assert!((moved - 2.0).abs() < 0.05, "moved {}", moved);
    }

    #[tokio::test]
    async fn test_goto_reaches_target() {
        let v = armed_offboard().await;
        let (lat0, lon0) = v.location();
        let (lat, lon) = offset_position(lat0, lon0, 10.0, 0.0);
        let target = GotoTarget { latitude: lat, longitude: lon, altitude_abs_m: 488.0, heading_deg: 45.0 };
        v.goto_location(target).await.unwrap();
        assert_eq!(v.mode(), modes::GOTO);

        // 10 m at 5 m/s
        for _ in 0..150 {
            v.step(Duration::from_millis(20));
        }
        assert_eq!(v.location(), (lat, lon));
        assert_eq!(v.mode(), modes::OFFBOARD);
    }

    #[tokio::test]
    async fn test_velocity_in_offboard_cancels_goto() {
        let v = armed_offboard().await;
        let target = GotoTarget { latitude: 47.5, longitude: 8.6, altitude_abs_m: 488.0, heading_deg: 0.0 };
        v.goto_location(target).await.unwrap();
        v.set_velocity(VelocityCommand::ZERO).await.unwrap();
        assert_eq!(v.mode(), modes::OFFBOARD);
    }

    #[tokio::test]
    async fn test_battery_drains_only_when_armed() {
        let v = vehicle();
        v.step(Duration::from_secs(100));
        assert_eq!(lock_state(&v.state).battery_fraction, 1.0);

        v.arm().await.unwrap();
        v.step(Duration::from_secs(100));
        assert!((lock_state(&v.state).battery_fraction - 0.95).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_position_stream_follows_state() {
        let v = vehicle().at(10.0, 20.0);
        let mut positions = v.position();

        let first = positions.next().await.unwrap();
        assert_eq!((first.latitude_deg, first.longitude_deg), (10.0, 20.0));
        assert_eq!(first.relative_altitude_m, 0.0);

        let v2 = v.clone().at(11.0, 21.0);
        let second = positions.next().await.unwrap();
        assert_eq!((second.latitude_deg, second.longitude_deg), v2.location());
    }

    #[tokio::test(start_paused = true)]
    async fn test_streams_have_independent_cadence() {
        let v = vehicle();
        let mut attitude = v.attitude();
        let mut battery = v.battery();

        let start = tokio::time::Instant::now();
        for _ in 0..3 {
            attitude.next().await.unwrap();
        }
        // Ticks at 0, 50, 100 ms
        assert_eq!(start.elapsed(), Duration::from_millis(100));

        // First poll starts the battery clock at 100 ms
        battery.next().await.unwrap();
        battery.next().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(1100));
    }

    #[tokio::test]
    async fn test_flight_mode_stream_reports_label() {
        let v = armed_offboard().await;
        let mode = v.flight_mode().next().await.unwrap();
        assert_eq!(mode, FlightModeSample(modes::OFFBOARD.to_string()));
    }
}
