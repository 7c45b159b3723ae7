//! # Flight Actuator Interface
//!
//! Commands accepted by the flight stack of one vehicle. Every command may
//! fail; the control loop logs failures and carries on.

pub mod sim;

use async_trait::async_trait;

use crate::error::Result;

/// Offboard velocity setpoint in the local NED frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityCommand {
    /// North velocity in m/s
    pub vx: f64,
    /// East velocity in m/s
    pub vy: f64,
    /// Down velocity in m/s
    pub vz: f64,
    /// Heading to hold, degrees (0 = north)
    pub yaw_deg: f64,
}

impl VelocityCommand {
    /// All-zero setpoint, sent before offboard mode is started
    pub const ZERO: VelocityCommand = VelocityCommand {
        vx: 0.0,
        vy: 0.0,
        vz: 0.0,
        yaw_deg: 0.0,
    };

    /// Level flight at `speed` along `heading_deg`, nose on the same heading
    ///
    /// # Examples
    ///
    /// ```
    /// use swarm_flock::flight::VelocityCommand;
    ///
    /// let cmd = VelocityCommand::forward(2.0, 90.0);
    /// assert!(cmd.vx.abs() < 1e-9);
    /// assert!((cmd.vy - 2.0).abs() < 1e-9);
    /// assert_eq!(cmd.yaw_deg, 90.0);
    /// ```
    pub fn forward(speed: f64, heading_deg: f64) -> Self {
        let heading = heading_deg.to_radians();
        Self {
            vx: speed * heading.cos(),
            vy: speed * heading.sin(),
            vz: 0.0,
            yaw_deg: heading_deg,
        }
    }

    /// Horizontal speed of the setpoint
    pub fn horizontal_speed(&self) -> f64 {
        self.vx.hypot(self.vy)
    }
}

/// Absolute position target for a goto
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GotoTarget {
    pub latitude: f64,
    pub longitude: f64,
    /// Altitude above mean sea level in meters
    pub altitude_abs_m: f64,
    pub heading_deg: f64,
}

/// Commands of the vehicle flight stack
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FlightActuator: Send + Sync {
    /// Arm the motors
    async fn arm(&self) -> Result<()>;

    /// Switch to offboard mode; a setpoint must have been sent first
    async fn start_offboard(&self) -> Result<()>;

    /// Send an offboard velocity setpoint
    async fn set_velocity(&self, command: VelocityCommand) -> Result<()>;

    /// Fly to an absolute position
    async fn goto_location(&self, target: GotoTarget) -> Result<()>;
}
