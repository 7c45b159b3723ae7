//! # Flocking Regimes
//!
//! Pure decision logic of the controller: from one swarm snapshot to one
//! command for the local vehicle.
//!
//! ## Regimes
//!
//! | Nearest neighbor distance `d` | Regime | Command |
//! |---|---|---|
//! | no neighbor | Free flight (default) | cruise speed, current yaw |
//! | `d < escape` | Escape | escape speed directly away from the neighbor |
//! | `escape <= d <= radius` | Flocking | flock speed along the weighted heading |
//! | `d > radius` or unknown | Free flight | cruise speed, current yaw |
//!
//! Vectors are composed in a local north/east frame. Compass headings are
//! degrees with 0 = north and 90 = east.

use std::fmt;

use super::neighbor::{nearest_neighbor, Neighbor};
use crate::config::{ControllerConfig, EscapeMode};
use crate::flight::{GotoTarget, VelocityCommand};
use crate::geo::{heading_deg, offset_position, Coordinates};
use crate::telemetry::state::{SwarmSnapshot, VehicleState};

/// Controller regime chosen from the nearest neighbor distance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    /// No other vehicle known
    FreeFlightDefault,
    Escape,
    Flocking,
    FreeFlight,
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Regime::FreeFlightDefault => write!(f, "free flight (alone)"),
            Regime::Escape => write!(f, "escape"),
            Regime::Flocking => write!(f, "flocking"),
            Regime::FreeFlight => write!(f, "free flight"),
        }
    }
}

/// Thresholds, speeds and weights of the controller
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlockingParams {
    pub escape_distance_m: f64,
    pub flock_radius_m: f64,
    pub escape_speed_m_s: f64,
    pub flock_speed_m_s: f64,
    pub cruise_speed_m_s: f64,
    pub separation_weight: f64,
    pub alignment_weight: f64,
    pub cohesion_weight: f64,
    pub escape_mode: EscapeMode,
    pub escape_hop_m: f64,
}

impl From<&ControllerConfig> for FlockingParams {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            escape_distance_m: config.escape_distance_m,
            flock_radius_m: config.flock_radius_m,
            escape_speed_m_s: config.escape_speed_m_s,
            flock_speed_m_s: config.flock_speed_m_s,
            cruise_speed_m_s: config.cruise_speed_m_s,
            separation_weight: config.separation_weight,
            alignment_weight: config.alignment_weight,
            cohesion_weight: config.cohesion_weight,
            escape_mode: config.escape_mode,
            escape_hop_m: config.escape_hop_m,
        }
    }
}

impl Default for FlockingParams {
    fn default() -> Self {
        Self::from(&ControllerConfig::default())
    }
}

/// Command to send to the flight actuator
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Velocity(VelocityCommand),
    Goto(GotoTarget),
}

/// Outcome of one controller tick
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub regime: Regime,
    pub command: Command,
    /// Nearest other vehicle, if any
    pub neighbor_id: Option<String>,
    /// Distance to that vehicle in meters (infinite when unknown)
    pub distance_m: f64,
}

/// Classify a nearest-neighbor distance
///
/// Both band limits are inclusive for flocking. A NaN or infinite distance
/// is free flight.
///
/// # Examples
///
/// ```
/// use swarm_flock::controller::regime::{classify, FlockingParams, Regime};
///
/// let params = FlockingParams::default();
/// assert_eq!(classify(9.999, &params), Regime::Escape);
/// assert_eq!(classify(10.0, &params), Regime::Flocking);
/// assert_eq!(classify(30.0, &params), Regime::Flocking);
/// assert_eq!(classify(30.001, &params), Regime::FreeFlight);
/// ```
pub fn classify(distance_m: f64, params: &FlockingParams) -> Regime {
    if distance_m < params.escape_distance_m {
        Regime::Escape
    } else if distance_m <= params.flock_radius_m {
        Regime::Flocking
    } else {
        Regime::FreeFlight
    }
}

/// Unit (north, east) vector from `from` towards `to`
///
/// Coincident points give the zero vector.
fn unit_towards(from: &Coordinates, to: &Coordinates) -> (f64, f64) {
    let (east, north) = to.offset_from(from);
    let norm = north.hypot(east);
    if norm > 0.0 && norm.is_finite() {
        (north / norm, east / norm)
    } else {
        (0.0, 0.0)
    }
}

fn unit_heading(heading_deg: f64) -> (f64, f64) {
    let h = heading_deg.to_radians();
    (h.cos(), h.sin())
}

/// Weighted separation + alignment + cohesion heading in degrees
///
/// Separation points from the neighbor to the local vehicle, cohesion the
/// other way, alignment along the neighbor's yaw (0 when unknown).
pub fn flocking_heading(
    own: &Coordinates,
    neighbor: &Coordinates,
    neighbor_yaw_deg: f64,
    params: &FlockingParams,
) -> f64 {
    let separation = unit_towards(neighbor, own);
    let alignment = unit_heading(neighbor_yaw_deg);
    let cohesion = (-separation.0, -separation.1);

    let north = params.separation_weight * separation.0
        + params.alignment_weight * alignment.0
        + params.cohesion_weight * cohesion.0;
    let east = params.separation_weight * separation.1
        + params.alignment_weight * alignment.1
        + params.cohesion_weight * cohesion.1;

    heading_deg(north, east)
}

fn escape_command(
    own: &VehicleState,
    own_pos: &Coordinates,
    neighbor: &Coordinates,
    params: &FlockingParams,
) -> Command {
    let (away_north, away_east) = unit_towards(neighbor, own_pos);
    // Coincident vehicles: flee north rather than stand still
    let (away_north, away_east) = if away_north == 0.0 && away_east == 0.0 {
        (1.0, 0.0)
    } else {
        (away_north, away_east)
    };
    let yaw = own.yaw.unwrap_or(0.0);

    if let (EscapeMode::Goto, Some(altitude)) = (params.escape_mode, own.absolute_altitude) {
        let (latitude, longitude) = offset_position(
            own_pos.latitude,
            own_pos.longitude,
            away_east * params.escape_hop_m,
            away_north * params.escape_hop_m,
        );
        return Command::Goto(GotoTarget {
            latitude,
            longitude,
            altitude_abs_m: altitude,
            heading_deg: yaw,
        });
    }

    Command::Velocity(VelocityCommand {
        vx: params.escape_speed_m_s * away_north,
        vy: params.escape_speed_m_s * away_east,
        vz: 0.0,
        yaw_deg: yaw,
    })
}

/// Decide the command for `self_id` from a swarm snapshot
///
/// # Examples
///
/// ```
/// use swarm_flock::controller::regime::{decide, Command, FlockingParams, Regime};
/// use swarm_flock::telemetry::state::SwarmSnapshot;
///
/// let decision = decide(&SwarmSnapshot::new(), "1", &FlockingParams::default());
/// assert_eq!(decision.regime, Regime::FreeFlightDefault);
/// assert!(matches!(decision.command, Command::Velocity(_)));
/// ```
pub fn decide(snapshot: &SwarmSnapshot, self_id: &str, params: &FlockingParams) -> Decision {
    let own = snapshot.get(self_id).cloned().unwrap_or_default();
    let own_yaw = own.yaw.unwrap_or(0.0);
    let cruise = Command::Velocity(VelocityCommand::forward(params.cruise_speed_m_s, own_yaw));

    let Some(Neighbor { vehicle_id, state, distance_m }) = nearest_neighbor(snapshot, self_id) else {
        return Decision {
            regime: Regime::FreeFlightDefault,
            command: cruise,
            neighbor_id: None,
            distance_m: f64::INFINITY,
        };
    };

    let regime = classify(distance_m, params);
    let positions = own.coordinates().zip(state.coordinates());

    let command = match (regime, positions) {
        (Regime::Escape, Some((own_pos, their_pos))) => {
            escape_command(&own, &own_pos, &their_pos, params)
        }
        (Regime::Flocking, Some((own_pos, their_pos))) => {
            let heading =
                flocking_heading(&own_pos, &their_pos, state.yaw.unwrap_or(0.0), params);
            Command::Velocity(VelocityCommand::forward(params.flock_speed_m_s, heading))
        }
        _ => cruise,
    };

    Decision {
        regime,
        command,
        neighbor_id: Some(vehicle_id.to_string()),
        distance_m,
    }
}
