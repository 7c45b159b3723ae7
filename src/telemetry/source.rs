//! # Telemetry Source Interface
//!
//! Typed samples and the per-field-group subscription trait implemented by
//! the flight stack (or by [`SimVehicle`](crate::flight::sim::SimVehicle)).
//!
//! Each subscription is an unbounded, non-restartable stream with its own
//! cadence. Reconnecting after a transport failure is the source's concern;
//! the aggregator keeps the last known values when a stream ends.

use futures::stream::BoxStream;

/// Global position sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSample {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub absolute_altitude_m: f64,
    pub relative_altitude_m: f64,
}

/// NED velocity sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocitySample {
    pub north_m_s: f64,
    pub east_m_s: f64,
    pub down_m_s: f64,
}

impl VelocitySample {
    /// Horizontal speed magnitude in m/s
    pub fn horizontal_speed(&self) -> f64 {
        self.north_m_s.hypot(self.east_m_s)
    }
}

/// Euler attitude sample in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttitudeSample {
    pub roll_deg: f64,
    pub pitch_deg: f64,
    pub yaw_deg: f64,
}

/// Flight mode label sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlightModeSample(pub String);

/// Battery sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatterySample {
    /// Remaining charge as a fraction (0.0-1.0)
    pub remaining_fraction: f64,
    pub voltage_v: f64,
}

/// GPS receiver sample; receivers may omit either value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpsSample {
    pub satellites_visible: Option<u32>,
    pub fix_type: Option<u32>,
}

/// Independent telemetry subscriptions, one per field group
pub trait TelemetrySource: Send + Sync {
    fn position(&self) -> BoxStream<'static, PositionSample>;

    fn velocity(&self) -> BoxStream<'static, VelocitySample>;

    fn attitude(&self) -> BoxStream<'static, AttitudeSample>;

    fn flight_mode(&self) -> BoxStream<'static, FlightModeSample>;

    fn battery(&self) -> BoxStream<'static, BatterySample>;

    fn gps(&self) -> BoxStream<'static, GpsSample>;
}
