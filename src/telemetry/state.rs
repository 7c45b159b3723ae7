//! # Vehicle State
//!
//! Typed per-vehicle telemetry and the swarm-wide snapshot map.
//!
//! The serialized shape of one entry is:
//!
//! ```text
//! {"latitude": f64, "longitude": f64, "absolute_altitude": f64,
//!  "relative_altitude": f64, "speed": f64, "roll": f64, "pitch": f64,
//!  "yaw": f64, "flight_mode": string, "battery_percent": f64,
//!  "battery_voltage": f64, "satellites_visible": number|"N/A",
//!  "fix_type": number|"N/A", "uptime": "MM:SS"}
//! ```
//!
//! Every field is optional until its first sample arrives; absent fields
//! are omitted from the JSON.

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::geo::Coordinates;

/// Vehicle identifier (small stable string such as `"1"`)
pub type VehicleId = String;

/// Swarm-wide map of vehicle id to latest known state
pub type SwarmSnapshot = BTreeMap<VehicleId, VehicleState>;

/// Placeholder written when a GPS receiver does not report a value
pub const NOT_AVAILABLE: &str = "N/A";

/// GPS counter that is either a number or `"N/A"` on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpsReading {
    Value(u32),
    NotAvailable,
}

impl From<Option<u32>> for GpsReading {
    fn from(value: Option<u32>) -> Self {
        value.map_or(GpsReading::NotAvailable, GpsReading::Value)
    }
}

impl Serialize for GpsReading {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            GpsReading::Value(v) => serializer.serialize_u32(*v),
            GpsReading::NotAvailable => serializer.serialize_str(NOT_AVAILABLE),
        }
    }
}

impl<'de> Deserialize<'de> for GpsReading {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct GpsReadingVisitor;

        impl<'de> Visitor<'de> for GpsReadingVisitor {
            type Value = GpsReading;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an unsigned integer or \"N/A\"")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<GpsReading, E> {
                u32::try_from(v)
                    .map(GpsReading::Value)
                    .map_err(|_| E::custom(format!("GPS reading {} out of range", v)))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<GpsReading, E> {
                u32::try_from(v)
                    .map(GpsReading::Value)
                    .map_err(|_| E::custom(format!("GPS reading {} out of range", v)))
            }

            // Any text (not only "N/A") means the receiver had nothing to report
            fn visit_str<E: de::Error>(self, _v: &str) -> Result<GpsReading, E> {
                Ok(GpsReading::NotAvailable)
            }

            fn visit_unit<E: de::Error>(self) -> Result<GpsReading, E> {
                Ok(GpsReading::NotAvailable)
            }
        }

        deserializer.deserialize_any(GpsReadingVisitor)
    }
}

/// Most recent telemetry of one vehicle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    /// Latitude in degrees (WGS84)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    /// Longitude in degrees (WGS84)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    /// Altitude above mean sea level in meters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absolute_altitude: Option<f64>,
    /// Altitude above takeoff in meters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_altitude: Option<f64>,
    /// Horizontal speed in m/s
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f64>,
    /// Heading in degrees, 0 = north
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yaw: Option<f64>,
    /// Opaque flight mode label reported by the flight stack
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flight_mode: Option<String>,
    /// Remaining battery (0-100)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_voltage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub satellites_visible: Option<GpsReading>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_type: Option<GpsReading>,
    /// Elapsed time since process start, `MM:SS`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<String>,
}

impl VehicleState {
    /// Position of the vehicle, if both coordinates are known and valid
    pub fn coordinates(&self) -> Option<Coordinates> {
        Coordinates::new(self.latitude?, self.longitude?)
    }

    /// Copy holding only the fields the flocking controller needs
    ///
    /// Used to shrink the local entry when a full snapshot would not fit
    /// in the shared region.
    pub fn control_fields(&self) -> VehicleState {
        VehicleState {
            latitude: self.latitude,
            longitude: self.longitude,
            absolute_altitude: self.absolute_altitude,
            relative_altitude: self.relative_altitude,
            speed: self.speed,
            yaw: self.yaw,
            flight_mode: self.flight_mode.clone(),
            battery_percent: self.battery_percent,
            ..VehicleState::default()
        }
    }
}

/// Order vehicle ids: unsigned integers first in numeric order, then every
/// other id in lexicographic order
///
/// # Examples
///
/// ```
/// use std::cmp::Ordering;
/// use swarm_flock::telemetry::state::compare_vehicle_ids;
///
/// assert_eq!(compare_vehicle_ids("2", "10"), Ordering::Less);
/// assert_eq!(compare_vehicle_ids("alpha", "bravo"), Ordering::Less);
/// assert_eq!(compare_vehicle_ids("10", "1a"), Ordering::Less);
/// ```
pub fn compare_vehicle_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Format an elapsed duration as `MM:SS`
///
/// Minutes are not wrapped into hours.
pub fn format_uptime(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
