//! # Geodesic Math
//!
//! Conversions between WGS84 latitude/longitude pairs and local metric
//! quantities used by the flocking controller.
//!
//! - [`haversine_distance`]: great-circle distance in meters
//! - [`planar_offset`]: local east/north offset (equirectangular approximation)
//! - [`offset_position`]: inverse of [`planar_offset`]
//!
//! Invalid input (NaN, infinite or out-of-range coordinates) never panics;
//! distances come back as [`DISTANCE_UNKNOWN`] instead.

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Meters per degree of longitude at the equator
pub const METERS_PER_DEG_LON: f64 = 111_320.0;

/// Meters per degree of latitude
pub const METERS_PER_DEG_LAT: f64 = 110_540.0;

/// Sentinel distance for unknown or invalid positions
pub const DISTANCE_UNKNOWN: f64 = f64::INFINITY;

/// A validated latitude/longitude pair in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Create coordinates, returning `None` when either value is out of range
    ///
    /// # Examples
    ///
    /// ```
    /// use swarm_flock::geo::Coordinates;
    ///
    /// assert!(Coordinates::new(47.39, 8.54).is_some());
    /// assert!(Coordinates::new(91.0, 8.54).is_none());
    /// ```
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        if is_valid(latitude, longitude) {
            Some(Self { latitude, longitude })
        } else {
            None
        }
    }

    /// Great-circle distance to `other` in meters
    pub fn distance_to(&self, other: &Coordinates) -> f64 {
        haversine_distance(self.latitude, self.longitude, other.latitude, other.longitude)
    }

    /// East/north offset of `self` relative to `reference`, in meters
    pub fn offset_from(&self, reference: &Coordinates) -> (f64, f64) {
        planar_offset(self.latitude, self.longitude, reference.latitude, reference.longitude)
    }
}

fn is_valid(latitude: f64, longitude: f64) -> bool {
    latitude.is_finite()
        && longitude.is_finite()
        && (-90.0..=90.0).contains(&latitude)
        && (-180.0..=180.0).contains(&longitude)
}

/// Great-circle distance between two points using the haversine formula
///
/// # Arguments
///
/// * `lat1`, `lon1` - First point in degrees
/// * `lat2`, `lon2` - Second point in degrees
///
/// # Returns
///
/// * `f64` - Distance in meters, or [`DISTANCE_UNKNOWN`] if any coordinate is invalid
///
/// # Examples
///
/// ```
/// use swarm_flock::geo::haversine_distance;
///
/// let d = haversine_distance(0.0, 0.0, 0.0, 1.0);
/// assert!((d - 111_195.0).abs() < 1.0);
/// ```
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    if !is_valid(lat1, lon1) || !is_valid(lat2, lon2) {
        return DISTANCE_UNKNOWN;
    }

    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push `a` slightly outside [0, 1] for antipodal points
    let a = a.clamp(0.0, 1.0);

    EARTH_RADIUS_M * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Local east/north offset of a point relative to a reference point
///
/// Equirectangular approximation, only accurate for short ranges
/// (a few hundred meters):
///
/// ```text
/// dx = Δlon · 111320 · cos(lat)
/// dy = Δlat · 110540
/// ```
///
/// # Returns
///
/// * `(dx, dy)` - East and north offsets in meters, or
///   `(DISTANCE_UNKNOWN, DISTANCE_UNKNOWN)` if any coordinate is invalid
pub fn planar_offset(lat: f64, lon: f64, ref_lat: f64, ref_lon: f64) -> (f64, f64) {
    if !is_valid(lat, lon) || !is_valid(ref_lat, ref_lon) {
        return (DISTANCE_UNKNOWN, DISTANCE_UNKNOWN);
    }

    let dx = (lon - ref_lon) * METERS_PER_DEG_LON * lat.to_radians().cos();
    let dy = (lat - ref_lat) * METERS_PER_DEG_LAT;
    (dx, dy)
}

/// Move a point by an east/north offset in meters
///
/// Inverse of [`planar_offset`] for short ranges.
pub fn offset_position(lat: f64, lon: f64, east_m: f64, north_m: f64) -> (f64, f64) {
    let new_lat = lat + north_m / METERS_PER_DEG_LAT;
    let cos_lat = lat.to_radians().cos();
    let new_lon = if cos_lat.abs() < f64::EPSILON {
        lon
    } else {
        lon + east_m / (METERS_PER_DEG_LON * cos_lat)
    };
    (new_lat, new_lon)
}

/// Compass heading in degrees (-180, 180] of a north/east vector
///
/// 0° is north, 90° is east.
pub fn heading_deg(north: f64, east: f64) -> f64 {
    east.atan2(north).to_degrees()
}
