//! # Nearest Neighbor Selection
//!
//! Picks the closest other vehicle from a swarm snapshot.
//!
//! Candidates are all entries except the local one that carry both
//! `latitude` and `longitude`. Entries missing position are not an error,
//! they simply do not take part in this tick.

use std::cmp::Ordering;

use crate::geo::{haversine_distance, DISTANCE_UNKNOWN};
use crate::telemetry::state::{compare_vehicle_ids, SwarmSnapshot, VehicleState};

/// The closest other vehicle and its distance
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor<'a> {
    pub vehicle_id: &'a str,
    pub state: &'a VehicleState,
    /// Great-circle distance in meters; [`DISTANCE_UNKNOWN`] when the local
    /// position is not known
    pub distance_m: f64,
}

/// Find the nearest other vehicle to `self_id`
///
/// Equidistant candidates resolve to the lowest vehicle id, so the choice is
/// the same on every tick and every vehicle.
///
/// # Returns
///
/// * `None` - No other vehicle with a position is known
/// * `Some(neighbor)` - The nearest candidate. If the local vehicle has no
///   position every distance is unknown and the lowest id is returned.
///
/// # Examples
///
/// ```
/// use swarm_flock::controller::neighbor::nearest_neighbor;
/// use swarm_flock::telemetry::state::{SwarmSnapshot, VehicleState};
///
/// let at = |lat: f64, lon: f64| VehicleState {
///     latitude: Some(lat),
///     longitude: Some(lon),
///     ..VehicleState::default()
/// };
///
/// let mut snapshot = SwarmSnapshot::new();
/// snapshot.insert("1".into(), at(0.0, 0.0));
/// snapshot.insert("2".into(), at(0.001, 0.0));
/// snapshot.insert("3".into(), at(0.0002, 0.0));
///
/// let nearest = nearest_neighbor(&snapshot, "1").unwrap();
/// assert_eq!(nearest.vehicle_id, "3");
/// ```
pub fn nearest_neighbor<'a>(snapshot: &'a SwarmSnapshot, self_id: &str) -> Option<Neighbor<'a>> {
    let own = snapshot.get(self_id).and_then(VehicleState::coordinates);

    snapshot
        .iter()
        .filter(|(id, _)| id.as_str() != self_id)
        .filter_map(|(id, state)| {
            let theirs = state.coordinates()?;
            let distance_m = own.map_or(DISTANCE_UNKNOWN, |own| {
                haversine_distance(own.latitude, own.longitude, theirs.latitude, theirs.longitude)
            });
            Some(Neighbor {
                vehicle_id: id.as_str(),
                state,
                distance_m,
            })
        })
        .min_by(|a, b| compare_neighbors(a, b))
}

/// Sort key used by [`nearest_neighbor`], exposed for callers ranking whole swarms
pub fn compare_neighbors(a: &Neighbor<'_>, b: &Neighbor<'_>) -> Ordering {
    a.distance_m
        .total_cmp(&b.distance_m)
        .then_with(|| compare_vehicle_ids(a.vehicle_id, b.vehicle_id))
}
