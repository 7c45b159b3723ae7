//! # Liveness Tracking
//!
//! Entries are never removed from the shared snapshot, so a disconnected
//! vehicle keeps its last entry forever. Consumers (the monitor, a
//! dashboard) watch each entry for changes and call a vehicle stale when its
//! entry has not changed for `stale_after`. Stale vehicles stay in the
//! report; they are only flagged.
//!
//! A publishing vehicle rewrites its `uptime` every second, so an entry
//! that stops changing means its publisher stopped.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use crate::telemetry::state::{compare_vehicle_ids, SwarmSnapshot, VehicleId, VehicleState};

/// Default time without change before a vehicle is stale
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(3);

/// Observed liveness of one vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Active,
    Stale,
}

impl fmt::Display for Liveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Liveness::Active => write!(f, "ACTIVE"),
            Liveness::Stale => write!(f, "STALE"),
        }
    }
}

/// One line of a liveness report
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleStatus {
    pub vehicle_id: VehicleId,
    pub liveness: Liveness,
    /// Time since the entry last changed
    pub age: Duration,
    pub state: VehicleState,
}

#[derive(Debug, Clone)]
struct Observation {
    state: VehicleState,
    changed_at: Instant,
}

/// Tracks when each vehicle's entry last changed
#[derive(Debug, Clone)]
pub struct LivenessTracker {
    stale_after: Duration,
    observed: BTreeMap<VehicleId, Observation>,
}

impl Default for LivenessTracker {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_AFTER)
    }
}

impl LivenessTracker {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            stale_after,
            observed: BTreeMap::new(),
        }
    }

    /// Record a snapshot read at `now`
    ///
    /// A vehicle seen for the first time counts as changed at `now`.
    /// Vehicles missing from `snapshot` keep their last observation.
    pub fn observe(&mut self, snapshot: &SwarmSnapshot, now: Instant) {
        for (id, state) in snapshot {
            match self.observed.get_mut(id) {
                Some(seen) if seen.state == *state => {}
                Some(seen) => {
                    seen.state = state.clone();
                    seen.changed_at = now;
                }
                None => {
                    self.observed.insert(
                        id.clone(),
                        Observation {
                            state: state.clone(),
                            changed_at: now,
                        },
                    );
                }
            }
        }
    }

    /// Liveness of one vehicle, `None` if it was never observed
    pub fn status(&self, vehicle_id: &str, now: Instant) -> Option<Liveness> {
        self.observed
            .get(vehicle_id)
            .map(|seen| self.classify(now.saturating_duration_since(seen.changed_at)))
    }

    /// Status of every observed vehicle, ordered by id
    pub fn report(&self, now: Instant) -> Vec<VehicleStatus> {
        let mut report: Vec<VehicleStatus> = self
            .observed
            .iter()
            .map(|(id, seen)| {
                let age = now.saturating_duration_since(seen.changed_at);
                VehicleStatus {
                    vehicle_id: id.clone(),
                    liveness: self.classify(age),
                    age,
                    state: seen.state.clone(),
                }
            })
            .collect();
        report.sort_by(|a, b| compare_vehicle_ids(&a.vehicle_id, &b.vehicle_id));
        report
    }

    fn classify(&self, age: Duration) -> Liveness {
        if age >= self.stale_after {
            Liveness::Stale
        } else {
            Liveness::Active
        }
    }
}
