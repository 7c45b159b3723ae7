//! # Vehicle State Store
//!
//! Latest known state of the local vehicle, shared between the telemetry
//! updaters and the publisher behind a single mutex.
//!
//! The lock is synchronous and only ever held for a field copy, never
//! across an `.await`.

use std::sync::{Arc, Mutex, MutexGuard};

use super::state::VehicleState;

/// Cloneable handle to the local vehicle state
#[derive(Debug, Clone, Default)]
pub struct VehicleStateStore {
    inner: Arc<Mutex<VehicleState>>,
}

impl VehicleStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `f` to the state while holding the lock
    ///
    /// # Examples
    ///
    /// ```
    /// use swarm_flock::telemetry::store::VehicleStateStore;
    ///
    /// let store = VehicleStateStore::new();
    /// store.update(|s| s.yaw = Some(90.0));
    /// assert_eq!(store.snapshot().yaw, Some(90.0));
    /// ```
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut VehicleState),
    {
        f(&mut self.lock());
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> VehicleState {
        self.lock().clone()
    }

    // A panicking updater cannot leave a field half-written, so a poisoned
    // lock still holds usable data.
    fn lock(&self) -> MutexGuard<'_, VehicleState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_store_is_empty() {
        assert_eq!(VehicleStateStore::new().snapshot(), VehicleState::default());
    }

    #[test]
    fn test_clones_share_state() {
        let store = VehicleStateStore::new();
        let other = store.clone();
        other.update(|s| s.latitude = Some(1.0));
        assert_eq!(store.snapshot().latitude, Some(1.0));
    }

    #[test]
    fn test_updates_from_threads_are_all_applied() {
        let store = VehicleStateStore::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        store.update(|s| {
                            s.speed = Some(s.speed.unwrap_or(0.0) + 1.0);
                            s.yaw = Some(i as f64);
                        });
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.snapshot().speed, Some(800.0));
    }

    #[test]
    fn test_poisoned_lock_is_recovered() {
        let store = VehicleStateStore::new();
        store.update(|s| s.yaw = Some(10.0));

        let poisoner = store.clone();
        let _ = std::thread::spawn(move || {
            poisoner.update(|_| panic!("updater failed"));
        })
        .join();

        assert_eq!(store.snapshot().yaw, Some(10.0));
        store.update(|s| s.yaw = Some(20.0));
        assert_eq!(store.snapshot().yaw, Some(20.0));
    }
}
