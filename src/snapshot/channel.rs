//! # Shared Snapshot Channel
//!
//! Publish/read protocol over a [`SharedRegion`].
//!
//! `publish` is a read-modify-write of the whole region: load, decode (an
//! undecodable buffer counts as an empty map), insert the local entry,
//! re-encode and store. It runs under a local lock so tasks of one process
//! never interleave their writes. There is no lock between processes;
//! readers that catch a frame mid-write get a decode error and retry.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use super::frame::{decode_frame, encode_frame, peek_seq, Frame};
use super::region::SharedRegion;
use crate::config::ChannelConfig;
use crate::error::{Result, SwarmError};
use crate::telemetry::state::{SwarmSnapshot, VehicleState};

/// Read/publish tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelOptions {
    /// Decode attempts per read before falling back to an empty snapshot
    pub read_retries: u32,
    /// Delay between decode attempts
    pub retry_delay: Duration,
    /// On overflow, retry with only the control fields of the local entry
    pub trim_on_overflow: bool,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            read_retries: 3,
            retry_delay: Duration::from_millis(10),
            trim_on_overflow: false,
        }
    }
}

impl From<&ChannelConfig> for ChannelOptions {
    fn from(config: &ChannelConfig) -> Self {
        Self {
            read_retries: config.read_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            trim_on_overflow: config.trim_on_overflow,
        }
    }
}

/// Result of a successful publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Published {
    /// Sequence number written to the frame trailer
    pub seq: u32,
    /// Number of vehicles in the written snapshot
    pub vehicles: usize,
    /// Whether the local entry had to be reduced to its control fields
    pub trimmed: bool,
}

/// Swarm-wide snapshot channel over a shared region
pub struct SharedSnapshotChannel {
    region: Arc<dyn SharedRegion>,
    publish_lock: Mutex<()>,
    options: ChannelOptions,
}

impl std::fmt::Debug for SharedSnapshotChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSnapshotChannel")
            .field("region", &self.region.name())
            .field("capacity", &self.region.capacity())
            .field("options", &self.options)
            .finish()
    }
}

impl SharedSnapshotChannel {
    pub fn new(region: Arc<dyn SharedRegion>, options: ChannelOptions) -> Self {
        Self {
            region,
            publish_lock: Mutex::new(()),
            options,
        }
    }

    pub fn capacity(&self) -> usize {
        self.region.capacity()
    }

    /// Write `state` as the entry of `vehicle_id`, keeping every other entry
    ///
    /// # Errors
    ///
    /// Returns `CapacityExceeded` if the merged snapshot does not fit; the
    /// region is left untouched in that case.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use swarm_flock::snapshot::channel::{ChannelOptions, SharedSnapshotChannel};
    /// use swarm_flock::snapshot::region::MemoryRegion;
    /// use swarm_flock::telemetry::state::VehicleState;
    ///
    /// let channel = SharedSnapshotChannel::new(
    ///     Arc::new(MemoryRegion::new("swarm", 4096)),
    ///     ChannelOptions::default(),
    /// );
    /// let state = VehicleState { yaw: Some(90.0), ..VehicleState::default() };
    /// channel.publish("1", &state)?;
    ///
    /// assert_eq!(channel.try_read()?.snapshot["1"], state);
    /// # Ok::<(), swarm_flock::error::SwarmError>(())
    /// ```
    pub fn publish(&self, vehicle_id: &str, state: &VehicleState) -> Result<Published> {
        let _guard = self.publish_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let buf = self.region.load();
        let (mut snapshot, previous_seq) = match decode_frame(&buf) {
            Ok(frame) => (frame.snapshot, frame.seq),
            Err(e) => {
                debug!("Discarding undecodable region contents before publish: {}", e);
                (SwarmSnapshot::new(), peek_seq(&buf))
            }
        };
        let seq = previous_seq.map_or(1, |s| s.wrapping_add(1));
        let capacity = self.region.capacity();

        snapshot.insert(vehicle_id.to_string(), state.clone());
        let mut trimmed = false;

        let frame = match encode_frame(&snapshot, seq, capacity) {
            Ok(frame) => frame,
            Err(SwarmError::CapacityExceeded { size, .. }) if self.options.trim_on_overflow => {
                snapshot.insert(vehicle_id.to_string(), state.control_fields());
                match encode_frame(&snapshot, seq, capacity) {
                    Ok(frame) => {
                        debug!(
                            "Snapshot of {} bytes trimmed to fit {} byte region",
                            size, capacity
                        );
                        trimmed = true;
                        frame
                    }
                    Err(e) => {
                        warn!("Skipping publish of vehicle {}: {}", vehicle_id, e);
                        return Err(e);
                    }
                }
            }
            Err(e) => {
                warn!("Skipping publish of vehicle {}: {}", vehicle_id, e);
                return Err(e);
            }
        };

        self.region.store(&frame)?;

        Ok(Published {
            seq,
            vehicles: snapshot.len(),
            trimmed,
        })
    }

    /// Single decode attempt of the current region contents
    ///
    /// # Errors
    ///
    /// Returns `Decode` on a torn or corrupt frame
    pub fn try_read(&self) -> Result<Frame> {
        decode_frame(&self.region.load())
    }

    /// Read the frame, retrying torn reads up to `read_retries` times
    ///
    /// # Returns
    ///
    /// * `Option<Frame>` - `None` if every attempt failed
    pub async fn read_frame(&self) -> Option<Frame> {
        let attempts = self.options.read_retries.max(1);

        for attempt in 1..=attempts {
            match self.try_read() {
                Ok(frame) => return Some(frame),
                Err(e) => {
                    debug!("Snapshot read attempt {}/{} failed: {}", attempt, attempts, e);
                    if attempt < attempts {
                        tokio::time::sleep(self.options.retry_delay).await;
                    }
                }
            }
        }

        warn!(
            "Snapshot in region {} unreadable after {} attempts",
            self.region.name(),
            attempts
        );
        None
    }

    /// Read the swarm snapshot; an unreadable region yields an empty map
    pub async fn read(&self) -> SwarmSnapshot {
        self.read_frame()
            .await
            .map(|frame| frame.snapshot)
            .unwrap_or_default()
    }
}


#[cfg(test)]
mod tests {
    use super::mocks::TornRegion;
    use super::*;
    use crate::snapshot::region::MemoryRegion;
    use std::sync::atomic::Ordering;

    fn channel_over(region: MemoryRegion) -> SharedSnapshotChannel {
        SharedSnapshotChannel::new(Arc::new(region), ChannelOptions::default())
    }

    fn state(lat: f64, yaw: f64) -> VehicleState {
        VehicleState {
            latitude: Some(lat),
            longitude: Some(8.5),
            yaw: Some(yaw),
            flight_mode: Some("OFFBOARD".to_string()),
            ..VehicleState::default()
        }
    }

    #[tokio::test]
    async fn test_read_before_any_publish_is_empty() {
        let channel = channel_over(MemoryRegion::new("swarm", 4096));
        assert!(channel.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_publish_then_read() {
        let channel = channel_over(MemoryRegion::new("swarm", 4096));
        let published = channel.publish("1", &state(47.0, 10.0)).unwrap();
        assert_eq!(published, Published { seq: 1, vehicles: 1, trimmed: false });

        let snapshot = channel.read().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot["1"], state(47.0, 10.0));
    }

    #[tokio::test]
    async fn test_publishers_merge_entries() {
        let region = MemoryRegion::new("swarm", 4096);
        let first = channel_over(region.clone());
        let second = channel_over(region);

        first.publish("1", &state(47.0, 10.0)).unwrap();
        second.publish("2", &state(47.1, 20.0)).unwrap();
        first.publish("1", &state(47.2, 30.0)).unwrap();

        let snapshot = second.read().await;
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["1"], state(47.2, 30.0));
        assert_eq!(snapshot["2"], state(47.1, 20.0));
        assert_eq!(second.try_read().unwrap().seq, Some(3));
    }

    #[tokio::test]
    async fn test_capacity_guard_keeps_previous_buffer() {
        let region = MemoryRegion::new("swarm", 192);
        let channel = channel_over(region.clone());

        channel.publish("1", &state(47.0, 10.0)).unwrap();
        let before_bytes = region.load();
        let before = channel.read().await;

        let oversized = VehicleState {
            flight_mode: Some("X".repeat(300)),
            ..state(47.5, 50.0)
        };
        match channel.publish("2", &oversized) {
            Err(SwarmError::CapacityExceeded { capacity, .. }) => assert_eq!(capacity, 192),
            other => panic!("Expected CapacityExceeded, got: {:?}", other),
        }

        assert_eq!(region.load(), before_bytes);
        assert_eq!(channel.read().await, before);
    }

    #[tokio::test]
    async fn test_trim_on_overflow_keeps_control_fields() {
        let region = MemoryRegion::new("swarm", 140);
        let channel = SharedSnapshotChannel::new(
            Arc::new(region),
            ChannelOptions { trim_on_overflow: true, ..ChannelOptions::default() },
        );

        let verbose = VehicleState {
            roll: Some(1.234567),
            pitch: Some(-2.345678),
            battery_voltage: Some(15.87654),
            uptime: Some("12:34".to_string()),
            ..state(47.0, 10.0)
        };
        let published = channel.publish("1", &verbose).unwrap();
        assert!(published.trimmed);

        let entry = &channel.read().await["1"];
        assert_eq!(entry.latitude, Some(47.0));
        assert_eq!(entry.yaw, Some(10.0));
        assert_eq!(entry.roll, None);
        assert_eq!(entry.uptime, None);
    }

    #[tokio::test]
    async fn test_publish_over_garbage_starts_from_empty_map() {
        let region = MemoryRegion::new("swarm", 256);
        region.store(&[b'x'; 256]).unwrap();
        let channel = channel_over(region);

        let published = channel.publish("3", &state(47.0, 0.0)).unwrap();
        assert_eq!(published.vehicles, 1);
        assert_eq!(published.seq, 1);

        let snapshot = channel.read().await;
        assert_eq!(snapshot.keys().collect::<Vec<_>>(), vec!["3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_torn_reads_are_retried() {
        let inner = MemoryRegion::new("swarm", 512);
        channel_over(inner.clone()).publish("1", &state(47.0, 10.0)).unwrap();

        let torn = Arc::new(TornRegion::new(inner, 2));
        let channel = SharedSnapshotChannel::new(torn.clone(), ChannelOptions::default());

        let snapshot = channel.read().await;
        assert_eq!(snapshot["1"], state(47.0, 10.0));
        assert_eq!(torn.loads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_torn_reads_fall_back_to_empty() {
        let inner = MemoryRegion::new("swarm", 512);
        channel_over(inner.clone()).publish("1", &state(47.0, 10.0)).unwrap();

        let torn = Arc::new(TornRegion::new(inner, 10));
        let channel = SharedSnapshotChannel::new(torn.clone(), ChannelOptions::default());

        assert!(channel.read().await.is_empty());
        assert_eq!(torn.loads.load(Ordering::SeqCst), 3);
        assert!(channel.read_frame().await.is_none());
    }

    #[test]
    fn test_options_from_config() {
        let config = ChannelConfig {
            read_retries: 5,
            retry_delay_ms: 25,
            trim_on_overflow: true,
            ..ChannelConfig::default()
        };
        let options = ChannelOptions::from(&config);
        assert_eq!(options.read_retries, 5);
        assert_eq!(options.retry_delay, Duration::from_millis(25));
        assert!(options.trim_on_overflow);
    }
}
