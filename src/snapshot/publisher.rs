//! # Snapshot Publisher
//!
//! Publishes the local vehicle state on a fixed tick, whether or not any
//! telemetry changed since the last tick, so peers always see a recent
//! entry. Each published state is also handed to the telemetry recorder,
//! if one is attached.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::channel::{Published, SharedSnapshotChannel};
use crate::error::Result;
use crate::telemetry::recorder::TelemetryRecord;
use crate::telemetry::state::{format_uptime, VehicleId};
use crate::telemetry::store::VehicleStateStore;

/// Number of publishes between status log messages
const LOG_INTERVAL_PUBLISHES: u64 = 1000;

/// Fixed-tick publisher of the local vehicle state
pub struct SnapshotPublisher {
    channel: Arc<SharedSnapshotChannel>,
    vehicle_id: VehicleId,
    store: VehicleStateStore,
    period: Duration,
    started: Instant,
    records: Option<mpsc::Sender<TelemetryRecord>>,
}

impl SnapshotPublisher {
    /// Create a publisher; uptime is measured from this call
    pub fn new(
        channel: Arc<SharedSnapshotChannel>,
        vehicle_id: &str,
        store: VehicleStateStore,
        period: Duration,
    ) -> Self {
        Self {
            channel,
            vehicle_id: vehicle_id.to_string(),
            store,
            period,
            started: Instant::now(),
            records: None,
        }
    }

    /// Also send every published state to a recorder
    #[must_use]
    pub fn with_recorder(mut self, records: mpsc::Sender<TelemetryRecord>) -> Self {
        self.records = Some(records);
        self
    }

    /// Publish the current local state once
    ///
    /// # Errors
    ///
    /// Returns `CapacityExceeded` if the snapshot did not fit (already logged)
    pub fn publish_once(&self) -> Result<Published> {
        self.store
            .update(|state| state.uptime = Some(format_uptime(self.started.elapsed())));
        let state = self.store.snapshot();

        let published = self.channel.publish(&self.vehicle_id, &state)?;

        if let Some(records) = &self.records {
            let record = TelemetryRecord {
                timestamp: chrono::Utc::now(),
                vehicle_id: self.vehicle_id.clone(),
                state,
            };
            match records.try_send(record) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => debug!("Recorder queue full, dropping record"),
                Err(TrySendError::Closed(_)) => debug!("Recorder stopped, dropping record"),
            }
        }

        Ok(published)
    }

    /// Publish forever at the configured period
    pub async fn run(&self) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Publishing vehicle {} every {}ms",
            self.vehicle_id,
            self.period.as_millis()
        );

        let mut published: u64 = 0;
        let mut skipped: u64 = 0;

        loop {
            ticker.tick().await;

            match self.publish_once() {
                Ok(_) => published += 1,
                // Logged by the channel; not retried
                Err(_) => skipped += 1,
            }

            if published > 0 && published % LOG_INTERVAL_PUBLISHES == 0 {
                info!("Published {} snapshots ({} skipped)", published, skipped);
            }
        }
    }
}
