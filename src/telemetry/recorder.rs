//! # Telemetry Recorder
//!
//! Writes published vehicle states to rotating JSON Lines files.
//!
//! Records arrive over a bounded [`mpsc`] channel from the publisher and are
//! written on a blocking-pool thread, so a slow disk never stalls the publish
//! tick. When the queue is full the publisher drops the record. The recorder:
//! - keeps at most one record per `record_interval_ms`
//! - starts a new file after `max_records_per_file` records
//! - deletes its oldest files beyond `max_files_to_keep`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::state::{VehicleId, VehicleState};
use crate::config::RecorderConfig;
use crate::error::Result;

/// Capacity of the publisher -> recorder channel
pub const RECORD_QUEUE_DEPTH: usize = 256;

/// One JSONL line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub timestamp: DateTime<Utc>,
    pub vehicle_id: VehicleId,
    pub state: VehicleState,
}

/// Create the channel feeding a [`TelemetryRecorder`]
pub fn record_channel() -> (mpsc::Sender<TelemetryRecord>, mpsc::Receiver<TelemetryRecord>) {
    mpsc::channel(RECORD_QUEUE_DEPTH)
}

/// Rotating JSONL writer for one vehicle
pub struct TelemetryRecorder {
    config: RecorderConfig,
    file_prefix: String,
    writer: Option<BufWriter<File>>,
    records_in_file: usize,
    files: VecDeque<PathBuf>,
    file_counter: u64,
    last_recorded: Option<DateTime<Utc>>,
}

impl TelemetryRecorder {
    /// Create a recorder, making sure the log directory exists
    ///
    /// # Errors
    ///
    /// Returns error if the log directory cannot be created
    pub fn new(config: RecorderConfig, vehicle_id: &str) -> Result<Self> {
        fs::create_dir_all(&config.log_dir)?;

        let safe_id: String = vehicle_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();

        Ok(Self {
            config,
            file_prefix: format!("telemetry-{}", safe_id),
            writer: None,
            records_in_file: 0,
            files: VecDeque::new(),
            file_counter: 0,
            last_recorded: None,
        })
    }

    /// Files written by this recorder that are still on disk, oldest first
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(PathBuf::as_path)
    }

    /// Consume records on the blocking pool until every sender is dropped
    ///
    /// Write failures are logged and the record is dropped.
    pub async fn run(self, records: mpsc::Receiver<TelemetryRecord>) {
        info!("Telemetry recorder writing to {}", self.config.log_dir);

        if let Err(e) = tokio::task::spawn_blocking(move || self.run_blocking(records)).await {
            warn!("Telemetry recorder task failed: {}", e);
        }
    }

    /// Blocking variant of [`run`](Self::run); must not be called from an
    /// async context
    pub fn run_blocking(mut self, mut records: mpsc::Receiver<TelemetryRecord>) {
        while let Some(record) = records.blocking_recv() {
            if let Err(e) = self.record(&record) {
                warn!("Failed to record telemetry: {}", e);
                // Reopen on the next record
                self.writer = None;
            }
        }

        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                warn!("Failed to flush telemetry log: {}", e);
            }
        }
        debug!("Telemetry recorder stopped");
    }

    /// Write one record, subject to throttling and rotation
    ///
    /// # Returns
    ///
    /// * `Result<bool>` - `true` if the record was written, `false` if throttled
    pub fn record(&mut self, record: &TelemetryRecord) -> Result<bool> {
        if let Some(last) = self.last_recorded {
            let elapsed_ms = (record.timestamp - last).num_milliseconds();
            if elapsed_ms >= 0 && (elapsed_ms as u64) < self.config.record_interval_ms {
                return Ok(false);
            }
        }

        if self.writer.is_none() || self.records_in_file >= self.config.max_records_per_file {
            self.rotate(record.timestamp)?;
        }

        let line = serde_json::to_string(record)?;
        if let Some(writer) = self.writer.as_mut() {
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }

        self.records_in_file += 1;
        self.last_recorded = Some(record.timestamp);
        Ok(true)
    }

    fn rotate(&mut self, now: DateTime<Utc>) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }

        self.file_counter += 1;
        let name = format!(
            "{}-{}-{}.jsonl",
            self.file_prefix,
            now.format("%Y%m%d-%H%M%S"),
            self.file_counter
        );
        let path = Path::new(&self.config.log_dir).join(name);
        let file = File::create(&path)?;
        debug!("Opened telemetry log {}", path.display());

        self.writer = Some(BufWriter::new(file));
        self.records_in_file = 0;
        self.files.push_back(path);

        while self.files.len() > self.config.max_files_to_keep {
            if let Some(old) = self.files.pop_front() {
                if let Err(e) = fs::remove_file(&old) {
                    warn!("Failed to remove old telemetry log {}: {}", old.display(), e);
                }
            }
        }

        Ok(())
    }
}
