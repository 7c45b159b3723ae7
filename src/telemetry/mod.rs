//! # Telemetry Module
//!
//! Local vehicle telemetry: from field-group subscriptions to one merged state.
//!
//! This module handles:
//! - The typed vehicle state and swarm snapshot model
//! - Subscribing to independent telemetry field groups
//! - Merging samples into a mutex-guarded state store
//! - Recording published states to rotating JSONL files

pub mod aggregator;
pub mod recorder;
pub mod source;
pub mod state;
pub mod store;

pub use aggregator::TelemetryAggregator;
pub use state::{SwarmSnapshot, VehicleId, VehicleState};
pub use store::VehicleStateStore;
