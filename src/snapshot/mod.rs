//! # Shared Snapshot Module
//!
//! Swarm-wide state exchange through a fixed-capacity shared buffer.
//!
//! This module handles:
//! - Frame encoding (JSON payload, NUL terminator, CRC trailer, zero padding)
//! - In-memory and memory-mapped region backends
//! - The publish/read protocol with torn-read retry
//! - Fixed-tick publication of the local vehicle
//! - Liveness classification for snapshot consumers

pub mod channel;
pub mod crc;
pub mod frame;
pub mod liveness;
pub mod publisher;
pub mod region;

pub use channel::{ChannelOptions, Published, SharedSnapshotChannel};
pub use region::{MemoryRegion, MmapRegion, SharedRegion};
