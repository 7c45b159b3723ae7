//! # Swarm Flock Library
//!
//! Coordinate a small swarm of autonomous aerial vehicles.
//!
//! Each vehicle merges its own telemetry, publishes it into a fixed-size
//! snapshot shared by every vehicle process, and runs a reactive
//! flocking/avoidance controller on the relative geometry of its nearest
//! neighbor.

pub mod config;
pub mod controller;
pub mod error;
pub mod flight;
pub mod geo;
pub mod node;
pub mod snapshot;
pub mod telemetry;
