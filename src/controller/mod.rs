//! # Controller Module
//!
//! Distance-driven flocking and collision avoidance.
//!
//! This module handles:
//! - Nearest neighbor selection from the swarm snapshot
//! - Regime classification (escape, flocking, free flight)
//! - Separation/alignment/cohesion vector composition
//! - The fixed-tick control loop issuing actuator commands

pub mod flocking;
pub mod neighbor;
pub mod regime;

pub use flocking::FlockingController;
pub use regime::{Command, Decision, FlockingParams, Regime};
