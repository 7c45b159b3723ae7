//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{Result, SwarmError};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Required to fly (`run`), optional for observers (`monitor`)
    #[serde(default)]
    pub vehicle: VehicleConfig,
    pub channel: ChannelConfig,
    pub controller: ControllerConfig,
    #[serde(default)]
    pub liveness: LivenessConfig,
    #[serde(default)]
    pub recorder: RecorderConfig,
    #[serde(default)]
    pub sim: SimConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Identity of the local vehicle
#[derive(Debug, Deserialize, Clone)]
pub struct VehicleConfig {
    #[serde(default)]
    pub id: String,

    #[serde(default = "default_start_offboard")]
    pub start_offboard: bool,
}

/// Shared snapshot channel configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ChannelConfig {
    #[serde(default = "default_channel_name")]
    pub name: String,

    #[serde(default = "default_channel_directory")]
    pub directory: String,

    #[serde(default = "default_capacity")]
    pub capacity: usize,

    #[serde(default = "default_publish_interval_ms")]
    pub publish_interval_ms: u64,

    #[serde(default = "default_read_retries")]
    pub read_retries: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default)]
    pub trim_on_overflow: bool,
}

/// How the controller escapes a too-close neighbor
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EscapeMode {
    /// High-speed velocity setpoint away from the neighbor
    Velocity,
    /// Short goto hop away from the neighbor
    Goto,
}

/// Flocking/avoidance controller configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ControllerConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    #[serde(default = "default_escape_distance_m")]
    pub escape_distance_m: f64,

    #[serde(default = "default_flock_radius_m")]
    pub flock_radius_m: f64,

    #[serde(default = "default_escape_speed_m_s")]
    pub escape_speed_m_s: f64,

    #[serde(default = "default_flock_speed_m_s")]
    pub flock_speed_m_s: f64,

    #[serde(default = "default_cruise_speed_m_s")]
    pub cruise_speed_m_s: f64,

    #[serde(default = "default_separation_weight")]
    pub separation_weight: f64,

    #[serde(default = "default_alignment_weight")]
    pub alignment_weight: f64,

    #[serde(default = "default_cohesion_weight")]
    pub cohesion_weight: f64,

    #[serde(default = "default_escape_mode")]
    pub escape_mode: EscapeMode,

    #[serde(default = "default_escape_hop_m")]
    pub escape_hop_m: f64,

    #[serde(default = "default_escape_hold_ms")]
    pub escape_hold_ms: u64,
}

/// Stale-vehicle detection for snapshot consumers
#[derive(Debug, Deserialize, Clone)]
pub struct LivenessConfig {
    #[serde(default = "default_stale_after_ms")]
    pub stale_after_ms: u64,

    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,
}

/// Telemetry recorder configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RecorderConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,

    #[serde(default = "default_record_interval_ms")]
    pub record_interval_ms: u64,
}

/// Simulated vehicle configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SimConfig {
    #[serde(default = "default_home_latitude")]
    pub home_latitude: f64,

    #[serde(default = "default_home_longitude")]
    pub home_longitude: f64,

    #[serde(default = "default_home_altitude_m")]
    pub home_altitude_m: f64,

    #[serde(default)]
    pub initial_yaw_deg: f64,

    #[serde(default = "default_physics_rate_hz")]
    pub physics_rate_hz: u32,

    #[serde(default = "default_goto_speed_m_s")]
    pub goto_speed_m_s: f64,
}

/// Log output configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Also write a daily-rolling log file here
    #[serde(default)]
    pub directory: Option<String>,
}

// Default value functions
fn default_start_offboard() -> bool { true }

fn default_channel_name() -> String { "telemetry_shared".to_string() }
fn default_channel_directory() -> String { "/dev/shm".to_string() }
fn default_capacity() -> usize { 4096 }
fn default_publish_interval_ms() -> u64 { 10 }
fn default_read_retries() -> u32 { 3 }
fn default_retry_delay_ms() -> u64 { 10 }

fn default_tick_ms() -> u64 { 20 }
fn default_escape_distance_m() -> f64 { 10.0 }
fn default_flock_radius_m() -> f64 { 30.0 }
fn default_escape_speed_m_s() -> f64 { 3.5 }
fn default_flock_speed_m_s() -> f64 { 1.2 }
fn default_cruise_speed_m_s() -> f64 { 0.8 }
fn default_separation_weight() -> f64 { 2.0 }
fn default_alignment_weight() -> f64 { 1.0 }
fn default_cohesion_weight() -> f64 { 1.0 }
fn default_escape_mode() -> EscapeMode { EscapeMode::Velocity }
fn default_escape_hop_m() -> f64 { 15.0 }
fn default_escape_hold_ms() -> u64 { 400 }

fn default_stale_after_ms() -> u64 { 3000 }
fn default_monitor_interval_ms() -> u64 { 1000 }

fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }
fn default_record_interval_ms() -> u64 { 100 }

fn default_home_latitude() -> f64 { 47.397742 }
fn default_home_longitude() -> f64 { 8.545594 }
fn default_home_altitude_m() -> f64 { 488.0 }
fn default_physics_rate_hz() -> u32 { 50 }
fn default_goto_speed_m_s() -> f64 { 5.0 }

fn default_log_level() -> String { "info".to_string() }

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            start_offboard: default_start_offboard(),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            name: default_channel_name(),
            directory: default_channel_directory(),
            capacity: default_capacity(),
            publish_interval_ms: default_publish_interval_ms(),
            read_retries: default_read_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            trim_on_overflow: false,
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            escape_distance_m: default_escape_distance_m(),
            flock_radius_m: default_flock_radius_m(),
            escape_speed_m_s: default_escape_speed_m_s(),
            flock_speed_m_s: default_flock_speed_m_s(),
            cruise_speed_m_s: default_cruise_speed_m_s(),
            separation_weight: default_separation_weight(),
            alignment_weight: default_alignment_weight(),
            cohesion_weight: default_cohesion_weight(),
            escape_mode: default_escape_mode(),
            escape_hop_m: default_escape_hop_m(),
            escape_hold_ms: default_escape_hold_ms(),
        }
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            stale_after_ms: default_stale_after_ms(),
            monitor_interval_ms: default_monitor_interval_ms(),
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_dir: default_log_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
            record_interval_ms: default_record_interval_ms(),
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            home_latitude: default_home_latitude(),
            home_longitude: default_home_longitude(),
            home_altitude_m: default_home_altitude_m(),
            initial_yaw_deg: 0.0,
            physics_rate_hz: default_physics_rate_hz(),
            goto_speed_m_s: default_goto_speed_m_s(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
        }
    }
}

fn invalid(message: impl std::fmt::Display) -> SwarmError {
    SwarmError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use swarm_flock::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the settings a flying vehicle needs on top of [`validate`](Self::validate)
    ///
    /// # Errors
    ///
    /// Returns error if the vehicle id is empty
    pub fn validate_vehicle(&self) -> Result<()> {
        if self.vehicle.id.trim().is_empty() {
            return Err(invalid("vehicle id cannot be empty"));
        }
        Ok(())
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Channel
        if self.channel.name.is_empty() || self.channel.name.contains('/') {
            return Err(invalid("channel name must be non-empty and contain no '/'"));
        }

        if self.channel.directory.is_empty() {
            return Err(invalid("channel directory cannot be empty"));
        }

        if !(64..=1024 * 1024).contains(&self.channel.capacity) {
            return Err(invalid("channel capacity must be between 64 and 1048576 bytes"));
        }

        if self.channel.publish_interval_ms == 0 || self.channel.publish_interval_ms > 1000 {
            return Err(invalid("publish_interval_ms must be between 1 and 1000"));
        }

        if self.channel.read_retries == 0 || self.channel.read_retries > 20 {
            return Err(invalid("read_retries must be between 1 and 20"));
        }

        if self.channel.retry_delay_ms > 1000 {
            return Err(invalid("retry_delay_ms must be at most 1000"));
        }

        // Controller
        let c = &self.controller;

        if c.tick_ms == 0 || c.tick_ms > 10000 {
            return Err(invalid("tick_ms must be between 1 and 10000"));
        }

        if !(c.escape_distance_m.is_finite() && c.escape_distance_m > 0.0) {
            return Err(invalid("escape_distance_m must be positive"));
        }

        if !c.flock_radius_m.is_finite() || c.flock_radius_m < c.escape_distance_m {
            return Err(invalid("flock_radius_m must be at least escape_distance_m"));
        }

        for (name, value) in [
            ("escape_speed_m_s", c.escape_speed_m_s),
            ("flock_speed_m_s", c.flock_speed_m_s),
            ("cruise_speed_m_s", c.cruise_speed_m_s),
        ] {
            if !value.is_finite() || value < 0.0 || value > 20.0 {
                return Err(invalid(format!("{} must be between 0.0 and 20.0", name)));
            }
        }

        for (name, value) in [
            ("separation_weight", c.separation_weight),
            ("alignment_weight", c.alignment_weight),
            ("cohesion_weight", c.cohesion_weight),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(format!("{} cannot be negative", name)));
            }
        }

        if !c.escape_hop_m.is_finite() || c.escape_hop_m <= 0.0 {
            return Err(invalid("escape_hop_m must be positive"));
        }

        if c.escape_hold_ms > 10000 {
            return Err(invalid("escape_hold_ms must be at most 10000"));
        }

        // Liveness
        if self.liveness.stale_after_ms == 0 {
            return Err(invalid("stale_after_ms must be greater than 0"));
        }

        if self.liveness.monitor_interval_ms == 0 || self.liveness.monitor_interval_ms > 60000 {
            return Err(invalid("monitor_interval_ms must be between 1 and 60000"));
        }

        // Recorder
        if self.recorder.enabled && self.recorder.log_dir.is_empty() {
            return Err(invalid("recorder log_dir cannot be empty when enabled"));
        }

        if self.recorder.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }

        if self.recorder.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        if self.recorder.record_interval_ms > 60000 {
            return Err(invalid("record_interval_ms must be at most 60000"));
        }

        // Simulation
        if crate::geo::Coordinates::new(self.sim.home_latitude, self.sim.home_longitude).is_none() {
            return Err(invalid("sim home position is not a valid latitude/longitude"));
        }

        if self.sim.physics_rate_hz == 0 || self.sim.physics_rate_hz > 1000 {
            return Err(invalid("physics_rate_hz must be between 1 and 1000"));
        }

        if !self.sim.goto_speed_m_s.is_finite() || self.sim.goto_speed_m_s <= 0.0 {
            return Err(invalid("goto_speed_m_s must be positive"));
        }

        // Logging
        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid("log level must be one of: trace, debug, info, warn, error"));
        }

        Ok(())
    }
}
