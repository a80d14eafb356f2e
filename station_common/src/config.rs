//! TOML configuration with validation.
//!
//! Defaults reproduce the flight-proven station constants. Validation
//! rejects threshold orderings that would make the hysteresis bands
//! overlap: with an oversized buffer a single pressure reading could
//! classify as both "above max" and "below abort", and the transition
//! logic has no defined priority between those.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration loading/validation error.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("config I/O error: {0}")]
    Io(String),
    /// TOML parse error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Parameter validation error.
    #[error("config validation: {0}")]
    Validation(String),
}

// ─── Pressure Thresholds ────────────────────────────────────────────

/// Tank pressure thresholds [milli-psi] shared by all gated modes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PressureThresholds {
    /// Keep-mode lower bound: below this (minus buffer), fill.
    #[serde(default = "default_min_mpsi")]
    pub min_mpsi: i64,
    /// Keep-mode upper bound: above this (plus buffer), vent.
    #[serde(default = "default_max_mpsi")]
    pub max_mpsi: i64,
    /// Over-pressure bound for fill/purge/pulse modes.
    #[serde(default = "default_abort_mpsi")]
    pub abort_mpsi: i64,
    /// Hysteresis half-width around every threshold.
    #[serde(default = "default_buffer_mpsi")]
    pub buffer_mpsi: i64,
}

fn default_min_mpsi() -> i64 {
    730_000
}
fn default_max_mpsi() -> i64 {
    770_000
}
fn default_abort_mpsi() -> i64 {
    900_000
}
fn default_buffer_mpsi() -> i64 {
    5_000
}

impl Default for PressureThresholds {
    fn default() -> Self {
        Self {
            min_mpsi: default_min_mpsi(),
            max_mpsi: default_max_mpsi(),
            abort_mpsi: default_abort_mpsi(),
            buffer_mpsi: default_buffer_mpsi(),
        }
    }
}

impl PressureThresholds {
    /// Check ordering and band separation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_mpsi <= 0 {
            return Err(ConfigError::Validation(format!(
                "buffer_mpsi {} must be positive",
                self.buffer_mpsi
            )));
        }
        if !(self.min_mpsi < self.max_mpsi && self.max_mpsi < self.abort_mpsi) {
            return Err(ConfigError::Validation(format!(
                "thresholds must satisfy min < max < abort (got {} / {} / {})",
                self.min_mpsi, self.max_mpsi, self.abort_mpsi
            )));
        }
        // Bands are ±buffer wide; neighbouring thresholds must not
        // produce overlapping dead zones.
        if self.buffer_mpsi >= self.abort_mpsi - self.max_mpsi {
            return Err(ConfigError::Validation(format!(
                "buffer_mpsi {} >= abort−max gap {}; hysteresis bands overlap",
                self.buffer_mpsi,
                self.abort_mpsi - self.max_mpsi
            )));
        }
        if self.buffer_mpsi >= self.max_mpsi - self.min_mpsi {
            return Err(ConfigError::Validation(format!(
                "buffer_mpsi {} >= max−min gap {}; hysteresis bands overlap",
                self.buffer_mpsi,
                self.max_mpsi - self.min_mpsi
            )));
        }
        Ok(())
    }
}

// ─── Timed-Mode Durations ───────────────────────────────────────────

/// Fixed timeouts for the timed modes [ms].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Durations {
    #[serde(default = "default_pulse_fill_a_ms")]
    pub pulse_fill_a_ms: u64,
    #[serde(default = "default_pulse_fill_b_ms")]
    pub pulse_fill_b_ms: u64,
    #[serde(default = "default_pulse_fill_c_ms")]
    pub pulse_fill_c_ms: u64,
    #[serde(default = "default_pulse_vent_a_ms")]
    pub pulse_vent_a_ms: u64,
    #[serde(default = "default_pulse_vent_b_ms")]
    pub pulse_vent_b_ms: u64,
    #[serde(default = "default_pulse_vent_c_ms")]
    pub pulse_vent_c_ms: u64,
    #[serde(default = "default_pulse_purge_a_ms")]
    pub pulse_purge_a_ms: u64,
    #[serde(default = "default_pulse_purge_b_ms")]
    pub pulse_purge_b_ms: u64,
    #[serde(default = "default_pulse_purge_c_ms")]
    pub pulse_purge_c_ms: u64,
    /// Igniter burn time before the valve stage.
    #[serde(default = "default_fire_igniter_ms")]
    pub fire_igniter_ms: u64,
    /// Gap between igniter off and pyro valve open.
    #[serde(default = "default_fire_valve_buffer_ms")]
    pub fire_valve_buffer_ms: u64,
    /// Pyro valve open time before returning to standby.
    #[serde(default = "default_fire_pyro_valve_ms")]
    pub fire_pyro_valve_ms: u64,
}

fn default_pulse_fill_a_ms() -> u64 {
    1_000
}
fn default_pulse_fill_b_ms() -> u64 {
    5_000
}
fn default_pulse_fill_c_ms() -> u64 {
    10_000
}
fn default_pulse_vent_a_ms() -> u64 {
    1_000
}
fn default_pulse_vent_b_ms() -> u64 {
    2_000
}
fn default_pulse_vent_c_ms() -> u64 {
    5_000
}
fn default_pulse_purge_a_ms() -> u64 {
    1_000
}
fn default_pulse_purge_b_ms() -> u64 {
    2_000
}
fn default_pulse_purge_c_ms() -> u64 {
    5_000
}
fn default_fire_igniter_ms() -> u64 {
    10_000
}
fn default_fire_valve_buffer_ms() -> u64 {
    500
}
fn default_fire_pyro_valve_ms() -> u64 {
    30_000
}

impl Default for Durations {
    fn default() -> Self {
        Self {
            pulse_fill_a_ms: default_pulse_fill_a_ms(),
            pulse_fill_b_ms: default_pulse_fill_b_ms(),
            pulse_fill_c_ms: default_pulse_fill_c_ms(),
            pulse_vent_a_ms: default_pulse_vent_a_ms(),
            pulse_vent_b_ms: default_pulse_vent_b_ms(),
            pulse_vent_c_ms: default_pulse_vent_c_ms(),
            pulse_purge_a_ms: default_pulse_purge_a_ms(),
            pulse_purge_b_ms: default_pulse_purge_b_ms(),
            pulse_purge_c_ms: default_pulse_purge_c_ms(),
            fire_igniter_ms: default_fire_igniter_ms(),
            fire_valve_buffer_ms: default_fire_valve_buffer_ms(),
            fire_pyro_valve_ms: default_fire_pyro_valve_ms(),
        }
    }
}

impl Durations {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let all = [
            ("pulse_fill_a_ms", self.pulse_fill_a_ms),
            ("pulse_fill_b_ms", self.pulse_fill_b_ms),
            ("pulse_fill_c_ms", self.pulse_fill_c_ms),
            ("pulse_vent_a_ms", self.pulse_vent_a_ms),
            ("pulse_vent_b_ms", self.pulse_vent_b_ms),
            ("pulse_vent_c_ms", self.pulse_vent_c_ms),
            ("pulse_purge_a_ms", self.pulse_purge_a_ms),
            ("pulse_purge_b_ms", self.pulse_purge_b_ms),
            ("pulse_purge_c_ms", self.pulse_purge_c_ms),
            ("fire_igniter_ms", self.fire_igniter_ms),
            ("fire_valve_buffer_ms", self.fire_valve_buffer_ms),
            ("fire_pyro_valve_ms", self.fire_pyro_valve_ms),
        ];
        for (name, value) in all {
            if value == 0 {
                return Err(ConfigError::Validation(format!("{name} must be non-zero")));
            }
        }
        Ok(())
    }
}

// ─── Task Cadences & Endpoints ──────────────────────────────────────

/// Uplink connection to the operator station server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// `host:port` of the ground server.
    #[serde(default = "default_server_addr")]
    pub server_addr: String,
    /// Command poll / status push period [ms].
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Reconnect backoff after a transport failure [ms].
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_server_addr() -> String {
    "127.0.0.1:3000".to_string()
}
fn default_poll_interval_ms() -> u64 {
    250
}
fn default_backoff_ms() -> u64 {
    1_000
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            server_addr: default_server_addr(),
            poll_interval_ms: default_poll_interval_ms(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

/// Serial link to the scientific (sensor) board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Serial device path.
    #[serde(default = "default_sensor_device")]
    pub device: String,
    /// Baud rate (8N1, no flow control).
    #[serde(default = "default_sensor_baud_rate")]
    pub baud_rate: u32,
}

fn default_sensor_device() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_sensor_baud_rate() -> u32 {
    115_200
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            device: default_sensor_device(),
            baud_rate: default_sensor_baud_rate(),
        }
    }
}

// ─── Top-Level Config ───────────────────────────────────────────────

/// Complete validated station configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationConfig {
    /// Station identifier reported in every status record.
    #[serde(default)]
    pub station_id: String,
    /// Control loop period [ms].
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Relay flush period [ms].
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default)]
    pub thresholds: PressureThresholds,
    #[serde(default)]
    pub durations: Durations,
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub sensor: SensorConfig,
}

fn default_tick_interval_ms() -> u64 {
    10
}
fn default_flush_interval_ms() -> u64 {
    5
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            station_id: String::new(),
            tick_interval_ms: default_tick_interval_ms(),
            flush_interval_ms: default_flush_interval_ms(),
            thresholds: PressureThresholds::default(),
            durations: Durations::default(),
            link: LinkConfig::default(),
            sensor: SensorConfig::default(),
        }
    }
}

impl StationConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "tick_interval_ms must be non-zero".to_string(),
            ));
        }
        if self.flush_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "flush_interval_ms must be non-zero".to_string(),
            ));
        }
        if self.sensor.baud_rate == 0 {
            return Err(ConfigError::Validation(
                "sensor.baud_rate must be non-zero".to_string(),
            ));
        }
        self.thresholds.validate()?;
        self.durations.validate()?;
        Ok(())
    }
}

/// Load and validate the station configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<StationConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("failed to read {}: {e}", path.display())))?;
    load_config_from_str(&raw)
}

/// Load config from a TOML string (for testing).
pub fn load_config_from_str(raw: &str) -> Result<StationConfig, ConfigError> {
    let config: StationConfig =
        toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
    config.validate()?;
    Ok(config)
}
