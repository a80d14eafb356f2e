//! # Station Common
//!
//! Shared vocabulary for the fill/firing station: operating states,
//! relay wire encoding, operator commands, and configuration.
//!
//! Everything here is transport-agnostic. The byte codes in
//! [`op_state`] and [`relay`] are a stable contract with the remote
//! operator station and must not be renumbered.

pub mod command;
pub mod config;
pub mod op_state;
pub mod relay;

pub use command::{Command, CommandError};
pub use config::{Durations, LinkConfig, PressureThresholds, SensorConfig, StationConfig};
pub use op_state::OpState;
pub use relay::{RelayState, RelayWord};
