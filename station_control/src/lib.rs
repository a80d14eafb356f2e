//! # Station Control
//!
//! Control daemon for the propellant fill/firing station.
//!
//! The control loop runs once per tick: consume at most one pending
//! operator command, take a single pressure sample, advance the
//! operational state machine, and latch the resulting actuator set.
//! Hardware application happens in a separate periodic flush task, and
//! command/status transport in a background uplink task, so the loop
//! itself never blocks on I/O.

pub mod actuators;
pub mod cycle;
pub mod mailbox;
pub mod pressure;
pub mod sensor_link;
pub mod state;
pub mod uplink;

pub use cycle::ControlCycle;
pub use state::machine::StationFsm;
