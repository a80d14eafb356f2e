//! Operational state machine.
//!
//! [`internal`] defines the fine-grained state space (pressure bands,
//! fire stages); [`machine`] owns the transition and output logic.

pub mod internal;
pub mod machine;

pub use internal::{AbortBand, FireStage, InternalState, KeepBand, PulseSlot};
pub use machine::{PressureBands, StationFsm};
