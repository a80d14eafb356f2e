//! Fine-grained internal state.
//!
//! `InternalState` refines [`OpState`] with the sub-state the control
//! loop actually needs: which side of the abort threshold a gated mode
//! is on, where keep-mode pressure sits relative to its band, and which
//! stage of the firing sequence is active. The mapping back to
//! `OpState` is total and many-to-one; it never changes at runtime.

use station_common::OpState;

/// Which timed pulse variant is running (shortest to longest).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseSlot {
    A,
    B,
    C,
}

/// Pressure classification against the abort threshold, with
/// hysteresis. A reading inside the buffer zone keeps the previous
/// band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortBand {
    BelowAbort,
    AboveAbort,
}

/// Keep-mode classification against the [MIN, MAX] band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepBand {
    InRange,
    AboveMax,
    BelowMin,
}

/// Ordered stages of the firing sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireStage {
    /// Igniter on, valve system armed.
    Igniter,
    /// Igniter off, valve system still armed; settle gap before the
    /// pyro valve opens.
    ValveBuffer,
    /// Main valve open.
    PyroValve,
}

/// Fine-grained operational state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalState {
    Standby,
    Keep(KeepBand),
    Fill(AbortBand),
    Purge(AbortBand),
    PulseFill(PulseSlot, AbortBand),
    PulseVent(PulseSlot),
    PulsePurge(PulseSlot, AbortBand),
    Fire(FireStage),
    FireManualIgniter,
    FireManualValve,
    Abort,
    Custom,
}

impl InternalState {
    /// Coarse mode this state belongs to. Total and stable.
    pub const fn op_state(&self) -> OpState {
        match self {
            Self::Standby => OpState::Standby,
            Self::Keep(_) => OpState::Keep,
            Self::Fill(_) => OpState::Fill,
            Self::Purge(_) => OpState::Purge,
            Self::PulseFill(PulseSlot::A, _) => OpState::PulseFillA,
            Self::PulseFill(PulseSlot::B, _) => OpState::PulseFillB,
            Self::PulseFill(PulseSlot::C, _) => OpState::PulseFillC,
            Self::PulseVent(PulseSlot::A) => OpState::PulseVentA,
            Self::PulseVent(PulseSlot::B) => OpState::PulseVentB,
            Self::PulseVent(PulseSlot::C) => OpState::PulseVentC,
            Self::PulsePurge(PulseSlot::A, _) => OpState::PulsePurgeA,
            Self::PulsePurge(PulseSlot::B, _) => OpState::PulsePurgeB,
            Self::PulsePurge(PulseSlot::C, _) => OpState::PulsePurgeC,
            Self::Fire(_) => OpState::Fire,
            Self::FireManualIgniter => OpState::FireManualIgniter,
            Self::FireManualValve => OpState::FireManualValve,
            Self::Abort => OpState::Abort,
            Self::Custom => OpState::Custom,
        }
    }

    /// Canonical entry sub-state for an externally commanded mode.
    ///
    /// Gated modes enter below-abort (fill first, vent only once the
    /// pressure proves otherwise); the firing sequence starts at the
    /// igniter stage.
    pub const fn entry_for(op: OpState) -> Self {
        match op {
            OpState::Standby => Self::Standby,
            OpState::Keep => Self::Keep(KeepBand::InRange),
            OpState::Fill => Self::Fill(AbortBand::BelowAbort),
            OpState::Purge => Self::Purge(AbortBand::BelowAbort),
            OpState::PulseFillA => Self::PulseFill(PulseSlot::A, AbortBand::BelowAbort),
            OpState::PulseFillB => Self::PulseFill(PulseSlot::B, AbortBand::BelowAbort),
            OpState::PulseFillC => Self::PulseFill(PulseSlot::C, AbortBand::BelowAbort),
            OpState::PulseVentA => Self::PulseVent(PulseSlot::A),
            OpState::PulseVentB => Self::PulseVent(PulseSlot::B),
            OpState::PulseVentC => Self::PulseVent(PulseSlot::C),
            OpState::PulsePurgeA => Self::PulsePurge(PulseSlot::A, AbortBand::BelowAbort),
            OpState::PulsePurgeB => Self::PulsePurge(PulseSlot::B, AbortBand::BelowAbort),
            OpState::PulsePurgeC => Self::PulsePurge(PulseSlot::C, AbortBand::BelowAbort),
            OpState::Fire => Self::Fire(FireStage::Igniter),
            OpState::FireManualIgniter => Self::FireManualIgniter,
            OpState::FireManualValve => Self::FireManualValve,
            OpState::Abort => Self::Abort,
            OpState::Custom => Self::Custom,
        }
    }
}
