//! Coarse operating modes of the station.
//!
//! `OpState` is the externally commanded mode. The discriminants are
//! the wire codes reported upstream in the status record; the remote
//! station decodes them by value, so they are frozen.

use serde::{Deserialize, Serialize};

/// Externally commanded operating mode.
///
/// Exactly one mode is active at any time. Modes change only via an
/// explicit operator command; the control loop never invents one,
/// except for timed modes expiring back to `Standby`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum OpState {
    /// Firing sequence (igniter → valve buffer → pyro valve).
    Fire = 0,
    /// Fill until over abort pressure, vent back down.
    Fill = 1,
    /// Fill + vent simultaneously to flush the lines.
    Purge = 2,
    /// Abort relay open, everything else off.
    Abort = 3,
    /// All actuators off.
    Standby = 4,
    /// Hold tank pressure inside the [MIN, MAX] band.
    Keep = 5,
    /// Timed fill, shortest pulse.
    PulseFillA = 6,
    /// Timed fill, medium pulse.
    PulseFillB = 7,
    /// Timed fill, longest pulse.
    PulseFillC = 8,
    /// Igniter held on until overridden.
    FireManualIgniter = 20,
    /// Main valve held open until overridden.
    FireManualValve = 21,
    /// Timed vent, shortest pulse.
    PulseVentA = 25,
    /// Timed vent, medium pulse.
    PulseVentB = 26,
    /// Timed vent, longest pulse.
    PulseVentC = 27,
    /// Timed purge, shortest pulse.
    PulsePurgeA = 30,
    /// Timed purge, medium pulse.
    PulsePurgeB = 31,
    /// Timed purge, longest pulse.
    PulsePurgeC = 32,
    /// Raw operator-supplied relay word applied verbatim.
    Custom = 40,
}

impl OpState {
    /// All states, in wire-code order. Used by codec tests and the
    /// command table.
    pub const ALL: [Self; 18] = [
        Self::Fire,
        Self::Fill,
        Self::Purge,
        Self::Abort,
        Self::Standby,
        Self::Keep,
        Self::PulseFillA,
        Self::PulseFillB,
        Self::PulseFillC,
        Self::FireManualIgniter,
        Self::FireManualValve,
        Self::PulseVentA,
        Self::PulseVentB,
        Self::PulseVentC,
        Self::PulsePurgeA,
        Self::PulsePurgeB,
        Self::PulsePurgeC,
        Self::Custom,
    ];

    /// The status byte reported upstream for this mode.
    #[inline]
    pub const fn wire_code(&self) -> u8 {
        *self as u8
    }

    /// Convert from a wire code. Returns `None` for unassigned values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Fire),
            1 => Some(Self::Fill),
            2 => Some(Self::Purge),
            3 => Some(Self::Abort),
            4 => Some(Self::Standby),
            5 => Some(Self::Keep),
            6 => Some(Self::PulseFillA),
            7 => Some(Self::PulseFillB),
            8 => Some(Self::PulseFillC),
            20 => Some(Self::FireManualIgniter),
            21 => Some(Self::FireManualValve),
            25 => Some(Self::PulseVentA),
            26 => Some(Self::PulseVentB),
            27 => Some(Self::PulseVentC),
            30 => Some(Self::PulsePurgeA),
            31 => Some(Self::PulsePurgeB),
            32 => Some(Self::PulsePurgeC),
            40 => Some(Self::Custom),
            _ => None,
        }
    }
}

impl Default for OpState {
    fn default() -> Self {
        Self::Standby
    }
}
