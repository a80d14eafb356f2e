//! Relay status encoding.
//!
//! The status byte packs five actuators, one bit each. The abort relay
//! has no wire bit: it is reported implicitly through the `abort`
//! operating state, and a decoded custom word always leaves it off.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Wire representation of the relay bank (5 bits used).
    ///
    /// Every value of the underlying byte decodes to *some* relay
    /// combination; the three high bits are ignored.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RelayWord: u8 {
        /// Fill valve relay.
        const FILL        = 0x01;
        /// Vent valve relay.
        const VENT        = 0x02;
        /// Pyro-cutter relay.
        const PYRO_CUTTER = 0x04;
        /// Main (servo) valve.
        const MAIN_VALVE  = 0x08;
        /// Igniter relay.
        const IGNITER     = 0x10;
    }
}

impl Default for RelayWord {
    fn default() -> Self {
        Self::empty()
    }
}

/// Desired on/off status of every relay, as a plain record.
///
/// This is the payload of a `custom` command: it is replaced wholesale
/// on every new command and never partially mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RelayState {
    pub fill: bool,
    pub vent: bool,
    pub abort: bool,
    pub pyro_cutter: bool,
    pub igniter: bool,
    pub main_valve: bool,
}

impl RelayState {
    /// Everything off.
    pub const OFF: Self = Self {
        fill: false,
        vent: false,
        abort: false,
        pyro_cutter: false,
        igniter: false,
        main_valve: false,
    };

    /// Pack into the wire word. The abort relay is not transmitted.
    pub fn wire_word(&self) -> RelayWord {
        let mut word = RelayWord::empty();
        word.set(RelayWord::FILL, self.fill);
        word.set(RelayWord::VENT, self.vent);
        word.set(RelayWord::PYRO_CUTTER, self.pyro_cutter);
        word.set(RelayWord::MAIN_VALVE, self.main_valve);
        word.set(RelayWord::IGNITER, self.igniter);
        word
    }

    /// Decode a custom-command byte. Cannot fail: all 256 values map
    /// to a relay combination, with `abort` always off.
    pub fn from_wire(byte: u8) -> Self {
        let word = RelayWord::from_bits_truncate(byte);
        Self {
            fill: word.contains(RelayWord::FILL),
            vent: word.contains(RelayWord::VENT),
            abort: false,
            pyro_cutter: word.contains(RelayWord::PYRO_CUTTER),
            igniter: word.contains(RelayWord::IGNITER),
            main_valve: word.contains(RelayWord::MAIN_VALVE),
        }
    }
}
