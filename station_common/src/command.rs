//! Operator command vocabulary and decoding.
//!
//! Commands arrive as short identifier strings from the remote
//! station. The vocabulary is a stable contract; unknown identifiers
//! are a decode error, dropped by the caller after logging.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::op_state::OpState;
use crate::relay::RelayState;

/// Command identifier strings, one per operating mode plus maintenance.
const STANDBY: &str = "standby";
const KEEP: &str = "keep";
const FILL: &str = "fill";
const PURGE: &str = "purge";
const PULSE_FILL_A: &str = "pulse-fill-A";
const PULSE_FILL_B: &str = "pulse-fill-B";
const PULSE_FILL_C: &str = "pulse-fill-C";
const PULSE_VENT_A: &str = "pulse-vent-A";
const PULSE_VENT_B: &str = "pulse-vent-B";
const PULSE_VENT_C: &str = "pulse-vent-C";
const PULSE_PURGE_A: &str = "pulse-purge-A";
const PULSE_PURGE_B: &str = "pulse-purge-B";
const PULSE_PURGE_C: &str = "pulse-purge-C";
const FIRE: &str = "fire";
const FIRE_MANUAL_IGNITER: &str = "fire-manual-igniter";
const FIRE_MANUAL_VALVE: &str = "fire-manual-valve";
const ABORT: &str = "abort";
const CUSTOM: &str = "custom";
const RECALIBRATE: &str = "recalibrate";
const CLEAR_CALIBRATION: &str = "clear-calibration";

/// Command decode failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    /// Identifier not in the vocabulary.
    #[error("unknown command {0:?}")]
    Unknown(String),
    /// `custom` without a relay byte, or a non-numeric payload.
    #[error("custom command payload {0:?} is not a byte")]
    BadCustomPayload(String),
}

/// A decoded operator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Enter the given operating mode.
    SetState(OpState),
    /// Enter custom mode with the decoded relay word.
    Custom(RelayState),
    /// Forwarded to the sensor board: recalibrate transducers.
    Recalibrate,
    /// Forwarded to the sensor board: clear stored calibration.
    ClearCalibration,
}

impl FromStr for Command {
    type Err = CommandError;

    /// Decode a command identifier. `custom` takes a decimal byte
    /// payload after a space, e.g. `"custom 19"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if s == CUSTOM {
            return Err(CommandError::BadCustomPayload(String::new()));
        }
        if let Some((word, payload)) = s.split_once(' ') {
            if word == CUSTOM {
                let payload = payload.trim();
                let byte: u8 = payload
                    .parse()
                    .map_err(|_| CommandError::BadCustomPayload(payload.to_string()))?;
                return Ok(Self::Custom(RelayState::from_wire(byte)));
            }
            return Err(CommandError::Unknown(s.to_string()));
        }

        let state = match s {
            STANDBY => OpState::Standby,
            KEEP => OpState::Keep,
            FILL => OpState::Fill,
            PURGE => OpState::Purge,
            PULSE_FILL_A => OpState::PulseFillA,
            PULSE_FILL_B => OpState::PulseFillB,
            PULSE_FILL_C => OpState::PulseFillC,
            PULSE_VENT_A => OpState::PulseVentA,
            PULSE_VENT_B => OpState::PulseVentB,
            PULSE_VENT_C => OpState::PulseVentC,
            PULSE_PURGE_A => OpState::PulsePurgeA,
            PULSE_PURGE_B => OpState::PulsePurgeB,
            PULSE_PURGE_C => OpState::PulsePurgeC,
            FIRE => OpState::Fire,
            FIRE_MANUAL_IGNITER => OpState::FireManualIgniter,
            FIRE_MANUAL_VALVE => OpState::FireManualValve,
            ABORT => OpState::Abort,
            RECALIBRATE => return Ok(Self::Recalibrate),
            CLEAR_CALIBRATION => return Ok(Self::ClearCalibration),
            other => return Err(CommandError::Unknown(other.to_string())),
        };

        Ok(Self::SetState(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_mode_commands() {
        assert_eq!(
            "standby".parse::<Command>().unwrap(),
            Command::SetState(OpState::Standby)
        );
        assert_eq!(
            "pulse-fill-B".parse::<Command>().unwrap(),
            Command::SetState(OpState::PulseFillB)
        );
        assert_eq!(
            "fire-manual-valve".parse::<Command>().unwrap(),
            Command::SetState(OpState::FireManualValve)
        );
        assert_eq!(
            "abort".parse::<Command>().unwrap(),
            Command::SetState(OpState::Abort)
        );
    }

    #[test]
    fn decode_maintenance_commands() {
        assert_eq!("recalibrate".parse::<Command>().unwrap(), Command::Recalibrate);
        assert_eq!(
            "clear-calibration".parse::<Command>().unwrap(),
            Command::ClearCalibration
        );
    }

    #[test]
    fn decode_custom_with_payload() {
        let cmd = "custom 19".parse::<Command>().unwrap();
        match cmd {
            Command::Custom(relays) => {
                // 19 = FILL | VENT | IGNITER
                assert!(relays.fill);
                assert!(relays.vent);
                assert!(relays.igniter);
                assert!(!relays.pyro_cutter);
                assert!(!relays.main_valve);
                assert!(!relays.abort);
            }
            other => panic!("expected custom, got {other:?}"),
        }
    }

    #[test]
    fn custom_without_payload_rejected() {
        assert!(matches!(
            "custom".parse::<Command>(),
            Err(CommandError::BadCustomPayload(_))
        ));
        assert!(matches!(
            "custom much".parse::<Command>(),
            Err(CommandError::BadCustomPayload(_))
        ));
    }

    #[test]
    fn unknown_command_rejected() {
        assert_eq!(
            "launch".parse::<Command>(),
            Err(CommandError::Unknown("launch".to_string()))
        );
        // Case matters: the vocabulary is exact.
        assert!(matches!(
            "Standby".parse::<Command>(),
            Err(CommandError::Unknown(_))
        ));
    }

    #[test]
    fn whitespace_tolerated() {
        assert_eq!(
            "  fill \n".parse::<Command>().unwrap(),
            Command::SetState(OpState::Fill)
        );
    }
}
