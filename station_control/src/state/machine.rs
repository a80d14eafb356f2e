//! Transition and output logic for the operational state machine.
//!
//! `tick` runs in a fixed order: classify the (already sampled)
//! pressure into hysteresis bands, apply at most one transition, then
//! recompute the full actuator set from the resulting state. Outputs
//! are a pure function of state — nothing carries over from the
//! previous tick, so a missed reset cannot leave a relay stuck on.
//!
//! Over-pressure in a gated mode only ever opens the vent; it never
//! promotes the mode to `Abort`. Venting and full abort are distinct
//! operator responses and the operator picks between them.

use std::time::{Duration, Instant};

use station_common::{Durations, OpState, PressureThresholds, RelayState};
use tracing::debug;

use crate::actuators::ActuatorOutputs;
use crate::state::internal::{AbortBand, FireStage, InternalState, KeepBand, PulseSlot};

// ─── Pressure Bands ─────────────────────────────────────────────────

/// Hysteresis classification of one pressure sample.
///
/// For each threshold T the sample is "above" only past `T + buffer`
/// and "below" only under `T - buffer`. Inside the buffer zone both
/// flags are false and the previous band classification stands — this
/// is what keeps relays from chattering when the reading hovers on a
/// threshold.
#[derive(Debug, Clone, Copy)]
pub struct PressureBands {
    pub above_abort: bool,
    pub below_abort: bool,
    pub above_max: bool,
    pub below_max: bool,
    pub above_min: bool,
    pub below_min: bool,
}

impl PressureBands {
    pub fn classify(pressure_mpsi: i64, t: &PressureThresholds) -> Self {
        Self {
            above_abort: pressure_mpsi > t.abort_mpsi + t.buffer_mpsi,
            below_abort: pressure_mpsi < t.abort_mpsi - t.buffer_mpsi,
            above_max: pressure_mpsi > t.max_mpsi + t.buffer_mpsi,
            below_max: pressure_mpsi < t.max_mpsi - t.buffer_mpsi,
            above_min: pressure_mpsi > t.min_mpsi + t.buffer_mpsi,
            below_min: pressure_mpsi < t.min_mpsi - t.buffer_mpsi,
        }
    }
}

// ─── State Machine ──────────────────────────────────────────────────

/// The operational state machine.
///
/// Owns the fine-grained state, the timestamp of its last entry, and
/// the relay record for custom mode. Mutated only by [`Self::tick`]
/// and the two command-application methods.
#[derive(Debug)]
pub struct StationFsm {
    thresholds: PressureThresholds,
    durations: Durations,
    state: InternalState,
    entered_at: Instant,
    custom: RelayState,
}

impl StationFsm {
    pub fn new(thresholds: PressureThresholds, durations: Durations, now: Instant) -> Self {
        Self {
            thresholds,
            durations,
            state: InternalState::Standby,
            entered_at: now,
            custom: RelayState::OFF,
        }
    }

    /// Current coarse mode.
    #[inline]
    pub fn op_state(&self) -> OpState {
        self.state.op_state()
    }

    /// Current fine-grained state (test and diagnostic visibility).
    #[inline]
    pub fn internal_state(&self) -> InternalState {
        self.state
    }

    /// Unconditional external override: jump to the canonical entry
    /// sub-state for `op` and restart the state timer. Interrupts any
    /// in-progress timed or pressure-gated sequence.
    pub fn set_op_state(&mut self, op: OpState, now: Instant) {
        debug!(?op, "set op state");
        self.enter(InternalState::entry_for(op), now);
    }

    /// Enter custom mode with an atomically replaced relay record.
    pub fn set_op_state_custom(&mut self, relays: RelayState, now: Instant) {
        debug!(?relays, "set op state: custom");
        self.custom = relays;
        self.enter(InternalState::Custom, now);
    }

    /// Advance one tick and return the actuator set for the (possibly
    /// new) state. `pressure_mpsi` must be a single sample taken before
    /// the call, frozen for the whole tick.
    pub fn tick(&mut self, pressure_mpsi: i64, now: Instant) -> ActuatorOutputs {
        self.transition(pressure_mpsi, now);
        self.outputs()
    }

    fn enter(&mut self, state: InternalState, now: Instant) {
        self.state = state;
        self.entered_at = now;
    }

    /// Apply at most one transition. Pressure-band switches win over
    /// timeouts: a pulse only expires while it is not actively venting
    /// over-pressure.
    fn transition(&mut self, pressure_mpsi: i64, now: Instant) {
        let bands = PressureBands::classify(pressure_mpsi, &self.thresholds);
        let elapsed = now.saturating_duration_since(self.entered_at);

        let next = match self.state {
            // No autonomous exit.
            InternalState::Standby
            | InternalState::FireManualIgniter
            | InternalState::FireManualValve
            | InternalState::Abort
            | InternalState::Custom => None,

            InternalState::Keep(band) => match band {
                KeepBand::InRange if bands.above_max => {
                    Some(InternalState::Keep(KeepBand::AboveMax))
                }
                KeepBand::InRange if bands.below_min => {
                    Some(InternalState::Keep(KeepBand::BelowMin))
                }
                KeepBand::AboveMax if bands.below_max => {
                    Some(InternalState::Keep(KeepBand::InRange))
                }
                KeepBand::BelowMin if bands.above_min => {
                    Some(InternalState::Keep(KeepBand::InRange))
                }
                _ => None,
            },

            InternalState::Fill(band) => {
                Self::abort_band_switch(band, bands).map(InternalState::Fill)
            }
            InternalState::Purge(band) => {
                Self::abort_band_switch(band, bands).map(InternalState::Purge)
            }

            InternalState::PulseFill(slot, band) => match band {
                AbortBand::AboveAbort if bands.below_abort => {
                    Some(InternalState::PulseFill(slot, AbortBand::BelowAbort))
                }
                AbortBand::BelowAbort if bands.above_abort => {
                    Some(InternalState::PulseFill(slot, AbortBand::AboveAbort))
                }
                AbortBand::BelowAbort if elapsed > self.pulse_fill_time(slot) => {
                    Some(InternalState::Standby)
                }
                _ => None,
            },

            InternalState::PulseVent(slot) => {
                (elapsed > self.pulse_vent_time(slot)).then_some(InternalState::Standby)
            }

            InternalState::PulsePurge(slot, band) => match band {
                AbortBand::AboveAbort if bands.below_abort => {
                    Some(InternalState::PulsePurge(slot, AbortBand::BelowAbort))
                }
                AbortBand::BelowAbort if bands.above_abort => {
                    Some(InternalState::PulsePurge(slot, AbortBand::AboveAbort))
                }
                AbortBand::BelowAbort if elapsed > self.pulse_purge_time(slot) => {
                    Some(InternalState::Standby)
                }
                _ => None,
            },

            // Purely time-driven; pressure is ignored.
            InternalState::Fire(stage) => match stage {
                FireStage::Igniter
                    if elapsed > Duration::from_millis(self.durations.fire_igniter_ms) =>
                {
                    Some(InternalState::Fire(FireStage::ValveBuffer))
                }
                FireStage::ValveBuffer
                    if elapsed > Duration::from_millis(self.durations.fire_valve_buffer_ms) =>
                {
                    Some(InternalState::Fire(FireStage::PyroValve))
                }
                FireStage::PyroValve
                    if elapsed > Duration::from_millis(self.durations.fire_pyro_valve_ms) =>
                {
                    Some(InternalState::Standby)
                }
                _ => None,
            },
        };

        if let Some(state) = next {
            debug!(from = ?self.state, to = ?state, "state transition");
            self.enter(state, now);
        }
    }

    fn abort_band_switch(band: AbortBand, bands: PressureBands) -> Option<AbortBand> {
        match band {
            AbortBand::AboveAbort if bands.below_abort => Some(AbortBand::BelowAbort),
            AbortBand::BelowAbort if bands.above_abort => Some(AbortBand::AboveAbort),
            _ => None,
        }
    }

    /// Full actuator set for the current state. Exhaustive over every
    /// internal state; every actuator is assigned on every call.
    pub fn outputs(&self) -> ActuatorOutputs {
        let mut out = ActuatorOutputs::OFF;

        match self.state {
            InternalState::Standby | InternalState::Keep(KeepBand::InRange) => {}

            InternalState::Keep(KeepBand::AboveMax) => out.vent = true,
            InternalState::Keep(KeepBand::BelowMin) => out.fill = true,

            InternalState::Fill(AbortBand::AboveAbort) => out.vent = true,
            InternalState::Fill(AbortBand::BelowAbort) => out.fill = true,

            // Purge floods the lines: fill and vent open together while
            // under the abort threshold.
            InternalState::Purge(AbortBand::AboveAbort) => out.vent = true,
            InternalState::Purge(AbortBand::BelowAbort) => {
                out.fill = true;
                out.vent = true;
            }

            InternalState::PulseFill(_, AbortBand::AboveAbort) => out.vent = true,
            InternalState::PulseFill(_, AbortBand::BelowAbort) => out.fill = true,

            InternalState::PulseVent(_) => out.vent = true,

            InternalState::PulsePurge(_, AbortBand::AboveAbort) => out.vent = true,
            InternalState::PulsePurge(_, AbortBand::BelowAbort) => {
                out.fill = true;
                out.vent = true;
            }

            InternalState::Fire(FireStage::Igniter) => {
                out.igniter = true;
                out.valve_armed = true;
            }
            InternalState::Fire(FireStage::ValveBuffer) => out.valve_armed = true,
            InternalState::Fire(FireStage::PyroValve) => {
                out.main_valve = true;
                out.valve_armed = true;
            }

            InternalState::FireManualIgniter => {
                out.igniter = true;
                out.valve_armed = true;
            }
            InternalState::FireManualValve => {
                out.main_valve = true;
                out.valve_armed = true;
            }

            InternalState::Abort => out.abort = true,

            InternalState::Custom => out = ActuatorOutputs::from_custom(&self.custom),
        }

        out
    }

    fn pulse_fill_time(&self, slot: PulseSlot) -> Duration {
        Duration::from_millis(match slot {
            PulseSlot::A => self.durations.pulse_fill_a_ms,
            PulseSlot::B => self.durations.pulse_fill_b_ms,
            PulseSlot::C => self.durations.pulse_fill_c_ms,
        })
    }

    fn pulse_vent_time(&self, slot: PulseSlot) -> Duration {
        Duration::from_millis(match slot {
            PulseSlot::A => self.durations.pulse_vent_a_ms,
            PulseSlot::B => self.durations.pulse_vent_b_ms,
            PulseSlot::C => self.durations.pulse_vent_c_ms,
        })
    }

    fn pulse_purge_time(&self, slot: PulseSlot) -> Duration {
        Duration::from_millis(match slot {
            PulseSlot::A => self.durations.pulse_purge_a_ms,
            PulseSlot::B => self.durations.pulse_purge_b_ms,
            PulseSlot::C => self.durations.pulse_purge_c_ms,
        })
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fsm() -> (StationFsm, Instant) {
        let t0 = Instant::now();
        (
            StationFsm::new(PressureThresholds::default(), Durations::default(), t0),
            t0,
        )
    }

    // Pressures relative to the default thresholds.
    const CALM: i64 = 500_000; // comfortably below everything
    const OVER_ABORT: i64 = 905_001; // above abort + buffer

    #[test]
    fn starts_in_standby_all_off() {
        let (mut fsm, t0) = fsm();
        assert_eq!(fsm.op_state(), OpState::Standby);
        assert_eq!(fsm.tick(CALM, t0), ActuatorOutputs::OFF);
    }

    #[test]
    fn fill_switches_bands_on_abort_threshold() {
        let (mut fsm, t0) = fsm();
        fsm.set_op_state(OpState::Fill, t0);

        let out = fsm.tick(CALM, t0 + Duration::from_millis(1));
        assert_eq!(fsm.internal_state(), InternalState::Fill(AbortBand::BelowAbort));
        assert!(out.fill && !out.vent);

        let out = fsm.tick(OVER_ABORT, t0 + Duration::from_millis(2));
        assert_eq!(fsm.internal_state(), InternalState::Fill(AbortBand::AboveAbort));
        assert!(out.vent && !out.fill);

        let out = fsm.tick(CALM, t0 + Duration::from_millis(3));
        assert_eq!(fsm.internal_state(), InternalState::Fill(AbortBand::BelowAbort));
        assert!(out.fill && !out.vent);
    }

    #[test]
    fn buffer_zone_preserves_previous_band() {
        let (mut fsm, t0) = fsm();
        fsm.set_op_state(OpState::Fill, t0);

        // Cross above.
        fsm.tick(OVER_ABORT, t0 + Duration::from_millis(1));
        assert_eq!(fsm.internal_state(), InternalState::Fill(AbortBand::AboveAbort));

        // Anywhere inside abort ± buffer: no transition, outputs stay.
        for p in [895_000, 899_999, 900_000, 903_000, 905_000] {
            let out = fsm.tick(p, t0 + Duration::from_millis(2));
            assert_eq!(
                fsm.internal_state(),
                InternalState::Fill(AbortBand::AboveAbort),
                "pressure {p} must not leave the band"
            );
            assert!(out.vent && !out.fill);
        }

        // One mpsi under the band edge flips it.
        fsm.tick(894_999, t0 + Duration::from_millis(3));
        assert_eq!(fsm.internal_state(), InternalState::Fill(AbortBand::BelowAbort));
    }

    #[test]
    fn keep_holds_pressure_between_min_and_max() {
        let (mut fsm, t0) = fsm();
        fsm.set_op_state(OpState::Keep, t0);

        // In range: nothing on.
        let out = fsm.tick(750_000, t0 + Duration::from_millis(1));
        assert_eq!(out, ActuatorOutputs::OFF);

        // Above max + buffer: vent.
        let out = fsm.tick(776_000, t0 + Duration::from_millis(2));
        assert_eq!(fsm.internal_state(), InternalState::Keep(KeepBand::AboveMax));
        assert!(out.vent);

        // Back below max - buffer: in range again.
        let out = fsm.tick(760_000, t0 + Duration::from_millis(3));
        assert_eq!(fsm.internal_state(), InternalState::Keep(KeepBand::InRange));
        assert_eq!(out, ActuatorOutputs::OFF);

        // Below min - buffer: fill.
        let out = fsm.tick(720_000, t0 + Duration::from_millis(4));
        assert_eq!(fsm.internal_state(), InternalState::Keep(KeepBand::BelowMin));
        assert!(out.fill);
    }

    #[test]
    fn keep_has_no_timeout() {
        let (mut fsm, t0) = fsm();
        fsm.set_op_state(OpState::Keep, t0);
        fsm.tick(750_000, t0 + Duration::from_secs(3600));
        assert_eq!(fsm.op_state(), OpState::Keep);
    }

    #[test]
    fn pulse_fill_expires_to_standby() {
        let (mut fsm, t0) = fsm();
        fsm.set_op_state(OpState::PulseFillA, t0);

        // Before the timeout: filling.
        let out = fsm.tick(CALM, t0 + Duration::from_millis(999));
        assert!(out.fill);
        assert_eq!(fsm.op_state(), OpState::PulseFillA);

        // Just past the timeout: standby, everything off.
        let out = fsm.tick(CALM, t0 + Duration::from_millis(1_001));
        assert_eq!(fsm.op_state(), OpState::Standby);
        assert_eq!(out, ActuatorOutputs::OFF);
    }

    #[test]
    fn pulse_fill_does_not_expire_while_venting() {
        let (mut fsm, t0) = fsm();
        fsm.set_op_state(OpState::PulseFillA, t0);

        // Over-pressure before the timeout moves to the vent band.
        fsm.tick(OVER_ABORT, t0 + Duration::from_millis(10));
        assert_eq!(
            fsm.internal_state(),
            InternalState::PulseFill(PulseSlot::A, AbortBand::AboveAbort)
        );

        // Way past the nominal pulse time but still over-pressure:
        // the pulse keeps venting instead of expiring.
        let out = fsm.tick(OVER_ABORT, t0 + Duration::from_secs(30));
        assert_eq!(fsm.op_state(), OpState::PulseFillA);
        assert!(out.vent);

        // Band switch and timeout never fire on the same tick: the
        // drop back below abort re-enters the fill band first...
        fsm.tick(CALM, t0 + Duration::from_secs(31));
        assert_eq!(
            fsm.internal_state(),
            InternalState::PulseFill(PulseSlot::A, AbortBand::BelowAbort)
        );
        assert_eq!(fsm.op_state(), OpState::PulseFillA);

        // ...and the restarted timer expires the pulse on a later tick.
        fsm.tick(CALM, t0 + Duration::from_secs(33));
        assert_eq!(fsm.op_state(), OpState::Standby);
    }

    #[test]
    fn pulse_vent_expires_regardless_of_pressure() {
        let (mut fsm, t0) = fsm();
        fsm.set_op_state(OpState::PulseVentB, t0);

        let out = fsm.tick(OVER_ABORT, t0 + Duration::from_millis(100));
        assert!(out.vent);

        let out = fsm.tick(OVER_ABORT, t0 + Duration::from_millis(2_001));
        assert_eq!(fsm.op_state(), OpState::Standby);
        assert_eq!(out, ActuatorOutputs::OFF);
    }

    #[test]
    fn purge_opens_fill_and_vent_below_abort() {
        let (mut fsm, t0) = fsm();
        fsm.set_op_state(OpState::Purge, t0);

        let out = fsm.tick(CALM, t0 + Duration::from_millis(1));
        assert!(out.fill && out.vent);

        let out = fsm.tick(OVER_ABORT, t0 + Duration::from_millis(2));
        assert!(out.vent && !out.fill);
    }

    #[test]
    fn fire_sequence_stages_and_exclusivity() {
        let (mut fsm, t0) = fsm();
        fsm.set_op_state(OpState::Fire, t0);

        // Igniter stage.
        let out = fsm.tick(CALM, t0 + Duration::from_millis(1));
        assert!(out.igniter && out.valve_armed && !out.main_valve);

        // Valve buffer: igniter off, still armed.
        let out = fsm.tick(CALM, t0 + Duration::from_millis(10_001));
        assert_eq!(fsm.internal_state(), InternalState::Fire(FireStage::ValveBuffer));
        assert!(!out.igniter && out.valve_armed && !out.main_valve);

        // Pyro valve: main valve open, igniter off.
        let out = fsm.tick(CALM, t0 + Duration::from_millis(10_502));
        assert_eq!(fsm.internal_state(), InternalState::Fire(FireStage::PyroValve));
        assert!(out.main_valve && out.valve_armed && !out.igniter);

        // Done: everything off.
        let out = fsm.tick(CALM, t0 + Duration::from_millis(40_503));
        assert_eq!(fsm.op_state(), OpState::Standby);
        assert_eq!(out, ActuatorOutputs::OFF);
    }

    #[test]
    fn fire_ignores_pressure() {
        let (mut fsm, t0) = fsm();
        fsm.set_op_state(OpState::Fire, t0);
        let out = fsm.tick(OVER_ABORT, t0 + Duration::from_millis(1));
        assert!(out.igniter);
        assert!(!out.vent);
        assert_eq!(fsm.internal_state(), InternalState::Fire(FireStage::Igniter));
    }

    #[test]
    fn manual_fire_modes_hold_until_overridden() {
        let (mut fsm, t0) = fsm();
        fsm.set_op_state(OpState::FireManualIgniter, t0);

        let out = fsm.tick(CALM, t0 + Duration::from_secs(3600));
        assert!(out.igniter && out.valve_armed);
        assert_eq!(fsm.op_state(), OpState::FireManualIgniter);

        fsm.set_op_state(OpState::FireManualValve, t0 + Duration::from_secs(3601));
        let out = fsm.tick(CALM, t0 + Duration::from_secs(3602));
        assert!(out.main_valve && out.valve_armed && !out.igniter);
        assert_eq!(fsm.op_state(), OpState::FireManualValve);
    }

    #[test]
    fn abort_opens_abort_relay_only() {
        let (mut fsm, t0) = fsm();
        fsm.set_op_state(OpState::Abort, t0);
        let out = fsm.tick(OVER_ABORT, t0 + Duration::from_secs(600));
        assert_eq!(
            out,
            ActuatorOutputs {
                abort: true,
                ..ActuatorOutputs::OFF
            }
        );
        assert_eq!(fsm.op_state(), OpState::Abort);
    }

    #[test]
    fn overpressure_never_promotes_to_abort() {
        let (mut fsm, t0) = fsm();
        fsm.set_op_state(OpState::Fill, t0);
        for i in 1..1000u64 {
            fsm.tick(OVER_ABORT, t0 + Duration::from_millis(i * 10));
            assert_eq!(fsm.op_state(), OpState::Fill);
        }
    }

    #[test]
    fn custom_applies_relays_verbatim() {
        let (mut fsm, t0) = fsm();
        fsm.set_op_state_custom(
            RelayState {
                fill: true,
                abort: true,
                ..RelayState::OFF
            },
            t0,
        );

        // Pressure is irrelevant in custom mode.
        let out = fsm.tick(OVER_ABORT, t0 + Duration::from_millis(1));
        assert_eq!(
            out,
            ActuatorOutputs {
                fill: true,
                abort: true,
                ..ActuatorOutputs::OFF
            }
        );

        // A new custom command replaces the record wholesale.
        fsm.set_op_state_custom(
            RelayState {
                vent: true,
                ..RelayState::OFF
            },
            t0 + Duration::from_millis(2),
        );
        let out = fsm.tick(CALM, t0 + Duration::from_millis(3));
        assert!(out.vent && !out.fill && !out.abort);
    }

    #[test]
    fn set_op_state_is_idempotent_for_outputs() {
        let (mut fsm, t0) = fsm();
        fsm.set_op_state(OpState::Standby, t0);
        fsm.set_op_state(OpState::Standby, t0 + Duration::from_millis(1));
        assert_eq!(fsm.outputs(), ActuatorOutputs::OFF);
    }

    #[test]
    fn reentering_a_state_restarts_its_timer() {
        let (mut fsm, t0) = fsm();
        fsm.set_op_state(OpState::PulseVentA, t0);
        fsm.tick(CALM, t0 + Duration::from_millis(900));

        // Re-command the same pulse just before it would expire.
        fsm.set_op_state(OpState::PulseVentA, t0 + Duration::from_millis(950));

        // The old deadline passes without expiry.
        fsm.tick(CALM, t0 + Duration::from_millis(1_100));
        assert_eq!(fsm.op_state(), OpState::PulseVentA);

        // The restarted one expires.
        fsm.tick(CALM, t0 + Duration::from_millis(1_951));
        assert_eq!(fsm.op_state(), OpState::Standby);
    }

    #[test]
    fn override_interrupts_fire_sequence() {
        let (mut fsm, t0) = fsm();
        fsm.set_op_state(OpState::Fire, t0);
        fsm.tick(CALM, t0 + Duration::from_millis(10_100));
        assert_eq!(fsm.internal_state(), InternalState::Fire(FireStage::ValveBuffer));

        fsm.set_op_state(OpState::Abort, t0 + Duration::from_millis(10_200));
        let out = fsm.tick(CALM, t0 + Duration::from_millis(10_300));
        assert_eq!(fsm.op_state(), OpState::Abort);
        assert!(out.abort && !out.igniter && !out.main_valve && !out.valve_armed);
    }

    #[test]
    fn igniter_never_on_while_unarmed() {
        // Sweep every state's outputs; the valve system must be armed
        // whenever the igniter is commanded.
        let (mut fsm, t0) = fsm();
        for op in OpState::ALL {
            fsm.set_op_state(op, t0);
            for (i, p) in [CALM, OVER_ABORT].into_iter().enumerate() {
                let out = fsm.tick(p, t0 + Duration::from_millis(i as u64));
                if out.igniter {
                    assert!(out.valve_armed, "{op:?} commands igniter unarmed");
                }
                assert!(
                    !(out.igniter && out.main_valve),
                    "{op:?} commands igniter and main valve together"
                );
            }
        }
    }
}
