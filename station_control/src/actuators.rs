//! Actuator outputs and the latched bank the flush task reads.
//!
//! The control loop never touches hardware: it overwrites the full
//! desired actuator set in [`ActuatorBank`] once per tick, and an
//! independent periodic task snapshots the bank and applies it through
//! a [`RelayDriver`]. The snapshot is a single lock acquisition, so the
//! flush can never observe a half-updated set.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use station_common::{RelayState, RelayWord};
use tracing::{debug, info};

/// Desired state of every physical output.
///
/// `valve_armed` attaches the main-valve servo to its signal line; the
/// valve itself (open/closed) is `main_valve`. The state machine never
/// commands the igniter in a state where the valve system is unarmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActuatorOutputs {
    pub fill: bool,
    pub vent: bool,
    pub abort: bool,
    pub pyro_cutter: bool,
    pub igniter: bool,
    pub main_valve: bool,
    pub valve_armed: bool,
}

impl ActuatorOutputs {
    /// Everything off and disarmed.
    pub const OFF: Self = Self {
        fill: false,
        vent: false,
        abort: false,
        pyro_cutter: false,
        igniter: false,
        main_valve: false,
        valve_armed: false,
    };

    /// Apply an operator-supplied relay record verbatim. The valve
    /// system arms whenever the main valve is commanded, since a
    /// servo-driven valve cannot move unarmed.
    pub fn from_custom(relays: &RelayState) -> Self {
        Self {
            fill: relays.fill,
            vent: relays.vent,
            abort: relays.abort,
            pyro_cutter: relays.pyro_cutter,
            igniter: relays.igniter,
            main_valve: relays.main_valve,
            valve_armed: relays.main_valve,
        }
    }

    /// The five-bit relay word reported upstream.
    pub fn wire_word(&self) -> RelayWord {
        let mut word = RelayWord::empty();
        word.set(RelayWord::FILL, self.fill);
        word.set(RelayWord::VENT, self.vent);
        word.set(RelayWord::PYRO_CUTTER, self.pyro_cutter);
        word.set(RelayWord::MAIN_VALVE, self.main_valve);
        word.set(RelayWord::IGNITER, self.igniter);
        word
    }
}

// ─── Latched Bank ───────────────────────────────────────────────────

/// Latched actuator values shared between the control loop (writer)
/// and the flush task (reader).
#[derive(Debug, Default)]
pub struct ActuatorBank {
    inner: Mutex<ActuatorOutputs>,
}

impl ActuatorBank {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ActuatorOutputs::OFF),
        }
    }

    /// Overwrite the full desired set atomically.
    pub fn latch(&self, outputs: ActuatorOutputs) {
        *self.inner.lock() = outputs;
    }

    /// Atomic copy of the latest latched set.
    pub fn snapshot(&self) -> ActuatorOutputs {
        *self.inner.lock()
    }
}

// ─── Relay Driver ───────────────────────────────────────────────────

/// Applies a latched actuator set to the physical relays and servo.
///
/// The GPIO/PWM implementation lives with the hardware crate for the
/// target board; [`SimRelayDriver`] stands in everywhere else.
pub trait RelayDriver: Send {
    fn apply(&mut self, outputs: &ActuatorOutputs);
}

/// Driver that logs edges instead of toggling pins.
#[derive(Debug, Default)]
pub struct SimRelayDriver {
    last: Option<ActuatorOutputs>,
}

impl RelayDriver for SimRelayDriver {
    fn apply(&mut self, outputs: &ActuatorOutputs) {
        if self.last.as_ref() != Some(outputs) {
            info!(?outputs, "relay flush");
            self.last = Some(*outputs);
        }
    }
}

/// Periodically copy the latched bank to hardware.
///
/// Runs until the task is aborted; every iteration flushes the full
/// set so a relay can never stay stuck on a missed edge.
pub async fn run_flush_task(
    bank: Arc<ActuatorBank>,
    mut driver: Box<dyn RelayDriver>,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    debug!(?period, "relay flush task started");
    loop {
        ticker.tick().await;
        let outputs = bank.snapshot();
        driver.apply(&outputs);
    }
}
