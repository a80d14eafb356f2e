//! Fixed-rate control cycle.
//!
//! One tick performs, in order:
//!   1. consume at most one pending operator command,
//!   2. sample pressure once (every decision this tick sees the same
//!      value),
//!   3. advance the state machine,
//!   4. latch the computed actuator outputs into the shared bank,
//!   5. publish a status frame for the uplink.
//!
//! The loop itself never blocks on I/O: commands arrive through the
//! capacity-1 slot, pressure through atomics, outputs leave through the
//! latched bank, status through the outbox.

use std::sync::Arc;
use std::time::{Duration, Instant};

use station_common::{Command, StationConfig};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::actuators::ActuatorBank;
use crate::mailbox::{CommandSlot, StatusFrame, StatusOutbox};
use crate::pressure::PressureFeed;
use crate::sensor_link::SensorCommand;
use crate::state::StationFsm;

// ─── Cycle Statistics ───────────────────────────────────────────────

/// O(1) per-tick timing statistics. Updated every tick, no allocation.
#[derive(Debug, Clone)]
pub struct CycleStats {
    /// Total ticks executed.
    pub tick_count: u64,
    /// Last tick duration [ns].
    pub last_tick_ns: i64,
    /// Minimum tick duration [ns].
    pub min_tick_ns: i64,
    /// Maximum tick duration [ns].
    pub max_tick_ns: i64,
    /// Running sum for average computation.
    pub sum_tick_ns: i64,
    /// Ticks that exceeded the configured period.
    pub overruns: u64,
}

impl CycleStats {
    pub const fn new() -> Self {
        Self {
            tick_count: 0,
            last_tick_ns: 0,
            min_tick_ns: i64::MAX,
            max_tick_ns: 0,
            sum_tick_ns: 0,
            overruns: 0,
        }
    }

    /// Record a tick duration. O(1), no allocation.
    #[inline]
    pub fn record(&mut self, duration_ns: i64, budget_ns: i64) {
        self.tick_count += 1;
        self.last_tick_ns = duration_ns;
        if duration_ns < self.min_tick_ns {
            self.min_tick_ns = duration_ns;
        }
        if duration_ns > self.max_tick_ns {
            self.max_tick_ns = duration_ns;
        }
        self.sum_tick_ns += duration_ns;
        if duration_ns > budget_ns {
            self.overruns += 1;
        }
    }

    /// Average tick time [ns] (returns 0 if no ticks).
    #[inline]
    pub fn avg_tick_ns(&self) -> i64 {
        if self.tick_count == 0 {
            0
        } else {
            self.sum_tick_ns / self.tick_count as i64
        }
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Control Cycle ──────────────────────────────────────────────────

/// Ticks logged between periodic stats reports.
const STATS_REPORT_INTERVAL: u64 = 6_000;

/// The control cycle: owns the state machine and drives it at a fixed
/// rate from the shared pressure feed and command slot.
pub struct ControlCycle {
    fsm: StationFsm,
    feed: Arc<PressureFeed>,
    bank: Arc<ActuatorBank>,
    commands: Arc<CommandSlot>,
    status: Arc<StatusOutbox>,
    sensor_commands: mpsc::Sender<SensorCommand>,
    started_at: Instant,
    stats: CycleStats,
}

impl ControlCycle {
    pub fn new(
        config: &StationConfig,
        feed: Arc<PressureFeed>,
        bank: Arc<ActuatorBank>,
        commands: Arc<CommandSlot>,
        status: Arc<StatusOutbox>,
        sensor_commands: mpsc::Sender<SensorCommand>,
        now: Instant,
    ) -> Self {
        Self {
            fsm: StationFsm::new(config.thresholds, config.durations, now),
            feed,
            bank,
            commands,
            status,
            sensor_commands,
            started_at: now,
            stats: CycleStats::new(),
        }
    }

    /// Execute one tick of the control cycle body.
    pub fn tick(&mut self, now: Instant) {
        if let Some(command) = self.commands.try_take() {
            self.apply_command(command, now);
        }

        // Sampled exactly once per tick.
        let pressure_mpsi = self.feed.control_mpsi();

        let outputs = self.fsm.tick(pressure_mpsi, now);
        self.bank.latch(outputs);

        self.status.post(StatusFrame {
            state_code: self.fsm.op_state().wire_code(),
            relay_code: outputs.wire_word().bits(),
            pressure_mpsi,
            uptime_ms: now.duration_since(self.started_at).as_millis() as u64,
        });
    }

    fn apply_command(&mut self, command: Command, now: Instant) {
        match command {
            Command::SetState(op) => {
                info!(state = ?op, "operator state change");
                self.fsm.set_op_state(op, now);
            }
            Command::Custom(relays) => {
                info!(?relays, "operator custom relay pattern");
                self.fsm.set_op_state_custom(relays, now);
            }
            Command::Recalibrate => self.forward_sensor_command(SensorCommand::Recalibrate),
            Command::ClearCalibration => {
                self.forward_sensor_command(SensorCommand::ClearCalibration)
            }
        }
    }

    /// Calibration commands pass straight through to the sensor board.
    fn forward_sensor_command(&self, command: SensorCommand) {
        if let Err(e) = self.sensor_commands.try_send(command) {
            warn!(error = %e, "sensor command dropped");
        }
    }

    /// Run the cycle at `period` until the task is aborted.
    pub async fn run(mut self, period: Duration) {
        let budget_ns = period.as_nanos() as i64;
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(period_ms = period.as_millis() as u64, "control cycle started");

        loop {
            ticker.tick().await;

            let start = Instant::now();
            self.tick(start);
            let duration_ns = start.elapsed().as_nanos() as i64;
            self.stats.record(duration_ns, budget_ns);

            if self.stats.tick_count % STATS_REPORT_INTERVAL == 0 {
                debug!(
                    ticks = self.stats.tick_count,
                    avg_ns = self.stats.avg_tick_ns(),
                    max_ns = self.stats.max_tick_ns,
                    overruns = self.stats.overruns,
                    "cycle stats"
                );
            }
        }
    }
}
