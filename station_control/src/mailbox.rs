//! Capacity-1 handoff slots between the uplink and the control loop.
//!
//! Both directions are last-write-wins: a command posted before the
//! previous one was consumed replaces it, and a status frame the
//! uplink has not drained yet is overwritten by the next tick's. The
//! control loop uses non-blocking takes — contention on the lock is
//! treated as "nothing pending this tick", never waited out.

use parking_lot::Mutex;
use serde::Serialize;
use station_common::Command;
use tracing::debug;

/// Inbound slot: next pending operator command.
#[derive(Debug, Default)]
pub struct CommandSlot {
    inner: Mutex<Option<Command>>,
}

impl CommandSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Post a command, replacing any unconsumed one. Returns `true`
    /// if a pending command was displaced.
    pub fn post(&self, command: Command) -> bool {
        let displaced = self.inner.lock().replace(command);
        if let Some(displaced) = &displaced {
            debug!(?displaced, "pending command replaced before consumption");
        }
        displaced.is_some()
    }

    /// Take the pending command without blocking. Lock contention
    /// reads as "no command this tick".
    pub fn try_take(&self) -> Option<Command> {
        self.inner.try_lock().and_then(|mut slot| slot.take())
    }
}

/// One tick's outbound status snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusFrame {
    /// Wire code of the current operating state.
    pub state_code: u8,
    /// Packed relay word of the latched outputs.
    pub relay_code: u8,
    /// Pressure sample the tick was computed from [milli-psi].
    pub pressure_mpsi: i64,
    /// Milliseconds since process start.
    pub uptime_ms: u64,
}

/// Outbound slot: latest status frame for the uplink.
#[derive(Debug, Default)]
pub struct StatusOutbox {
    inner: Mutex<Option<StatusFrame>>,
}

impl StatusOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the latest frame, dropping any undelivered predecessor.
    pub fn post(&self, frame: StatusFrame) {
        *self.inner.lock() = Some(frame);
    }

    /// Drain the latest frame, if any.
    pub fn try_take(&self) -> Option<StatusFrame> {
        self.inner.try_lock().and_then(|mut slot| slot.take())
    }
}
