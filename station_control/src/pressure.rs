//! Shared pressure feed.
//!
//! The sensor link stores the latest transducer readings here; the
//! control loop takes exactly one atomic read per tick so its band
//! classification can never tear across a mid-tick update. The feed
//! holds the last stored value indefinitely — staleness detection is
//! the sensor board's problem, not the control loop's.

use std::sync::atomic::{AtomicI64, Ordering};

/// Latest milli-psi readings from the two small transducers.
///
/// Transducer 2 (top of the tank) drives all control decisions; the
/// bottom one sometimes freezes over during fill.
#[derive(Debug, Default)]
pub struct PressureFeed {
    transducer1_mpsi: AtomicI64,
    transducer2_mpsi: AtomicI64,
}

impl PressureFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, transducer1_mpsi: i64, transducer2_mpsi: i64) {
        self.transducer1_mpsi
            .store(transducer1_mpsi, Ordering::Relaxed);
        self.transducer2_mpsi
            .store(transducer2_mpsi, Ordering::Relaxed);
    }

    /// The controlling pressure signal (transducer 2).
    #[inline]
    pub fn control_mpsi(&self) -> i64 {
        self.transducer2_mpsi.load(Ordering::Relaxed)
    }

    /// Auxiliary reading (transducer 1), telemetry only.
    #[inline]
    pub fn aux_mpsi(&self) -> i64 {
        self.transducer1_mpsi.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_holds_last_value() {
        let feed = PressureFeed::new();
        assert_eq!(feed.control_mpsi(), 0);

        feed.store(100_000, 200_000);
        assert_eq!(feed.aux_mpsi(), 100_000);
        assert_eq!(feed.control_mpsi(), 200_000);

        // No decay, no staleness: the value persists.
        assert_eq!(feed.control_mpsi(), 200_000);
    }
}
