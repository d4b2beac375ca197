//! Eye-blink timer.

use rand::rngs::StdRng;
use tracing::debug;

use super::CycleTimer;
use crate::config::BlinkConfig;

/// Produces the "eyes closed" flag: closed for `hold_secs`, once every
/// `interval_min_secs..=interval_max_secs`.
#[derive(Debug, Clone)]
pub struct BlinkScheduler {
    timer: CycleTimer,
    rng: StdRng,
}

impl BlinkScheduler {
    pub fn new(config: &BlinkConfig, rng: StdRng) -> Self {
        Self {
            timer: CycleTimer::new(
                config.interval_min_secs,
                config.interval_max_secs,
                config.hold_secs,
            ),
            rng,
        }
    }

    pub fn start(&mut self) {
        self.timer.start(&mut self.rng);
    }

    /// Stop blinking. The eyes are left open.
    pub fn stop(&mut self) {
        self.timer.stop();
    }

    /// Advance by `dt`. Returns the new flag when it differs from before.
    pub fn advance(&mut self, dt: f64) -> Option<bool> {
        let was_closed = self.is_closed();
        let edges = self.timer.advance(dt, &mut self.rng);
        if edges.total() > 1 {
            debug!(dt, blinks = edges.activated, "several blink edges in one step");
        }
        let closed = self.is_closed();
        (closed != was_closed).then_some(closed)
    }

    pub fn is_closed(&self) -> bool {
        self.timer.is_active()
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_running()
    }
}
