//! Ambient timers: eye blinks and expression changes.
//!
//! Both are two-phase cycles advanced by frame time. They never touch morph
//! weights themselves; the engine reads their state once per frame.

pub mod blink;
pub mod expression;

pub use blink::BlinkScheduler;
pub use expression::ExpressionScheduler;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Shortest phase the timer will schedule, to keep `advance` finite.
const MIN_PHASE_SECS: f64 = 1e-3;

/// Where a [`CycleTimer`] is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CyclePhase {
    Stopped,
    /// Waiting for the next activation.
    Idle { remaining: f64 },
    /// Holding the active state.
    Active { remaining: f64 },
}

/// Phase changes crossed during one [`CycleTimer::advance`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleEdges {
    pub activated: u32,
    pub deactivated: u32,
}

impl CycleEdges {
    pub fn total(self) -> u32 {
        self.activated + self.deactivated
    }

    pub fn is_empty(self) -> bool {
        self.total() == 0
    }
}

/// Recurring Idle → Active → Idle timer with a jittered period.
///
/// The period, measured from one activation to the next, is drawn uniformly
/// from `[interval_min, interval_max]` each cycle. The active phase lasts
/// exactly `hold`. A zero hold produces instantaneous activations.
#[derive(Debug, Clone)]
pub struct CycleTimer {
    interval_min: f64,
    interval_max: f64,
    hold: f64,
    phase: CyclePhase,
}

impl CycleTimer {
    pub fn new(interval_min: f64, interval_max: f64, hold: f64) -> Self {
        let (interval_min, interval_max) = if interval_min <= interval_max {
            (interval_min, interval_max)
        } else {
            (interval_max, interval_min)
        };
        Self {
            interval_min,
            interval_max,
            hold: hold.max(0.0),
            phase: CyclePhase::Stopped,
        }
    }

    /// Begin waiting for the first activation. Restarts draw a fresh interval.
    pub fn start<R: Rng>(&mut self, rng: &mut R) {
        self.phase = CyclePhase::Idle {
            remaining: self.draw_idle(rng),
        };
    }

    /// Return to `Stopped`, dropping any active phase.
    pub fn stop(&mut self) {
        self.phase = CyclePhase::Stopped;
    }

    /// Consume `dt` seconds, crossing as many phases as it spans.
    pub fn advance<R: Rng>(&mut self, dt: f64, rng: &mut R) -> CycleEdges {
        let mut edges = CycleEdges::default();
        if !dt.is_finite() || dt <= 0.0 {
            return edges;
        }

        let mut left = dt;
        loop {
            match self.phase {
                CyclePhase::Stopped => break,
                CyclePhase::Idle { remaining } => {
                    if left < remaining {
                        self.phase = CyclePhase::Idle {
                            remaining: remaining - left,
                        };
                        break;
                    }
                    left -= remaining;
                    edges.activated += 1;
                    self.phase = if self.hold > 0.0 {
                        CyclePhase::Active {
                            remaining: self.hold,
                        }
                    } else {
                        CyclePhase::Idle {
                            remaining: self.draw_idle(rng),
                        }
                    };
                }
                CyclePhase::Active { remaining } => {
                    if left < remaining {
                        self.phase = CyclePhase::Active {
                            remaining: remaining - left,
                        };
                        break;
                    }
                    left -= remaining;
                    edges.deactivated += 1;
                    self.phase = CyclePhase::Idle {
                        remaining: self.draw_idle(rng),
                    };
                }
            }
        }
        edges
    }

    fn draw_idle<R: Rng>(&self, rng: &mut R) -> f64 {
        let period = if self.interval_max > self.interval_min {
            rng.gen_range(self.interval_min..=self.interval_max)
        } else {
            self.interval_min
        };
        (period - self.hold).max(MIN_PHASE_SECS)
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        matches!(self.phase, CyclePhase::Active { .. })
    }

    pub fn is_running(&self) -> bool {
        !matches!(self.phase, CyclePhase::Stopped)
    }
}

/// Random source for one scheduler. A fixed seed gives each stream its own
/// reproducible sequence.
pub(crate) fn scheduler_rng(seed: Option<u64>, stream: u64) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(stream)),
        None => StdRng::from_entropy(),
    }
}
