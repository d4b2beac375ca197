//! Ambient expression timer.

use rand::Rng;
use rand::rngs::StdRng;
use tracing::debug;

use super::CycleTimer;
use crate::config::ExpressionConfig;
use crate::expression::ExpressionState;

/// Picks a new ambient expression and intensity on a jittered interval.
///
/// The first pick happens on [`start`](Self::start), so the avatar never
/// waits a full interval before its first expression.
#[derive(Debug, Clone)]
pub struct ExpressionScheduler {
    timer: CycleTimer,
    rng: StdRng,
    candidates: Vec<String>,
    initial: String,
    intensity_min: f32,
    intensity_max: f32,
    current: ExpressionState,
}

impl ExpressionScheduler {
    pub fn new(config: &ExpressionConfig, rng: StdRng) -> Self {
        Self {
            timer: CycleTimer::new(config.interval_min_secs, config.interval_max_secs, 0.0),
            rng,
            candidates: config.candidates.clone(),
            initial: config.initial.clone(),
            intensity_min: config.intensity_min.min(config.intensity_max),
            intensity_max: config.intensity_max.max(config.intensity_min),
            current: ExpressionState::default(),
        }
    }

    /// Show the initial expression and start the timer.
    pub fn start(&mut self) -> &ExpressionState {
        let intensity = self.draw_intensity();
        self.current = ExpressionState::new(self.initial.clone(), intensity);
        self.timer.start(&mut self.rng);
        debug!(expression = %self.current.name, intensity, "expression scheduler started");
        &self.current
    }

    /// Stop the timer and return to the neutral expression.
    pub fn stop(&mut self) {
        self.timer.stop();
        self.current = ExpressionState::default();
    }

    /// Advance by `dt`. Returns the new state if a pick happened.
    pub fn advance(&mut self, dt: f64) -> Option<&ExpressionState> {
        let picks = self.timer.advance(dt, &mut self.rng).activated;
        if picks == 0 {
            return None;
        }
        // Only the last pick of a long step is ever visible.
        for _ in 0..picks {
            self.pick();
        }
        Some(&self.current)
    }

    fn pick(&mut self) {
        let name = if self.candidates.is_empty() {
            self.initial.clone()
        } else {
            self.candidates[self.rng.gen_range(0..self.candidates.len())].clone()
        };
        let intensity = self.draw_intensity();
        self.current = ExpressionState::new(name, intensity);
    }

    fn draw_intensity(&mut self) -> f32 {
        if self.intensity_max > self.intensity_min {
            self.rng.gen_range(self.intensity_min..=self.intensity_max)
        } else {
            self.intensity_min
        }
    }

    pub fn current(&self) -> &ExpressionState {
        &self.current
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_running()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::expression::DEFAULT_EXPRESSION;
    use rand::SeedableRng;

    fn scheduler(seed: u64) -> ExpressionScheduler {
        ExpressionScheduler::new(&ExpressionConfig::default(), StdRng::seed_from_u64(seed))
    }

    #[test]
    fn starts_with_initial_expression_immediately() {
        let mut sched = scheduler(1);
        assert_eq!(sched.current().name, DEFAULT_EXPRESSION);
        let state = sched.start().clone();
        assert_eq!(state.name, "bigSmile");
        assert!((0.7..=1.0).contains(&state.intensity));
    }

    #[test]
    fn picks_from_candidates_within_interval() {
        let mut sched = scheduler(2);
        sched.start();
        assert!(sched.advance(1.9).is_none());

        let mut picks = 0;
        for _ in 0..1_000 {
            if let Some(state) = sched.advance(0.1) {
                assert!(state.name == "bigSmile" || state.name == "smallSmile");
                assert!((0.7..=1.0).contains(&state.intensity));
                picks += 1;
            }
        }
        // 100 s at one pick every 2-5 s.
        assert!((20..=50).contains(&picks), "picks = {picks}");
    }

    #[test]
    fn both_candidates_are_chosen() {
        let mut sched = scheduler(3);
        sched.start();
        let mut seen = std::collections::BTreeSet::new();
        for _ in 0..100 {
            if let Some(state) = sched.advance(5.0) {
                seen.insert(state.name.clone());
            }
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn stop_returns_to_neutral() {
        let mut sched = scheduler(4);
        sched.start();
        sched.stop();
        assert_eq!(sched.current(), &ExpressionState::default());
        assert!(!sched.is_running());
        assert!(sched.advance(10.0).is_none());
    }
}
