//! Clip mixer with weighted actions and timed fades.

use std::sync::Arc;
use tracing::debug;

use super::{AnimationClip, Pose};

#[derive(Debug, Clone)]
struct Fade {
    from: f32,
    to: f32,
    elapsed: f32,
    duration: f32,
}

/// One clip being played.
#[derive(Debug, Clone)]
struct Action {
    clip: Arc<AnimationClip>,
    time: f32,
    weight: f32,
    fade: Option<Fade>,
}

impl Action {
    fn new(clip: Arc<AnimationClip>, weight: f32) -> Self {
        Self {
            clip,
            time: 0.0,
            weight,
            fade: None,
        }
    }

    fn fade_to(&mut self, to: f32, duration: f32) {
        if duration <= 0.0 {
            self.weight = to;
            self.fade = None;
        } else {
            self.fade = Some(Fade {
                from: self.weight,
                to,
                elapsed: 0.0,
                duration,
            });
        }
    }

    fn advance(&mut self, dt: f32) {
        let duration = self.clip.duration;
        self.time = if duration > 0.0 {
            (self.time + dt) % duration
        } else {
            0.0
        };

        if let Some(fade) = &mut self.fade {
            fade.elapsed += dt;
            let alpha = (fade.elapsed / fade.duration).min(1.0);
            self.weight = fade.from + (fade.to - fade.from) * alpha;
            if alpha >= 1.0 {
                self.weight = fade.to;
                self.fade = None;
            }
        }
    }

    /// Faded out completely and not coming back.
    fn is_spent(&self) -> bool {
        self.fade.is_none() && self.weight <= 0.0
    }
}

/// Plays looping clips and blends them into a single [`Pose`].
///
/// The default policy plays one idle clip. [`crossfade_to`](Self::crossfade_to)
/// lets a host swap in a talk clip while speaking.
#[derive(Debug, Clone, Default)]
pub struct AnimationMixer {
    actions: Vec<Action>,
}

impl AnimationMixer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Play `clip` alone at full weight, looping from the start.
    pub fn play(&mut self, clip: Arc<AnimationClip>) {
        debug!(clip = %clip.name, "playing clip");
        self.actions.clear();
        self.actions.push(Action::new(clip, 1.0));
    }

    /// Fade every other action out and `clip` in to full weight.
    pub fn crossfade_to(&mut self, clip: Arc<AnimationClip>, duration: f32) {
        self.crossfade_to_weight(clip, duration, 1.0);
    }

    /// Like [`crossfade_to`](Self::crossfade_to) with an explicit target weight.
    pub fn crossfade_to_weight(&mut self, clip: Arc<AnimationClip>, duration: f32, weight: f32) {
        let duration = if duration.is_finite() { duration.max(0.0) } else { 0.0 };
        let weight = weight.clamp(0.0, 1.0);
        debug!(clip = %clip.name, duration, weight, "crossfading");

        let mut found = false;
        for action in &mut self.actions {
            if action.clip.name == clip.name {
                action.fade_to(weight, duration);
                found = true;
            } else {
                action.fade_to(0.0, duration);
            }
        }
        if !found {
            let mut action = Action::new(clip, 0.0);
            action.fade_to(weight, duration);
            self.actions.push(action);
        }
        self.actions.retain(|a| !a.is_spent());
    }

    /// Advance every action by `dt` seconds and drop faded-out ones.
    pub fn update(&mut self, dt: f32) {
        if !dt.is_finite() || dt < 0.0 {
            return;
        }
        for action in &mut self.actions {
            action.advance(dt);
        }
        self.actions.retain(|a| !a.is_spent());
    }

    /// Blend of all actions, normalised by their total weight.
    pub fn pose(&self) -> Pose {
        let mut active = self.actions.iter().filter(|a| a.weight > 0.0);
        let Some(first) = active.next() else {
            return Pose::default();
        };
        let mut pose = first.clip.sample(first.time);
        let mut accumulated = first.weight;
        for action in active {
            accumulated += action.weight;
            let sample = action.clip.sample(action.time);
            pose = pose.blend(&sample, action.weight / accumulated);
        }
        pose
    }

    pub fn stop_all(&mut self) {
        self.actions.clear();
    }

    pub fn is_playing(&self, name: &str) -> bool {
        self.actions.iter().any(|a| a.clip.name == name)
    }

    /// Current weight of the named clip, `0.0` if it is not playing.
    pub fn weight(&self, name: &str) -> f32 {
        self.actions
            .iter()
            .find(|a| a.clip.name == name)
            .map_or(0.0, |a| a.weight)
    }

    /// Playback time within the named clip.
    pub fn time(&self, name: &str) -> Option<f32> {
        self.actions
            .iter()
            .find(|a| a.clip.name == name)
            .map(|a| a.time)
    }
}
