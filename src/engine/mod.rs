//! The per-frame orchestrator.
//!
//! Each [`FacialAnimationEngine::tick`] runs the layers in a fixed order:
//!
//! 1. advance the skeletal mixer,
//! 2. blend every ambient target towards the current expression,
//! 3. blend the blink pair towards open or closed,
//! 4. poll the audio clock and retire the speech layer if it ended,
//! 5. repaint the viseme targets from the timeline while speech is active,
//! 6. turn the head towards the viewer.
//!
//! The engine is the only writer of the [`MorphTargetRegistry`]. Timers and
//! the audio clock publish state; the tick reads it.

pub mod head;
pub mod state;

pub use head::HeadTracker;
pub use state::{AvatarState, ConversationLog, ConversationTurn, Role, SpeechLayer};

use glam::Vec3;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::animation::{AnimationClip, AnimationMixer, Pose};
use crate::audio::{AudioAsset, AudioSyncClock, ClockNotice, PlaybackState, PlaybackTransport};
use crate::config::AvatarConfig;
use crate::error::{AvatarError, Result};
use crate::rig::{MorphTargetRegistry, NodeHandle, Rig};
use crate::runtime::AvatarEvent;
use crate::schedule::{BlinkScheduler, ExpressionScheduler, scheduler_rng};
use crate::viseme::{Viseme, VisemeSupplier};

const BLINK_RNG_STREAM: u64 = 0;
const EXPRESSION_RNG_STREAM: u64 = 1;

/// Assets the host's loader hands to the engine.
#[derive(Debug, Clone, Default)]
pub struct AvatarAssets {
    pub rig: Rig,
    pub clips: Vec<AnimationClip>,
}

impl AvatarAssets {
    pub fn new(rig: Rig, clips: Vec<AnimationClip>) -> Self {
        Self { rig, clips }
    }

    /// The sample half-body rig with an `idle` sway and a `talk` nod clip.
    pub fn sample() -> Self {
        Self::new(
            Rig::sample_half_body(),
            vec![
                AnimationClip::idle_sway("idle"),
                AnimationClip::talk_nod("talk"),
            ],
        )
    }
}

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrameReport {
    pub frame: u64,
    /// Audio position, present while the speech layer is active.
    pub elapsed: Option<f64>,
    pub active_viseme: Option<Viseme>,
    pub events: Vec<AvatarEvent>,
}

/// Blends idle animation, ambient expressions, blinks and lip-sync into
/// one set of morph weights and one pose per frame.
pub struct FacialAnimationEngine {
    config: AvatarConfig,
    registry: MorphTargetRegistry,
    clips: HashMap<String, Arc<AnimationClip>>,
    mixer: AnimationMixer,
    clock: AudioSyncClock,
    blink: BlinkScheduler,
    expression: ExpressionScheduler,
    head: Option<HeadTracker>,
    pose: Pose,
    state: AvatarState,
    /// Rig targets driven by the ambient layer: everything except blink and viseme targets.
    ambient_targets: Vec<String>,
    blink_targets: Vec<String>,
    viseme_targets: Vec<String>,
    speech_nodes: Vec<NodeHandle>,
    pending: Vec<AvatarEvent>,
    shut_down: bool,
}

impl std::fmt::Debug for FacialAnimationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FacialAnimationEngine")
            .field("frame", &self.state.frame)
            .field("clock", &self.clock)
            .field("ambient_targets", &self.ambient_targets.len())
            .field("speech_nodes", &self.speech_nodes.len())
            .field("shut_down", &self.shut_down)
            .finish_non_exhaustive()
    }
}

impl FacialAnimationEngine {
    /// Validate `config`, index the rig and start the ambient timers.
    ///
    /// # Errors
    ///
    /// Returns [`AvatarError::Config`] if the configuration is invalid. A rig
    /// that lacks some targets, nodes or clips is not an error.
    pub fn new(
        config: AvatarConfig,
        assets: AvatarAssets,
        transport: Box<dyn PlaybackTransport>,
    ) -> Result<Self> {
        config.validate()?;

        let registry = MorphTargetRegistry::from_rig(&assets.rig);

        let blink_targets = supported(&registry, config.blink.targets(), "blink");
        let viseme_targets = supported(
            &registry,
            config.lip_sync.viseme_map.targets(),
            "viseme",
        );
        let ambient_targets: Vec<String> = {
            let excluded: BTreeSet<&str> = config
                .blink
                .targets()
                .into_iter()
                .chain(config.lip_sync.viseme_map.targets())
                .collect();
            registry
                .target_names()
                .filter(|t| !excluded.contains(t))
                .map(str::to_owned)
                .collect()
        };

        let speech_nodes = resolve_speech_nodes(&registry, &config, &viseme_targets);

        let clips: HashMap<String, Arc<AnimationClip>> = assets
            .clips
            .into_iter()
            .map(|c| (c.name.clone(), Arc::new(c)))
            .collect();
        let mut mixer = AnimationMixer::new();
        match clips.get(&config.animation.idle_clip) {
            Some(idle) => mixer.play(Arc::clone(idle)),
            None => debug!(clip = %config.animation.idle_clip, "idle clip not provided, skipping"),
        }
        if let Some(talk) = &config.animation.talk_clip
            && !clips.contains_key(talk)
        {
            debug!(clip = %talk, "talk clip not provided, speech keeps the idle clip");
        }

        let head = if config.head_tracking.enabled {
            let tracker = assets
                .rig
                .skeleton()
                .and_then(|s| HeadTracker::from_skeleton(s, &config.head_tracking.head_bone));
            if tracker.is_none() {
                debug!(bone = %config.head_tracking.head_bone, "head bone not found, head tracking off");
            }
            tracker
        } else {
            None
        };

        let mut blink = BlinkScheduler::new(
            &config.blink,
            scheduler_rng(config.rng_seed, BLINK_RNG_STREAM),
        );
        let mut expression = ExpressionScheduler::new(
            &config.expression,
            scheduler_rng(config.rng_seed, EXPRESSION_RNG_STREAM),
        );
        blink.start();
        let first = expression.start().clone();

        let mut engine = Self {
            pose: mixer.pose(),
            config,
            registry,
            clips,
            mixer,
            clock: AudioSyncClock::new(transport),
            blink,
            expression,
            head,
            state: AvatarState::default(),
            ambient_targets,
            blink_targets,
            viseme_targets,
            speech_nodes,
            pending: Vec::new(),
            shut_down: false,
        };
        engine.pending.push(AvatarEvent::ExpressionChanged {
            name: first.name.clone(),
            intensity: first.intensity,
        });
        engine.state.expression = first;
        engine.repaint_visemes(None);

        info!(
            ambient = engine.ambient_targets.len(),
            blink = engine.blink_targets.len(),
            visemes = engine.viseme_targets.len(),
            speech_nodes = engine.speech_nodes.len(),
            "facial animation engine ready"
        );
        Ok(engine)
    }

    /// Begin a new utterance, retiring any current one first.
    ///
    /// # Errors
    ///
    /// Returns an error if the supplier cannot build a timeline or playback
    /// cannot start. The ambient layer keeps running either way.
    pub fn start_utterance(
        &mut self,
        asset: AudioAsset,
        supplier: &mut dyn VisemeSupplier,
    ) -> Result<()> {
        if self.shut_down {
            return Err(AvatarError::Playback("engine has been shut down".into()));
        }
        self.retire_speech(|asset_id| AvatarEvent::SpeechSuperseded { asset_id });

        let asset_id = asset.id.clone();
        let timeline = match supplier.timeline_for(&asset) {
            Ok(timeline) => timeline,
            Err(e) => {
                warn!(asset = %asset_id, "no viseme timeline: {e}");
                self.pending.push(AvatarEvent::SpeechFailed {
                    asset_id,
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        self.clock.load(asset);
        if let Err(e) = self.clock.play() {
            // Drain the failure notice the clock queued; it is reported here.
            let _ = self.clock.poll(0.0);
            self.state.playback = self.clock.playback_state();
            self.pending.push(AvatarEvent::SpeechFailed {
                asset_id,
                reason: e.to_string(),
            });
            return Err(e);
        }

        info!(
            asset = %asset_id,
            segments = timeline.len(),
            span = timeline.duration(),
            "speech layer active"
        );
        self.state.speech = Some(SpeechLayer {
            asset_id: asset_id.clone(),
            timeline,
            active_viseme: None,
        });
        self.state.playback = self.clock.playback_state();
        self.pending.push(AvatarEvent::SpeechStarted { asset_id });
        self.fade_to_talk();
        Ok(())
    }

    /// Stop the current utterance, if any, and restore baseline visemes.
    pub fn stop_utterance(&mut self) {
        self.retire_speech(|asset_id| AvatarEvent::SpeechStopped { asset_id });
    }

    /// Run one frame. `viewer` is the camera position for head tracking.
    pub fn tick(&mut self, dt: f64, viewer: Option<Vec3>) -> FrameReport {
        if self.shut_down {
            return FrameReport {
                frame: self.state.frame,
                ..FrameReport::default()
            };
        }
        let dt = if dt.is_finite() && dt > 0.0 { dt } else { 0.0 };
        self.state.frame += 1;

        // 1. Skeletal animation.
        self.mixer.update(dt as f32);
        self.pose = self.mixer.pose();

        // Timers publish state; only this tick turns it into weights.
        if let Some(closed) = self.blink.advance(dt) {
            self.pending.push(AvatarEvent::Blink { closed });
        }
        if let Some(picked) = self.expression.advance(dt) {
            self.pending.push(AvatarEvent::ExpressionChanged {
                name: picked.name.clone(),
                intensity: picked.intensity,
            });
        }
        self.state.expression = self.expression.current().clone();
        self.state.eyes_closed = self.blink.is_closed();

        // 2. Ambient expression.
        let expr = &self.state.expression;
        let library = &self.config.expression.library;
        for target in &self.ambient_targets {
            let desired = library.weight(&expr.name, target) * expr.intensity;
            self.registry
                .resolve_and_blend(target, desired, self.config.smoothing.ambient);
        }

        // 3. Blink.
        let lid = if self.state.eyes_closed { 1.0 } else { 0.0 };
        for target in &self.blink_targets {
            self.registry
                .resolve_and_blend(target, lid, self.config.smoothing.blink);
        }

        // 4. Audio clock.
        match self.clock.poll(dt) {
            Some(ClockNotice::Ended) => {
                self.retire_speech(|asset_id| AvatarEvent::SpeechEnded { asset_id });
            }
            Some(ClockNotice::Failed(reason)) => {
                self.retire_speech(|asset_id| AvatarEvent::SpeechFailed { asset_id, reason });
            }
            None => {}
        }

        // 5. Speech layer.
        let mut elapsed = None;
        let mut active_viseme = None;
        if self.clock.is_playing()
            && let Some(speech) = &self.state.speech
        {
            let t = self.clock.elapsed();
            let symbol = speech.timeline.active_segment_at(t).map(|seg| {
                let weight = seg.intensity.min(self.config.lip_sync.cap);
                (seg.symbol, weight)
            });
            let previous = speech.active_viseme;
            self.repaint_visemes(symbol);

            active_viseme = symbol.map(|(v, _)| v);
            elapsed = Some(t);
            if active_viseme != previous {
                self.pending.push(AvatarEvent::VisemeChanged {
                    viseme: active_viseme,
                });
            }
            if let Some(speech) = &mut self.state.speech {
                speech.active_viseme = active_viseme;
            }
        }

        // 6. Head tracking.
        if let (Some(head), Some(viewer)) = (&self.head, viewer) {
            head.apply(&mut self.pose, viewer);
        }

        self.state.playback = self.clock.playback_state();
        FrameReport {
            frame: self.state.frame,
            elapsed,
            active_viseme,
            events: std::mem::take(&mut self.pending),
        }
    }

    /// Stop timers, audio and clips. Later ticks do nothing.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.retire_speech(|asset_id| AvatarEvent::SpeechStopped { asset_id });
        self.blink.stop();
        self.expression.stop();
        self.mixer.stop_all();
        self.clock.stop();
        self.state.eyes_closed = false;
        self.shut_down = true;
        info!(frames = self.state.frame, "facial animation engine shut down");
    }

    /// Record a conversation turn.
    pub fn record_turn(&mut self, role: Role, text: impl Into<String>) {
        self.state.conversation.push(role, text);
    }

    pub fn registry(&self) -> &MorphTargetRegistry {
        &self.registry
    }

    /// Bone pose computed by the last tick.
    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    pub fn state(&self) -> &AvatarState {
        &self.state
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.clock.playback_state()
    }

    pub fn config(&self) -> &AvatarConfig {
        &self.config
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Mixer weight of a clip, for hosts that display it.
    pub fn clip_weight(&self, name: &str) -> f32 {
        self.mixer.weight(name)
    }

    /// Targets the speech layer repaints.
    pub fn viseme_targets(&self) -> &[String] {
        &self.viseme_targets
    }

    /// Reset every viseme target on the speech nodes to baseline, then set
    /// the active one. Direct writes: visemes snap, they do not blend.
    fn repaint_visemes(&mut self, active: Option<(Viseme, f32)>) {
        let baseline = self.config.lip_sync.baseline;
        for target in &self.viseme_targets {
            self.registry.set_on(&self.speech_nodes, target, baseline);
        }
        if let Some((symbol, weight)) = active
            && let Some(target) = self.config.lip_sync.viseme_map.target(symbol)
        {
            self.registry.set_on(&self.speech_nodes, target, weight);
        }
    }

    /// Drop the speech layer: stop audio, restore baseline visemes and the
    /// idle clip. Emits `event` for the retired asset.
    fn retire_speech(&mut self, event: impl FnOnce(String) -> AvatarEvent) {
        self.clock.stop();
        self.state.playback = self.clock.playback_state();
        let Some(speech) = self.state.speech.take() else {
            return;
        };
        self.repaint_visemes(None);
        self.fade_to_idle();
        let event = event(speech.asset_id);
        match &event {
            AvatarEvent::SpeechFailed { asset_id, reason } => {
                warn!(asset = %asset_id, "speech layer retired after failure: {reason}");
            }
            other => info!(event = ?other, "speech layer retired"),
        }
        self.pending.push(event);
    }

    fn fade_to_talk(&mut self) {
        let anim = &self.config.animation;
        let Some(talk) = anim.talk_clip.as_ref().and_then(|n| self.clips.get(n)) else {
            return;
        };
        self.mixer.crossfade_to_weight(
            Arc::clone(talk),
            anim.talk_fade_in_secs,
            anim.talk_weight,
        );
    }

    fn fade_to_idle(&mut self) {
        let anim = &self.config.animation;
        let Some(talk) = anim.talk_clip.as_deref() else {
            return;
        };
        if !self.mixer.is_playing(talk) {
            return;
        }
        match self.clips.get(&anim.idle_clip) {
            Some(idle) => self
                .mixer
                .crossfade_to(Arc::clone(idle), anim.talk_fade_out_secs),
            None => self.mixer.stop_all(),
        }
    }
}

impl Drop for FacialAnimationEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The subset of `names` the rig actually exposes.
fn supported<'a>(
    registry: &MorphTargetRegistry,
    names: impl IntoIterator<Item = &'a str>,
    layer: &str,
) -> Vec<String> {
    let mut out = Vec::new();
    for name in names {
        if registry.supports(name) {
            if !out.iter().any(|n| n == name) {
                out.push(name.to_owned());
            }
        } else {
            debug!(morph_target = name, layer, "morph target not on this rig, skipping");
        }
    }
    out
}

/// Handles of the configured speech nodes. An empty list means every node
/// exposing a viseme target.
fn resolve_speech_nodes(
    registry: &MorphTargetRegistry,
    config: &AvatarConfig,
    viseme_targets: &[String],
) -> Vec<NodeHandle> {
    if config.lip_sync.speech_nodes.is_empty() {
        let all: BTreeSet<NodeHandle> = viseme_targets
            .iter()
            .flat_map(|t| registry.nodes_exposing(t))
            .collect();
        return all.into_iter().collect();
    }
    config
        .lip_sync
        .speech_nodes
        .iter()
        .filter_map(|name| {
            let handle = registry.node_handle(name);
            if handle.is_none() {
                debug!(node = %name, "speech node not on this rig, skipping");
            }
            handle
        })
        .collect()
}
