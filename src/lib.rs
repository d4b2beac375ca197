//! Visage: facial animation blending core for a talking 3D avatar.
//!
//! The face is driven by two independent signals: a viseme timeline tied to
//! the audio clock, and an ambient expression state (smiles, blinks) that
//! runs regardless of speech. The engine folds both, plus an idle skeletal
//! clip and head tracking, into one set of morph-target weights and one
//! bone pose per rendered frame.
//!
//! # Architecture
//!
//! - **Rig**: mesh nodes and morph targets supplied by the host, indexed once
//!   by [`MorphTargetRegistry`]
//! - **Expressions**: static weight tables in an [`ExpressionLibrary`]
//! - **Visemes**: per-utterance [`VisemeTimeline`] from a pluggable [`VisemeSupplier`]
//! - **Schedules**: blink and expression timers polled once per frame
//! - **Animation**: looping clips blended by the [`AnimationMixer`]
//! - **Audio**: an [`AudioSyncClock`] over a [`PlaybackTransport`]
//! - **Engine**: [`FacialAnimationEngine`] runs the layers in a fixed order

pub mod animation;
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod expression;
pub mod rig;
pub mod runtime;
pub mod schedule;
pub mod viseme;

pub use animation::{AnimationClip, AnimationMixer, Pose};
pub use audio::{AudioAsset, AudioSyncClock, PlaybackState, PlaybackTransport, SimulatedTransport};
pub use config::AvatarConfig;
pub use engine::{AvatarAssets, AvatarState, FacialAnimationEngine, FrameReport, Role};
pub use error::{AvatarError, Result};
pub use expression::{ExpressionLibrary, ExpressionState};
pub use rig::{MorphTargetRegistry, NodeSelector, Rig};
pub use runtime::AvatarEvent;
pub use viseme::{Viseme, VisemeSegment, VisemeSupplier, VisemeTimeline};
