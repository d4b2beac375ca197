//! Events emitted by the engine for UI and observability.
//!
//! Kept lightweight so a host can forward them every frame without
//! allocating large payloads.

use serde::Serialize;

use crate::viseme::Viseme;

/// Something that changed during a frame tick or utterance call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AvatarEvent {
    /// An utterance began playing and its speech layer is active.
    SpeechStarted { asset_id: String },
    /// Playback reached its end; viseme targets are back at baseline.
    SpeechEnded { asset_id: String },
    /// Playback failed. The speech layer is inactive; ambient animation continues.
    SpeechFailed { asset_id: String, reason: String },
    /// A newer utterance replaced this one before it ended.
    SpeechSuperseded { asset_id: String },
    /// The host stopped this utterance, or the engine shut down.
    SpeechStopped { asset_id: String },
    /// The ambient expression scheduler picked a new expression.
    ExpressionChanged { name: String, intensity: f32 },
    /// Eyes closed (`true`) or reopened.
    Blink { closed: bool },
    /// The speech layer switched to a different mouth shape (or to rest).
    VisemeChanged { viseme: Option<Viseme> },
}
