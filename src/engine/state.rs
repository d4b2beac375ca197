//! State owned by the engine and read by the UI.

use serde::{Deserialize, Serialize};

use crate::audio::PlaybackState;
use crate::expression::ExpressionState;
use crate::viseme::{Viseme, VisemeTimeline};

/// Who said a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
}

/// Ordered record of the exchanged messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationLog {
    turns: Vec<ConversationTurn>,
}

impl ConversationLog {
    pub fn push(&mut self, role: Role, text: impl Into<String>) {
        self.turns.push(ConversationTurn {
            role,
            text: text.into(),
        });
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&ConversationTurn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// The one active utterance: its asset and the timeline built for it.
#[derive(Debug, Clone)]
pub struct SpeechLayer {
    pub asset_id: String,
    pub timeline: VisemeTimeline,
    /// Shape written on the last frame, `None` while holding baseline.
    pub active_viseme: Option<Viseme>,
}

/// Everything the engine knows about the avatar between frames.
///
/// Only the engine mutates it; hosts get a shared reference.
#[derive(Debug, Clone, Default)]
pub struct AvatarState {
    pub expression: ExpressionState,
    pub eyes_closed: bool,
    pub speech: Option<SpeechLayer>,
    pub playback: PlaybackState,
    pub conversation: ConversationLog,
    pub frame: u64,
}

impl AvatarState {
    pub fn is_speaking(&self) -> bool {
        self.speech.is_some()
    }
}
