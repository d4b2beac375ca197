//! Configuration types for the avatar animation core.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{AvatarError, Result};
use crate::expression::ExpressionLibrary;
use crate::viseme::VisemeMap;

/// Top-level configuration for one avatar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarConfig {
    /// Seed for all random draws. `None` seeds from the OS.
    pub rng_seed: Option<u64>,
    /// Per-frame interpolation factors.
    pub smoothing: SmoothingConfig,
    /// Eye-blink timer.
    pub blink: BlinkConfig,
    /// Ambient expression timer and expression tables.
    pub expression: ExpressionConfig,
    /// Speech-layer settings.
    pub lip_sync: LipSyncConfig,
    /// Skeletal clips.
    pub animation: AnimationConfig,
    /// Head look-at.
    pub head_tracking: HeadTrackingConfig,
    /// Speaker output.
    pub playback: PlaybackConfig,
}

/// Interpolation factor per frame (higher converges faster).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Ambient expression drift.
    pub ambient: f32,
    /// Eye lids. Must be faster than `ambient` to read as a blink.
    pub blink: f32,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            ambient: 0.1,
            blink: 0.5,
        }
    }
}

/// Eye-blink timer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlinkConfig {
    /// Shortest time between the starts of two blinks.
    pub interval_min_secs: f64,
    /// Longest time between the starts of two blinks.
    pub interval_max_secs: f64,
    /// How long the eyes stay closed.
    pub hold_secs: f64,
    pub left_target: String,
    pub right_target: String,
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            interval_min_secs: 5.0,
            interval_max_secs: 8.0,
            hold_secs: 0.2,
            left_target: "eyeBlinkLeft".into(),
            right_target: "eyeBlinkRight".into(),
        }
    }
}

impl BlinkConfig {
    pub fn targets(&self) -> [&str; 2] {
        [&self.left_target, &self.right_target]
    }
}

/// Ambient expression configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpressionConfig {
    pub interval_min_secs: f64,
    pub interval_max_secs: f64,
    /// Intensity multiplier drawn with each new expression.
    pub intensity_min: f32,
    pub intensity_max: f32,
    /// Expressions the scheduler picks from, uniformly.
    pub candidates: Vec<String>,
    /// Expression shown as soon as the scheduler starts.
    pub initial: String,
    pub library: ExpressionLibrary,
}

impl Default for ExpressionConfig {
    fn default() -> Self {
        Self {
            interval_min_secs: 2.0,
            interval_max_secs: 5.0,
            intensity_min: 0.7,
            intensity_max: 1.0,
            candidates: vec!["bigSmile".into(), "smallSmile".into()],
            initial: "bigSmile".into(),
            library: ExpressionLibrary::builtin(),
        }
    }
}

/// Speech-layer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LipSyncConfig {
    /// Resting weight of every viseme target between shapes.
    pub baseline: f32,
    /// Upper bound on the weight of the active viseme.
    pub cap: f32,
    /// Nodes whose viseme targets are repainted each frame.
    pub speech_nodes: Vec<String>,
    pub viseme_map: VisemeMap,
}

impl Default for LipSyncConfig {
    fn default() -> Self {
        Self {
            baseline: 0.1,
            cap: 0.5,
            speech_nodes: vec!["Wolf3D_Head".into(), "Wolf3D_Teeth".into()],
            viseme_map: VisemeMap::default(),
        }
    }
}

/// Skeletal animation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    /// Clip looped while the avatar is idle.
    pub idle_clip: String,
    /// Clip crossfaded in while speaking. `None` keeps the idle clip.
    pub talk_clip: Option<String>,
    /// Target weight of the talk clip.
    pub talk_weight: f32,
    pub talk_fade_in_secs: f32,
    pub talk_fade_out_secs: f32,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            idle_clip: "idle".into(),
            talk_clip: None,
            talk_weight: 0.9,
            talk_fade_in_secs: 0.5,
            talk_fade_out_secs: 0.8,
        }
    }
}

/// Head look-at configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadTrackingConfig {
    pub enabled: bool,
    pub head_bone: String,
}

impl Default for HeadTrackingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            head_bone: "Head".into(),
        }
    }
}

/// Speaker output configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Output device name. `None` uses the system default.
    pub output_device: Option<String>,
}

impl AvatarConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| AvatarError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AvatarError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/visage/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("visage").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("visage")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/visage-config/config.toml")
        }
    }

    /// Check every tunable before the engine starts.
    ///
    /// # Errors
    ///
    /// Returns [`AvatarError::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        check_factor("smoothing.ambient", self.smoothing.ambient)?;
        check_factor("smoothing.blink", self.smoothing.blink)?;

        let blink = &self.blink;
        check_range(
            "blink.interval",
            blink.interval_min_secs,
            blink.interval_max_secs,
        )?;
        if !(blink.hold_secs.is_finite() && blink.hold_secs > 0.0) {
            return Err(invalid("blink.hold_secs", "must be positive"));
        }
        if blink.hold_secs >= blink.interval_min_secs {
            return Err(invalid(
                "blink.hold_secs",
                "must be shorter than blink.interval_min_secs",
            ));
        }
        if blink.left_target.is_empty() || blink.right_target.is_empty() {
            return Err(invalid("blink", "blink targets must be named"));
        }

        let expr = &self.expression;
        check_range(
            "expression.interval",
            expr.interval_min_secs,
            expr.interval_max_secs,
        )?;
        check_unit("expression.intensity_min", expr.intensity_min)?;
        check_unit("expression.intensity_max", expr.intensity_max)?;
        if expr.intensity_min > expr.intensity_max {
            return Err(invalid(
                "expression.intensity",
                "intensity_min exceeds intensity_max",
            ));
        }
        if !expr.library.contains(&expr.initial) {
            return Err(invalid(
                "expression.initial",
                &format!("'{}' is not in the expression library", expr.initial),
            ));
        }
        if let Some(missing) = expr
            .candidates
            .iter()
            .find(|name| !expr.library.contains(name))
        {
            return Err(invalid(
                "expression.candidates",
                &format!("'{missing}' is not in the expression library"),
            ));
        }

        let lip = &self.lip_sync;
        check_unit("lip_sync.baseline", lip.baseline)?;
        check_unit("lip_sync.cap", lip.cap)?;
        let viseme_targets = lip.viseme_map.targets();
        if let Some(shared) = blink
            .targets()
            .into_iter()
            .find(|t| viseme_targets.contains(t))
        {
            return Err(invalid(
                "lip_sync.viseme_map",
                &format!("'{shared}' is also a blink target"),
            ));
        }

        let anim = &self.animation;
        if anim.idle_clip.is_empty() {
            return Err(invalid("animation.idle_clip", "must be named"));
        }
        check_unit("animation.talk_weight", anim.talk_weight)?;
        for (field, secs) in [
            ("animation.talk_fade_in_secs", anim.talk_fade_in_secs),
            ("animation.talk_fade_out_secs", anim.talk_fade_out_secs),
        ] {
            if !(secs.is_finite() && secs >= 0.0) {
                return Err(invalid(field, "must be a non-negative duration"));
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> AvatarError {
    AvatarError::Config(format!("{field}: {reason}"))
}

fn check_factor(field: &str, value: f32) -> Result<()> {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(invalid(field, &format!("{value} is not in (0, 1]")))
    }
}

fn check_unit(field: &str, value: f32) -> Result<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(field, &format!("{value} is not in [0, 1]")))
    }
}

fn check_range(field: &str, min: f64, max: f64) -> Result<()> {
    if !(min.is_finite() && max.is_finite()) || min <= 0.0 {
        return Err(invalid(field, "bounds must be positive"));
    }
    if min > max {
        return Err(invalid(field, &format!("min {min} exceeds max {max}")));
    }
    Ok(())
}
