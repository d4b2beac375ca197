//! Utterance audio: assets, playback transports and the sync clock.

pub mod clock;
#[cfg(feature = "cpal-playback")]
pub mod playback;
pub mod transport;

pub use clock::{AudioSyncClock, ClockNotice, ClockState, PlaybackState};
#[cfg(feature = "cpal-playback")]
pub use playback::CpalTransport;
pub use transport::{
    PlaybackEvent, PlaybackEventReceiver, PlaybackEventSender, PlaybackTransport,
    SimulatedTransport, playback_channel,
};

use std::path::Path;

use crate::error::{AvatarError, Result};

/// Sample rate used for assets that carry no audio data.
pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;

/// A playable utterance handed over by the speech backend.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioAsset {
    pub id: String,
    /// Known length in seconds. `None` lets the transport decide when it ends.
    pub duration_secs: Option<f64>,
    /// Mono samples in `[-1, 1]`. Empty for simulated assets.
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Whitespace-separated ARPABET phonemes, when the backend provides them.
    pub phonemes: Option<String>,
}

impl AudioAsset {
    /// Mono samples with a duration derived from their count.
    pub fn from_samples(id: impl Into<String>, samples: Vec<f32>, sample_rate: u32) -> Self {
        let duration = if sample_rate == 0 {
            0.0
        } else {
            samples.len() as f64 / f64::from(sample_rate)
        };
        Self {
            id: id.into(),
            duration_secs: Some(duration),
            samples,
            sample_rate,
            phonemes: None,
        }
    }

    /// An asset with a length but no audio data, for headless runs.
    pub fn silent(id: impl Into<String>, duration_secs: f64) -> Self {
        Self {
            id: id.into(),
            duration_secs: Some(duration_secs),
            samples: Vec::new(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            phonemes: None,
        }
    }

    pub fn with_phonemes(mut self, phonemes: impl Into<String>) -> Self {
        self.phonemes = Some(phonemes.into());
        self
    }

    /// Decode a WAV file into mono f32 samples.
    ///
    /// The asset id is the file stem.
    ///
    /// # Errors
    ///
    /// Returns [`AvatarError::Asset`] if the file cannot be opened or decoded.
    pub fn from_wav(path: &Path) -> Result<Self> {
        let mut reader = hound::WavReader::open(path)
            .map_err(|e| AvatarError::Asset(format!("cannot open WAV {}: {e}", path.display())))?;
        let spec = reader.spec();

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Int => {
                let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| {
                        s.map_err(|e| AvatarError::Asset(format!("WAV read error: {e}")))
                            .map(|v| v as f32 / max)
                    })
                    .collect::<Result<Vec<f32>>>()?
            }
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .map(|s| s.map_err(|e| AvatarError::Asset(format!("WAV read error: {e}"))))
                .collect::<Result<Vec<f32>>>()?,
        };

        // Mix to mono if stereo.
        let samples = if spec.channels > 1 {
            let ch = usize::from(spec.channels);
            samples
                .chunks(ch)
                .map(|frame| frame.iter().sum::<f32>() / ch as f32)
                .collect()
        } else {
            samples
        };

        let id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "utterance".to_owned());
        Ok(Self::from_samples(id, samples, spec.sample_rate))
    }

    /// Length in seconds, falling back to the sample count.
    pub fn length_secs(&self) -> f64 {
        match self.duration_secs {
            Some(d) if d.is_finite() => d.max(0.0),
            _ if self.sample_rate > 0 => self.samples.len() as f64 / f64::from(self.sample_rate),
            _ => 0.0,
        }
    }
}
