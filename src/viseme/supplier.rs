//! Sources of viseme timelines.
//!
//! The engine only depends on [`VisemeSupplier`]. A real phoneme-to-viseme
//! model plugs in here; the suppliers in this module are stand-ins.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::{Viseme, VisemeSegment, VisemeTimeline};
use crate::audio::AudioAsset;
use crate::error::Result;

/// Produces the viseme timeline for an audio asset.
pub trait VisemeSupplier {
    /// Build the timeline for one utterance.
    ///
    /// # Errors
    ///
    /// Returns an error if no usable timeline can be produced for `asset`.
    fn timeline_for(&mut self, asset: &AudioAsset) -> Result<VisemeTimeline>;
}

/// Shape of a randomly generated placeholder timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaceholderParams {
    /// Distance between consecutive segment starts.
    pub stride_secs: f64,
    pub width_min_secs: f64,
    pub width_max_secs: f64,
    pub weight_min: f32,
    pub weight_max: f32,
    /// Span covered when the asset does not report its duration.
    pub nominal_secs: f64,
    pub max_segments: usize,
}

impl PlaceholderParams {
    /// Overlapping 0.15–0.25 s windows every 0.15 s with moderate weights.
    pub fn conversational() -> Self {
        Self {
            stride_secs: 0.15,
            width_min_secs: 0.15,
            width_max_secs: 0.25,
            weight_min: 0.4,
            weight_max: 0.6,
            nominal_secs: 30.0,
            max_segments: 200,
        }
    }

    /// Back-to-back 200 ms windows with strong weights.
    pub fn uniform() -> Self {
        Self {
            stride_secs: 0.2,
            width_min_secs: 0.2,
            width_max_secs: 0.2,
            weight_min: 0.8,
            weight_max: 1.0,
            nominal_secs: 30.0,
            max_segments: 150,
        }
    }
}

impl Default for PlaceholderParams {
    fn default() -> Self {
        Self::conversational()
    }
}

/// Random mouth movement that ignores the audio content.
#[derive(Debug, Clone)]
pub struct PlaceholderVisemeSupplier {
    params: PlaceholderParams,
    rng: StdRng,
}

impl PlaceholderVisemeSupplier {
    pub fn new(params: PlaceholderParams) -> Self {
        Self {
            params,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic supplier for tests and reproducible simulations.
    pub fn seeded(params: PlaceholderParams, seed: u64) -> Self {
        Self {
            params,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for PlaceholderVisemeSupplier {
    fn default() -> Self {
        Self::new(PlaceholderParams::default())
    }
}

impl VisemeSupplier for PlaceholderVisemeSupplier {
    fn timeline_for(&mut self, asset: &AudioAsset) -> Result<VisemeTimeline> {
        let p = self.params;
        let span = asset
            .duration_secs
            .filter(|d| d.is_finite() && *d > 0.0)
            .unwrap_or(p.nominal_secs);
        let stride = p.stride_secs.max(0.01);
        let count = ((span / stride).ceil() as usize).min(p.max_segments);

        let (w_lo, w_hi) = ordered(p.width_min_secs, p.width_max_secs);
        let (k_lo, k_hi) = ordered(p.weight_min, p.weight_max);

        let mut segments = Vec::with_capacity(count);
        for i in 0..count {
            let start = i as f64 * stride;
            let width = self.rng.gen_range(w_lo..=w_hi);
            let symbol = Viseme::SPOKEN[self.rng.gen_range(0..Viseme::SPOKEN.len())];
            let intensity = self.rng.gen_range(k_lo..=k_hi);
            segments.push(VisemeSegment::new(start, start + width, symbol, intensity));
        }

        debug!(asset = %asset.id, segments = count, span, "generated placeholder visemes");
        VisemeTimeline::new(segments)
    }
}

fn ordered<T: PartialOrd>(a: T, b: T) -> (T, T) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Rule-based timeline from an ARPABET phoneme string attached to the asset.
///
/// Durations are estimated per phoneme class, so the result only roughly
/// follows the audio. Repeated shapes are merged into one segment.
#[derive(Debug, Clone)]
pub struct PhonemeVisemeSupplier {
    /// Speaking-rate multiplier (1.0 = normal).
    pub speech_rate: f32,
    /// Base duration per phoneme in seconds at rate 1.0.
    pub base_duration_secs: f64,
}

impl Default for PhonemeVisemeSupplier {
    fn default() -> Self {
        Self {
            speech_rate: 1.0,
            base_duration_secs: 0.08,
        }
    }
}

impl PhonemeVisemeSupplier {
    /// Convert a whitespace-separated ARPABET sequence into segments.
    pub fn segments_for(&self, phonemes: &str) -> Vec<VisemeSegment> {
        let unit = self.base_duration_secs / f64::from(self.speech_rate.max(0.5));
        let mut segments: Vec<VisemeSegment> = Vec::new();
        let mut cursor = 0.0;

        for raw in phonemes.split_whitespace() {
            // Remove stress markers (0, 1, 2)
            let phone = raw.trim_end_matches(['0', '1', '2']);
            let class = PhoneClass::of(phone);
            let duration = unit * class.duration_scale();

            let Some(symbol) = phoneme_to_viseme(phone) else {
                cursor += duration;
                continue;
            };

            match segments.last_mut() {
                Some(last) if last.symbol == symbol && (last.end - cursor).abs() < 1e-9 => {
                    last.end += duration;
                }
                _ => segments.push(VisemeSegment::new(
                    cursor,
                    cursor + duration,
                    symbol,
                    class.intensity(),
                )),
            }
            cursor += duration;
        }

        segments
    }
}

impl VisemeSupplier for PhonemeVisemeSupplier {
    fn timeline_for(&mut self, asset: &AudioAsset) -> Result<VisemeTimeline> {
        let Some(phonemes) = asset.phonemes.as_deref() else {
            debug!(asset = %asset.id, "asset carries no phonemes, using an empty timeline");
            return Ok(VisemeTimeline::empty());
        };
        VisemeTimeline::new(self.segments_for(phonemes))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PhoneClass {
    Silence,
    Vowel,
    Stop,
    Other,
}

impl PhoneClass {
    fn of(phone: &str) -> Self {
        match phone {
            "" | "sil" | "sp" => Self::Silence,
            "AA" | "AE" | "AH" | "AO" | "AW" | "AY" | "EH" | "ER" | "EY" | "IH" | "IY" | "OW"
            | "OY" | "UH" | "UW" => Self::Vowel,
            "P" | "B" | "T" | "D" | "K" | "G" | "M" | "N" | "F" | "V" | "S" | "Z" => Self::Stop,
            _ => Self::Other,
        }
    }

    fn duration_scale(self) -> f64 {
        match self {
            Self::Vowel => 1.5,
            Self::Stop => 0.8,
            Self::Silence | Self::Other => 1.0,
        }
    }

    fn intensity(self) -> f32 {
        match self {
            Self::Vowel => 0.6,
            _ => 0.45,
        }
    }
}

/// ARPABET phoneme (stress removed) to mouth shape. `None` for silence.
fn phoneme_to_viseme(phone: &str) -> Option<Viseme> {
    let viseme = match phone {
        "" | "sil" | "sp" => return None,

        // Bilabial: lips together
        "B" | "P" | "M" | "EM" => Viseme::A,

        // Labiodental: teeth on lip
        "F" | "V" => Viseme::G,

        // Dental and lateral: tongue visible
        "TH" | "DH" | "L" | "EL" => Viseme::H,

        // Front vowels
        "IH" | "IY" | "EY" | "EH" | "AE" => Viseme::C,

        // Open vowels
        "AA" | "AH" | "AW" | "AY" | "ER" => Viseme::D,

        // Rounded
        "AO" | "OW" | "OY" => Viseme::E,

        // Puckered
        "UW" | "UH" | "W" => Viseme::F,

        // Everything else keeps the teeth close together
        _ => Viseme::B,
    };
    Some(viseme)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn placeholder_respects_ranges() {
        let mut supplier =
            PlaceholderVisemeSupplier::seeded(PlaceholderParams::conversational(), 7);
        let tl = supplier
            .timeline_for(&AudioAsset::silent("reply", 30.0))
            .unwrap();
        assert_eq!(tl.len(), 200);
        for seg in tl.segments() {
            let width = seg.end - seg.start;
            assert!((0.15 - 1e-9..=0.25 + 1e-9).contains(&width), "width {width}");
            assert!((0.4..=0.6).contains(&seg.intensity));
            assert_ne!(seg.symbol, Viseme::X);
        }
    }

    #[test]
    fn placeholder_is_reproducible_with_seed() {
        let asset = AudioAsset::silent("reply", 5.0);
        let a = PlaceholderVisemeSupplier::seeded(PlaceholderParams::default(), 42)
            .timeline_for(&asset)
            .unwrap();
        let b = PlaceholderVisemeSupplier::seeded(PlaceholderParams::default(), 42)
            .timeline_for(&asset)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn placeholder_covers_short_asset_only() {
        let mut supplier = PlaceholderVisemeSupplier::seeded(PlaceholderParams::uniform(), 1);
        let tl = supplier
            .timeline_for(&AudioAsset::silent("short", 1.0))
            .unwrap();
        assert_eq!(tl.len(), 5);
        assert!(tl.segments().iter().all(|s| s.intensity >= 0.8));
    }

    #[test]
    fn bilabials_map_to_closed_lips() {
        let supplier = PhonemeVisemeSupplier::default();
        let segs = supplier.segments_for("B P M");
        // Repeated shapes merge into one segment.
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].symbol, Viseme::A);
    }

    #[test]
    fn stress_markers_are_ignored() {
        let supplier = PhonemeVisemeSupplier::default();
        let segs = supplier.segments_for("HH AH0 L OW1");
        let symbols: Vec<_> = segs.iter().map(|s| s.symbol).collect();
        assert_eq!(symbols, vec![Viseme::B, Viseme::D, Viseme::H, Viseme::E]);
    }

    #[test]
    fn silence_leaves_a_gap() {
        let supplier = PhonemeVisemeSupplier::default();
        let segs = supplier.segments_for("AA sil AA");
        assert_eq!(segs.len(), 2);
        assert!(segs[1].start > segs[0].end);
        let tl = VisemeTimeline::new(segs.clone()).unwrap();
        let gap = (segs[0].end + segs[1].start) / 2.0;
        assert!(tl.active_segment_at(gap).is_none());
    }

    #[test]
    fn vowels_last_longer_than_stops() {
        let supplier = PhonemeVisemeSupplier::default();
        let segs = supplier.segments_for("AA P");
        let vowel = segs[0].end - segs[0].start;
        let stop = segs[1].end - segs[1].start;
        assert!(vowel > stop);
    }

    #[test]
    fn missing_phonemes_give_empty_timeline() {
        let mut supplier = PhonemeVisemeSupplier::default();
        let tl = supplier
            .timeline_for(&AudioAsset::silent("quiet", 2.0))
            .unwrap();
        assert!(tl.is_empty());
    }
}
