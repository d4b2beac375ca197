//! Viseme timelines for lip-sync animation.
//!
//! A viseme is a visual mouth shape that corresponds to one or more phonemes.
//! An utterance is described by a [`VisemeTimeline`]: time-stamped segments
//! built once when the audio starts and dropped when it ends.

pub mod supplier;

pub use supplier::{
    PhonemeVisemeSupplier, PlaceholderParams, PlaceholderVisemeSupplier, VisemeSupplier,
};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{AvatarError, Result};

/// Mouth-shape categories (Preston Blair / Rhubarb letters).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Viseme {
    /// Closed lips: P, B, M
    A,
    /// Slightly open, clenched teeth: K, S, T, EE
    B,
    /// Open mouth: EH, AE
    C,
    /// Wide open: AA
    D,
    /// Slightly rounded: AO, ER
    E,
    /// Puckered: UW, OW, W
    F,
    /// Teeth on lower lip: F, V
    G,
    /// Tongue raised: L, TH
    H,
    /// Idle / rest
    X,
}

impl Viseme {
    pub const ALL: [Viseme; 9] = [
        Viseme::A,
        Viseme::B,
        Viseme::C,
        Viseme::D,
        Viseme::E,
        Viseme::F,
        Viseme::G,
        Viseme::H,
        Viseme::X,
    ];

    /// Shapes that occur during speech (everything but rest).
    pub const SPOKEN: [Viseme; 8] = [
        Viseme::A,
        Viseme::B,
        Viseme::C,
        Viseme::D,
        Viseme::E,
        Viseme::F,
        Viseme::G,
        Viseme::H,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::E => "E",
            Self::F => "F",
            Self::G => "G",
            Self::H => "H",
            Self::X => "X",
        }
    }
}

impl fmt::Display for Viseme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Viseme {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown viseme '{s}'"))
    }
}

/// One mouth shape held over `[start, end)` seconds of the utterance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VisemeSegment {
    pub start: f64,
    pub end: f64,
    pub symbol: Viseme,
    /// Requested weight in `[0, 1]`, before the engine's cap.
    pub intensity: f32,
}

impl VisemeSegment {
    pub fn new(start: f64, end: f64, symbol: Viseme, intensity: f32) -> Self {
        Self {
            start,
            end,
            symbol,
            intensity,
        }
    }

    pub fn contains(&self, t: f64) -> bool {
        self.start <= t && t < self.end
    }
}

/// Immutable, start-ordered sequence of viseme segments for one utterance.
///
/// Segments may overlap. A query returns the first segment in construction
/// order whose window contains the time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisemeTimeline {
    segments: Vec<VisemeSegment>,
    /// `max_end[i]` = largest `end` among `segments[..=i]`.
    max_end: Vec<f64>,
}

impl VisemeTimeline {
    /// Validate and index a sequence of segments.
    ///
    /// # Errors
    ///
    /// Returns [`AvatarError::Timeline`] if a time is not finite, a segment
    /// ends before it starts, or starts are not non-decreasing.
    pub fn new(segments: Vec<VisemeSegment>) -> Result<Self> {
        let mut segments = segments;
        let mut max_end = Vec::with_capacity(segments.len());
        let mut prev_start = f64::NEG_INFINITY;
        let mut running_end = f64::NEG_INFINITY;

        for (idx, seg) in segments.iter_mut().enumerate() {
            if !seg.start.is_finite() || !seg.end.is_finite() {
                return Err(AvatarError::Timeline(format!(
                    "segment {idx} has a non-finite bound"
                )));
            }
            if seg.end < seg.start {
                return Err(AvatarError::Timeline(format!(
                    "segment {idx} ends at {} before it starts at {}",
                    seg.end, seg.start
                )));
            }
            if seg.start < prev_start {
                return Err(AvatarError::Timeline(format!(
                    "segment {idx} starts at {} before the previous segment ({prev_start})",
                    seg.start
                )));
            }
            seg.intensity = if seg.intensity.is_finite() {
                seg.intensity.clamp(0.0, 1.0)
            } else {
                0.0
            };
            prev_start = seg.start;
            running_end = running_end.max(seg.end);
            max_end.push(running_end);
        }

        Ok(Self { segments, max_end })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// First segment, in construction order, whose `[start, end)` contains `t`.
    ///
    /// Starts are sorted, so candidates are the prefix with `start <= t`. The
    /// running maximum of `end` is sorted too, and the first index where it
    /// exceeds `t` is exactly the first candidate that still covers `t`.
    pub fn active_segment_at(&self, t: f64) -> Option<&VisemeSegment> {
        if !t.is_finite() {
            return None;
        }
        let candidates = self.segments.partition_point(|s| s.start <= t);
        let first_covering = self.max_end.partition_point(|&end| end <= t);
        if first_covering < candidates {
            self.segments.get(first_covering)
        } else {
            None
        }
    }

    /// End of the last-ending segment, or `0.0` for an empty timeline.
    pub fn duration(&self) -> f64 {
        self.max_end.last().copied().unwrap_or(0.0).max(0.0)
    }

    pub fn segments(&self) -> &[VisemeSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Maps each viseme symbol to the morph target that renders it.
///
/// Serialized as a plain string table (`A = "viseme_PP"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, String>",
    into = "BTreeMap<String, String>"
)]
pub struct VisemeMap {
    targets: BTreeMap<Viseme, String>,
}

impl TryFrom<BTreeMap<String, String>> for VisemeMap {
    type Error = String;

    fn try_from(table: BTreeMap<String, String>) -> std::result::Result<Self, Self::Error> {
        let targets = table
            .into_iter()
            .map(|(symbol, target)| Ok((symbol.parse::<Viseme>()?, target)))
            .collect::<std::result::Result<_, String>>()?;
        Ok(Self { targets })
    }
}

impl From<VisemeMap> for BTreeMap<String, String> {
    fn from(map: VisemeMap) -> Self {
        map.targets
            .into_iter()
            .map(|(symbol, target)| (symbol.as_str().to_owned(), target))
            .collect()
    }
}

impl Default for VisemeMap {
    fn default() -> Self {
        Self::oculus()
    }
}

impl VisemeMap {
    /// Letter shapes onto Oculus/ARKit-style `viseme_*` blend shapes.
    pub fn oculus() -> Self {
        let targets = [
            (Viseme::A, "viseme_PP"),
            (Viseme::B, "viseme_kk"),
            (Viseme::C, "viseme_I"),
            (Viseme::D, "viseme_AA"),
            (Viseme::E, "viseme_O"),
            (Viseme::F, "viseme_U"),
            (Viseme::G, "viseme_FF"),
            (Viseme::H, "viseme_TH"),
            (Viseme::X, "viseme_PP"),
        ]
        .into_iter()
        .map(|(v, t)| (v, t.to_owned()))
        .collect();
        Self { targets }
    }

    pub fn target(&self, viseme: Viseme) -> Option<&str> {
        self.targets.get(&viseme).map(String::as_str)
    }

    pub fn insert(&mut self, viseme: Viseme, target: impl Into<String>) {
        self.targets.insert(viseme, target.into());
    }

    /// Distinct target names, sorted. Several symbols may share a target.
    pub fn targets(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.targets.values().map(String::as_str).collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn seg(start: f64, end: f64, symbol: Viseme) -> VisemeSegment {
        VisemeSegment::new(start, end, symbol, 0.5)
    }

    #[test]
    fn disjoint_segments_resolve_by_time() {
        let tl = VisemeTimeline::new(vec![
            seg(0.0, 1.0, Viseme::A),
            seg(1.0, 2.0, Viseme::B),
            seg(2.0, 3.0, Viseme::C),
        ])
        .unwrap();
        let at = |t| tl.active_segment_at(t).map(|s| s.symbol);
        assert_eq!(at(0.5), Some(Viseme::A));
        assert_eq!(at(1.5), Some(Viseme::B));
        assert_eq!(at(2.5), Some(Viseme::C));
        assert_eq!(at(3.5), None);
    }

    #[test]
    fn boundaries_are_half_open() {
        let tl = VisemeTimeline::new(vec![seg(0.0, 1.0, Viseme::A), seg(1.0, 2.0, Viseme::B)])
            .unwrap();
        assert_eq!(tl.active_segment_at(0.0).unwrap().symbol, Viseme::A);
        assert_eq!(tl.active_segment_at(1.0).unwrap().symbol, Viseme::B);
        assert!(tl.active_segment_at(2.0).is_none());
        assert!(tl.active_segment_at(-0.1).is_none());
    }

    #[test]
    fn overlapping_segments_first_match_wins() {
        let tl = VisemeTimeline::new(vec![seg(0.0, 1.0, Viseme::A), seg(0.5, 1.5, Viseme::B)])
            .unwrap();
        assert_eq!(tl.active_segment_at(0.7).unwrap().symbol, Viseme::A);
        assert_eq!(tl.active_segment_at(1.2).unwrap().symbol, Viseme::B);
    }

    #[test]
    fn long_early_segment_shadows_later_ones() {
        // A covers everything; later segments never win while A contains t.
        let tl = VisemeTimeline::new(vec![
            seg(0.0, 10.0, Viseme::A),
            seg(1.0, 2.0, Viseme::B),
            seg(3.0, 4.0, Viseme::C),
        ])
        .unwrap();
        assert_eq!(tl.active_segment_at(3.5).unwrap().symbol, Viseme::A);
        assert!(tl.active_segment_at(10.0).is_none());
    }

    #[test]
    fn gap_between_segments_yields_none() {
        let tl = VisemeTimeline::new(vec![
            seg(0.0, 0.5, Viseme::A),
            seg(0.2, 0.6, Viseme::D),
            seg(1.0, 1.5, Viseme::B),
        ])
        .unwrap();
        assert_eq!(tl.active_segment_at(0.55).unwrap().symbol, Viseme::D);
        assert!(tl.active_segment_at(0.8).is_none());
        assert_eq!(tl.active_segment_at(1.2).unwrap().symbol, Viseme::B);
    }

    #[test]
    fn indexed_lookup_matches_linear_scan() {
        let mut segments = Vec::new();
        for i in 0..200 {
            let start = f64::from(i) * 0.15;
            let width = 0.1 + f64::from(i % 7) * 0.05;
            let symbol = Viseme::SPOKEN[i as usize % 8];
            segments.push(seg(start, start + width, symbol));
        }
        let tl = VisemeTimeline::new(segments.clone()).unwrap();
        let mut t = -0.5;
        while t < 32.0 {
            let linear = segments.iter().find(|s| s.contains(t));
            assert_eq!(tl.active_segment_at(t), linear, "t = {t}");
            t += 0.013;
        }
    }

    #[test]
    fn query_is_pure() {
        let tl = VisemeTimeline::new(vec![seg(0.0, 1.0, Viseme::A), seg(0.5, 1.5, Viseme::B)])
            .unwrap();
        let forward: Vec<_> = [0.2, 0.7, 1.2, 2.0]
            .iter()
            .map(|&t| tl.active_segment_at(t).copied())
            .collect();
        let mut backward: Vec<_> = [2.0, 1.2, 0.7, 0.2]
            .iter()
            .map(|&t| tl.active_segment_at(t).copied())
            .collect();
        backward.reverse();
        assert_eq!(forward, backward);
    }

    #[test]
    fn rejects_malformed_segments() {
        assert!(VisemeTimeline::new(vec![seg(1.0, 0.5, Viseme::A)]).is_err());
        assert!(VisemeTimeline::new(vec![seg(1.0, 2.0, Viseme::A), seg(0.5, 3.0, Viseme::B)])
            .is_err());
        assert!(VisemeTimeline::new(vec![seg(f64::NAN, 1.0, Viseme::A)]).is_err());
    }

    #[test]
    fn intensity_is_clamped() {
        let tl = VisemeTimeline::new(vec![VisemeSegment::new(0.0, 1.0, Viseme::D, 3.0)]).unwrap();
        assert_eq!(tl.segments()[0].intensity, 1.0);
    }

    #[test]
    fn empty_timeline_has_no_active_segment() {
        let tl = VisemeTimeline::empty();
        assert!(tl.active_segment_at(0.0).is_none());
        assert_eq!(tl.duration(), 0.0);
    }

    #[test]
    fn symbols_parse_case_insensitively() {
        assert_eq!("d".parse::<Viseme>().unwrap(), Viseme::D);
        assert_eq!("X".parse::<Viseme>().unwrap(), Viseme::X);
        assert!("Q".parse::<Viseme>().is_err());
    }

    #[test]
    fn map_serializes_as_string_table() {
        let json = serde_json::to_value(VisemeMap::default()).unwrap();
        assert_eq!(json["D"], "viseme_AA");
        let back: VisemeMap = serde_json::from_value(json).unwrap();
        assert_eq!(back, VisemeMap::default());

        let bad = serde_json::json!({ "Q": "viseme_AA" });
        assert!(serde_json::from_value::<VisemeMap>(bad).is_err());
    }

    #[test]
    fn default_map_shares_rest_and_closed_lips() {
        let map = VisemeMap::default();
        assert_eq!(map.target(Viseme::A), Some("viseme_PP"));
        assert_eq!(map.target(Viseme::X), Some("viseme_PP"));
        assert_eq!(map.targets().len(), 8);
    }
}
