//! End-to-end lip-sync: timeline, audio clock and registry driven through
//! the public engine API.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::cell::Cell;
use std::rc::Rc;

use visage::audio::{PlaybackEvent, PlaybackEventSender, PlaybackTransport};
use visage::{
    AudioAsset, AudioSyncClock, AvatarAssets, AvatarConfig, AvatarError, AvatarEvent,
    FacialAnimationEngine, NodeSelector, Result, SimulatedTransport, Viseme, VisemeSegment,
    VisemeSupplier, VisemeTimeline,
};

const SPEECH_NODES: [&str; 2] = ["Wolf3D_Head", "Wolf3D_Teeth"];

struct FixedSupplier(Vec<VisemeSegment>);

impl VisemeSupplier for FixedSupplier {
    fn timeline_for(&mut self, _asset: &AudioAsset) -> Result<VisemeTimeline> {
        VisemeTimeline::new(self.0.clone())
    }
}

fn three_second_utterance() -> FixedSupplier {
    FixedSupplier(vec![
        VisemeSegment::new(0.0, 1.0, Viseme::A, 0.8),
        VisemeSegment::new(1.0, 2.0, Viseme::B, 0.8),
        VisemeSegment::new(2.0, 3.0, Viseme::C, 0.8),
    ])
}

fn engine(transport: SimulatedTransport) -> FacialAnimationEngine {
    engine_on(Box::new(transport))
}

fn engine_on(transport: Box<dyn PlaybackTransport>) -> FacialAnimationEngine {
    let config = AvatarConfig {
        rng_seed: Some(7),
        ..AvatarConfig::default()
    };
    FacialAnimationEngine::new(config, AvatarAssets::sample(), transport).unwrap()
}

fn count_failures(events: &[AvatarEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, AvatarEvent::SpeechFailed { .. }))
        .count()
}

fn weight(engine: &FacialAnimationEngine, node: &str, target: &str) -> f32 {
    engine.registry().get(NodeSelector::Name(node), target)
}

/// Assert `active` holds `expected` on every speech node and every other
/// viseme target sits at baseline.
fn assert_only_active(engine: &FacialAnimationEngine, active: Option<&str>, expected: f32) {
    for node in SPEECH_NODES {
        for target in engine.viseme_targets() {
            let w = weight(engine, node, target);
            if Some(target.as_str()) == active {
                assert!((w - expected).abs() < 1e-6, "{node}/{target} = {w}");
            } else {
                assert!((w - 0.1).abs() < 1e-6, "{node}/{target} = {w}");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[test]
fn visemes_follow_audio_clock() {
    let mut engine = engine(SimulatedTransport::new());
    engine
        .start_utterance(AudioAsset::silent("hello", 3.0), &mut three_second_utterance())
        .unwrap();
    assert!(engine.playback_state().is_playing);

    let report = engine.tick(0.5, None);
    assert_eq!(report.active_viseme, Some(Viseme::A));
    assert_only_active(&engine, Some("viseme_PP"), 0.5);

    let report = engine.tick(1.0, None);
    assert_eq!(report.elapsed, Some(1.5));
    assert_eq!(report.active_viseme, Some(Viseme::B));
    assert_only_active(&engine, Some("viseme_kk"), 0.5);

    let report = engine.tick(1.0, None);
    assert_eq!(report.active_viseme, Some(Viseme::C));
    assert!(
        report
            .events
            .contains(&AvatarEvent::VisemeChanged { viseme: Some(Viseme::C) })
    );
    assert_only_active(&engine, Some("viseme_I"), 0.5);
}

#[test]
fn end_of_audio_restores_baseline() {
    let mut engine = engine(SimulatedTransport::new());
    engine
        .start_utterance(AudioAsset::silent("hello", 3.0), &mut three_second_utterance())
        .unwrap();

    let mut events = Vec::new();
    for _ in 0..8 {
        events.extend(engine.tick(0.5, None).events);
    }

    assert!(events.contains(&AvatarEvent::SpeechEnded {
        asset_id: "hello".into()
    }));
    assert!(!engine.playback_state().is_playing);
    assert!(engine.playback_state().has_ended);
    assert!(!engine.state().is_speaking());
    assert_only_active(&engine, None, 0.1);

    // The clock stays put after the asset ended.
    let report = engine.tick(0.5, None);
    assert!(report.elapsed.is_none());
    assert!(report.active_viseme.is_none());
}

#[test]
fn mid_playback_failure_keeps_ambient_layer() {
    let mut engine = engine(SimulatedTransport::failing_after(1.5, "decoder error"));
    engine
        .start_utterance(AudioAsset::silent("hello", 3.0), &mut three_second_utterance())
        .unwrap();

    engine.tick(0.5, None);
    engine.tick(0.5, None);
    assert_only_active(&engine, Some("viseme_kk"), 0.5);

    let report = engine.tick(0.5, None);
    assert!(report.events.iter().any(|e| matches!(
        e,
        AvatarEvent::SpeechFailed { asset_id, reason }
            if asset_id == "hello" && reason.contains("decoder error")
    )));
    assert!(!engine.state().is_speaking());
    assert_only_active(&engine, None, 0.1);

    let smile_before = weight(&engine, "Wolf3D_Head", "mouthSmileLeft");
    for _ in 0..30 {
        engine.tick(1.0 / 60.0, None);
    }
    let smile_after = weight(&engine, "Wolf3D_Head", "mouthSmileLeft");
    assert!(smile_after > smile_before);
}

#[test]
fn failed_start_is_reported_once() {
    let mut engine = engine(SimulatedTransport::failing("autoplay blocked"));
    engine
        .start_utterance(AudioAsset::silent("hello", 3.0), &mut three_second_utterance())
        .unwrap();

    // The transport fails at position zero; the first poll retires the layer.
    let first = engine.tick(0.1, None);
    assert_eq!(count_failures(&first.events), 1);
    assert_only_active(&engine, None, 0.1);

    let second = engine.tick(0.1, None);
    assert_eq!(count_failures(&second.events), 0);
}

/// Holds an output "device" open from `start` until `stop`.
struct DeviceTransport {
    open: Rc<Cell<bool>>,
    stops: Rc<Cell<u32>>,
    position: f64,
    duration: f64,
    events: Option<PlaybackEventSender>,
}

impl DeviceTransport {
    fn new() -> (Self, Rc<Cell<bool>>, Rc<Cell<u32>>) {
        let open = Rc::new(Cell::new(false));
        let stops = Rc::new(Cell::new(0));
        let transport = Self {
            open: Rc::clone(&open),
            stops: Rc::clone(&stops),
            position: 0.0,
            duration: 0.0,
            events: None,
        };
        (transport, open, stops)
    }
}

impl PlaybackTransport for DeviceTransport {
    fn start(&mut self, asset: &AudioAsset, events: PlaybackEventSender) -> Result<()> {
        self.open.set(true);
        self.position = 0.0;
        self.duration = asset.length_secs();
        self.events = Some(events);
        Ok(())
    }

    fn stop(&mut self) {
        self.open.set(false);
        self.stops.set(self.stops.get() + 1);
        self.events = None;
    }

    fn position_secs(&self) -> f64 {
        self.position
    }

    fn tick(&mut self, dt: f64) {
        self.position = (self.position + dt).min(self.duration);
        if self.position >= self.duration
            && let Some(tx) = self.events.take()
        {
            let _ = tx.send(PlaybackEvent::Ended);
        }
    }
}

#[test]
fn device_is_released_after_natural_end() {
    let (transport, open, stops) = DeviceTransport::new();
    let mut engine = engine_on(Box::new(transport));
    engine
        .start_utterance(AudioAsset::silent("short", 1.0), &mut three_second_utterance())
        .unwrap();
    assert!(open.get());

    let mut events = Vec::new();
    for _ in 0..4 {
        events.extend(engine.tick(0.5, None).events);
    }
    assert!(events.contains(&AvatarEvent::SpeechEnded {
        asset_id: "short".into()
    }));
    assert!(!open.get());
    assert_eq!(stops.get(), 1);

    engine.shutdown();
    assert_eq!(stops.get(), 1);
}

/// Refuses every `start`, like a blocked or missing output device.
struct RefusingTransport;

impl PlaybackTransport for RefusingTransport {
    fn start(&mut self, _asset: &AudioAsset, _events: PlaybackEventSender) -> Result<()> {
        Err(AvatarError::Playback("device busy".into()))
    }

    fn stop(&mut self) {}

    fn position_secs(&self) -> f64 {
        0.0
    }
}

#[test]
fn refused_start_returns_error_and_fails_once() {
    let mut engine = engine_on(Box::new(RefusingTransport));
    let err = engine
        .start_utterance(AudioAsset::silent("hello", 3.0), &mut three_second_utterance())
        .unwrap_err();
    assert!(matches!(err, AvatarError::Playback(_)));
    assert!(!engine.state().is_speaking());

    let mut events = Vec::new();
    for _ in 0..3 {
        events.extend(engine.tick(0.5, None).events);
    }
    assert_eq!(count_failures(&events), 1);
    assert!(!engine.state().is_speaking());
    assert!(!engine.playback_state().is_playing);
    assert_only_active(&engine, None, 0.1);
}

// ---------------------------------------------------------------------------
// Audio clock
// ---------------------------------------------------------------------------

/// Counts `start` calls and never finishes on its own.
struct CountingTransport {
    starts: Rc<Cell<u32>>,
}

impl PlaybackTransport for CountingTransport {
    fn start(&mut self, _asset: &AudioAsset, _events: PlaybackEventSender) -> Result<()> {
        self.starts.set(self.starts.get() + 1);
        Ok(())
    }

    fn stop(&mut self) {}

    fn position_secs(&self) -> f64 {
        0.0
    }
}

#[test]
fn play_starts_an_asset_once() {
    let starts = Rc::new(Cell::new(0));
    let mut clock = AudioSyncClock::new(Box::new(CountingTransport {
        starts: Rc::clone(&starts),
    }));
    clock.load(AudioAsset::silent("a", 1.0));

    clock.play().unwrap();
    clock.play().unwrap();
    assert_eq!(starts.get(), 1);
    assert!(clock.is_playing());

    clock.stop();
    clock.play().unwrap();
    assert_eq!(starts.get(), 1);

    clock.load(AudioAsset::silent("b", 1.0));
    clock.play().unwrap();
    assert_eq!(starts.get(), 2);
}

#[test]
fn play_without_asset_is_an_error() {
    let mut clock = AudioSyncClock::new(Box::new(SimulatedTransport::new()));
    assert!(clock.play().is_err());
    assert!(!clock.playback_state().is_playing);
}
