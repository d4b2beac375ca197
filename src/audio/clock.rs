//! The audio clock: the only source of utterance-relative time.

use serde::Serialize;
use tracing::{debug, info, warn};

use super::transport::{PlaybackEvent, PlaybackEventReceiver, PlaybackTransport, playback_channel};
use super::AudioAsset;
use crate::error::{AvatarError, Result};

/// Lifecycle of the loaded asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ClockState {
    Idle,
    Playing,
    Ended,
    Failed,
}

/// Read-only view of playback for the rest of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PlaybackState {
    pub is_playing: bool,
    pub elapsed: f64,
    pub has_ended: bool,
}

/// Terminal transition, reported once per loaded asset.
#[derive(Debug, Clone, PartialEq)]
pub enum ClockNotice {
    Ended,
    Failed(String),
}

/// Wraps a [`PlaybackTransport`] and reduces its asynchronous events to
/// plain state polled once per frame.
pub struct AudioSyncClock {
    transport: Box<dyn PlaybackTransport>,
    asset: Option<AudioAsset>,
    state: ClockState,
    /// Set once the loaded asset has been handed to the transport.
    started: bool,
    /// The transport holds resources for this asset until `stop` is called on it.
    engaged: bool,
    elapsed: f64,
    events: Option<PlaybackEventReceiver>,
    pending: Option<ClockNotice>,
}

impl std::fmt::Debug for AudioSyncClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioSyncClock")
            .field("asset", &self.asset.as_ref().map(|a| a.id.as_str()))
            .field("state", &self.state)
            .field("elapsed", &self.elapsed)
            .finish_non_exhaustive()
    }
}

impl AudioSyncClock {
    pub fn new(transport: Box<dyn PlaybackTransport>) -> Self {
        Self {
            transport,
            asset: None,
            state: ClockState::Idle,
            started: false,
            engaged: false,
            elapsed: 0.0,
            events: None,
            pending: None,
        }
    }

    /// Replace the loaded asset. Anything still playing is stopped first.
    pub fn load(&mut self, asset: AudioAsset) {
        self.stop();
        debug!(asset = %asset.id, "audio asset loaded");
        self.asset = Some(asset);
        self.state = ClockState::Idle;
        self.started = false;
        self.elapsed = 0.0;
        self.events = None;
        self.pending = None;
    }

    /// Start the loaded asset.
    ///
    /// An asset is started at most once: repeated calls while playing, or
    /// after it has ended, do nothing.
    ///
    /// # Errors
    ///
    /// Returns [`AvatarError::Playback`] if nothing is loaded or the transport
    /// refuses to start. In the latter case the failure is also reported by
    /// the next [`poll`](Self::poll).
    pub fn play(&mut self) -> Result<()> {
        let Some(asset) = &self.asset else {
            return Err(AvatarError::Playback("no audio asset loaded".into()));
        };
        if self.started {
            debug!(asset = %asset.id, state = ?self.state, "play ignored, asset already started");
            return Ok(());
        }
        self.started = true;

        let (tx, rx) = playback_channel();
        match self.transport.start(asset, tx) {
            Ok(()) => {
                info!(asset = %asset.id, "playback started");
                self.state = ClockState::Playing;
                self.engaged = true;
                self.events = Some(rx);
                Ok(())
            }
            Err(e) => {
                warn!(asset = %asset.id, "playback failed to start: {e}");
                self.state = ClockState::Failed;
                self.pending = Some(ClockNotice::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Stop playback without a notice. Elapsed time is frozen.
    ///
    /// Also releases a transport whose asset already ended or failed.
    pub fn stop(&mut self) {
        if self.state == ClockState::Playing {
            self.state = ClockState::Ended;
            self.events = None;
            debug!(elapsed = self.elapsed, "playback stopped");
        }
        self.release();
    }

    fn release(&mut self) {
        if self.engaged {
            self.transport.stop();
            self.engaged = false;
        }
    }

    /// Advance the transport and drain its events.
    ///
    /// Returns `Some` exactly once per asset, on its terminal transition.
    pub fn poll(&mut self, dt: f64) -> Option<ClockNotice> {
        if let Some(notice) = self.pending.take() {
            return Some(notice);
        }
        if self.state != ClockState::Playing {
            return None;
        }

        self.transport.tick(dt);
        self.track_position();

        let rx = self.events.as_ref()?;
        let mut terminal = None;
        loop {
            match rx.try_recv() {
                Ok(PlaybackEvent::Started) => debug!("transport confirmed start"),
                Ok(PlaybackEvent::Ended) => {
                    terminal = Some(ClockNotice::Ended);
                    break;
                }
                Ok(PlaybackEvent::Failed(reason)) => {
                    terminal = Some(ClockNotice::Failed(reason));
                    break;
                }
                Err(crossbeam_channel::TryRecvError::Empty) => break,
                Err(crossbeam_channel::TryRecvError::Disconnected) => {
                    terminal = Some(ClockNotice::Failed(
                        "playback transport disconnected".into(),
                    ));
                    break;
                }
            }
        }

        let notice = terminal?;
        self.events = None;
        self.release();
        let id = self.asset_id().unwrap_or_default().to_owned();
        match &notice {
            ClockNotice::Ended => {
                self.state = ClockState::Ended;
                info!(asset = %id, elapsed = self.elapsed, "playback ended");
            }
            ClockNotice::Failed(reason) => {
                self.state = ClockState::Failed;
                warn!(asset = %id, elapsed = self.elapsed, "playback failed: {reason}");
            }
        }
        Some(notice)
    }

    fn track_position(&mut self) {
        let position = self.transport.position_secs();
        if position.is_finite() && position > self.elapsed {
            self.elapsed = position;
        }
    }

    /// Playback position in seconds. Never decreases while playing and is
    /// frozen once playback ends or fails.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == ClockState::Playing
    }

    pub fn playback_state(&self) -> PlaybackState {
        PlaybackState {
            is_playing: self.is_playing(),
            elapsed: self.elapsed,
            has_ended: self.state == ClockState::Ended,
        }
    }

    pub fn asset_id(&self) -> Option<&str> {
        self.asset.as_ref().map(|a| a.id.as_str())
    }
}

impl Drop for AudioSyncClock {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::audio::{PlaybackEventSender, SimulatedTransport};
    use std::cell::Cell;
    use std::rc::Rc;

    fn clock_with(asset_secs: f64) -> AudioSyncClock {
        let mut clock = AudioSyncClock::new(Box::new(SimulatedTransport::new()));
        clock.load(AudioAsset::silent("utt", asset_secs));
        clock
    }

    #[test]
    fn idle_until_played() {
        let mut clock = clock_with(1.0);
        assert_eq!(clock.state(), ClockState::Idle);
        assert!(clock.poll(0.5).is_none());
        assert_eq!(clock.elapsed(), 0.0);
    }

    #[test]
    fn second_play_does_not_restart() {
        let mut clock = clock_with(3.0);
        clock.play().unwrap();
        clock.poll(0.5);
        clock.poll(0.5);
        assert_eq!(clock.elapsed(), 1.0);

        clock.play().unwrap();
        assert!(clock.is_playing());
        assert_eq!(clock.elapsed(), 1.0);
        clock.poll(0.25);
        assert_eq!(clock.elapsed(), 1.25);
    }

    #[test]
    fn ended_is_notified_once_and_elapsed_freezes() {
        let mut clock = clock_with(1.0);
        clock.play().unwrap();
        assert!(clock.poll(0.4).is_none());
        assert_eq!(clock.poll(0.8), Some(ClockNotice::Ended));
        assert_eq!(clock.elapsed(), 1.0);

        assert!(clock.poll(0.5).is_none());
        assert_eq!(clock.elapsed(), 1.0);
        let state = clock.playback_state();
        assert!(!state.is_playing);
        assert!(state.has_ended);
    }

    #[test]
    fn play_after_end_is_ignored() {
        let mut clock = clock_with(0.5);
        clock.play().unwrap();
        assert_eq!(clock.poll(1.0), Some(ClockNotice::Ended));
        clock.play().unwrap();
        assert_eq!(clock.state(), ClockState::Ended);
    }

    #[test]
    fn failure_is_reported_with_reason() {
        let mut clock = AudioSyncClock::new(Box::new(SimulatedTransport::failing("decode error")));
        clock.load(AudioAsset::silent("utt", 2.0));
        clock.play().unwrap();
        assert_eq!(
            clock.poll(0.1),
            Some(ClockNotice::Failed("decode error".into()))
        );
        assert_eq!(clock.state(), ClockState::Failed);
        assert!(clock.poll(0.1).is_none());
    }

    #[test]
    fn play_without_asset_is_an_error() {
        let mut clock = AudioSyncClock::new(Box::new(SimulatedTransport::new()));
        assert!(clock.play().is_err());
    }

    /// Records `stop` calls; stays "open" until stopped.
    struct DeviceLike {
        open: Rc<Cell<bool>>,
        stops: Rc<Cell<u32>>,
        position: f64,
        duration: f64,
        events: Option<PlaybackEventSender>,
    }

    impl DeviceLike {
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

    impl PlaybackTransport for DeviceLike {
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
    fn natural_end_releases_transport_once() {
        let (transport, open, stops) = DeviceLike::new();
        let mut clock = AudioSyncClock::new(Box::new(transport));
        clock.load(AudioAsset::silent("utt", 1.0));
        clock.play().unwrap();
        assert!(open.get());

        assert!(clock.poll(0.5).is_none());
        assert_eq!(clock.poll(0.5), Some(ClockNotice::Ended));
        assert!(!open.get());
        assert_eq!(stops.get(), 1);

        clock.stop();
        drop(clock);
        assert_eq!(stops.get(), 1);
    }

    #[test]
    fn stop_while_playing_releases_transport() {
        let (transport, open, stops) = DeviceLike::new();
        let mut clock = AudioSyncClock::new(Box::new(transport));
        clock.load(AudioAsset::silent("utt", 3.0));
        clock.play().unwrap();
        clock.poll(0.5);
        clock.stop();
        assert!(!open.get());
        assert_eq!(stops.get(), 1);
        assert_eq!(clock.state(), ClockState::Ended);
    }

    #[test]
    fn reload_resets_clock() {
        let mut clock = clock_with(2.0);
        clock.play().unwrap();
        clock.poll(1.0);
        clock.load(AudioAsset::silent("next", 2.0));
        assert_eq!(clock.state(), ClockState::Idle);
        assert_eq!(clock.elapsed(), 0.0);
        assert_eq!(clock.asset_id(), Some("next"));
        clock.play().unwrap();
        assert!(clock.is_playing());
    }
}
