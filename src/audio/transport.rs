//! Playback transports.
//!
//! A transport owns the actual audio output. It reports progress through a
//! channel because real backends call back from their own threads; the
//! [`AudioSyncClock`](super::AudioSyncClock) drains that channel once per
//! frame.

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::debug;

use super::AudioAsset;
use crate::error::Result;

/// Notification published by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    Started,
    Ended,
    Failed(String),
}

pub type PlaybackEventSender = Sender<PlaybackEvent>;
pub type PlaybackEventReceiver = Receiver<PlaybackEvent>;

/// Fresh channel for one playback.
pub fn playback_channel() -> (PlaybackEventSender, PlaybackEventReceiver) {
    unbounded()
}

/// Something that can play an [`AudioAsset`].
pub trait PlaybackTransport {
    /// Begin playing `asset`. Progress is reported through `events`.
    ///
    /// # Errors
    ///
    /// Returns an error if playback cannot begin at all.
    fn start(&mut self, asset: &AudioAsset, events: PlaybackEventSender) -> Result<()>;

    /// Stop and detach. Must be safe to call when nothing is playing.
    fn stop(&mut self);

    /// Current position in seconds.
    fn position_secs(&self) -> f64;

    /// Frame hook for transports driven by the render loop.
    fn tick(&mut self, _dt: f64) {}
}

/// Transport whose position advances with frame time instead of a device.
///
/// Used for headless simulation and tests. Optionally fails at a given
/// position to emulate decode errors or blocked autoplay.
#[derive(Debug, Default)]
pub struct SimulatedTransport {
    position: f64,
    duration: f64,
    playing: bool,
    events: Option<PlaybackEventSender>,
    failure: Option<(f64, String)>,
}

impl SimulatedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail immediately after start.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self::failing_after(0.0, reason)
    }

    /// Fail once playback reaches `at_secs`.
    pub fn failing_after(at_secs: f64, reason: impl Into<String>) -> Self {
        Self {
            failure: Some((at_secs, reason.into())),
            ..Self::default()
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    fn publish(&self, event: PlaybackEvent) {
        if let Some(tx) = &self.events {
            // Receiver gone means the clock moved on.
            let _ = tx.send(event);
        }
    }

    fn check_failure(&mut self) -> bool {
        let reason = match &self.failure {
            Some((at, reason)) if self.position >= *at => reason.clone(),
            _ => return false,
        };
        self.playing = false;
        self.publish(PlaybackEvent::Failed(reason));
        self.events = None;
        true
    }
}

impl PlaybackTransport for SimulatedTransport {
    fn start(&mut self, asset: &AudioAsset, events: PlaybackEventSender) -> Result<()> {
        self.position = 0.0;
        self.duration = asset.length_secs();
        self.playing = true;
        self.events = Some(events);
        debug!(asset = %asset.id, duration = self.duration, "simulated playback started");
        self.publish(PlaybackEvent::Started);
        self.check_failure();
        Ok(())
    }

    fn stop(&mut self) {
        self.playing = false;
        self.events = None;
    }

    fn position_secs(&self) -> f64 {
        self.position
    }

    fn tick(&mut self, dt: f64) {
        if !self.playing || !dt.is_finite() || dt <= 0.0 {
            return;
        }
        self.position = (self.position + dt).min(self.duration);
        if self.check_failure() {
            return;
        }
        if self.position >= self.duration {
            self.playing = false;
            self.publish(PlaybackEvent::Ended);
            self.events = None;
        }
    }
}
