//! Utterance playback to system speakers via cpal.

use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};
use tracing::{error, info};

use super::AudioAsset;
use super::transport::{PlaybackEvent, PlaybackEventSender, PlaybackTransport};
use crate::error::{AvatarError, Result};

/// Non-blocking playback through a cpal output stream.
///
/// The stream callback runs on the audio thread; it only advances the
/// buffer position and publishes `Ended` through the event channel.
pub struct CpalTransport {
    device: cpal::Device,
    stream: Option<cpal::Stream>,
    buffer: Option<Arc<Mutex<PlaybackBuffer>>>,
}

impl CpalTransport {
    /// Open the named output device, or the default one.
    ///
    /// # Errors
    ///
    /// Returns an error if no matching output device is available.
    pub fn new(output_device: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(name) = output_device {
            host.output_devices()
                .map_err(|e| AvatarError::Playback(format!("cannot enumerate devices: {e}")))?
                .find(|d| {
                    d.description()
                        .ok()
                        .map(|desc| desc.name() == name)
                        .unwrap_or(false)
                })
                .ok_or_else(|| {
                    AvatarError::Playback(format!("output device '{name}' not found"))
                })?
        } else {
            host.default_output_device()
                .ok_or_else(|| AvatarError::Playback("no default output device".into()))?
        };

        let device_name = device
            .description()
            .map(|d| d.name().to_owned())
            .unwrap_or_else(|_| "<unknown>".into());
        info!("using output device: {device_name}");

        Ok(Self {
            device,
            stream: None,
            buffer: None,
        })
    }

    /// List available output devices.
    ///
    /// # Errors
    ///
    /// Returns an error if devices cannot be enumerated.
    pub fn list_output_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| AvatarError::Playback(format!("cannot enumerate devices: {e}")))?;

        let mut names = Vec::new();
        for device in devices {
            if let Ok(desc) = device.description() {
                names.push(desc.name().to_owned());
            }
        }
        Ok(names)
    }
}

impl PlaybackTransport for CpalTransport {
    fn start(&mut self, asset: &AudioAsset, events: PlaybackEventSender) -> Result<()> {
        self.stop();

        let stream_config = StreamConfig {
            channels: 1,
            sample_rate: asset.sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        // Assets without audio data still play out their length as silence.
        let mut samples = asset.samples.clone();
        let frames = (asset.length_secs() * f64::from(asset.sample_rate)).round() as usize;
        if samples.len() < frames {
            samples.resize(frames, 0.0);
        }

        let buffer = Arc::new(Mutex::new(PlaybackBuffer {
            samples,
            sample_rate: asset.sample_rate,
            position: 0,
            finished: false,
        }));
        let buffer_clone = Arc::clone(&buffer);
        let done_tx = events.clone();

        let stream = self
            .device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    let mut buf = match buffer_clone.lock() {
                        Ok(b) => b,
                        Err(_) => return,
                    };

                    for sample in data.iter_mut() {
                        if buf.position < buf.samples.len() {
                            *sample = buf.samples[buf.position];
                            buf.position += 1;
                        } else {
                            *sample = 0.0;
                        }
                    }

                    if !buf.finished && buf.position >= buf.samples.len() {
                        buf.finished = true;
                        let _ = done_tx.send(PlaybackEvent::Ended);
                    }
                },
                move |err| {
                    error!("audio output stream error: {err}");
                    let _ = events.send(PlaybackEvent::Failed(err.to_string()));
                },
                None,
            )
            .map_err(|e| AvatarError::Playback(format!("failed to build output stream: {e}")))?;

        stream
            .play()
            .map_err(|e| AvatarError::Playback(format!("failed to start output stream: {e}")))?;

        self.stream = Some(stream);
        self.buffer = Some(buffer);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.pause();
        }
        self.buffer = None;
    }

    fn position_secs(&self) -> f64 {
        let Some(buffer) = &self.buffer else {
            return 0.0;
        };
        match buffer.lock() {
            Ok(buf) if buf.sample_rate > 0 => buf.position as f64 / f64::from(buf.sample_rate),
            _ => 0.0,
        }
    }
}

/// Shared buffer tracking playback progress.
struct PlaybackBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    position: usize,
    finished: bool,
}
