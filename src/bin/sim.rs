//! Headless driver for the facial animation engine.
//!
//! Runs the engine frame by frame for a fixed time and prints a JSON summary
//! on stdout. Logs go to stderr.

use clap::{Parser, Subcommand, ValueEnum};
use glam::Vec3;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use visage::animation::AnimationClip;
use visage::audio::{AudioAsset, PlaybackTransport, SimulatedTransport};
use visage::viseme::{
    PhonemeVisemeSupplier, PlaceholderParams, PlaceholderVisemeSupplier, VisemeSupplier,
};
use visage::{AvatarAssets, AvatarConfig, AvatarEvent, FacialAnimationEngine, Rig, Role};

/// Visage: drive a talking avatar face without a renderer.
#[derive(Parser)]
#[command(name = "visage-sim", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Simulate an utterance and report what the face did.
    Run(RunArgs),

    /// Print the default configuration as TOML.
    DefaultConfig,

    /// List audio output devices.
    #[cfg(feature = "cpal-playback")]
    Devices,
}

#[derive(clap::Args, Default)]
struct RunArgs {
    /// Rig description (JSON). Defaults to the sample half-body rig.
    #[arg(long)]
    rig: Option<PathBuf>,

    /// Animation clips (JSON array). Defaults to the sample idle and talk clips.
    #[arg(long)]
    clips: Option<PathBuf>,

    /// Utterance audio (WAV). Without it a silent asset of `--speech-secs` is used.
    #[arg(long)]
    wav: Option<PathBuf>,

    /// Length of the silent utterance when no WAV is given.
    #[arg(long, default_value_t = 3.0)]
    speech_secs: f64,

    /// ARPABET phonemes for the utterance (used by `--supplier phoneme`).
    #[arg(long)]
    phonemes: Option<String>,

    /// How viseme timelines are produced.
    #[arg(long, value_enum, default_value_t = SupplierKind::Placeholder)]
    supplier: SupplierKind,

    /// Simulated run length in seconds.
    #[arg(long, default_value_t = 10.0)]
    seconds: f64,

    /// Frame rate.
    #[arg(long, default_value_t = 60)]
    fps: u32,

    /// Seed for every random draw (overrides the config).
    #[arg(long)]
    seed: Option<u64>,

    /// Run without starting an utterance.
    #[arg(long)]
    no_speech: bool,

    /// Play through the speakers in real time.
    #[cfg(feature = "cpal-playback")]
    #[arg(long)]
    speakers: bool,
}

#[derive(Clone, Copy, Default, ValueEnum)]
enum SupplierKind {
    /// Overlapping random windows.
    #[default]
    Placeholder,
    /// Back-to-back random windows.
    Uniform,
    /// Rule-based mapping from `--phonemes`.
    Phoneme,
}

#[derive(Serialize)]
struct Summary {
    frames: u64,
    seconds: f64,
    viseme_frames: BTreeMap<String, u64>,
    blink_fraction: f64,
    blinks: u64,
    expression_changes: Vec<(String, f32)>,
    speech_events: Vec<AvatarEvent>,
    final_weights: BTreeMap<String, f32>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("visage=info")),
        )
        .init();

    let cli = Cli::parse();

    let config = if let Some(ref path) = cli.config {
        AvatarConfig::from_file(path)?
    } else {
        AvatarConfig::default()
    };

    match cli.command.unwrap_or(Command::Run(RunArgs::default_run())) {
        Command::Run(args) => run(config, args),
        Command::DefaultConfig => {
            print!("{}", toml::to_string_pretty(&AvatarConfig::default())?);
            Ok(())
        }
        #[cfg(feature = "cpal-playback")]
        Command::Devices => {
            for name in visage::audio::CpalTransport::list_output_devices()? {
                println!("{name}");
            }
            Ok(())
        }
    }
}

impl RunArgs {
    /// The values clap would fill in for a bare `run`.
    fn default_run() -> Self {
        Self {
            speech_secs: 3.0,
            seconds: 10.0,
            fps: 60,
            ..Self::default()
        }
    }
}

fn run(mut config: AvatarConfig, args: RunArgs) -> anyhow::Result<()> {
    if args.seed.is_some() {
        config.rng_seed = args.seed;
    }
    if args.fps == 0 {
        anyhow::bail!("--fps must be positive");
    }

    let rig = match &args.rig {
        Some(path) => Rig::from_json_file(path)?,
        None => Rig::sample_half_body(),
    };
    let clips = match &args.clips {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            serde_json::from_str::<Vec<AnimationClip>>(&text)?
        }
        None => AvatarAssets::sample().clips,
    };

    let mut asset = match &args.wav {
        Some(path) => AudioAsset::from_wav(path)?,
        None => AudioAsset::silent("utterance", args.speech_secs),
    };
    if let Some(phonemes) = &args.phonemes {
        asset = asset.with_phonemes(phonemes.clone());
    }

    let seed = config.rng_seed;
    let mut supplier: Box<dyn VisemeSupplier> = match args.supplier {
        SupplierKind::Phoneme => Box::new(PhonemeVisemeSupplier::default()),
        kind => {
            let params = match kind {
                SupplierKind::Uniform => PlaceholderParams::uniform(),
                _ => PlaceholderParams::conversational(),
            };
            match seed {
                Some(seed) => Box::new(PlaceholderVisemeSupplier::seeded(params, seed)),
                None => Box::new(PlaceholderVisemeSupplier::new(params)),
            }
        }
    };

    let (transport, realtime) = make_transport(&config, &args)?;
    let mut engine =
        FacialAnimationEngine::new(config, AvatarAssets::new(rig, clips), transport)?;

    if !args.no_speech {
        engine.record_turn(Role::User, "Say something.");
        engine.record_turn(Role::Assistant, format!("<{}>", asset.id));
        if let Err(e) = engine.start_utterance(asset, &mut *supplier) {
            tracing::warn!("utterance did not start: {e}");
        }
    }

    let dt = 1.0 / f64::from(args.fps);
    let frames = (args.seconds.max(0.0) * f64::from(args.fps)).round() as u64;
    info!(frames, fps = args.fps, "simulation started");

    let mut viseme_frames: BTreeMap<String, u64> = BTreeMap::new();
    let mut closed_frames = 0u64;
    let mut blinks = 0u64;
    let mut expression_changes = Vec::new();
    let mut speech_events = Vec::new();

    for frame in 0..frames {
        // Viewer slowly orbits the avatar at eye height.
        let angle = frame as f32 * dt as f32 * 0.3;
        let viewer = Vec3::new(angle.sin() * 2.0, 1.6, angle.cos() * 2.0);

        let report = engine.tick(dt, Some(viewer));
        if let Some(viseme) = report.active_viseme {
            *viseme_frames.entry(viseme.to_string()).or_default() += 1;
        }
        if engine.state().eyes_closed {
            closed_frames += 1;
        }
        for event in report.events {
            match event {
                AvatarEvent::Blink { closed: true } => blinks += 1,
                AvatarEvent::Blink { .. } | AvatarEvent::VisemeChanged { .. } => {}
                AvatarEvent::ExpressionChanged { name, intensity } => {
                    expression_changes.push((name, intensity));
                }
                other => speech_events.push(other),
            }
        }

        if realtime {
            std::thread::sleep(std::time::Duration::from_secs_f64(dt));
        }
    }

    let summary = Summary {
        frames,
        seconds: frames as f64 * dt,
        viseme_frames,
        blink_fraction: if frames == 0 {
            0.0
        } else {
            closed_frames as f64 / frames as f64
        },
        blinks,
        expression_changes,
        speech_events,
        final_weights: engine.registry().snapshot().into_iter().collect(),
    };
    engine.shutdown();

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Returns the transport and whether frames must be paced in real time.
#[cfg(feature = "cpal-playback")]
fn make_transport(
    config: &AvatarConfig,
    args: &RunArgs,
) -> anyhow::Result<(Box<dyn PlaybackTransport>, bool)> {
    if args.speakers {
        let transport =
            visage::audio::CpalTransport::new(config.playback.output_device.as_deref())?;
        return Ok((Box::new(transport), true));
    }
    Ok((Box::new(SimulatedTransport::new()), false))
}

/// Returns the transport and whether frames must be paced in real time.
#[cfg(not(feature = "cpal-playback"))]
fn make_transport(
    _config: &AvatarConfig,
    _args: &RunArgs,
) -> anyhow::Result<(Box<dyn PlaybackTransport>, bool)> {
    Ok((Box::new(SimulatedTransport::new()), false))
}
