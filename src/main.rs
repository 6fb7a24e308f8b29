use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use log::info;
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use sonosphere::audio::{AudioSource, FeatureSnapshot, MediaElement, SourceKind};
use sonosphere::legacy::LegacyBridge;
use sonosphere::render::{PresetManager, SceneUniforms, Visualizer};
use sonosphere::AudioSourceOptions;

#[derive(Parser)]
#[command(name = "sonosphere")]
#[command(about = "Live audio feature monitor driving the sonosphere scene mapping")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// JSON options file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// How long to run, in seconds
    #[arg(long, default_value = "10")]
    seconds: f32,

    /// Reports per second
    #[arg(long, default_value = "10")]
    report_rate: f32,

    /// Print one JSON object per report on stdout
    #[arg(long)]
    json: bool,

    /// Override the feature smoothing factor (0..1)
    #[arg(long)]
    smoothing: Option<f32>,

    /// Scene preset by name
    #[arg(long)]
    preset: Option<String>,

    /// Also republish features into the process-wide legacy mirror
    #[arg(long)]
    legacy: bool,

    /// List scene presets and exit
    #[arg(long)]
    list_presets: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Analyse the default microphone
    Mic,
    /// Play a file and analyse what is played
    Play {
        /// Audio file (WAV, MP3, OGG, FLAC, M4A)
        file: PathBuf,
    },
}

#[derive(Serialize)]
struct MonitorRecord<'a> {
    time: f32,
    source: SourceKind,
    note: Option<String>,
    #[serde(flatten)]
    features: &'a FeatureSnapshot,
    scale: f32,
    noise_amplitude: f32,
    color: [f32; 3],
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.list_presets {
        for (index, preset) in PresetManager::new().presets().iter().enumerate() {
            println!("{index}: {} {:?}", preset.name, preset.parameters);
        }
        return Ok(());
    }

    let mut options = match &args.config {
        Some(path) => AudioSourceOptions::load(path)?,
        None => AudioSourceOptions::default(),
    };
    if let Some(smoothing) = args.smoothing {
        options.smoothing_factor = smoothing;
    }

    let mut source = AudioSource::new(options);
    match &args.command {
        Some(Command::Mic) | None => source.init_microphone()?,
        Some(Command::Play { file }) => {
            let element = MediaElement::open(file)?;
            source.connect_audio_element(&element)?;
        }
    }

    let Some(kind) = source.kind() else {
        bail!("audio source did not initialize");
    };
    info!(
        "Monitoring {} at {:.0} Hz for {:.1}s",
        kind,
        source.sample_rate().unwrap_or_default(),
        args.seconds
    );

    let mut visualizer = Visualizer::new(1200, 800);
    if let Some(name) = &args.preset {
        if !visualizer.presets_mut().select_by_name(name) {
            bail!("unknown preset '{}', see --list-presets", name);
        }
    }
    visualizer.connect_audio_source(source.handle());
    visualizer.start();

    let legacy = args.legacy.then(|| LegacyBridge::new(source.handle()));

    let interval = Duration::from_secs_f32(1.0 / args.report_rate.max(0.1));
    let ticker = crossbeam_channel::tick(interval);
    let started = Instant::now();
    let mut last_frame = started;

    while started.elapsed().as_secs_f32() < args.seconds {
        if ticker.recv().is_err() {
            break;
        }
        let now = Instant::now();
        let uniforms = visualizer.frame((now - last_frame).as_secs_f32());
        last_frame = now;

        if let Some(bridge) = &legacy {
            bridge.publish();
        }

        let snapshot = source.feature_snapshot(true);
        report(&args, kind, started.elapsed().as_secs_f32(), &snapshot, &uniforms)?;
    }

    visualizer.destroy();
    source.destroy();
    info!("Done");
    Ok(())
}

fn report(
    args: &Args,
    kind: SourceKind,
    time: f32,
    snapshot: &FeatureSnapshot,
    uniforms: &SceneUniforms,
) -> Result<()> {
    if args.json {
        let record = MonitorRecord {
            time,
            source: kind,
            note: snapshot.note_label(),
            features: snapshot,
            scale: uniforms.scale,
            noise_amplitude: uniforms.noise_amplitude,
            color: [uniforms.color[0], uniforms.color[1], uniforms.color[2]],
        };
        println!("{}", serde_json::to_string(&record)?);
    } else {
        info!(
            "t={:5.1}s energy={:.3} warmth={:6.0}Hz rough={:.2} rich={:.2} sharp={:.2} bass_hue={:3.0} note={}",
            time,
            snapshot.energy,
            snapshot.warmth,
            snapshot.roughness,
            snapshot.richness,
            snapshot.sharpness,
            snapshot.bass_frequency,
            snapshot.note_label().unwrap_or_else(|| "-".to_string())
        );
    }
    Ok(())
}
