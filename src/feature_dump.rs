use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use rodio::{Decoder, Source};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::PathBuf;

use sonosphere::audio::{FeatureSnapshot, OfflineAnalyzer};
use sonosphere::AudioSourceOptions;

#[derive(Parser)]
#[command(name = "feature-dump")]
#[command(about = "Offline feature analysis - runs the media pipeline over a file and writes a JSON report")]
struct Args {
    /// Audio file to analyze (WAV, MP3, OGG, FLAC, M4A)
    audio_file: PathBuf,

    /// Output JSON file path
    #[arg(long, short, default_value = "features.json")]
    output: PathBuf,

    /// Include per-frame records (large, useful for tuning presets)
    #[arg(long)]
    frame_by_frame: bool,

    /// Simulated display frame rate (defaults to the options' refresh rate)
    #[arg(long)]
    frame_rate: Option<f32>,

    /// JSON options file
    #[arg(long, short)]
    config: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct FeatureStats {
    min: f32,
    max: f32,
    mean: f32,
    median: f32,
    std_dev: f32,
    samples: usize,
}

#[derive(Debug, Serialize)]
struct FrameRecord {
    timestamp: f32,
    note: Option<String>,
    #[serde(flatten)]
    features: FeatureSnapshot,
}

#[derive(Debug, Serialize)]
struct FileInfo {
    filename: String,
    duration_seconds: f32,
    sample_rate: u32,
    channels: u16,
    total_frames: usize,
}

#[derive(Debug, Serialize)]
struct Report {
    file_info: FileInfo,
    options: AudioSourceOptions,
    frame_rate: f32,
    feature_stats: BTreeMap<String, FeatureStats>,
    /// How often each note passed the clarity gate.
    note_histogram: BTreeMap<String, usize>,
    voiced_ratio: f32,
    frames: Option<Vec<FrameRecord>>,
}

#[derive(Default)]
struct Collector {
    series: BTreeMap<&'static str, Vec<f32>>,
    notes: BTreeMap<String, usize>,
    voiced: usize,
    frames: Vec<FrameRecord>,
}

impl Collector {
    fn add(&mut self, name: &'static str, value: f32) {
        self.series.entry(name).or_default().push(value);
    }

    fn observe(&mut self, timestamp: f32, snapshot: &FeatureSnapshot, keep_frame: bool) {
        self.add("energy", snapshot.energy);
        self.add("roughness", snapshot.roughness);
        self.add("warmth", snapshot.warmth);
        self.add("richness", snapshot.richness);
        self.add("sharpness", snapshot.sharpness);
        self.add("kurtosis", snapshot.kurtosis);
        self.add("dominant_frequency", snapshot.dominant_frequency);
        self.add("bass_frequency", snapshot.bass_frequency);
        self.add("bass_energy", snapshot.bass_energy);

        let note = snapshot.note_label();
        if let Some(label) = &note {
            *self.notes.entry(label.clone()).or_default() += 1;
            self.voiced += 1;
        }
        if keep_frame {
            let mut features = snapshot.clone();
            features.frequency_buffer = Vec::new();
            features.time_domain_buffer = Vec::new();
            self.frames.push(FrameRecord { timestamp, note, features });
        }
    }
}

fn calculate_stats(data: &[f32]) -> FeatureStats {
    if data.is_empty() {
        return FeatureStats { min: 0.0, max: 0.0, mean: 0.0, median: 0.0, std_dev: 0.0, samples: 0 };
    }

    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mean = data.iter().sum::<f32>() / data.len() as f32;
    let variance = data.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / data.len() as f32;

    FeatureStats {
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        mean,
        median: sorted[sorted.len() / 2],
        std_dev: variance.sqrt(),
        samples: data.len(),
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let options = match &args.config {
        Some(path) => AudioSourceOptions::load(path)?,
        None => AudioSourceOptions::default(),
    };
    let frame_rate = args.frame_rate.unwrap_or(options.refresh_rate_hz);

    info!("File: {}", args.audio_file.display());
    info!("Output: {}", args.output.display());
    info!("Simulated frame rate: {} Hz", frame_rate);

    let file = File::open(&args.audio_file)
        .with_context(|| format!("cannot open {}", args.audio_file.display()))?;
    let decoder = Decoder::new(BufReader::new(file))
        .with_context(|| format!("cannot decode {}", args.audio_file.display()))?;
    let sample_rate = decoder.sample_rate();
    let channels = decoder.channels();

    let mut analyzer = OfflineAnalyzer::new(sample_rate, channels, &options, frame_rate);
    let mut collector = Collector::default();
    let keep_frames = args.frame_by_frame;

    let frames = analyzer.run(decoder.convert_samples::<f32>(), |timestamp, snapshot| {
        collector.observe(timestamp, snapshot, keep_frames);
        if collector.series.get("energy").map_or(0, Vec::len) % 1000 == 0 {
            info!("Processed {:.1}s", timestamp);
        }
    });
    let duration = frames as f32 * analyzer.tick_interval();
    info!("Analysis complete. {} frames ({:.2}s)", frames, duration);

    let feature_stats = collector
        .series
        .iter()
        .map(|(name, data)| (name.to_string(), calculate_stats(data)))
        .collect();
    let voiced_ratio = if frames > 0 {
        collector.voiced as f32 / frames as f32
    } else {
        0.0
    };

    let report = Report {
        file_info: FileInfo {
            filename: args.audio_file.display().to_string(),
            duration_seconds: duration,
            sample_rate,
            channels,
            total_frames: frames,
        },
        options,
        frame_rate,
        feature_stats,
        note_histogram: collector.notes,
        voiced_ratio,
        frames: keep_frames.then_some(collector.frames),
    };

    let json = serde_json::to_string_pretty(&report)?;
    let mut out = File::create(&args.output)
        .with_context(|| format!("cannot create {}", args.output.display()))?;
    out.write_all(json.as_bytes())?;

    info!("Summary:");
    info!("  Duration: {:.2}s", report.file_info.duration_seconds);
    info!("  Voiced frames: {:.0}%", report.voiced_ratio * 100.0);
    if let Some((note, count)) = report.note_histogram.iter().max_by_key(|(_, c)| **c) {
        info!("  Most frequent note: {} ({} frames)", note, count);
    }
    Ok(())
}
