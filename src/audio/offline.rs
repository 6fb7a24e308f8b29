use std::sync::Arc;

use super::analyser::{AnalysisTap, SpectrumAnalyser};
use super::extractor::PerceptualExtractor;
use super::features::FeatureSnapshot;
use super::graph::AnalysisInput;
use super::pipeline::FeatureTicker;
use crate::config::AudioSourceOptions;

/// Runs the media pipeline over decoded audio as fast as it can be read,
/// ticking once per simulated display frame.
pub struct OfflineAnalyzer {
    input: AnalysisInput,
    ticker: FeatureTicker,
    snapshot: FeatureSnapshot,
    sample_rate: f32,
    block_len: usize,
    tick_seconds: f32,
    pending: Vec<f32>,
    frames: usize,
}

impl OfflineAnalyzer {
    pub fn new(sample_rate: u32, channels: u16, options: &AudioSourceOptions, frame_rate: f32) -> Self {
        let rate = sample_rate as f32;
        let analyser = Arc::new(SpectrumAnalyser::new(rate, options.media_fft_size));
        let extractor = PerceptualExtractor::new(rate, options.extractor_block_size);
        let ticker = FeatureTicker::new(
            Arc::clone(&analyser) as Arc<dyn AnalysisTap>,
            Some(extractor.output()),
            options.smoothing_factor,
            options.pitch_config(),
        );
        let frames_per_tick = (rate / frame_rate.max(1.0)).round().max(1.0) as usize;

        Self {
            input: AnalysisInput::new(channels, analyser, Some(extractor)),
            ticker,
            snapshot: FeatureSnapshot::default(),
            sample_rate: rate,
            block_len: frames_per_tick * channels.max(1) as usize,
            tick_seconds: frames_per_tick as f32 / rate,
            pending: Vec::new(),
            frames: 0,
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Seconds of audio consumed per tick.
    pub fn tick_interval(&self) -> f32 {
        self.tick_seconds
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Consumes interleaved samples, calling `on_frame` with the timestamp of
    /// the end of each tick. A trailing partial block is not ticked.
    pub fn run<I, F>(&mut self, samples: I, mut on_frame: F) -> usize
    where
        I: IntoIterator<Item = f32>,
        F: FnMut(f32, &FeatureSnapshot),
    {
        let start = self.frames;
        for sample in samples {
            self.pending.push(sample);
            if self.pending.len() == self.block_len {
                self.input.feed_interleaved(&self.pending);
                self.pending.clear();
                self.ticker.tick(&mut self.snapshot);
                self.frames += 1;
                on_frame(self.frames as f32 * self.tick_seconds, &self.snapshot);
            }
        }
        self.frames - start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn ticks_once_per_simulated_frame() {
        let options = AudioSourceOptions::default();
        let mut analyzer = OfflineAnalyzer::new(48000, 2, &options, 60.0);
        // 800 stereo frames per tick.
        let samples = vec![0.0f32; 800 * 2 * 5 + 10];
        let mut stamps = Vec::new();
        let ticks = analyzer.run(samples, |t, _| stamps.push(t));
        assert_eq!(ticks, 5);
        assert!((stamps[0] - 1.0 / 60.0).abs() < 1e-6);
        assert!((analyzer.tick_interval() - 1.0 / 60.0).abs() < 1e-6);
    }

    #[test]
    fn steady_tone_settles_on_its_note() {
        let options = AudioSourceOptions::default();
        let rate = 44100.0;
        let mut analyzer = OfflineAnalyzer::new(44100, 1, &options, 30.0);
        let tone = (0..44100).map(|i| (2.0 * PI * 440.0 * i as f32 / rate).sin() * 0.5);
        let mut last = None;
        analyzer.run(tone, |_, snapshot| last = snapshot.note_label());
        assert_eq!(last.as_deref(), Some("A4"));
    }
}
