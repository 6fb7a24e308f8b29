use std::sync::Arc;

use super::analyser::AnalysisTap;
use super::bass;
use super::extractor::ExtractorOutput;
use super::features::FeatureSnapshot;
use super::pitch::{PitchConfig, PitchDetector};
use super::smoothing::{SmoothedFeatures, TemporalSmoother};
use super::spectral::{self, SpectralFrame};

/// One tick's worth of work: read the tap, derive features, publish them.
///
/// Owned by whichever driver is active, so there is exactly one writer per
/// snapshot. Scratch buffers live here and are only resized when the tap's
/// resolution changes.
pub struct FeatureTicker {
    tap: Arc<dyn AnalysisTap>,
    extractor: Option<Arc<ExtractorOutput>>,
    smoother: TemporalSmoother,
    pitch: PitchDetector,
    samples: Vec<f32>,
    ticks: u64,
}

impl FeatureTicker {
    pub fn new(
        tap: Arc<dyn AnalysisTap>,
        extractor: Option<Arc<ExtractorOutput>>,
        smoothing_factor: f32,
        pitch: PitchConfig,
    ) -> Self {
        Self {
            tap,
            extractor,
            smoother: TemporalSmoother::new(smoothing_factor),
            pitch: PitchDetector::new(pitch),
            samples: Vec::new(),
            ticks: 0,
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn smoothing_factor(&self) -> f32 {
        self.smoother.factor()
    }

    pub fn set_smoothing_factor(&mut self, factor: f32) {
        self.smoother.set_factor(factor);
    }

    pub fn tick(&mut self, snapshot: &mut FeatureSnapshot) {
        let sample_rate = self.tap.sample_rate();
        let bins = self.tap.frequency_bin_count();
        let window = self.tap.fft_size();

        snapshot.ensure_buffer_lengths(bins, window);
        if self.samples.len() != window {
            self.samples.resize(window, 0.0);
        }

        self.tap.byte_frequency_data(&mut snapshot.frequency_buffer);
        self.tap.byte_time_domain_data(&mut snapshot.time_domain_buffer);
        self.tap.float_time_domain_data(&mut self.samples);

        let frame = SpectralFrame::compute(&snapshot.frequency_buffer, sample_rate);
        let perceptual = self
            .extractor
            .as_ref()
            .filter(|output| output.is_running())
            .and_then(|output| output.latest());

        let (richness, sharpness, kurtosis) = match perceptual {
            Some(features) => (features.spread, features.sharpness, features.kurtosis),
            None => (
                spectral::fallback_richness(frame.energy),
                spectral::fallback_sharpness(frame.centroid),
                0.0,
            ),
        };

        let smoothed = self.smoother.update(SmoothedFeatures {
            energy: frame.energy,
            warmth: frame.centroid,
            richness,
            sharpness,
        });

        snapshot.energy = smoothed.energy;
        snapshot.warmth = smoothed.warmth;
        snapshot.richness = smoothed.richness;
        snapshot.sharpness = smoothed.sharpness;
        snapshot.roughness = frame.flatness;
        snapshot.kurtosis = kurtosis;
        snapshot.dominant_bin = frame.dominant_bin;
        snapshot.dominant_frequency = frame.dominant_frequency;

        let peak = bass::locate(&snapshot.frequency_buffer, sample_rate);
        snapshot.bass_frequency = peak.hue;
        snapshot.bass_energy = peak.energy;

        let detected = self.pitch.detect(&self.samples, sample_rate);
        snapshot.pitch = detected.map(|p| p.pitch);
        snapshot.octave = detected.map(|p| p.octave);

        self.ticks += 1;
        if self.ticks % 600 == 0 {
            log::debug!(
                "tick {}: energy={:.3} warmth={:.0}Hz roughness={:.3} bass_hue={:.0} note={:?}",
                self.ticks,
                snapshot.energy,
                snapshot.warmth,
                snapshot.roughness,
                snapshot.bass_frequency,
                snapshot.note_label()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::analyser::SpectrumAnalyser;
    use crate::audio::extractor::PerceptualExtractor;
    use crate::audio::features::PitchClass;
    use approx::assert_relative_eq;
    use std::f32::consts::PI;

    /// Tap that always returns the same frequency buffer.
    struct FixedTap {
        spectrum: Vec<u8>,
        sample_rate: f32,
    }

    impl AnalysisTap for FixedTap {
        fn fft_size(&self) -> usize {
            self.spectrum.len() * 2
        }
        fn sample_rate(&self) -> f32 {
            self.sample_rate
        }
        fn byte_frequency_data(&self, out: &mut [u8]) {
            out.copy_from_slice(&self.spectrum);
        }
        fn byte_time_domain_data(&self, out: &mut [u8]) {
            out.fill(128);
        }
        fn float_time_domain_data(&self, out: &mut [f32]) {
            out.fill(0.0);
        }
    }

    fn sine(frequency: f32, sample_rate: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * frequency * i as f32 / sample_rate).sin() * 0.6)
            .collect()
    }

    #[test]
    fn fallback_path_fills_snapshot() {
        let k = 200;
        let mut spectrum = vec![0u8; 1024];
        spectrum[k] = 255;
        let tap = Arc::new(FixedTap { spectrum, sample_rate: 44100.0 });
        let mut ticker = FeatureTicker::new(tap, None, 0.0, PitchConfig::default());
        let mut snapshot = FeatureSnapshot::default();

        ticker.tick(&mut snapshot);

        assert_eq!(snapshot.frequency_buffer.len(), 1024);
        assert_eq!(snapshot.time_domain_buffer.len(), 2048);
        assert_eq!(snapshot.dominant_bin, k);
        assert_relative_eq!(snapshot.dominant_frequency, k as f32 * 22050.0 / 1024.0);
        assert_relative_eq!(snapshot.richness, (snapshot.energy * 2.0).min(1.0));
        assert_eq!(snapshot.sharpness, 1.0);
        assert_eq!(snapshot.kurtosis, 0.0);
        assert_eq!(snapshot.pitch, None);
        assert_eq!(snapshot.octave, None);
    }

    #[test]
    fn bass_fields_are_not_smoothed() {
        // 44100 / 2 / 1024 ≈ 21.5 Hz per bin: bins 1..=5 are in the bass band.
        let mut spectrum = vec![0u8; 1024];
        spectrum[3] = 255;
        let tap = Arc::new(FixedTap { spectrum, sample_rate: 44100.0 });
        let mut ticker = FeatureTicker::new(tap, None, 0.95, PitchConfig::default());
        let mut snapshot = FeatureSnapshot::default();

        ticker.tick(&mut snapshot);
        assert_eq!(snapshot.bass_energy, 1.0);
        assert!(snapshot.energy < 0.01, "energy is smoothed, bass is not");
    }

    #[test]
    fn buffers_are_not_reallocated_between_ticks() {
        let tap = Arc::new(FixedTap { spectrum: vec![10u8; 512], sample_rate: 48000.0 });
        let mut ticker = FeatureTicker::new(tap, None, 0.8, PitchConfig::default());
        let mut snapshot = FeatureSnapshot::default();

        ticker.tick(&mut snapshot);
        let freq_ptr = snapshot.frequency_buffer.as_ptr();
        let time_ptr = snapshot.time_domain_buffer.as_ptr();
        ticker.tick(&mut snapshot);
        assert_eq!(snapshot.frequency_buffer.as_ptr(), freq_ptr);
        assert_eq!(snapshot.time_domain_buffer.as_ptr(), time_ptr);
        assert_eq!(ticker.ticks(), 2);
    }

    #[test]
    fn analyser_sine_yields_pitch_and_perceptual_features() {
        let sample_rate = 44100.0;
        let analyser = Arc::new(SpectrumAnalyser::new(sample_rate, 2048));
        let mut extractor = PerceptualExtractor::new(sample_rate, 512);
        let block = sine(440.0, sample_rate, 2048);
        analyser.push_samples(&block);
        extractor.process(&block);

        let mut ticker = FeatureTicker::new(
            analyser,
            Some(extractor.output()),
            0.0,
            PitchConfig::default(),
        );
        let mut snapshot = FeatureSnapshot::default();
        ticker.tick(&mut snapshot);

        assert_eq!(snapshot.pitch, Some(PitchClass::A));
        assert_eq!(snapshot.octave, Some(4));
        assert!(snapshot.energy > 0.0);
        assert!(snapshot.warmth > 0.0);
        let features = extractor.output().latest().unwrap();
        assert_relative_eq!(snapshot.richness, features.spread);
        assert_relative_eq!(snapshot.kurtosis, features.kurtosis);
    }

    #[test]
    fn stopped_extractor_falls_back() {
        let sample_rate = 44100.0;
        let analyser = Arc::new(SpectrumAnalyser::new(sample_rate, 1024));
        let mut extractor = PerceptualExtractor::new(sample_rate, 512);
        let block = sine(1000.0, sample_rate, 1024);
        analyser.push_samples(&block);
        extractor.process(&block);
        let output = extractor.output();
        output.stop();

        let mut ticker = FeatureTicker::new(analyser, Some(output), 0.0, PitchConfig::default());
        let mut snapshot = FeatureSnapshot::default();
        ticker.tick(&mut snapshot);
        assert_eq!(snapshot.kurtosis, 0.0);
        assert_relative_eq!(snapshot.richness, (snapshot.energy * 2.0).min(1.0));
    }
}
