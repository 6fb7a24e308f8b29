use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::features::PitchClass;

/// Peaks within this fraction of the highest normalized-autocorrelation peak
/// qualify; the earliest one wins, which suppresses octave-down errors.
const KEY_MAXIMUM_CUTOFF: f32 = 0.9;
const MIN_SIGNAL_POWER: f32 = 1e-10;
const A4_HZ: f32 = 440.0;
const A4_MIDI: f32 = 69.0;
const MAX_OCTAVE: i32 = 8;

/// Acceptance window for detected pitches. Fixed for the lifetime of a source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchConfig {
    pub clarity_threshold: f32,
    pub min_frequency: f32,
    pub max_frequency: f32,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            clarity_threshold: 0.9,
            min_frequency: 20.0,
            max_frequency: 4000.0,
        }
    }
}

/// A pitch that passed the gate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedPitch {
    pub frequency: f32,
    pub clarity: f32,
    pub pitch: PitchClass,
    pub octave: i32,
}

/// Maps a frequency onto 12-TET with A4 = 440 Hz, scientific octave numbering.
pub fn frequency_to_note(frequency: f32) -> Option<(PitchClass, i32)> {
    if !(frequency.is_finite() && frequency > 0.0) {
        return None;
    }
    let midi = (A4_MIDI + 12.0 * (frequency / A4_HZ).log2()).round();
    if !midi.is_finite() {
        return None;
    }
    let midi = midi as i32;
    Some((PitchClass::from_midi(midi), midi.div_euclid(12) - 1))
}

/// Normalized-autocorrelation (McLeod-style) pitch estimator with a clarity gate.
///
/// The autocorrelation is computed through an FFT so large analysis windows stay
/// cheap. Buffers that cannot be analysed (too short, silent, non-finite) simply
/// produce no pitch.
pub struct PitchDetector {
    config: PitchConfig,
    fft_len: usize,
    forward: Option<Arc<dyn Fft<f32>>>,
    inverse: Option<Arc<dyn Fft<f32>>>,
    spectrum: Vec<Complex<f32>>,
    nsdf: Vec<f32>,
}

impl PitchDetector {
    pub fn new(config: PitchConfig) -> Self {
        Self {
            config,
            fft_len: 0,
            forward: None,
            inverse: None,
            spectrum: Vec::new(),
            nsdf: Vec::new(),
        }
    }

    pub fn config(&self) -> &PitchConfig {
        &self.config
    }

    /// Runs the estimator and the gate. `None` covers both "no periodicity" and
    /// "rejected by the gate"; neither is an error.
    pub fn detect(&mut self, samples: &[f32], sample_rate: f32) -> Option<DetectedPitch> {
        let (frequency, clarity) = self.estimate(samples, sample_rate)?;
        self.gate(frequency, clarity)
    }

    /// Applies the clarity threshold and the open frequency interval.
    pub fn gate(&self, frequency: f32, clarity: f32) -> Option<DetectedPitch> {
        let accepted = clarity > self.config.clarity_threshold
            && frequency > self.config.min_frequency
            && frequency < self.config.max_frequency;
        if !accepted {
            return None;
        }

        let (pitch, octave) = frequency_to_note(frequency)?;
        if !(0..=MAX_OCTAVE).contains(&octave) {
            return None;
        }

        Some(DetectedPitch {
            frequency,
            clarity,
            pitch,
            octave,
        })
    }

    /// Returns `(frequency_hz, clarity)` for the strongest periodicity, if any.
    pub fn estimate(&mut self, samples: &[f32], sample_rate: f32) -> Option<(f32, f32)> {
        let n = samples.len();
        if n < 4 || !(sample_rate > 0.0) || samples.iter().any(|s| !s.is_finite()) {
            return None;
        }

        let mean = samples.iter().sum::<f32>() / n as f32;
        let power: f32 = samples.iter().map(|&s| (s - mean) * (s - mean)).sum();
        if power < MIN_SIGNAL_POWER {
            return None;
        }

        self.autocorrelate(samples, mean);
        self.normalize(samples, mean);

        let tau = self.pick_key_maximum()?;
        let (refined_tau, clarity) = self.interpolate(tau);
        if !(refined_tau > 0.0) {
            return None;
        }

        let frequency = sample_rate / refined_tau;
        frequency
            .is_finite()
            .then_some((frequency, clarity.clamp(0.0, 1.0)))
    }

    fn ensure_plan(&mut self, fft_len: usize) {
        if self.fft_len == fft_len && self.forward.is_some() {
            return;
        }
        let mut planner = FftPlanner::new();
        self.forward = Some(planner.plan_fft_forward(fft_len));
        self.inverse = Some(planner.plan_fft_inverse(fft_len));
        self.spectrum.resize(fft_len, Complex::new(0.0, 0.0));
        self.fft_len = fft_len;
    }

    /// Leaves the raw autocorrelation r(tau) in `self.spectrum[tau].re`.
    fn autocorrelate(&mut self, samples: &[f32], mean: f32) {
        let n = samples.len();
        self.ensure_plan((2 * n).next_power_of_two());

        for (slot, &s) in self.spectrum.iter_mut().zip(samples.iter()) {
            *slot = Complex::new(s - mean, 0.0);
        }
        for slot in self.spectrum.iter_mut().skip(n) {
            *slot = Complex::new(0.0, 0.0);
        }

        if let (Some(forward), Some(inverse)) = (&self.forward, &self.inverse) {
            forward.process(&mut self.spectrum);
            for c in self.spectrum.iter_mut() {
                *c = Complex::new(c.norm_sqr(), 0.0);
            }
            inverse.process(&mut self.spectrum);
        }
    }

    /// nsdf(tau) = 2 r(tau) / m(tau), with m updated incrementally.
    fn normalize(&mut self, samples: &[f32], mean: f32) {
        let n = samples.len();
        let max_tau = n / 2;
        let scale = 1.0 / self.fft_len as f32;
        let x = |i: usize| samples[i] - mean;

        self.nsdf.clear();
        self.nsdf.reserve(max_tau);

        let mut m: f32 = 2.0 * (0..n).map(|i| x(i) * x(i)).sum::<f32>();
        for tau in 0..max_tau {
            if tau > 0 {
                let head = x(tau - 1);
                let tail = x(n - tau);
                m -= head * head + tail * tail;
            }
            let r = self.spectrum[tau].re * scale;
            let value = if m > MIN_SIGNAL_POWER { 2.0 * r / m } else { 0.0 };
            self.nsdf.push(value.clamp(-1.0, 1.0));
        }
    }

    /// First positive-lobe maximum within the cutoff of the global best lobe.
    fn pick_key_maximum(&self) -> Option<usize> {
        let nsdf = &self.nsdf;
        let mut maxima: Vec<usize> = Vec::new();

        // Skip the zero-lag lobe.
        let mut tau = 1;
        while tau < nsdf.len() && nsdf[tau] > 0.0 {
            tau += 1;
        }

        let mut current: Option<usize> = None;
        while tau < nsdf.len() {
            if nsdf[tau] > 0.0 {
                match current {
                    Some(best) if nsdf[best] >= nsdf[tau] => {}
                    _ => current = Some(tau),
                }
            } else if let Some(best) = current.take() {
                maxima.push(best);
            }
            tau += 1;
        }
        if let Some(best) = current {
            maxima.push(best);
        }

        let highest = maxima.iter().map(|&t| nsdf[t]).fold(f32::MIN, f32::max);
        if highest <= 0.0 {
            return None;
        }
        let cutoff = highest * KEY_MAXIMUM_CUTOFF;
        maxima.into_iter().find(|&t| nsdf[t] >= cutoff)
    }

    /// Parabolic interpolation around `tau`, returning the refined lag and peak.
    fn interpolate(&self, tau: usize) -> (f32, f32) {
        let nsdf = &self.nsdf;
        if tau == 0 || tau + 1 >= nsdf.len() {
            return (tau as f32, nsdf[tau]);
        }
        let (a, b, c) = (nsdf[tau - 1], nsdf[tau], nsdf[tau + 1]);
        let denominator = a - 2.0 * b + c;
        if denominator.abs() < f32::EPSILON {
            return (tau as f32, b);
        }
        let shift = 0.5 * (a - c) / denominator;
        let peak = b - 0.25 * (a - c) * shift;
        (tau as f32 + shift, peak)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::PI;

    fn sine(frequency: f32, sample_rate: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * frequency * i as f32 / sample_rate).sin() * 0.8)
            .collect()
    }

    fn noise(len: usize) -> Vec<f32> {
        let mut state: u32 = 0x9e37_79b9;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state as f32 / u32::MAX as f32) * 2.0 - 1.0
            })
            .collect()
    }

    #[test]
    fn detects_concert_a() {
        let mut detector = PitchDetector::new(PitchConfig::default());
        let detected = detector
            .detect(&sine(440.0, 44100.0, 2048), 44100.0)
            .expect("a clean sine should pass the gate");
        assert_eq!(detected.pitch, PitchClass::A);
        assert_eq!(detected.octave, 4);
        assert_relative_eq!(detected.frequency, 440.0, epsilon = 2.0);
        assert!(detected.clarity > 0.9);
    }

    #[test]
    fn detects_low_e() {
        let mut detector = PitchDetector::new(PitchConfig::default());
        let detected = detector.detect(&sine(82.41, 48000.0, 4096), 48000.0).unwrap();
        assert_eq!(detected.pitch, PitchClass::E);
        assert_eq!(detected.octave, 2);
    }

    #[test]
    fn gate_rejects_low_clarity_at_any_frequency() {
        let detector = PitchDetector::new(PitchConfig::default());
        for frequency in [30.0, 440.0, 1000.0, 3999.0] {
            assert!(detector.gate(frequency, 0.5).is_none());
            assert!(detector.gate(frequency, 0.9).is_none());
        }
        assert!(detector.gate(440.0, 0.95).is_some());
    }

    #[test]
    fn gate_interval_is_open() {
        let detector = PitchDetector::new(PitchConfig::default());
        assert!(detector.gate(20.0, 0.99).is_none());
        assert!(detector.gate(4000.0, 0.99).is_none());
        assert!(detector.gate(20.5, 0.99).is_some());
    }

    #[test]
    fn degenerate_buffers_yield_nothing() {
        let mut detector = PitchDetector::new(PitchConfig::default());
        assert!(detector.detect(&[], 44100.0).is_none());
        assert!(detector.detect(&[0.0; 2048], 44100.0).is_none());
        assert!(detector.detect(&[0.3; 2048], 44100.0).is_none());
        assert!(detector.detect(&[f32::NAN; 64], 44100.0).is_none());
        assert!(detector.detect(&sine(440.0, 44100.0, 2048), 0.0).is_none());
    }

    #[test]
    fn noise_does_not_pass_default_gate() {
        let mut detector = PitchDetector::new(PitchConfig::default());
        assert!(detector.detect(&noise(2048), 44100.0).is_none());
    }

    #[test]
    fn reuses_plan_across_window_sizes() {
        let mut detector = PitchDetector::new(PitchConfig::default());
        assert!(detector.detect(&sine(440.0, 44100.0, 1024), 44100.0).is_some());
        assert!(detector.detect(&sine(440.0, 44100.0, 4096), 44100.0).is_some());
        assert!(detector.detect(&sine(440.0, 44100.0, 1024), 44100.0).is_some());
    }

    #[test]
    fn note_mapping_follows_scientific_pitch() {
        assert_eq!(frequency_to_note(440.0), Some((PitchClass::A, 4)));
        assert_eq!(frequency_to_note(261.63), Some((PitchClass::C, 4)));
        assert_eq!(frequency_to_note(27.5), Some((PitchClass::A, 0)));
        assert_eq!(frequency_to_note(466.16), Some((PitchClass::ASharp, 4)));
        assert_eq!(frequency_to_note(0.0), None);
    }
}
