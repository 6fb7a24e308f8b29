use parking_lot::Mutex;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use super::host::AudioNode;

pub const DEFAULT_FFT_SIZE: usize = 2048;
pub const DEFAULT_MIN_DECIBELS: f32 = -100.0;
pub const DEFAULT_MAX_DECIBELS: f32 = -30.0;
pub const DEFAULT_SMOOTHING_TIME_CONSTANT: f32 = 0.8;
const MIN_FFT_SIZE: usize = 32;
const MAX_FFT_SIZE: usize = 32768;

/// Read side of an analysis point in an audio graph.
///
/// Implementors must be cheap to query from a tick: readers copy into
/// caller-owned buffers and never allocate per call.
pub trait AnalysisTap: Send + Sync {
    /// Transform size; the time-domain buffer has this many samples.
    fn fft_size(&self) -> usize;

    /// Number of magnitude bins, half the transform size.
    fn frequency_bin_count(&self) -> usize {
        self.fft_size() / 2
    }

    fn sample_rate(&self) -> f32;

    /// Magnitudes in decibels mapped onto 0..=255. Fills up to `out.len()` bins.
    fn byte_frequency_data(&self, out: &mut [u8]);

    /// Latest samples as `128 * (1 + x)`, clamped.
    fn byte_time_domain_data(&self, out: &mut [u8]);

    /// Latest samples in -1..1.
    fn float_time_domain_data(&self, out: &mut [f32]);
}

struct AnalyserState {
    ring: Vec<f32>,
    write_pos: usize,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
}

/// Windowed-FFT analyser fed from an audio thread and read from a tick.
///
/// Keeps the most recent `fft_size` samples. Frequency reads apply a Blackman
/// window, blend each bin's magnitude with the previous read using the
/// smoothing time constant, convert to decibels and scale the
/// `min_decibels..max_decibels` range onto bytes.
pub struct SpectrumAnalyser {
    sample_rate: f32,
    fft_size: usize,
    min_decibels: f32,
    max_decibels: f32,
    smoothing_time_constant: f32,
    state: Mutex<AnalyserState>,
}

impl SpectrumAnalyser {
    /// `fft_size` is rounded to a power of two within 32..=32768.
    pub fn new(sample_rate: f32, fft_size: usize) -> Self {
        let fft_size = fft_size.clamp(MIN_FFT_SIZE, MAX_FFT_SIZE).next_power_of_two();
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        Self {
            sample_rate,
            fft_size,
            min_decibels: DEFAULT_MIN_DECIBELS,
            max_decibels: DEFAULT_MAX_DECIBELS,
            smoothing_time_constant: DEFAULT_SMOOTHING_TIME_CONSTANT,
            state: Mutex::new(AnalyserState {
                ring: vec![0.0; fft_size],
                write_pos: 0,
                window: Self::blackman_window(fft_size),
                fft,
                scratch: vec![Complex::new(0.0, 0.0); fft_size],
                smoothed: vec![0.0; fft_size / 2],
            }),
        }
    }

    pub fn with_decibel_range(mut self, min_decibels: f32, max_decibels: f32) -> Self {
        if min_decibels < max_decibels {
            self.min_decibels = min_decibels;
            self.max_decibels = max_decibels;
        }
        self
    }

    pub fn with_smoothing_time_constant(mut self, constant: f32) -> Self {
        self.smoothing_time_constant = constant.clamp(0.0, 1.0);
        self
    }

    fn blackman_window(size: usize) -> Vec<f32> {
        let alpha = 0.16f32;
        let a0 = 0.5 * (1.0 - alpha);
        let a1 = 0.5;
        let a2 = 0.5 * alpha;
        (0..size)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / size as f32;
                a0 - a1 * phase.cos() + a2 * (2.0 * phase).cos()
            })
            .collect()
    }

    /// Appends mono samples, overwriting the oldest ones.
    pub fn push_samples(&self, samples: &[f32]) {
        let mut state = self.state.lock();
        let len = state.ring.len();
        // Only the tail can survive a write longer than the ring.
        let samples = &samples[samples.len().saturating_sub(len)..];
        for &sample in samples {
            let pos = state.write_pos;
            state.ring[pos] = sample;
            state.write_pos = (pos + 1) % len;
        }
    }

    /// Copies the ring in chronological order into `out` (oldest first).
    fn read_chronological(state: &AnalyserState, out: &mut [f32]) {
        let len = state.ring.len();
        let n = out.len().min(len);
        let start = (state.write_pos + len - n) % len;
        for (i, slot) in out.iter_mut().take(n).enumerate() {
            *slot = state.ring[(start + i) % len];
        }
    }

    fn decibels_to_byte(&self, decibels: f32) -> u8 {
        let range = self.max_decibels - self.min_decibels;
        let scaled = 255.0 / range * (decibels - self.min_decibels);
        if scaled.is_nan() {
            return 0;
        }
        scaled.floor().clamp(0.0, 255.0) as u8
    }
}

impl AnalysisTap for SpectrumAnalyser {
    fn fft_size(&self) -> usize {
        self.fft_size
    }

    fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn byte_frequency_data(&self, out: &mut [u8]) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let n = self.fft_size;

        let start = state.write_pos;
        for i in 0..n {
            let sample = state.ring[(start + i) % n];
            state.scratch[i] = Complex::new(sample * state.window[i], 0.0);
        }
        state.fft.process(&mut state.scratch);

        let tau = self.smoothing_time_constant;
        let bins = n / 2;
        for k in 0..bins {
            let magnitude = state.scratch[k].norm() / n as f32;
            let previous = state.smoothed[k];
            let value = tau * previous + (1.0 - tau) * magnitude;
            state.smoothed[k] = if value.is_finite() { value } else { 0.0 };
        }

        for (slot, &magnitude) in out.iter_mut().zip(state.smoothed.iter()) {
            *slot = self.decibels_to_byte(20.0 * magnitude.log10());
        }
    }

    fn byte_time_domain_data(&self, out: &mut [u8]) {
        let state = self.state.lock();
        let len = state.ring.len();
        let n = out.len().min(len);
        let start = (state.write_pos + len - n) % len;
        for (i, slot) in out.iter_mut().take(n).enumerate() {
            let sample = state.ring[(start + i) % len];
            *slot = (128.0 * (1.0 + sample)).floor().clamp(0.0, 255.0) as u8;
        }
    }

    fn float_time_domain_data(&self, out: &mut [f32]) {
        let state = self.state.lock();
        Self::read_chronological(&state, out);
    }
}

impl AudioNode for SpectrumAnalyser {
    fn node_kind(&self) -> &'static str {
        "AnalyserNode"
    }

    fn as_analyser(self: Arc<Self>) -> Option<Arc<dyn AnalysisTap>> {
        Some(self)
    }
}
