use parking_lot::Mutex;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const DEFAULT_BLOCK_SIZE: usize = 512;
const BARK_BANDS: usize = 24;
const SPECIFIC_LOUDNESS_EXPONENT: f32 = 0.23;

/// Perceptual descriptors from one extractor block.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PerceptualFeatures {
    /// Perceptual spread, 0..1. Published as `richness`.
    pub spread: f32,
    /// Bark-weighted sharpness, 0..1.
    pub sharpness: f32,
    /// Kurtosis of the amplitude spectrum.
    pub kurtosis: f32,
    /// Sum of the specific loudness over all bands.
    pub loudness: f32,
}

/// Shared result slot between the audio thread and the tick.
#[derive(Debug)]
pub struct ExtractorOutput {
    latest: Mutex<Option<PerceptualFeatures>>,
    running: AtomicBool,
}

impl ExtractorOutput {
    fn new() -> Self {
        Self {
            latest: Mutex::new(None),
            running: AtomicBool::new(true),
        }
    }

    pub fn latest(&self) -> Option<PerceptualFeatures> {
        *self.latest.lock()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stops publishing. The last block's result is discarded so the tick falls
    /// back to the cheap approximations.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        *self.latest.lock() = None;
    }
}

/// Block-cadence extractor for perceptual spread, sharpness and spectral kurtosis.
///
/// Runs wherever audio blocks arrive (capture callback or playback tap), so its
/// cadence is the audio block rate rather than the tick rate.
pub struct PerceptualExtractor {
    sample_rate: f32,
    block_size: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    pending: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    amplitudes: Vec<f32>,
    band_edges: Vec<usize>,
    output: Arc<ExtractorOutput>,
}

impl PerceptualExtractor {
    pub fn new(sample_rate: f32, block_size: usize) -> Self {
        let block_size = block_size.max(32).next_power_of_two();
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(block_size);

        Self {
            sample_rate,
            block_size,
            fft,
            window: Self::hann_window(block_size),
            pending: Vec::with_capacity(block_size),
            buffer: vec![Complex::new(0.0, 0.0); block_size],
            amplitudes: vec![0.0; block_size / 2],
            band_edges: Self::bark_band_edges(sample_rate, block_size / 2),
            output: Arc::new(ExtractorOutput::new()),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn output(&self) -> Arc<ExtractorOutput> {
        Arc::clone(&self.output)
    }

    fn hann_window(size: usize) -> Vec<f32> {
        (0..size)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32;
                0.5 * (1.0 - phase.cos())
            })
            .collect()
    }

    fn bark(frequency: f32) -> f32 {
        13.0 * (frequency / 1315.8).atan() + 3.5 * (frequency / 7518.0).powi(2).atan()
    }

    /// First bin of each Bark band plus a terminating edge at `bins`.
    fn bark_band_edges(sample_rate: f32, bins: usize) -> Vec<usize> {
        let bin_width = sample_rate / (2.0 * bins as f32);
        let mut edges = vec![0usize; BARK_BANDS + 1];
        let mut band = 1;
        for bin in 0..bins {
            while band < BARK_BANDS && Self::bark(bin as f32 * bin_width) >= band as f32 {
                edges[band] = bin;
                band += 1;
            }
        }
        for edge in edges.iter_mut().skip(band) {
            *edge = bins;
        }
        edges[BARK_BANDS] = bins;
        edges
    }

    /// Accumulates mono samples and analyses every complete block.
    pub fn process(&mut self, samples: &[f32]) {
        if !self.output.is_running() {
            return;
        }
        let mut rest = samples;
        while !rest.is_empty() {
            let take = (self.block_size - self.pending.len()).min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];

            if self.pending.len() == self.block_size {
                let block = std::mem::take(&mut self.pending);
                let features = self.analyze_block(&block);
                self.pending = block;
                self.pending.clear();
                *self.output.latest.lock() = Some(features);
            }
        }
    }

    /// Analyses exactly one block (shorter input is zero-padded).
    pub fn analyze_block(&mut self, block: &[f32]) -> PerceptualFeatures {
        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let sample = block.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(sample * self.window[i], 0.0);
        }
        self.fft.process(&mut self.buffer);

        for (amplitude, c) in self.amplitudes.iter_mut().zip(self.buffer.iter()) {
            *amplitude = c.norm();
        }

        let specific = self.specific_loudness();
        let loudness: f32 = specific.iter().sum();

        PerceptualFeatures {
            spread: Self::perceptual_spread(&specific, loudness),
            sharpness: Self::perceptual_sharpness(&specific, loudness),
            kurtosis: Self::spectral_kurtosis(&self.amplitudes),
            loudness,
        }
    }

    fn specific_loudness(&self) -> [f32; BARK_BANDS] {
        let mut specific = [0.0f32; BARK_BANDS];
        for (band, value) in specific.iter_mut().enumerate() {
            let start = self.band_edges[band];
            let end = self.band_edges[band + 1].max(start);
            let sum: f32 = self.amplitudes[start..end].iter().sum();
            *value = sum.powf(SPECIFIC_LOUDNESS_EXPONENT);
        }
        specific
    }

    fn perceptual_spread(specific: &[f32], total: f32) -> f32 {
        if total <= 0.0 {
            return 0.0;
        }
        let peak = specific.iter().copied().fold(0.0f32, f32::max);
        ((total - peak) / total).powi(2).clamp(0.0, 1.0)
    }

    /// Zwicker weighting: flat up to band 15, exponential above. Normalized by the
    /// largest possible weighted band index so the result stays in 0..1.
    fn perceptual_sharpness(specific: &[f32], total: f32) -> f32 {
        if total <= 0.0 {
            return 0.0;
        }
        let weight = |band: usize| {
            let z = (band + 1) as f32;
            if band < 15 {
                1.0
            } else {
                0.066 * (0.171 * z).exp()
            }
        };
        let weighted: f32 = specific
            .iter()
            .enumerate()
            .map(|(band, &n)| n * (band + 1) as f32 * weight(band))
            .sum();
        let ceiling = BARK_BANDS as f32 * weight(BARK_BANDS - 1);
        (weighted / (total * ceiling)).clamp(0.0, 1.0)
    }

    fn spectral_kurtosis(amplitudes: &[f32]) -> f32 {
        let total: f64 = amplitudes.iter().map(|&a| a as f64).sum();
        if total <= 0.0 {
            return 0.0;
        }
        let moment = |order: i32| -> f64 {
            amplitudes
                .iter()
                .enumerate()
                .map(|(k, &a)| (k as f64).powi(order) * a as f64)
                .sum::<f64>()
                / total
        };
        let (mu1, mu2, mu3, mu4) = (moment(1), moment(2), moment(3), moment(4));
        let variance = mu2 - mu1 * mu1;
        if variance <= f64::EPSILON {
            return 0.0;
        }
        let central4 = mu4 - 4.0 * mu1 * mu3 + 6.0 * mu1 * mu1 * mu2 - 3.0 * mu1.powi(4);
        (central4 / (variance * variance)) as f32
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }
}
