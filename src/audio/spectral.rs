//! Stateless spectral descriptors over byte-normalized magnitude buffers.
//!
//! Every function here is pure: the same buffer and sample rate always give the
//! same bits back. Sums run in `f64` so long buffers do not drift.

/// Width of one bin in Hz for a buffer of `len` magnitudes covering 0..nyquist.
pub fn bin_width(sample_rate: f32, len: usize) -> f32 {
    if len == 0 {
        return 0.0;
    }
    (sample_rate / 2.0) / len as f32
}

/// RMS of the magnitudes, normalized so a buffer of all 255 gives 1.0.
pub fn energy(spectrum: &[u8]) -> f32 {
    if spectrum.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = spectrum.iter().map(|&v| (v as f64) * (v as f64)).sum();
    ((sum_sq / spectrum.len() as f64).sqrt() / 255.0) as f32
}

/// Magnitude-weighted mean frequency in Hz; 0 for a silent buffer.
pub fn spectral_centroid(spectrum: &[u8], sample_rate: f32) -> f32 {
    let total: f64 = spectrum.iter().map(|&v| v as f64).sum();
    if total == 0.0 {
        return 0.0;
    }

    let weighted: f64 = spectrum
        .iter()
        .enumerate()
        .map(|(i, &v)| i as f64 * v as f64)
        .sum();

    (weighted / total * bin_width(sample_rate, spectrum.len()) as f64) as f32
}

/// Geometric over arithmetic mean of the magnitudes (Wiener entropy).
///
/// Magnitudes are floored at 1 inside the logarithm. Because of that floor a
/// sparse spectrum can push the raw ratio above 1, so the result is clamped.
pub fn spectral_flatness(spectrum: &[u8]) -> f32 {
    if spectrum.is_empty() {
        return 0.0;
    }
    let n = spectrum.len() as f64;
    let mean: f64 = spectrum.iter().map(|&v| v as f64).sum::<f64>() / n;
    if mean == 0.0 {
        return 0.0;
    }

    let log_mean: f64 = spectrum
        .iter()
        .map(|&v| (v.max(1) as f64).ln())
        .sum::<f64>()
        / n;

    (log_mean.exp() / mean).clamp(0.0, 1.0) as f32
}

/// Richness approximation used when no perceptual extractor is attached.
pub fn fallback_richness(energy: f32) -> f32 {
    (energy * 2.0).min(1.0)
}

/// Sharpness approximation used when no perceptual extractor is attached.
pub fn fallback_sharpness(centroid_hz: f32) -> f32 {
    (centroid_hz / 1000.0).min(1.0)
}

/// Strongest bin across the whole spectrum and its frequency in Hz.
///
/// Ties resolve to the lowest bin. An empty buffer reports bin 0 at 0 Hz.
pub fn dominant_peak(spectrum: &[u8], sample_rate: f32) -> (usize, f32) {
    let bin = peak_index(spectrum);
    (bin, bin as f32 * bin_width(sample_rate, spectrum.len()))
}

/// Index of the first maximum in `values`, 0 when empty.
pub(crate) fn peak_index(values: &[u8]) -> usize {
    let mut best = 0usize;
    let mut best_value = 0u8;
    for (i, &v) in values.iter().enumerate() {
        if v > best_value {
            best = i;
            best_value = v;
        }
    }
    best
}

/// Instantaneous descriptors computed from one frequency buffer.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpectralFrame {
    pub energy: f32,
    pub centroid: f32,
    pub flatness: f32,
    pub dominant_bin: usize,
    pub dominant_frequency: f32,
}

impl SpectralFrame {
    pub fn compute(spectrum: &[u8], sample_rate: f32) -> Self {
        let (dominant_bin, dominant_frequency) = dominant_peak(spectrum, sample_rate);
        Self {
            energy: energy(spectrum),
            centroid: spectral_centroid(spectrum, sample_rate),
            flatness: spectral_flatness(spectrum),
            dominant_bin,
            dominant_frequency,
        }
    }
}
