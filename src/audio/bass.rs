use super::spectral::{bin_width, peak_index};

pub const BASS_LOW_HZ: f32 = 20.0;
pub const BASS_HIGH_HZ: f32 = 120.0;
pub const HUE_RANGE: f32 = 360.0;

/// Peak of the kick/sub band, mapped for colour.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BassPeak {
    /// Winning bin in the full buffer.
    pub bin: usize,
    /// Frequency of that bin in Hz.
    pub frequency: f32,
    /// Frequency mapped linearly from 20..120 Hz onto 0..360.
    pub hue: f32,
    /// Winning magnitude over 255.
    pub energy: f32,
}

/// Maps a bass frequency onto the hue wheel, clamping outside 20..120 Hz.
pub fn frequency_to_hue(frequency: f32) -> f32 {
    let t = (frequency - BASS_LOW_HZ) / (BASS_HIGH_HZ - BASS_LOW_HZ);
    (t * HUE_RANGE).clamp(0.0, HUE_RANGE)
}

/// Scans the inclusive 20..120 Hz bin range for the strongest magnitude.
///
/// Ties go to the lowest bin. The result reflects only the current buffer: callers
/// must not smooth it, beat-synchronised colour changes depend on that.
pub fn locate(spectrum: &[u8], sample_rate: f32) -> BassPeak {
    let width = bin_width(sample_rate, spectrum.len());
    if width <= 0.0 {
        return BassPeak::default();
    }

    let first = (BASS_LOW_HZ / width).ceil() as usize;
    let last = ((BASS_HIGH_HZ / width).floor() as usize).min(spectrum.len().saturating_sub(1));
    if first > last || first >= spectrum.len() {
        return BassPeak::default();
    }

    let band = &spectrum[first..=last];
    let offset = peak_index(band);
    let magnitude = band[offset];
    if magnitude == 0 {
        return BassPeak::default();
    }

    let bin = first + offset;
    let frequency = bin as f32 * width;
    BassPeak {
        bin,
        frequency,
        hue: frequency_to_hue(frequency),
        energy: magnitude as f32 / 255.0,
    }
}
