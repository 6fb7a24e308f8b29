use serde::{Deserialize, Serialize};
use std::fmt;

/// The twelve pitch classes of equal temperament, sharps only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PitchClass {
    C,
    #[serde(rename = "C#")]
    CSharp,
    D,
    #[serde(rename = "D#")]
    DSharp,
    E,
    F,
    #[serde(rename = "F#")]
    FSharp,
    G,
    #[serde(rename = "G#")]
    GSharp,
    A,
    #[serde(rename = "A#")]
    ASharp,
    B,
}

impl PitchClass {
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::CSharp,
        PitchClass::D,
        PitchClass::DSharp,
        PitchClass::E,
        PitchClass::F,
        PitchClass::FSharp,
        PitchClass::G,
        PitchClass::GSharp,
        PitchClass::A,
        PitchClass::ASharp,
        PitchClass::B,
    ];

    /// Pitch class of a MIDI note number (60 = C4).
    pub fn from_midi(midi: i32) -> Self {
        Self::ALL[midi.rem_euclid(12) as usize]
    }

    pub fn name(self) -> &'static str {
        match self {
            PitchClass::C => "C",
            PitchClass::CSharp => "C#",
            PitchClass::D => "D",
            PitchClass::DSharp => "D#",
            PitchClass::E => "E",
            PitchClass::F => "F",
            PitchClass::FSharp => "F#",
            PitchClass::G => "G",
            PitchClass::GSharp => "G#",
            PitchClass::A => "A",
            PitchClass::ASharp => "A#",
            PitchClass::B => "B",
        }
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Latest perceptual features of one [`AudioSource`](super::AudioSource).
///
/// A single instance is overwritten in place on every tick; it is not a history.
/// The raw buffers are kept alongside the scalars so the rendering layer can draw
/// spectra/waveforms without a second read of the analysis tap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSnapshot {
    /// Smoothed loudness proxy.
    pub energy: f32,
    /// Instantaneous spectral flatness, 0..1.
    pub roughness: f32,
    /// Smoothed spectral centroid in Hz.
    pub warmth: f32,
    /// Smoothed perceptual spread, 0..1.
    pub richness: f32,
    /// Smoothed perceptual sharpness, 0..1.
    pub sharpness: f32,
    /// Instantaneous spectral kurtosis; stays 0 without the perceptual extractor.
    pub kurtosis: f32,

    pub pitch: Option<PitchClass>,
    pub octave: Option<i32>,

    /// Full-spectrum peak (informational).
    pub dominant_frequency: f32,
    pub dominant_bin: usize,

    /// Hue 0..360 of the strongest 20-120 Hz bin. Never smoothed.
    pub bass_frequency: f32,
    /// Magnitude 0..1 of that bin. Never smoothed.
    pub bass_energy: f32,

    #[serde(skip)]
    pub frequency_buffer: Vec<u8>,
    #[serde(skip)]
    pub time_domain_buffer: Vec<u8>,
}

impl Default for FeatureSnapshot {
    fn default() -> Self {
        Self {
            energy: 0.0,
            roughness: 0.0,
            warmth: 0.0,
            richness: 0.0,
            sharpness: 0.0,
            kurtosis: 0.0,
            pitch: None,
            octave: None,
            dominant_frequency: 0.0,
            dominant_bin: 0,
            bass_frequency: 0.0,
            bass_energy: 0.0,
            frequency_buffer: Vec::new(),
            time_domain_buffer: Vec::new(),
        }
    }
}

impl FeatureSnapshot {
    /// Resets every field back to the uninitialized shape, dropping the buffers.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Resizes the raw buffers to the tap's resolution. Existing allocations are
    /// reused when the lengths already match.
    pub fn ensure_buffer_lengths(&mut self, frequency_len: usize, time_domain_len: usize) {
        if self.frequency_buffer.len() != frequency_len {
            self.frequency_buffer.resize(frequency_len, 0);
        }
        if self.time_domain_buffer.len() != time_domain_len {
            self.time_domain_buffer.resize(time_domain_len, 128);
        }
    }

    /// Note name with octave, e.g. `A4`, when a pitch passed the clarity gate.
    pub fn note_label(&self) -> Option<String> {
        match (self.pitch, self.octave) {
            (Some(pitch), Some(octave)) => Some(format!("{}{}", pitch, octave)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pitch_class_from_midi_wraps() {
        assert_eq!(PitchClass::from_midi(69), PitchClass::A);
        assert_eq!(PitchClass::from_midi(60), PitchClass::C);
        assert_eq!(PitchClass::from_midi(-1), PitchClass::B);
    }

    #[test]
    fn buffers_resize_only_on_mismatch() {
        let mut snapshot = FeatureSnapshot::default();
        snapshot.ensure_buffer_lengths(1024, 2048);
        snapshot.frequency_buffer[3] = 200;
        let ptr = snapshot.frequency_buffer.as_ptr();

        snapshot.ensure_buffer_lengths(1024, 2048);
        assert_eq!(snapshot.frequency_buffer.as_ptr(), ptr);
        assert_eq!(snapshot.frequency_buffer[3], 200);
        assert!(snapshot.time_domain_buffer.iter().all(|&v| v == 128));
    }

    #[test]
    fn note_label_needs_both_parts() {
        let mut snapshot = FeatureSnapshot::default();
        assert_eq!(snapshot.note_label(), None);
        snapshot.pitch = Some(PitchClass::CSharp);
        snapshot.octave = Some(3);
        assert_eq!(snapshot.note_label().as_deref(), Some("C#3"));
    }

    #[test]
    fn json_skips_raw_buffers() {
        let mut snapshot = FeatureSnapshot::default();
        snapshot.frequency_buffer = vec![1, 2, 3];
        snapshot.pitch = Some(PitchClass::FSharp);
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(!json.contains("frequency_buffer"));
        assert!(json.contains("\"F#\""));
    }
}
