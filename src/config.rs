use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::audio::error::{AudioSourceError, Result};
use crate::audio::pitch::PitchConfig;

/// Construction options for an [`AudioSource`](crate::audio::AudioSource).
///
/// Every field has a default, so a JSON file only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSourceOptions {
    pub smoothing_factor: f32,
    pub clarity_threshold: f32,
    pub min_frequency: f32,
    pub max_frequency: f32,
    /// Poll rate for media and external taps.
    pub refresh_rate_hz: f32,
    pub microphone_fft_size: usize,
    pub media_fft_size: usize,
    pub extractor_block_size: usize,
}

impl Default for AudioSourceOptions {
    fn default() -> Self {
        Self {
            smoothing_factor: 0.8,
            clarity_threshold: 0.9,
            min_frequency: 20.0,
            max_frequency: 4000.0,
            refresh_rate_hz: 60.0,
            microphone_fft_size: 8192,
            media_fft_size: 2048,
            extractor_block_size: 512,
        }
    }
}

impl AudioSourceOptions {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| AudioSourceError::Config(format!("{}: {}", path.display(), e)))?;
        let options: Self = serde_json::from_str(&text)
            .map_err(|e| AudioSourceError::Config(format!("{}: {}", path.display(), e)))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.min_frequency > 0.0 && self.min_frequency < self.max_frequency) {
            return Err(AudioSourceError::Config(format!(
                "frequency range {}..{} is empty",
                self.min_frequency, self.max_frequency
            )));
        }
        if !(0.0..=1.0).contains(&self.clarity_threshold) {
            return Err(AudioSourceError::Config(format!(
                "clarity threshold {} is outside 0..1",
                self.clarity_threshold
            )));
        }
        let rate = self.refresh_rate_hz;
        if !(rate.is_finite() && rate > 0.0 && Duration::try_from_secs_f32(1.0 / rate).is_ok()) {
            return Err(AudioSourceError::Config(format!(
                "refresh rate {} must be positive and give a representable interval",
                self.refresh_rate_hz
            )));
        }
        Ok(())
    }

    pub fn pitch_config(&self) -> PitchConfig {
        PitchConfig {
            clarity_threshold: self.clarity_threshold,
            min_frequency: self.min_frequency,
            max_frequency: self.max_frequency,
        }
    }
}
