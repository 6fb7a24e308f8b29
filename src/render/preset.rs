use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpherePreset {
    pub name: String,
    pub parameters: PresetParameters,
}

/// How strongly each feature moves the sphere.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PresetParameters {
    /// Sphere radius gained per unit of energy.
    pub scale_response: f32,
    /// Vertex-noise amplitude at full roughness.
    pub noise_amplitude: f32,
    /// Degrees added to the bass hue.
    pub hue_shift: f32,
    /// Particle speed at full sharpness.
    pub particle_speed: f32,
    /// Rate of the per-frame smoothing, per second.
    pub response_rate: f32,
}

impl Default for PresetParameters {
    fn default() -> Self {
        Self {
            scale_response: 1.0,
            noise_amplitude: 0.3,
            hue_shift: 0.0,
            particle_speed: 1.0,
            response_rate: 8.0,
        }
    }
}

pub struct PresetManager {
    presets: Vec<SpherePreset>,
    current_preset: usize,
}

impl Default for PresetManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PresetManager {
    pub fn new() -> Self {
        let presets = vec![
            SpherePreset {
                name: "Pulse".to_string(),
                parameters: PresetParameters::default(),
            },
            SpherePreset {
                name: "Molten Core".to_string(),
                parameters: PresetParameters {
                    scale_response: 1.6,
                    noise_amplitude: 0.6,
                    hue_shift: 20.0,
                    particle_speed: 0.6,
                    response_rate: 5.0,
                },
            },
            SpherePreset {
                name: "Glass Bell".to_string(),
                parameters: PresetParameters {
                    scale_response: 0.6,
                    noise_amplitude: 0.1,
                    hue_shift: 180.0,
                    particle_speed: 1.4,
                    response_rate: 12.0,
                },
            },
            SpherePreset {
                name: "Storm".to_string(),
                parameters: PresetParameters {
                    scale_response: 1.2,
                    noise_amplitude: 0.9,
                    hue_shift: 240.0,
                    particle_speed: 2.0,
                    response_rate: 15.0,
                },
            },
        ];

        Self {
            presets,
            current_preset: 0,
        }
    }

    pub fn current(&self) -> &SpherePreset {
        &self.presets[self.current_preset]
    }

    pub fn set_current(&mut self, index: usize) {
        if index < self.presets.len() {
            self.current_preset = index;
        }
    }

    /// Selects a preset by case-insensitive name. Returns whether one matched.
    pub fn select_by_name(&mut self, name: &str) -> bool {
        match self
            .presets
            .iter()
            .position(|p| p.name.eq_ignore_ascii_case(name))
        {
            Some(index) => {
                self.current_preset = index;
                true
            }
            None => false,
        }
    }

    pub fn next(&mut self) {
        self.current_preset = (self.current_preset + 1) % self.presets.len();
    }

    pub fn presets(&self) -> &[SpherePreset] {
        &self.presets
    }

    pub fn current_index(&self) -> usize {
        self.current_preset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_index_is_ignored() {
        let mut presets = PresetManager::new();
        presets.set_current(2);
        presets.set_current(99);
        assert_eq!(presets.current_index(), 2);
    }

    #[test]
    fn next_wraps_and_names_match_loosely() {
        let mut presets = PresetManager::new();
        for _ in 0..presets.presets().len() {
            presets.next();
        }
        assert_eq!(presets.current_index(), 0);
        assert!(presets.select_by_name("storm"));
        assert_eq!(presets.current().name, "Storm");
        assert!(!presets.select_by_name("nope"));
    }
}
