/// Default blend factor; matches `AudioSourceOptions::default()`.
pub const DEFAULT_SMOOTHING_FACTOR: f32 = 0.8;

/// Raw per-tick values fed to the smoother.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SmoothedFeatures {
    pub energy: f32,
    pub warmth: f32,
    pub richness: f32,
    pub sharpness: f32,
}

/// Exponential moving average over the four slow-moving features.
///
/// Applied once per tick at whatever cadence the active driver runs. The factor
/// is deliberately not scaled by elapsed time: an audio-callback driver and a
/// refresh-rate driver respond differently, and the response curve users see
/// depends on that.
#[derive(Debug, Clone)]
pub struct TemporalSmoother {
    factor: f32,
    state: SmoothedFeatures,
}

impl TemporalSmoother {
    pub fn new(factor: f32) -> Self {
        Self {
            factor: factor.clamp(0.0, 1.0),
            state: SmoothedFeatures::default(),
        }
    }

    pub fn factor(&self) -> f32 {
        self.factor
    }

    /// 0 tracks the input instantly, 1 freezes the state.
    pub fn set_factor(&mut self, factor: f32) {
        self.factor = if factor.is_nan() { 0.0 } else { factor.clamp(0.0, 1.0) };
    }

    pub fn state(&self) -> SmoothedFeatures {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = SmoothedFeatures::default();
    }

    /// Blends one raw tick into the accumulators and returns the new state.
    pub fn update(&mut self, raw: SmoothedFeatures) -> SmoothedFeatures {
        let keep = self.factor;
        let take = 1.0 - keep;
        let blend = |old: f32, new: f32| old * keep + new * take;

        self.state = SmoothedFeatures {
            energy: blend(self.state.energy, raw.energy),
            warmth: blend(self.state.warmth, raw.warmth),
            richness: blend(self.state.richness, raw.richness),
            sharpness: blend(self.state.sharpness, raw.sharpness),
        };
        self.state
    }
}

impl Default for TemporalSmoother {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTHING_FACTOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn constant() -> SmoothedFeatures {
        SmoothedFeatures {
            energy: 0.42,
            warmth: 1800.0,
            richness: 0.7,
            sharpness: 0.3,
        }
    }

    #[test]
    fn converges_to_constant_input() {
        let mut smoother = TemporalSmoother::new(0.8);
        let target = constant();
        for _ in 0..500 {
            smoother.update(target);
        }
        let state = smoother.state();
        assert_relative_eq!(state.energy, target.energy, epsilon = 1e-4);
        assert_relative_eq!(state.warmth, target.warmth, epsilon = 1e-2);
        assert_relative_eq!(state.richness, target.richness, epsilon = 1e-4);
        assert_relative_eq!(state.sharpness, target.sharpness, epsilon = 1e-4);
    }

    #[test]
    fn zero_factor_tracks_instantly() {
        let mut smoother = TemporalSmoother::new(0.0);
        assert_eq!(smoother.update(constant()), constant());
    }

    #[test]
    fn unit_factor_freezes_state() {
        let mut smoother = TemporalSmoother::new(1.0);
        let state = smoother.update(constant());
        assert_eq!(state, SmoothedFeatures::default());
    }

    #[test]
    fn single_step_matches_formula() {
        let mut smoother = TemporalSmoother::new(0.8);
        let state = smoother.update(constant());
        assert_relative_eq!(state.energy, 0.42 * 0.2, epsilon = 1e-6);
        let state = smoother.update(constant());
        assert_relative_eq!(state.energy, 0.42 * 0.2 * 0.8 + 0.42 * 0.2, epsilon = 1e-6);
    }

    #[test]
    fn factor_is_clamped() {
        let mut smoother = TemporalSmoother::new(3.0);
        assert_eq!(smoother.factor(), 1.0);
        smoother.set_factor(-0.5);
        assert_eq!(smoother.factor(), 0.0);
        smoother.set_factor(f32::NAN);
        assert_eq!(smoother.factor(), 0.0);
    }
}
