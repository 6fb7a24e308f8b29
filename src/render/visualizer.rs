use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use log::{info, warn};

use super::preset::PresetManager;
use crate::audio::{FeatureHandle, FeatureSnapshot};

/// Per-frame values a renderer uploads as one uniform buffer.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct SceneUniforms {
    /// RGB plus unused alpha lane.
    pub color: [f32; 4],
    pub scale: f32,
    pub noise_amplitude: f32,
    pub particle_speed: f32,
    pub time: f32,
    pub resolution: [f32; 2],
    pub _padding: [f32; 2],
}

impl Default for SceneUniforms {
    fn default() -> Self {
        Self {
            color: [1.0, 1.0, 1.0, 1.0],
            scale: 1.0,
            noise_amplitude: 0.0,
            particle_speed: 0.0,
            time: 0.0,
            resolution: [1.0, 1.0],
            _padding: [0.0; 2],
        }
    }
}

/// Hue in degrees to RGB at the given saturation and full value.
pub fn hue_to_rgb(hue: f32, saturation: f32) -> Vec3 {
    let h = hue.rem_euclid(360.0) / 60.0;
    let s = saturation.clamp(0.0, 1.0);
    let c = s;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = 1.0 - c;
    Vec3::new(r + m, g + m, b + m)
}

#[derive(Debug, Clone, Copy)]
struct SceneState {
    scale: f32,
    noise_amplitude: f32,
    particle_speed: f32,
    color: Vec3,
}

impl Default for SceneState {
    fn default() -> Self {
        Self {
            scale: 1.0,
            noise_amplitude: 0.0,
            particle_speed: 0.0,
            color: Vec3::ONE,
        }
    }
}

/// Boundary to the 3D layer: owns the audio-to-scene mapping, not the GPU.
pub struct Visualizer {
    source: Option<FeatureHandle>,
    presets: PresetManager,
    width: u32,
    height: u32,
    running: bool,
    destroyed: bool,
    time: f32,
    state: SceneState,
    last: SceneUniforms,
}

impl Visualizer {
    pub fn new(width: u32, height: u32) -> Self {
        let mut visualizer = Self {
            source: None,
            presets: PresetManager::new(),
            width: width.max(1),
            height: height.max(1),
            running: false,
            destroyed: false,
            time: 0.0,
            state: SceneState::default(),
            last: SceneUniforms::default(),
        };
        visualizer.last = visualizer.uniforms();
        visualizer
    }

    pub fn connect_audio_source(&mut self, handle: FeatureHandle) {
        self.source = Some(handle);
        info!("Visualizer connected to audio source");
    }

    pub fn disconnect_audio_source(&mut self) {
        if self.source.take().is_some() {
            info!("Visualizer disconnected from audio source");
        }
    }

    pub fn has_audio_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn presets(&self) -> &PresetManager {
        &self.presets
    }

    pub fn presets_mut(&mut self) -> &mut PresetManager {
        &mut self.presets
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
        self.last.resolution = [self.width as f32, self.height as f32];
    }

    pub fn start(&mut self) {
        if self.destroyed {
            warn!("Visualizer::start called after destroy");
            return;
        }
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn destroy(&mut self) {
        self.stop();
        self.disconnect_audio_source();
        self.destroyed = true;
        self.state = SceneState::default();
        self.last = self.uniforms();
    }

    /// Advances the scene by `dt` seconds. While stopped the previous
    /// uniforms are returned unchanged.
    pub fn frame(&mut self, dt: f32) -> SceneUniforms {
        if !self.running {
            return self.last;
        }
        let dt = dt.max(0.0);
        self.time += dt;

        let target = match &self.source {
            Some(handle) => handle.read(|snapshot| self.target_state(snapshot)),
            None => SceneState::default(),
        };

        let alpha = 1.0 - (-dt * self.presets.current().parameters.response_rate).exp();
        self.state.scale += (target.scale - self.state.scale) * alpha;
        self.state.noise_amplitude += (target.noise_amplitude - self.state.noise_amplitude) * alpha;
        self.state.particle_speed += (target.particle_speed - self.state.particle_speed) * alpha;
        self.state.color = self.state.color.lerp(target.color, alpha);

        self.last = self.uniforms();
        self.last
    }

    fn target_state(&self, snapshot: &FeatureSnapshot) -> SceneState {
        let params = self.presets.current().parameters;
        let saturation = 0.4 + 0.6 * snapshot.richness.clamp(0.0, 1.0);
        SceneState {
            scale: 1.0 + snapshot.energy * params.scale_response,
            noise_amplitude: snapshot.roughness * params.noise_amplitude,
            particle_speed: snapshot.sharpness * params.particle_speed,
            color: hue_to_rgb(snapshot.bass_frequency + params.hue_shift, saturation),
        }
    }

    fn uniforms(&self) -> SceneUniforms {
        SceneUniforms {
            color: self.state.color.extend(1.0).to_array(),
            scale: self.state.scale,
            noise_amplitude: self.state.noise_amplitude,
            particle_speed: self.state.particle_speed,
            time: self.time,
            resolution: [self.width as f32, self.height as f32],
            _padding: [0.0; 2],
        }
    }
}
