pub mod preset;
pub mod visualizer;

pub use preset::{PresetManager, PresetParameters, SpherePreset};
pub use visualizer::{SceneUniforms, Visualizer};
