//! Real-time audio feature extraction for an audio-reactive sphere.
//!
//! An [`AudioSource`](audio::AudioSource) turns one of three inputs (the
//! default microphone, a decoded media file, or an analyser owned by the
//! caller) into a continuously updated [`FeatureSnapshot`](audio::FeatureSnapshot).
//! The [`render`] module maps snapshots onto per-frame scene uniforms.

pub mod audio;
pub mod config;
pub mod legacy;
pub mod render;

pub use audio::{AudioSource, AudioSourceError, FeatureHandle, FeatureSnapshot, SourceKind};
pub use config::AudioSourceOptions;
