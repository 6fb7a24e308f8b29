//! Process-wide mirror of one source's features, for embedders that still read
//! audio values from a global.
//!
//! Nothing in the audio core touches this module. An embedder opts in by
//! creating a [`LegacyBridge`] for exactly one [`AudioSource`](crate::audio::AudioSource)
//! and calling [`LegacyBridge::publish`] once per frame.

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::OnceLock;

use crate::audio::{FeatureHandle, FeatureSnapshot};

/// Flat scalar view in the shape older consumers expect.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LegacyFeatures {
    pub energy: f32,
    pub roughness: f32,
    pub warmth: f32,
    pub richness: f32,
    pub sharpness: f32,
    pub kurtosis: f32,
    /// Note name such as `"A"`, empty when no pitch passed the gate.
    pub pitch: String,
    pub octave: i32,
    pub dominant_frequency: f32,
    pub bass_frequency: f32,
    pub bass_energy: f32,
}

impl From<&FeatureSnapshot> for LegacyFeatures {
    fn from(snapshot: &FeatureSnapshot) -> Self {
        Self {
            energy: snapshot.energy,
            roughness: snapshot.roughness,
            warmth: snapshot.warmth,
            richness: snapshot.richness,
            sharpness: snapshot.sharpness,
            kurtosis: snapshot.kurtosis,
            pitch: snapshot.pitch.map(|p| p.name().to_string()).unwrap_or_default(),
            octave: snapshot.octave.unwrap_or(0),
            dominant_frequency: snapshot.dominant_frequency,
            bass_frequency: snapshot.bass_frequency,
            bass_energy: snapshot.bass_energy,
        }
    }
}

#[derive(Debug, Default)]
pub struct LegacyMirror {
    features: RwLock<LegacyFeatures>,
}

impl LegacyMirror {
    pub fn get(&self) -> LegacyFeatures {
        self.features.read().clone()
    }

    fn set(&self, features: LegacyFeatures) {
        *self.features.write() = features;
    }
}

static GLOBAL_MIRROR: OnceLock<LegacyMirror> = OnceLock::new();

pub fn global() -> &'static LegacyMirror {
    GLOBAL_MIRROR.get_or_init(LegacyMirror::default)
}

/// Republishes one source's snapshot into a mirror.
pub struct LegacyBridge {
    handle: FeatureHandle,
    mirror: &'static LegacyMirror,
}

impl LegacyBridge {
    /// Bridge into the process-wide mirror.
    pub fn new(handle: FeatureHandle) -> Self {
        Self::with_mirror(handle, global())
    }

    pub fn with_mirror(handle: FeatureHandle, mirror: &'static LegacyMirror) -> Self {
        Self { handle, mirror }
    }

    pub fn publish(&self) -> LegacyFeatures {
        let features = self.handle.read(|snapshot| LegacyFeatures::from(snapshot));
        self.mirror.set(features.clone());
        features
    }
}
