pub mod analyser;
pub mod bass;
pub mod context;
pub mod cpal_host;
pub mod driver;
pub mod error;
pub mod extractor;
pub mod features;
pub mod graph;
pub mod host;
pub mod offline;
pub mod pipeline;
pub mod pitch;
pub mod smoothing;
pub mod source;
pub mod spectral;
pub mod strategy;

pub use analyser::{AnalysisTap, SpectrumAnalyser};
pub use cpal_host::CpalHost;
pub use error::{AudioSourceError, Result};
pub use extractor::{PerceptualExtractor, PerceptualFeatures};
pub use features::{FeatureSnapshot, PitchClass};
pub use host::{
    AudioContext, AudioHost, AudioNode, BlockCallback, CaptureDevice, CaptureStream, ContextState,
    MediaElement, MediaStream, PlaybackOutput,
};
pub use offline::OfflineAnalyzer;
pub use pipeline::FeatureTicker;
pub use pitch::{PitchConfig, PitchDetector};
pub use source::{AudioSource, FeatureHandle, SnapshotView};
pub use strategy::SourceKind;
