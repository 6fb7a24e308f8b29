//! Boundary with the host audio subsystem.
//!
//! The facade never talks to a platform API directly. It asks an [`AudioHost`]
//! for a capture device or a playback output and wires the returned handles
//! into its own analysis graph. [`CpalHost`](super::cpal_host::CpalHost) is the
//! production implementation; tests substitute scripted hosts.

use parking_lot::Mutex;
use rodio::Source;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::analyser::AnalysisTap;
use super::error::{AudioSourceError, Result};

/// Interleaved `f32` block delivered by a capture stream.
pub type BlockCallback = Box<dyn FnMut(&[f32]) + Send + 'static>;

/// Decoded audio a media element can play.
pub type MediaStream = Box<dyn Source<Item = f32> + Send>;

/// Anything that can sit in an audio graph. Only analysers can be tapped.
pub trait AudioNode: Send + Sync {
    fn node_kind(&self) -> &'static str;

    fn as_analyser(self: Arc<Self>) -> Option<Arc<dyn AnalysisTap>> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Running,
    Suspended,
    Closed,
}

/// Processing context an analysis tap lives in.
pub trait AudioContext {
    fn sample_rate(&self) -> f32;

    fn state(&self) -> ContextState;

    fn resume(&self) -> Result<()>;

    fn suspend(&self) -> Result<()>;

    fn close(&self) -> Result<()>;
}

/// Running capture stream. Dropping it releases the device.
pub trait CaptureStream {
    fn play(&self) -> Result<()>;

    fn pause(&self) -> Result<()>;
}

/// An opened, not yet streaming, capture device.
pub trait CaptureDevice {
    fn name(&self) -> String;

    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    /// Builds a paused stream that calls `on_block` from the audio thread.
    fn build_stream(&mut self, on_block: BlockCallback) -> Result<Box<dyn CaptureStream>>;
}

/// An output device decoded media is routed into.
pub trait PlaybackOutput {
    fn sample_rate(&self) -> u32;

    fn play(&mut self, stream: MediaStream) -> Result<()>;

    fn pause(&self);

    fn resume(&self);

    fn stop(&self);

    fn is_paused(&self) -> bool;
}

pub trait AudioHost {
    /// Requests the default microphone. Permission and device failures map to
    /// [`AudioSourceError::PermissionDenied`] and
    /// [`AudioSourceError::DeviceUnavailable`].
    fn open_microphone(&self) -> Result<Box<dyn CaptureDevice>>;

    fn open_playback(&self) -> Result<Box<dyn PlaybackOutput>>;
}

/// A playable piece of decoded media, the counterpart of a page's `<audio>` element.
///
/// Its audio can be routed through at most one analysis tap over its whole
/// lifetime. The flag survives the tap's teardown.
pub struct MediaElement {
    label: String,
    stream: Mutex<Option<MediaStream>>,
    sample_rate: u32,
    channels: u16,
    has_source: AtomicBool,
}

impl MediaElement {
    pub fn new(label: impl Into<String>, stream: MediaStream) -> Self {
        let sample_rate = stream.sample_rate();
        let channels = stream.channels();
        Self {
            label: label.into(),
            stream: Mutex::new(Some(stream)),
            sample_rate,
            channels,
            has_source: AtomicBool::new(false),
        }
    }

    /// Decodes a file with rodio (symphonia codecs).
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| AudioSourceError::Backend(format!("cannot open {}: {}", path.display(), e)))?;
        let decoder = rodio::Decoder::new(std::io::BufReader::new(file))
            .map_err(|e| AudioSourceError::Backend(format!("cannot decode {}: {}", path.display(), e)))?;

        Ok(Self::new(path.display().to_string(), Box::new(decoder.convert_samples::<f32>())))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn has_source(&self) -> bool {
        self.has_source.load(Ordering::Acquire)
    }

    /// Claims the element's output for a tap. Fails if any tap ever claimed it.
    pub(crate) fn claim(&self) -> Result<MediaStream> {
        if self
            .has_source
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(AudioSourceError::AlreadyHasSource(self.label.clone()));
        }
        self.stream
            .lock()
            .take()
            .ok_or_else(|| AudioSourceError::AlreadyHasSource(self.label.clone()))
    }
}

impl std::fmt::Debug for MediaElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaElement")
            .field("label", &self.label)
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("has_source", &self.has_source())
            .finish()
    }
}
