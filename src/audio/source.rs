use log::{info, warn};
use parking_lot::{Mutex, MutexGuard};
use std::ops::Deref;
use std::sync::Arc;

use super::cpal_host::CpalHost;
use super::error::Result;
use super::features::FeatureSnapshot;
use super::host::{AudioContext, AudioHost, AudioNode, MediaElement};
use super::strategy::{AcquisitionStrategy, ExternalTap, MediaCapture, MicrophoneCapture, SourceKind};
use crate::config::AudioSourceOptions;

/// Read access to the current features.
///
/// `Live` holds the snapshot lock, so ticks wait until it is dropped. Keep it
/// short-lived; take a `Copied` view to hold on to the values.
pub enum SnapshotView<'a> {
    Live(MutexGuard<'a, FeatureSnapshot>),
    Copied(FeatureSnapshot),
}

impl Deref for SnapshotView<'_> {
    type Target = FeatureSnapshot;

    fn deref(&self) -> &FeatureSnapshot {
        match self {
            SnapshotView::Live(guard) => &**guard,
            SnapshotView::Copied(snapshot) => snapshot,
        }
    }
}

impl SnapshotView<'_> {
    pub fn into_owned(self) -> FeatureSnapshot {
        match self {
            SnapshotView::Live(guard) => guard.clone(),
            SnapshotView::Copied(snapshot) => snapshot,
        }
    }
}

/// Cheap, cloneable read handle on an [`AudioSource`]'s snapshot, for readers
/// on other threads.
#[derive(Clone)]
pub struct FeatureHandle {
    snapshot: Arc<Mutex<FeatureSnapshot>>,
}

impl FeatureHandle {
    pub fn snapshot(&self) -> FeatureSnapshot {
        self.snapshot.lock().clone()
    }

    /// Runs `f` against the live snapshot without copying the buffers.
    pub fn read<R>(&self, f: impl FnOnce(&FeatureSnapshot) -> R) -> R {
        f(&self.snapshot.lock())
    }
}

/// One audio input, one feature stream.
///
/// Exactly one acquisition is active at a time. A second initializer before
/// [`destroy`](Self::destroy) is ignored with a warning; after `destroy` the
/// source can be initialized again.
pub struct AudioSource {
    options: AudioSourceOptions,
    host: Box<dyn AudioHost>,
    snapshot: Arc<Mutex<FeatureSnapshot>>,
    strategy: Option<Box<dyn AcquisitionStrategy>>,
}

impl AudioSource {
    pub fn new(options: AudioSourceOptions) -> Self {
        Self::with_host(options, Box::new(CpalHost::new()))
    }

    pub fn with_host(mut options: AudioSourceOptions, host: Box<dyn AudioHost>) -> Self {
        options.smoothing_factor = clamp_factor(options.smoothing_factor);
        Self {
            options,
            host,
            snapshot: Arc::new(Mutex::new(FeatureSnapshot::default())),
            strategy: None,
        }
    }

    pub fn options(&self) -> &AudioSourceOptions {
        &self.options
    }

    pub fn is_initialized(&self) -> bool {
        self.strategy.is_some()
    }

    pub fn kind(&self) -> Option<SourceKind> {
        self.strategy.as_ref().map(|s| s.kind())
    }

    pub fn sample_rate(&self) -> Option<f32> {
        self.strategy.as_ref().map(|s| s.sample_rate())
    }

    pub fn handle(&self) -> FeatureHandle {
        FeatureHandle {
            snapshot: Arc::clone(&self.snapshot),
        }
    }

    fn already_initialized(&self, requested: SourceKind) -> bool {
        match self.kind() {
            Some(active) => {
                warn!(
                    "AudioSource already initialized with {}; ignoring {} request",
                    active, requested
                );
                true
            }
            None => false,
        }
    }

    /// Opens the default microphone and ticks from its capture callback.
    pub fn init_microphone(&mut self) -> Result<()> {
        if self.already_initialized(SourceKind::Microphone) {
            return Ok(());
        }
        let strategy =
            MicrophoneCapture::start(self.host.as_ref(), &self.options, Arc::clone(&self.snapshot))?;
        self.strategy = Some(Box::new(strategy));
        info!("AudioSource initialized: microphone");
        Ok(())
    }

    /// Reads features from an analyser the caller owns. Neither the node nor
    /// the context is ever closed by this source.
    pub fn connect_external_analyser(
        &mut self,
        node: Arc<dyn AudioNode>,
        context: &dyn AudioContext,
    ) -> Result<()> {
        if self.already_initialized(SourceKind::ExternalTap) {
            return Ok(());
        }
        let strategy =
            ExternalTap::connect(node, context, &self.options, Arc::clone(&self.snapshot))?;
        self.strategy = Some(Box::new(strategy));
        info!("AudioSource initialized: external tap");
        Ok(())
    }

    /// Plays `element` through an owned output and analyses what is played.
    pub fn connect_audio_element(&mut self, element: &MediaElement) -> Result<()> {
        if self.already_initialized(SourceKind::MediaElement) {
            return Ok(());
        }
        let strategy = MediaCapture::start(
            self.host.as_ref(),
            element,
            &self.options,
            Arc::clone(&self.snapshot),
        )?;
        self.strategy = Some(Box::new(strategy));
        info!("AudioSource initialized: media element {}", element.label());
        Ok(())
    }

    pub fn feature_snapshot(&self, copy: bool) -> SnapshotView<'_> {
        let guard = self.snapshot.lock();
        if copy {
            SnapshotView::Copied(guard.clone())
        } else {
            SnapshotView::Live(guard)
        }
    }

    /// Clamped to 0..=1. Applies to the running pipeline and to later
    /// initializations.
    pub fn set_smoothing_factor(&mut self, factor: f32) {
        let factor = clamp_factor(factor);
        self.options.smoothing_factor = factor;
        if let Some(strategy) = &self.strategy {
            strategy.target().set_smoothing_factor(factor);
        }
    }

    pub fn smoothing_factor(&self) -> f32 {
        self.options.smoothing_factor
    }

    /// Resumes a suspended owned context. No-op otherwise.
    pub fn resume(&mut self) -> Result<()> {
        match self.strategy.as_mut() {
            Some(strategy) => strategy.resume(),
            None => Ok(()),
        }
    }

    pub fn suspend(&mut self) -> Result<()> {
        match self.strategy.as_mut() {
            Some(strategy) => strategy.suspend(),
            None => Ok(()),
        }
    }

    /// Stops ticking, releases owned resources and resets the snapshot.
    /// Idempotent.
    pub fn destroy(&mut self) {
        if let Some(mut strategy) = self.strategy.take() {
            let kind = strategy.kind();
            strategy.teardown();
            info!("AudioSource destroyed ({})", kind);
        }
        self.snapshot.lock().reset();
    }
}

impl Drop for AudioSource {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn clamp_factor(factor: f32) -> f32 {
    if factor.is_nan() {
        0.0
    } else {
        factor.clamp(0.0, 1.0)
    }
}
