//! Acquisition strategies: how audio reaches the analysis tap and who owns
//! the graph it flows through.

use log::{info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::analyser::{AnalysisTap, SpectrumAnalyser};
use super::context::{MicrophoneContext, PlaybackContext};
use super::driver::{BlockDriver, PollDriver, TickDriver, TickTarget};
use super::error::{AudioSourceError, Result};
use super::extractor::{ExtractorOutput, PerceptualExtractor};
use super::features::FeatureSnapshot;
use super::graph::{AnalysisInput, TapSource};
use super::host::{AudioContext, AudioHost, AudioNode, CaptureDevice, ContextState, MediaElement};
use super::pipeline::FeatureTicker;
use crate::config::AudioSourceOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Microphone,
    MediaElement,
    ExternalTap,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SourceKind::Microphone => "microphone",
            SourceKind::MediaElement => "media element",
            SourceKind::ExternalTap => "external tap",
        };
        f.write_str(name)
    }
}

pub trait AcquisitionStrategy {
    fn kind(&self) -> SourceKind;

    /// Sample rate the tap analyses at.
    fn sample_rate(&self) -> f32;

    fn target(&self) -> &TickTarget;

    fn resume(&mut self) -> Result<()>;

    fn suspend(&mut self) -> Result<()>;

    /// Cancels ticks and releases owned resources in reverse creation order.
    /// Safe to call more than once.
    fn teardown(&mut self);
}

fn disconnect(connection: &AtomicBool) {
    connection.store(false, Ordering::Release);
}

/// Owned microphone graph, ticked from the capture callback.
pub struct MicrophoneCapture {
    device: Option<Box<dyn CaptureDevice>>,
    context: MicrophoneContext,
    analyser: Arc<SpectrumAnalyser>,
    extractor: Arc<ExtractorOutput>,
    connection: Arc<AtomicBool>,
    driver: BlockDriver,
}

impl MicrophoneCapture {
    pub fn start(
        host: &dyn AudioHost,
        options: &AudioSourceOptions,
        snapshot: Arc<Mutex<FeatureSnapshot>>,
    ) -> Result<Self> {
        let mut device = host.open_microphone()?;
        let sample_rate = device.sample_rate() as f32;
        info!(
            "Microphone: {} ({} Hz, {} channels)",
            device.name(),
            device.sample_rate(),
            device.channels()
        );

        let context = MicrophoneContext::new(sample_rate);
        let analyser = Arc::new(SpectrumAnalyser::new(sample_rate, options.microphone_fft_size));
        let extractor = PerceptualExtractor::new(sample_rate, options.extractor_block_size);
        let extractor_output = extractor.output();
        let input = AnalysisInput::new(device.channels(), Arc::clone(&analyser), Some(extractor));
        let connection = input.connection();

        let ticker = FeatureTicker::new(
            Arc::clone(&analyser) as Arc<dyn AnalysisTap>,
            Some(Arc::clone(&extractor_output)),
            options.smoothing_factor,
            options.pitch_config(),
        );
        let driver = BlockDriver::new(TickTarget::new(ticker, snapshot));
        let callback = driver.callback(input);
        let stream = device.build_stream(callback);

        let mut capture = Self {
            device: Some(device),
            context,
            analyser,
            extractor: extractor_output,
            connection,
            driver,
        };

        let started = stream.and_then(|stream| {
            capture.context.attach(stream);
            capture.context.resume()
        });
        if let Err(e) = started {
            warn!("Microphone start failed, rolling back: {}", e);
            capture.teardown();
            return Err(e);
        }

        info!("Microphone capture started, fft size {}", capture.analyser.fft_size());
        Ok(capture)
    }
}

impl AcquisitionStrategy for MicrophoneCapture {
    fn kind(&self) -> SourceKind {
        SourceKind::Microphone
    }

    fn sample_rate(&self) -> f32 {
        self.analyser.sample_rate()
    }

    fn target(&self) -> &TickTarget {
        self.driver.target()
    }

    fn resume(&mut self) -> Result<()> {
        if self.context.state() == ContextState::Suspended {
            self.context.resume()?;
            info!("Microphone context resumed");
        }
        Ok(())
    }

    fn suspend(&mut self) -> Result<()> {
        self.context.suspend()
    }

    fn teardown(&mut self) {
        self.driver.stop();
        self.extractor.stop();
        disconnect(&self.connection);
        if let Err(e) = self.context.close() {
            warn!("Closing microphone context failed: {}", e);
        }
        if let Some(device) = self.device.take() {
            info!("Released microphone {}", device.name());
        }
    }
}

/// Owned playback graph for a media element, polled at the refresh rate.
pub struct MediaCapture {
    context: PlaybackContext,
    sample_rate: f32,
    extractor: Arc<ExtractorOutput>,
    connection: Arc<AtomicBool>,
    target: TickTarget,
    driver: Option<PollDriver>,
}

impl MediaCapture {
    pub fn start(
        host: &dyn AudioHost,
        element: &MediaElement,
        options: &AudioSourceOptions,
        snapshot: Arc<Mutex<FeatureSnapshot>>,
    ) -> Result<Self> {
        let context = PlaybackContext::new(host.open_playback()?);

        let stream = match element.claim() {
            Ok(stream) => stream,
            Err(e) => {
                if let Err(close_err) = context.close() {
                    warn!("Closing playback context failed: {}", close_err);
                }
                return Err(e);
            }
        };

        let sample_rate = element.sample_rate() as f32;
        let analyser = Arc::new(SpectrumAnalyser::new(sample_rate, options.media_fft_size));
        let extractor = PerceptualExtractor::new(sample_rate, options.extractor_block_size);
        let extractor_output = extractor.output();
        let input = AnalysisInput::new(element.channels(), Arc::clone(&analyser), Some(extractor));
        let connection = input.connection();
        let tap = TapSource::new(stream, input, options.extractor_block_size);

        let ticker = FeatureTicker::new(
            analyser as Arc<dyn AnalysisTap>,
            Some(Arc::clone(&extractor_output)),
            options.smoothing_factor,
            options.pitch_config(),
        );
        let target = TickTarget::new(ticker, snapshot);

        let mut capture = Self {
            context,
            sample_rate,
            extractor: extractor_output,
            connection,
            target: target.clone(),
            driver: None,
        };

        let started = capture
            .context
            .play(Box::new(tap))
            .and_then(|_| PollDriver::spawn(target, options.refresh_rate_hz));
        match started {
            Ok(driver) => capture.driver = Some(driver),
            Err(e) => {
                warn!("Media start failed, rolling back: {}", e);
                capture.teardown();
                return Err(e);
            }
        }

        info!(
            "Media element {} connected ({} Hz, {} channels)",
            element.label(),
            element.sample_rate(),
            element.channels()
        );
        Ok(capture)
    }
}

impl AcquisitionStrategy for MediaCapture {
    fn kind(&self) -> SourceKind {
        SourceKind::MediaElement
    }

    fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn target(&self) -> &TickTarget {
        &self.target
    }

    fn resume(&mut self) -> Result<()> {
        if self.context.state() == ContextState::Suspended {
            self.context.resume()?;
            info!("Playback context resumed");
        }
        Ok(())
    }

    fn suspend(&mut self) -> Result<()> {
        self.context.suspend()
    }

    fn teardown(&mut self) {
        match self.driver.take() {
            Some(mut driver) => driver.stop(),
            None => self.target.deactivate(),
        }
        self.extractor.stop();
        disconnect(&self.connection);
        if let Err(e) = self.context.close() {
            warn!("Closing playback context failed: {}", e);
        }
    }
}

/// Caller-owned analyser in a caller-owned context. Only polled, never closed.
pub struct ExternalTap {
    sample_rate: f32,
    driver: PollDriver,
}

impl ExternalTap {
    /// Validates the node, then the context, before anything is created.
    pub fn connect(
        node: Arc<dyn AudioNode>,
        context: &dyn AudioContext,
        options: &AudioSourceOptions,
        snapshot: Arc<Mutex<FeatureSnapshot>>,
    ) -> Result<Self> {
        let node_kind = node.node_kind();
        let tap = node.as_analyser().ok_or_else(|| {
            AudioSourceError::InvalidArgument(format!("expected an AnalyserNode, got {node_kind}"))
        })?;

        if context.state() == ContextState::Closed {
            return Err(AudioSourceError::InvalidArgument(
                "audio context is closed".to_string(),
            ));
        }
        let context_rate = context.sample_rate();
        if !(context_rate.is_finite() && context_rate > 0.0) {
            return Err(AudioSourceError::InvalidArgument(format!(
                "audio context reports sample rate {context_rate}"
            )));
        }
        // Bin frequencies come from the analyser, so its rate is the one reported.
        let sample_rate = tap.sample_rate();
        if sample_rate != context_rate {
            warn!(
                "Analyser runs at {} Hz but its context reports {} Hz; using the analyser rate",
                sample_rate, context_rate
            );
        }

        let ticker = FeatureTicker::new(tap, None, options.smoothing_factor, options.pitch_config());
        let driver = PollDriver::spawn(TickTarget::new(ticker, snapshot), options.refresh_rate_hz)?;
        info!("External analyser connected at {} Hz", sample_rate);

        Ok(Self { sample_rate, driver })
    }
}

impl AcquisitionStrategy for ExternalTap {
    fn kind(&self) -> SourceKind {
        SourceKind::ExternalTap
    }

    fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn target(&self) -> &TickTarget {
        self.driver.target()
    }

    fn resume(&mut self) -> Result<()> {
        Ok(())
    }

    fn suspend(&mut self) -> Result<()> {
        Ok(())
    }

    fn teardown(&mut self) {
        self.driver.stop();
    }
}
