use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use log::{info, warn};
use rodio::{OutputStream, OutputStreamHandle, Sink};

use super::error::{AudioSourceError, Result};
use super::host::{AudioHost, BlockCallback, CaptureDevice, CaptureStream, MediaStream, PlaybackOutput};

/// Production host: cpal for capture, rodio for playback.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalHost;

impl CpalHost {
    pub fn new() -> Self {
        Self
    }
}

/// Backend error text is the only place a permission refusal shows up.
fn classify_backend(description: String) -> AudioSourceError {
    let lower = description.to_lowercase();
    if lower.contains("permission") || lower.contains("not allowed") || lower.contains("denied") {
        AudioSourceError::PermissionDenied(description)
    } else {
        AudioSourceError::Backend(description)
    }
}

fn map_config_error(err: cpal::DefaultStreamConfigError) -> AudioSourceError {
    match err {
        cpal::DefaultStreamConfigError::DeviceNotAvailable => {
            AudioSourceError::DeviceUnavailable("input device went away".to_string())
        }
        cpal::DefaultStreamConfigError::BackendSpecific { err } => classify_backend(err.description),
        other => AudioSourceError::DeviceUnavailable(format!("no usable capture config: {}", other)),
    }
}

fn map_build_error(err: cpal::BuildStreamError) -> AudioSourceError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => {
            AudioSourceError::DeviceUnavailable("input device went away".to_string())
        }
        cpal::BuildStreamError::BackendSpecific { err } => classify_backend(err.description),
        other => AudioSourceError::Backend(format!("failed to build input stream: {}", other)),
    }
}

impl AudioHost for CpalHost {
    fn open_microphone(&self) -> Result<Box<dyn CaptureDevice>> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| AudioSourceError::DeviceUnavailable("no input device available".to_string()))?;
        let config = device.default_input_config().map_err(map_config_error)?;

        info!(
            "Using audio device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );
        info!("Audio config: {:?}", config);

        Ok(Box::new(CpalCaptureDevice {
            sample_format: config.sample_format(),
            config: config.into(),
            device,
        }))
    }

    fn open_playback(&self) -> Result<Box<dyn PlaybackOutput>> {
        let sample_rate = cpal::default_host()
            .default_output_device()
            .and_then(|device| device.default_output_config().ok())
            .map(|config| config.sample_rate().0)
            .ok_or_else(|| AudioSourceError::DeviceUnavailable("no output device available".to_string()))?;

        let (stream, handle) = OutputStream::try_default().map_err(|e| match e {
            rodio::StreamError::NoDevice => {
                AudioSourceError::DeviceUnavailable("no output device available".to_string())
            }
            other => AudioSourceError::Backend(format!("failed to open output stream: {}", other)),
        })?;

        Ok(Box::new(RodioOutput {
            _stream: stream,
            handle,
            sink: None,
            sample_rate,
        }))
    }
}

struct CpalCaptureDevice {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
}

impl CpalCaptureDevice {
    fn build<T>(&self, mut on_block: BlockCallback) -> Result<Stream>
    where
        T: SizedSample,
        f32: FromSample<T>,
    {
        let mut converted: Vec<f32> = Vec::new();
        self.device
            .build_input_stream(
                &self.config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    converted.clear();
                    converted.extend(data.iter().map(|&s| f32::from_sample(s)));
                    on_block(&converted);
                },
                |err| {
                    warn!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(map_build_error)
    }
}

impl CaptureDevice for CpalCaptureDevice {
    fn name(&self) -> String {
        self.device.name().unwrap_or_else(|_| "Unknown".to_string())
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    fn channels(&self) -> u16 {
        self.config.channels
    }

    fn build_stream(&mut self, on_block: BlockCallback) -> Result<Box<dyn CaptureStream>> {
        info!(
            "Creating input stream with {} channels at {} Hz ({:?})",
            self.config.channels, self.config.sample_rate.0, self.sample_format
        );
        let stream = match self.sample_format {
            SampleFormat::F32 => self.build::<f32>(on_block)?,
            SampleFormat::I16 => self.build::<i16>(on_block)?,
            SampleFormat::U16 => self.build::<u16>(on_block)?,
            SampleFormat::I32 => self.build::<i32>(on_block)?,
            other => {
                return Err(AudioSourceError::DeviceUnavailable(format!(
                    "unsupported sample format {:?}",
                    other
                )))
            }
        };
        Ok(Box::new(CpalStream(stream)))
    }
}

struct CpalStream(Stream);

impl CaptureStream for CpalStream {
    fn play(&self) -> Result<()> {
        self.0.play().map_err(|e| match e {
            cpal::PlayStreamError::BackendSpecific { err } => classify_backend(err.description),
            other => AudioSourceError::DeviceUnavailable(format!("failed to start input stream: {}", other)),
        })
    }

    fn pause(&self) -> Result<()> {
        self.0
            .pause()
            .map_err(|e| AudioSourceError::Backend(format!("failed to pause input stream: {}", e)))
    }
}

struct RodioOutput {
    _stream: OutputStream,
    handle: OutputStreamHandle,
    sink: Option<Sink>,
    sample_rate: u32,
}

impl PlaybackOutput for RodioOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn play(&mut self, stream: MediaStream) -> Result<()> {
        let sink = Sink::try_new(&self.handle)
            .map_err(|e| AudioSourceError::Backend(format!("failed to create sink: {}", e)))?;
        sink.append(stream);
        if let Some(previous) = self.sink.replace(sink) {
            previous.stop();
        }
        info!("Audio playback started");
        Ok(())
    }

    fn pause(&self) {
        if let Some(sink) = &self.sink {
            sink.pause();
            info!("Audio playback paused");
        }
    }

    fn resume(&self) {
        if let Some(sink) = &self.sink {
            sink.play();
        }
    }

    fn stop(&self) {
        if let Some(sink) = &self.sink {
            sink.stop();
            info!("Audio playback stopped");
        }
    }

    fn is_paused(&self) -> bool {
        self.sink.as_ref().map_or(true, |sink| sink.is_paused())
    }
}
