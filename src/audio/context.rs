use log::debug;
use parking_lot::Mutex;

use super::error::{AudioSourceError, Result};
use super::host::{AudioContext, CaptureStream, ContextState, MediaStream, PlaybackOutput};

/// Context owned by the microphone strategy. Wraps the capture stream so that
/// suspend/resume map onto pausing and playing it.
pub struct MicrophoneContext {
    sample_rate: f32,
    state: Mutex<ContextState>,
    stream: Mutex<Option<Box<dyn CaptureStream>>>,
}

impl MicrophoneContext {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            state: Mutex::new(ContextState::Suspended),
            stream: Mutex::new(None),
        }
    }

    pub fn attach(&self, stream: Box<dyn CaptureStream>) {
        *self.stream.lock() = Some(stream);
    }
}

impl AudioContext for MicrophoneContext {
    fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn state(&self) -> ContextState {
        *self.state.lock()
    }

    fn resume(&self) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            ContextState::Running => Ok(()),
            ContextState::Closed => Err(AudioSourceError::Backend(
                "cannot resume a closed microphone context".to_string(),
            )),
            ContextState::Suspended => {
                if let Some(stream) = self.stream.lock().as_ref() {
                    stream.play()?;
                }
                *state = ContextState::Running;
                Ok(())
            }
        }
    }

    fn suspend(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state == ContextState::Running {
            if let Some(stream) = self.stream.lock().as_ref() {
                stream.pause()?;
            }
            *state = ContextState::Suspended;
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state == ContextState::Closed {
            return Ok(());
        }
        if let Some(stream) = self.stream.lock().take() {
            // Best effort; dropping the stream releases the device either way.
            if let Err(e) = stream.pause() {
                debug!("pausing capture stream on close failed: {}", e);
            }
        }
        *state = ContextState::Closed;
        Ok(())
    }
}

/// Context owned by the media strategy, backed by a playback output.
pub struct PlaybackContext {
    output: Mutex<Box<dyn PlaybackOutput>>,
    state: Mutex<ContextState>,
}

impl PlaybackContext {
    pub fn new(output: Box<dyn PlaybackOutput>) -> Self {
        Self {
            output: Mutex::new(output),
            state: Mutex::new(ContextState::Suspended),
        }
    }

    /// Routes `stream` to the output and starts playback.
    pub fn play(&self, stream: MediaStream) -> Result<()> {
        let mut state = self.state.lock();
        if *state == ContextState::Closed {
            return Err(AudioSourceError::Backend(
                "cannot play into a closed playback context".to_string(),
            ));
        }
        let mut output = self.output.lock();
        output.play(stream)?;
        output.resume();
        *state = ContextState::Running;
        Ok(())
    }
}

impl AudioContext for PlaybackContext {
    fn sample_rate(&self) -> f32 {
        self.output.lock().sample_rate() as f32
    }

    fn state(&self) -> ContextState {
        *self.state.lock()
    }

    fn resume(&self) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            ContextState::Closed => Err(AudioSourceError::Backend(
                "cannot resume a closed playback context".to_string(),
            )),
            _ => {
                self.output.lock().resume();
                *state = ContextState::Running;
                Ok(())
            }
        }
    }

    fn suspend(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state == ContextState::Running {
            self.output.lock().pause();
            *state = ContextState::Suspended;
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state != ContextState::Closed {
            self.output.lock().stop();
            *state = ContextState::Closed;
        }
        Ok(())
    }
}
