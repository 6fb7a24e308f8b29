//! Tick drivers.
//!
//! A driver decides *when* the [`FeatureTicker`] runs. Owned graphs push ticks
//! from the audio callback; external taps and media playback, where no callback
//! of ours sees the graph at a steady rate, are polled from a timer thread.

use crossbeam_channel::{select, Sender};
use log::{debug, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::error::{AudioSourceError, Result};
use super::features::FeatureSnapshot;
use super::graph::AnalysisInput;
use super::host::BlockCallback;
use super::pipeline::FeatureTicker;

/// What every driver ticks: the ticker, the snapshot it writes, and the
/// active flag that gates both.
#[derive(Clone)]
pub struct TickTarget {
    ticker: Arc<Mutex<FeatureTicker>>,
    snapshot: Arc<Mutex<FeatureSnapshot>>,
    active: Arc<AtomicBool>,
}

impl TickTarget {
    pub fn new(ticker: FeatureTicker, snapshot: Arc<Mutex<FeatureSnapshot>>) -> Self {
        Self {
            ticker: Arc::new(Mutex::new(ticker)),
            snapshot,
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Runs one tick. Returns `false` without touching the snapshot once the
    /// target has been deactivated.
    pub fn tick(&self) -> bool {
        let mut ticker = self.ticker.lock();
        if !self.is_active() {
            return false;
        }
        let mut snapshot = self.snapshot.lock();
        ticker.tick(&mut snapshot);
        true
    }

    /// Clears the active flag. Holding the ticker lock while doing so means no
    /// tick is in flight once this returns.
    pub fn deactivate(&self) {
        let _ticker = self.ticker.lock();
        self.active.store(false, Ordering::Release);
    }

    pub fn ticks(&self) -> u64 {
        self.ticker.lock().ticks()
    }

    pub fn smoothing_factor(&self) -> f32 {
        self.ticker.lock().smoothing_factor()
    }

    pub fn set_smoothing_factor(&self, factor: f32) {
        self.ticker.lock().set_smoothing_factor(factor);
    }
}

pub trait TickDriver: Send {
    fn name(&self) -> &'static str;

    fn target(&self) -> &TickTarget;

    fn is_running(&self) -> bool {
        self.target().is_active()
    }

    /// Deregisters the driver. No tick starts after this returns.
    fn stop(&mut self);
}

/// Ticks once per capture block, on the audio thread.
pub struct BlockDriver {
    target: TickTarget,
}

impl BlockDriver {
    pub fn new(target: TickTarget) -> Self {
        Self { target }
    }

    /// Capture callback: feed the graph, then tick.
    pub fn callback(&self, mut input: AnalysisInput) -> BlockCallback {
        let target = self.target.clone();
        Box::new(move |data: &[f32]| {
            if !target.is_active() {
                return;
            }
            input.feed_interleaved(data);
            target.tick();
        })
    }
}

impl TickDriver for BlockDriver {
    fn name(&self) -> &'static str {
        "block"
    }

    fn target(&self) -> &TickTarget {
        &self.target
    }

    fn stop(&mut self) {
        self.target.deactivate();
    }
}

/// Ticks at a fixed rate from a dedicated thread.
pub struct PollDriver {
    target: TickTarget,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PollDriver {
    pub fn spawn(target: TickTarget, refresh_rate_hz: f32) -> Result<Self> {
        if !(refresh_rate_hz.is_finite() && refresh_rate_hz > 0.0) {
            return Err(AudioSourceError::InvalidArgument(format!(
                "refresh rate must be positive, got {refresh_rate_hz}"
            )));
        }
        let interval = Duration::try_from_secs_f32(1.0 / refresh_rate_hz).map_err(|_| {
            AudioSourceError::InvalidArgument(format!(
                "refresh rate {refresh_rate_hz} Hz gives no usable tick interval"
            ))
        })?;
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let ticker = crossbeam_channel::tick(interval);
        let worker = target.clone();

        let handle = thread::Builder::new()
            .name("feature-poll".to_string())
            .spawn(move || {
                debug!("poll driver started, interval {:?}", interval);
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            if !worker.tick() {
                                break;
                            }
                        }
                        recv(stop_rx) -> _ => break,
                    }
                }
                debug!("poll driver exited after {} ticks", worker.ticks());
            })
            .map_err(|e| AudioSourceError::Backend(format!("failed to spawn poll thread: {e}")))?;

        Ok(Self {
            target,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }
}

impl TickDriver for PollDriver {
    fn name(&self) -> &'static str {
        "poll"
    }

    fn target(&self) -> &TickTarget {
        &self.target
    }

    fn stop(&mut self) {
        self.target.deactivate();
        // Dropping the sender disconnects the channel, which wakes the select.
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("poll driver thread panicked");
            }
        }
    }
}

impl Drop for PollDriver {
    fn drop(&mut self) {
        self.stop();
    }
}
