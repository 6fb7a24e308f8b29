use rodio::Source;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::analyser::SpectrumAnalyser;
use super::extractor::PerceptualExtractor;
use super::host::MediaStream;

/// Entry point of an owned analysis graph: raw interleaved audio goes in, the
/// analyser and (optionally) the perceptual extractor are fed.
pub struct AnalysisInput {
    channels: usize,
    analyser: Arc<SpectrumAnalyser>,
    extractor: Option<PerceptualExtractor>,
    connected: Arc<AtomicBool>,
    mono: Vec<f32>,
}

impl AnalysisInput {
    pub fn new(channels: u16, analyser: Arc<SpectrumAnalyser>, extractor: Option<PerceptualExtractor>) -> Self {
        Self {
            channels: channels.max(1) as usize,
            analyser,
            extractor,
            connected: Arc::new(AtomicBool::new(true)),
            mono: Vec::new(),
        }
    }

    /// Handle that disconnects the input from the analyser.
    pub fn connection(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.connected)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn feed_interleaved(&mut self, data: &[f32]) {
        if !self.is_connected() || data.is_empty() {
            return;
        }

        self.mono.clear();
        if self.channels == 1 {
            self.mono.extend_from_slice(data);
        } else {
            let channels = self.channels;
            self.mono.extend(
                data.chunks(channels)
                    .map(|frame| frame.iter().sum::<f32>() / channels as f32),
            );
        }

        self.analyser.push_samples(&self.mono);
        if let Some(extractor) = self.extractor.as_mut() {
            extractor.process(&self.mono);
        }
    }
}

/// Pass-through source that copies everything it plays into an [`AnalysisInput`].
///
/// Sits between a media element's decoded stream and the output, so analysis
/// sees exactly what is being played. Samples are handed over in blocks to keep
/// the analyser's lock off the per-sample path.
pub struct TapSource {
    inner: MediaStream,
    input: AnalysisInput,
    block: Vec<f32>,
    block_len: usize,
}

impl TapSource {
    pub fn new(inner: MediaStream, input: AnalysisInput, frames_per_block: usize) -> Self {
        let channels = inner.channels().max(1) as usize;
        let block_len = frames_per_block.max(1) * channels;
        Self {
            inner,
            input,
            block: Vec::with_capacity(block_len),
            block_len,
        }
    }

    fn flush(&mut self) {
        if !self.block.is_empty() {
            self.input.feed_interleaved(&self.block);
            self.block.clear();
        }
    }
}

impl Iterator for TapSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        match self.inner.next() {
            Some(sample) => {
                self.block.push(sample);
                if self.block.len() >= self.block_len {
                    self.flush();
                }
                Some(sample)
            }
            None => {
                self.flush();
                None
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl Source for TapSource {
    fn current_frame_len(&self) -> Option<usize> {
        self.inner.current_frame_len()
    }

    fn channels(&self) -> u16 {
        self.inner.channels()
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        self.inner.total_duration()
    }
}
