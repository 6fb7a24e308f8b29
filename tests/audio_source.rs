use parking_lot::Mutex;
use rodio::source::SineWave;
use std::f32::consts::PI;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use sonosphere::audio::{
    AudioContext, AudioHost, AudioNode, AudioSource, AudioSourceError, BlockCallback,
    CaptureDevice, CaptureStream, ContextState, FeatureSnapshot, MediaElement, MediaStream,
    PlaybackOutput, Result, SourceKind, SpectrumAnalyser,
};
use sonosphere::render::Visualizer;
use sonosphere::AudioSourceOptions;

const MIC_RATE: u32 = 44100;

/// Records what the mock host handed out and what was released.
#[derive(Default)]
struct Probe {
    deny_permission: AtomicBool,
    fail_build: AtomicBool,
    fail_play: AtomicBool,
    devices_opened: AtomicUsize,
    devices_released: AtomicUsize,
    streams_played: AtomicUsize,
    streams_dropped: AtomicUsize,
    outputs_opened: AtomicUsize,
    outputs_stopped: AtomicUsize,
    output_paused: AtomicBool,
    callback: Mutex<Option<BlockCallback>>,
    media: Mutex<Option<MediaStream>>,
}

impl Probe {
    fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// Runs the capture callback as the audio thread would.
    fn deliver(&self, block: &[f32]) {
        let mut callback = self.callback.lock();
        let callback = callback.as_mut().expect("no capture callback registered");
        callback(block);
    }

    /// Pulls samples through the media path as an output device would.
    fn pull_media(&self, samples: usize) -> usize {
        let mut media = self.media.lock();
        let stream = media.as_mut().expect("nothing is playing");
        stream.by_ref().take(samples).count()
    }
}

struct MockHost(Arc<Probe>);

impl AudioHost for MockHost {
    fn open_microphone(&self) -> Result<Box<dyn CaptureDevice>> {
        if self.0.deny_permission.load(Ordering::SeqCst) {
            return Err(AudioSourceError::PermissionDenied("user said no".to_string()));
        }
        self.0.devices_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockDevice(Arc::clone(&self.0))))
    }

    fn open_playback(&self) -> Result<Box<dyn PlaybackOutput>> {
        self.0.outputs_opened.fetch_add(1, Ordering::SeqCst);
        self.0.output_paused.store(true, Ordering::SeqCst);
        Ok(Box::new(MockOutput(Arc::clone(&self.0))))
    }
}

struct MockDevice(Arc<Probe>);

impl CaptureDevice for MockDevice {
    fn name(&self) -> String {
        "mock microphone".to_string()
    }

    fn sample_rate(&self) -> u32 {
        MIC_RATE
    }

    fn channels(&self) -> u16 {
        2
    }

    fn build_stream(&mut self, on_block: BlockCallback) -> Result<Box<dyn CaptureStream>> {
        if self.0.fail_build.load(Ordering::SeqCst) {
            return Err(AudioSourceError::Backend("stream build failed".to_string()));
        }
        *self.0.callback.lock() = Some(on_block);
        Ok(Box::new(MockStream(Arc::clone(&self.0))))
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.0.devices_released.fetch_add(1, Ordering::SeqCst);
    }
}

struct MockStream(Arc<Probe>);

impl CaptureStream for MockStream {
    fn play(&self) -> Result<()> {
        if self.0.fail_play.load(Ordering::SeqCst) {
            return Err(AudioSourceError::DeviceUnavailable("unplugged".to_string()));
        }
        self.0.streams_played.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        Ok(())
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        self.0.streams_dropped.fetch_add(1, Ordering::SeqCst);
    }
}

struct MockOutput(Arc<Probe>);

impl PlaybackOutput for MockOutput {
    fn sample_rate(&self) -> u32 {
        48000
    }

    fn play(&mut self, stream: MediaStream) -> Result<()> {
        *self.0.media.lock() = Some(stream);
        Ok(())
    }

    fn pause(&self) {
        self.0.output_paused.store(true, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.0.output_paused.store(false, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.0.outputs_stopped.fetch_add(1, Ordering::SeqCst);
        self.0.media.lock().take();
    }

    fn is_paused(&self) -> bool {
        self.0.output_paused.load(Ordering::SeqCst)
    }
}

/// Caller-owned context that counts every access.
struct TestContext {
    state: ContextState,
    sample_rate: f32,
    touched: AtomicUsize,
    closed: AtomicUsize,
}

impl TestContext {
    fn new(state: ContextState, sample_rate: f32) -> Self {
        Self {
            state,
            sample_rate,
            touched: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
        }
    }
}

impl AudioContext for TestContext {
    fn sample_rate(&self) -> f32 {
        self.touched.fetch_add(1, Ordering::SeqCst);
        self.sample_rate
    }

    fn state(&self) -> ContextState {
        self.touched.fetch_add(1, Ordering::SeqCst);
        self.state
    }

    fn resume(&self) -> Result<()> {
        self.touched.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn suspend(&self) -> Result<()> {
        self.touched.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct GainNode;

impl AudioNode for GainNode {
    fn node_kind(&self) -> &'static str {
        "GainNode"
    }
}

fn fast_options() -> AudioSourceOptions {
    AudioSourceOptions {
        refresh_rate_hz: 250.0,
        smoothing_factor: 0.0,
        ..AudioSourceOptions::default()
    }
}

fn source_with_probe(options: AudioSourceOptions) -> (AudioSource, Arc<Probe>) {
    let probe = Arc::new(Probe::default());
    let source = AudioSource::with_host(options, Box::new(MockHost(Arc::clone(&probe))));
    (source, probe)
}

fn stereo_sine(frequency: f32, sample_rate: f32, frames: usize) -> Vec<f32> {
    (0..frames)
        .flat_map(|i| {
            let s = (2.0 * PI * frequency * i as f32 / sample_rate).sin() * 0.5;
            [s, s]
        })
        .collect()
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn microphone_ticks_once_per_capture_block() {
    let (mut source, probe) = source_with_probe(fast_options());
    source.init_microphone().unwrap();
    assert_eq!(source.kind(), Some(SourceKind::Microphone));
    assert_eq!(source.sample_rate(), Some(MIC_RATE as f32));
    assert_eq!(Probe::count(&probe.streams_played), 1);

    let signal = stereo_sine(440.0, MIC_RATE as f32, 8192);
    for block in signal.chunks(1024) {
        probe.deliver(block);
    }

    let snapshot = source.feature_snapshot(true);
    assert_eq!(snapshot.frequency_buffer.len(), 4096);
    assert_eq!(snapshot.time_domain_buffer.len(), 8192);
    assert!(snapshot.energy > 0.0);
    assert_eq!(snapshot.note_label().as_deref(), Some("A4"));
}

#[test]
fn second_initializer_is_ignored() {
    let (mut source, probe) = source_with_probe(fast_options());
    source.init_microphone().unwrap();

    let element = MediaElement::new("song", Box::new(SineWave::new(440.0)));
    source.connect_audio_element(&element).unwrap();
    source.init_microphone().unwrap();

    assert_eq!(source.kind(), Some(SourceKind::Microphone));
    assert!(!element.has_source());
    assert_eq!(Probe::count(&probe.outputs_opened), 0);
    assert_eq!(Probe::count(&probe.devices_opened), 1);
    assert_eq!(Probe::count(&probe.devices_released), 0);
}

#[test]
fn failed_stream_build_rolls_back_and_can_retry() {
    let (mut source, probe) = source_with_probe(fast_options());
    probe.fail_build.store(true, Ordering::SeqCst);

    let err = source.init_microphone().unwrap_err();
    assert!(matches!(err, AudioSourceError::Backend(_)));
    assert!(!source.is_initialized());
    assert_eq!(Probe::count(&probe.devices_released), 1);

    probe.fail_build.store(false, Ordering::SeqCst);
    source.init_microphone().unwrap();
    assert!(source.is_initialized());
    assert_eq!(Probe::count(&probe.devices_opened), 2);
}

#[test]
fn failed_stream_start_releases_stream_and_device() {
    let (mut source, probe) = source_with_probe(fast_options());
    probe.fail_play.store(true, Ordering::SeqCst);

    let err = source.init_microphone().unwrap_err();
    assert!(matches!(err, AudioSourceError::DeviceUnavailable(_)));
    assert!(!source.is_initialized());
    assert_eq!(Probe::count(&probe.streams_dropped), 1);
    assert_eq!(Probe::count(&probe.devices_released), 1);

    // The orphaned callback must not write into the snapshot.
    probe.deliver(&[0.5; 512]);
    assert_eq!(*source.feature_snapshot(false), FeatureSnapshot::default());
}

#[test]
fn permission_denied_is_surfaced() {
    let (mut source, probe) = source_with_probe(fast_options());
    probe.deny_permission.store(true, Ordering::SeqCst);
    assert!(matches!(
        source.init_microphone(),
        Err(AudioSourceError::PermissionDenied(_))
    ));
    assert!(!source.is_initialized());
}

#[test]
fn destroy_is_idempotent_and_resets_snapshot() {
    let (mut source, probe) = source_with_probe(fast_options());
    source.init_microphone().unwrap();
    probe.deliver(&stereo_sine(440.0, MIC_RATE as f32, 2048));
    assert!(source.feature_snapshot(false).energy > 0.0);

    source.destroy();
    source.destroy();

    assert!(!source.is_initialized());
    assert_eq!(source.kind(), None);
    assert_eq!(*source.feature_snapshot(true), FeatureSnapshot::default());
    assert_eq!(Probe::count(&probe.streams_dropped), 1);
    assert_eq!(Probe::count(&probe.devices_released), 1);

    probe.deliver(&stereo_sine(440.0, MIC_RATE as f32, 2048));
    assert_eq!(*source.feature_snapshot(true), FeatureSnapshot::default());

    source.init_microphone().unwrap();
    assert!(source.is_initialized());
}

#[test]
fn suspend_and_resume_drive_the_owned_stream() {
    let (mut source, probe) = source_with_probe(fast_options());
    source.init_microphone().unwrap();
    source.resume().unwrap();
    assert_eq!(Probe::count(&probe.streams_played), 1);

    source.suspend().unwrap();
    source.resume().unwrap();
    assert_eq!(Probe::count(&probe.streams_played), 2);
}

#[test]
fn smoothing_factor_is_clamped() {
    let (mut source, _probe) = source_with_probe(fast_options());
    source.set_smoothing_factor(3.0);
    assert_eq!(source.smoothing_factor(), 1.0);
    source.set_smoothing_factor(-1.0);
    assert_eq!(source.smoothing_factor(), 0.0);
    source.set_smoothing_factor(f32::NAN);
    assert_eq!(source.smoothing_factor(), 0.0);
}

#[test]
fn non_analyser_node_is_rejected_before_the_context_is_touched() {
    let (mut source, _probe) = source_with_probe(fast_options());
    let context = TestContext::new(ContextState::Running, 48000.0);

    let err = source
        .connect_external_analyser(Arc::new(GainNode), &context)
        .unwrap_err();
    assert!(matches!(err, AudioSourceError::InvalidArgument(_)));
    assert_eq!(context.touched.load(Ordering::SeqCst), 0);
    assert!(!source.is_initialized());
}

#[test]
fn closed_context_is_rejected() {
    let (mut source, _probe) = source_with_probe(fast_options());
    let context = TestContext::new(ContextState::Closed, 48000.0);
    let analyser = Arc::new(SpectrumAnalyser::new(48000.0, 2048));

    let err = source.connect_external_analyser(analyser, &context).unwrap_err();
    assert!(matches!(err, AudioSourceError::InvalidArgument(_)));
    assert!(!source.is_initialized());
}

#[test]
fn external_tap_is_polled_and_never_closed() {
    let (mut source, _probe) = source_with_probe(fast_options());
    let context = TestContext::new(ContextState::Running, 48000.0);
    let analyser = Arc::new(SpectrumAnalyser::new(48000.0, 2048));
    let tone: Vec<f32> = (0..2048)
        .map(|i| (2.0 * PI * 440.0 * i as f32 / 48000.0).sin() * 0.5)
        .collect();
    analyser.push_samples(&tone);

    source
        .connect_external_analyser(Arc::clone(&analyser) as Arc<dyn AudioNode>, &context)
        .unwrap();
    assert_eq!(source.kind(), Some(SourceKind::ExternalTap));

    let handle = source.handle();
    assert!(wait_for(|| handle.read(|s| s.note_label().as_deref() == Some("A4"))));
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.frequency_buffer.len(), 1024);
    assert_eq!(snapshot.kurtosis, 0.0);

    let touched = context.touched.load(Ordering::SeqCst);
    source.resume().unwrap();
    source.destroy();
    assert_eq!(context.touched.load(Ordering::SeqCst), touched);
    assert_eq!(context.closed.load(Ordering::SeqCst), 0);
}

#[test]
fn media_element_is_analysed_as_it_plays() {
    let (mut source, probe) = source_with_probe(fast_options());
    let element = MediaElement::new("sine", Box::new(SineWave::new(440.0)));
    source.connect_audio_element(&element).unwrap();
    assert_eq!(source.kind(), Some(SourceKind::MediaElement));
    assert!(element.has_source());

    assert_eq!(probe.pull_media(4096), 4096);
    let handle = source.handle();
    assert!(wait_for(|| handle.read(|s| s.note_label().as_deref() == Some("A4"))));
    assert!(handle.read(|s| s.energy > 0.0));

    source.destroy();
    assert_eq!(Probe::count(&probe.outputs_stopped), 1);
    assert!(element.has_source());
}

#[test]
fn suspend_and_resume_drive_the_playback_output() {
    let (mut source, probe) = source_with_probe(fast_options());
    let element = MediaElement::new("sine", Box::new(SineWave::new(440.0)));
    source.connect_audio_element(&element).unwrap();
    assert!(!probe.output_paused.load(Ordering::SeqCst));

    source.suspend().unwrap();
    assert!(probe.output_paused.load(Ordering::SeqCst));
    source.suspend().unwrap();
    assert!(probe.output_paused.load(Ordering::SeqCst));

    source.resume().unwrap();
    assert!(!probe.output_paused.load(Ordering::SeqCst));
    assert_eq!(Probe::count(&probe.outputs_stopped), 0);
}

#[test]
fn second_external_connect_leaves_the_callers_context_alone() {
    let (mut source, _probe) = source_with_probe(fast_options());
    let first = TestContext::new(ContextState::Running, 48000.0);
    let second = TestContext::new(ContextState::Running, 48000.0);
    source
        .connect_external_analyser(Arc::new(SpectrumAnalyser::new(48000.0, 2048)), &first)
        .unwrap();

    source
        .connect_external_analyser(Arc::new(SpectrumAnalyser::new(48000.0, 2048)), &second)
        .unwrap();
    assert_eq!(source.kind(), Some(SourceKind::ExternalTap));
    assert_eq!(second.touched.load(Ordering::SeqCst), 0);
    assert_eq!(second.closed.load(Ordering::SeqCst), 0);

    source.destroy();
    assert_eq!(first.closed.load(Ordering::SeqCst), 0);
}

#[test]
fn external_tap_reports_the_analyser_rate() {
    let (mut source, _probe) = source_with_probe(fast_options());
    let context = TestContext::new(ContextState::Running, 48000.0);
    let analyser = Arc::new(SpectrumAnalyser::new(44100.0, 2048));

    source.connect_external_analyser(analyser, &context).unwrap();
    assert_eq!(source.sample_rate(), Some(44100.0));
}

#[test]
fn media_element_can_only_be_tapped_once() {
    let (mut first, _probe) = source_with_probe(fast_options());
    let element = MediaElement::new("sine", Box::new(SineWave::new(440.0)));
    first.connect_audio_element(&element).unwrap();
    first.destroy();

    let (mut second, probe) = source_with_probe(fast_options());
    let err = second.connect_audio_element(&element).unwrap_err();
    assert!(matches!(err, AudioSourceError::AlreadyHasSource(_)));
    assert!(err.to_string().contains("new MediaElement"));
    assert!(!second.is_initialized());
    assert_eq!(Probe::count(&probe.outputs_stopped), 1);
}

#[test]
fn visualizer_follows_the_connected_source() {
    let (mut source, probe) = source_with_probe(fast_options());
    source.init_microphone().unwrap();
    for block in stereo_sine(60.0, MIC_RATE as f32, 8192).chunks(1024) {
        probe.deliver(block);
    }

    let mut visualizer = Visualizer::new(800, 600);
    visualizer.connect_audio_source(source.handle());
    visualizer.start();
    let mut uniforms = visualizer.frame(0.016);
    for _ in 0..120 {
        uniforms = visualizer.frame(0.016);
    }
    assert!(uniforms.scale > 1.0);

    visualizer.disconnect_audio_source();
    source.destroy();
}
