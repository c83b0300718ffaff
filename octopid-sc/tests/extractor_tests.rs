//! Feature extractor loop tests with a scripted capture source

use async_trait::async_trait;
use octopid_core::{ControlState, MessageSink, ServerMessage};
use octopid_sc::*;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct RecordingSink {
    connected: AtomicBool,
    sent: Mutex<Vec<ServerMessage>>,
}

impl RecordingSink {
    fn connected() -> Arc<Self> {
        let sink = Self::default();
        sink.connected.store(true, Ordering::SeqCst);
        Arc::new(sink)
    }

    fn sent(&self) -> Vec<ServerMessage> {
        self.sent.lock().clone()
    }
}

impl MessageSink for RecordingSink {
    fn has_session(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn send(&self, message: ServerMessage) {
        self.sent.lock().push(message);
    }
}

/// Replays queued reads, then keeps returning silence
struct ScriptedCapture {
    script: VecDeque<Result<Vec<f32>, AudioError>>,
    reads: Arc<AtomicUsize>,
    discards: Arc<AtomicUsize>,
    released: Arc<AtomicBool>,
}

impl ScriptedCapture {
    fn new(script: Vec<Result<Vec<f32>, AudioError>>) -> Self {
        Self {
            script: script.into(),
            reads: Arc::new(AtomicUsize::new(0)),
            discards: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl CaptureSource for ScriptedCapture {
    async fn read(&mut self, frame_count: usize) -> Result<Vec<f32>, AudioError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.script
            .pop_front()
            .unwrap_or_else(|| Ok(vec![0.0; frame_count]))
    }

    fn discard_buffered(&mut self) {
        self.discards.fetch_add(1, Ordering::SeqCst);
    }

    fn sample_rate(&self) -> u32 {
        44100
    }
}

impl Drop for ScriptedCapture {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

fn bass_tone() -> Vec<f32> {
    (0..1024)
        .map(|i| 0.2 * (2.0 * PI * 150.0 * i as f32 / 44100.0).sin())
        .collect()
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn fast_config() -> AudioConfig {
    init_logging();
    let mut config = AudioConfig::default();
    config.idle_interval_ms = 5;
    config.pacing_interval_ms = 1;
    config
}

#[tokio::test]
async fn test_idle_when_audio_disabled() {
    let control = Arc::new(ControlState::new());
    let sink = RecordingSink::connected();
    let capture = ScriptedCapture::new(vec![Ok(bass_tone())]);
    let reads = capture.reads.clone();

    let mut extractor = FeatureExtractor::new(&fast_config(), capture, control, sink.clone()).unwrap();
    assert_eq!(extractor.tick().await.unwrap(), TickOutcome::Idle);
    assert_eq!(reads.load(Ordering::SeqCst), 0);
    assert!(sink.sent().is_empty());
}

#[tokio::test]
async fn test_idle_without_session() {
    let control = Arc::new(ControlState::new());
    control.enable_audio();
    let sink = Arc::new(RecordingSink::default());
    let capture = ScriptedCapture::new(vec![Ok(bass_tone())]);
    let reads = capture.reads.clone();

    let mut extractor = FeatureExtractor::new(&fast_config(), capture, control, sink.clone()).unwrap();
    assert_eq!(extractor.tick().await.unwrap(), TickOutcome::Idle);
    assert_eq!(reads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_publishes_levels_when_active() {
    let control = Arc::new(ControlState::new());
    control.enable_audio();
    let sink = RecordingSink::connected();
    let capture = ScriptedCapture::new(vec![Ok(bass_tone())]);
    let discards = capture.discards.clone();

    let mut extractor = FeatureExtractor::new(&fast_config(), capture, control, sink.clone()).unwrap();
    let outcome = extractor.tick().await.unwrap();

    let TickOutcome::Published(levels) = outcome else {
        panic!("expected levels, got {:?}", outcome);
    };
    assert!(levels.bass > levels.mid);
    assert_eq!(discards.load(Ordering::SeqCst), 1);

    let sent = sink.sent();
    assert_eq!(sent.len(), 1);
    match &sent[0] {
        ServerMessage::Audio { bass, mids, highs } => {
            assert_eq!(*bass, levels.bass);
            assert_eq!(*mids, Some(levels.mid));
            assert_eq!(*highs, Some(levels.high));
        }
        other => panic!("unexpected message {:?}", other),
    }
}

/// Lets an audio-off land just before the extractor's gated send
struct AudioOffFirstSink {
    control: Arc<ControlState>,
    inner: RecordingSink,
}

impl MessageSink for AudioOffFirstSink {
    fn has_session(&self) -> bool {
        true
    }

    fn send(&self, message: ServerMessage) {
        self.inner.send(message);
    }

    fn send_if(&self, message: ServerMessage, gate: &dyn Fn() -> bool) -> bool {
        if self.control.disable_audio() {
            self.inner.send(ServerMessage::audio_reset());
        }
        let pass = gate();
        if pass {
            self.inner.send(message);
        }
        pass
    }
}

#[tokio::test]
async fn test_level_is_gated_inside_the_sink() {
    let control = Arc::new(ControlState::new());
    control.enable_audio();
    let sink = Arc::new(AudioOffFirstSink {
        control: control.clone(),
        inner: RecordingSink::default(),
    });
    let capture = ScriptedCapture::new(vec![Ok(bass_tone())]);

    let mut extractor = FeatureExtractor::new(&fast_config(), capture, control, sink.clone()).unwrap();
    assert_eq!(extractor.tick().await.unwrap(), TickOutcome::Idle);
    assert_eq!(sink.inner.sent(), vec![ServerMessage::audio_reset()]);
}

#[tokio::test]
async fn test_empty_read_sends_nothing() {
    let control = Arc::new(ControlState::new());
    control.enable_audio();
    let sink = RecordingSink::connected();
    let capture = ScriptedCapture::new(vec![Ok(Vec::new())]);

    let mut extractor = FeatureExtractor::new(&fast_config(), capture, control, sink.clone()).unwrap();
    assert_eq!(extractor.tick().await.unwrap(), TickOutcome::NoData);
    assert!(extractor.analyzer().smoothing().is_empty());
    assert!(sink.sent().is_empty());
}

#[tokio::test]
async fn test_device_failure_disables_audio_and_releases_capture() {
    let control = Arc::new(ControlState::new());
    control.enable_audio();
    let sink = RecordingSink::connected();
    let capture = ScriptedCapture::new(vec![
        Ok(bass_tone()),
        Err(AudioError::Device("unplugged".to_string())),
    ]);
    let released = capture.released.clone();

    let extractor = FeatureExtractor::new(&fast_config(), capture, control.clone(), sink.clone()).unwrap();
    let handle = tokio::spawn(extractor.run(CancellationToken::new()));

    let joined = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("extractor should stop on device failure");
    tokio_test::assert_ok!(joined);

    assert!(!control.is_audio_enabled());
    assert!(control.is_capture_faulted());
    assert!(released.load(Ordering::SeqCst));
    assert_eq!(sink.sent().len(), 1);
}

#[tokio::test]
async fn test_cancellation_stops_idle_loop() {
    let control = Arc::new(ControlState::new());
    let sink = Arc::new(RecordingSink::default());
    let capture = ScriptedCapture::new(Vec::new());
    let released = capture.released.clone();

    let extractor = FeatureExtractor::new(&fast_config(), capture, control, sink).unwrap();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(extractor.run(cancel.clone()));

    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("extractor should honour cancellation")
        .unwrap();
    assert!(released.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_resumes_after_toggle_without_resetting_window() {
    let control = Arc::new(ControlState::new());
    control.enable_audio();
    let sink = RecordingSink::connected();
    let capture = ScriptedCapture::new(vec![Ok(bass_tone()), Ok(bass_tone())]);
    let discards = capture.discards.clone();

    let mut extractor = FeatureExtractor::new(&fast_config(), capture, control.clone(), sink).unwrap();
    extractor.tick().await.unwrap();

    control.disable_audio();
    assert_eq!(extractor.tick().await.unwrap(), TickOutcome::Idle);
    control.enable_audio();
    extractor.tick().await.unwrap();

    assert_eq!(extractor.analyzer().smoothing().len(), 2);
    assert_eq!(discards.load(Ordering::SeqCst), 2);
}
