//! Integration tests for the adaptive filter stage
//!
//! A recording mock engine counts rebuilds and checks that no call ever
//! reaches an engine after it was stopped.

use bytes::Bytes;
use livetx_core::*;
use livetx_media::*;
use parking_lot::Mutex;
use rand::Rng;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

// ============================================================================
// MOCK ENGINE
// ============================================================================

#[derive(Default)]
struct EngineRecord {
    received: Mutex<Vec<Frame>>,
    stopped: AtomicBool,
    failed: AtomicBool,
    flushes: AtomicUsize,
    calls_after_stop: AtomicUsize,
}

struct MockEngine {
    record: Arc<EngineRecord>,
    input_width: u32,
    input_height: u32,
    input_timebase: Timebase,
    output_timebase: Timebase,
    single_track: bool,
    on_output: OutputHandler,
}

impl MockEngine {
    fn check_alive(&self) -> bool {
        if self.record.stopped.load(Ordering::SeqCst) {
            self.record.calls_after_stop.fetch_add(1, Ordering::SeqCst);
            return false;
        }
        true
    }
}

impl TransformEngine for MockEngine {
    fn start(&self) -> bool {
        true
    }

    fn stop(&self) -> bool {
        self.record.stopped.store(true, Ordering::SeqCst);
        true
    }

    fn send_buffer(&self, frame: Frame) -> bool {
        if !self.check_alive() {
            return false;
        }
        self.record.received.lock().push(frame.clone());
        (self.on_output)(frame);
        true
    }

    fn flush(&self) {
        if self.check_alive() {
            self.record.flushes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn input_width(&self) -> u32 {
        self.input_width
    }

    fn input_height(&self) -> u32 {
        self.input_height
    }

    fn is_single_track(&self) -> bool {
        self.single_track
    }

    fn state(&self) -> EngineState {
        if self.record.failed.load(Ordering::SeqCst) {
            EngineState::Error
        } else {
            EngineState::Normal
        }
    }

    fn input_timebase(&self) -> Timebase {
        self.input_timebase
    }

    fn output_timebase(&self) -> Timebase {
        self.output_timebase
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[derive(Default)]
struct MockFactory {
    engines: Mutex<Vec<Arc<EngineRecord>>>,
    refuse_start: AtomicBool,
    /// Engines claim separate tracks even when built for one shared track
    ignore_single_track: AtomicBool,
}

impl MockFactory {
    fn created(&self) -> usize {
        self.engines.lock().len()
    }

    fn engine(&self, index: usize) -> Arc<EngineRecord> {
        self.engines.lock()[index].clone()
    }
}

struct RefusingEngine;

impl TransformEngine for RefusingEngine {
    fn start(&self) -> bool {
        false
    }
    fn stop(&self) -> bool {
        true
    }
    fn send_buffer(&self, _frame: Frame) -> bool {
        false
    }
    fn flush(&self) {}
    fn input_width(&self) -> u32 {
        0
    }
    fn input_height(&self) -> u32 {
        0
    }
    fn is_single_track(&self) -> bool {
        false
    }
    fn state(&self) -> EngineState {
        EngineState::Normal
    }
    fn input_timebase(&self) -> Timebase {
        Timebase::default()
    }
    fn output_timebase(&self) -> Timebase {
        Timebase::default()
    }
    fn name(&self) -> &str {
        "refusing"
    }
}

impl EngineFactory for MockFactory {
    fn create(
        &self,
        _kind: EngineKind,
        input: &TrackDescriptor,
        output: &TrackDescriptor,
        single_track: bool,
        on_output: OutputHandler,
    ) -> TranscodeResult<Box<dyn TransformEngine>> {
        if self.refuse_start.load(Ordering::SeqCst) {
            return Ok(Box::new(RefusingEngine));
        }

        let record = Arc::new(EngineRecord::default());
        self.engines.lock().push(record.clone());
        Ok(Box::new(MockEngine {
            record,
            input_width: input.width,
            input_height: input.height,
            input_timebase: input.timebase,
            output_timebase: output.timebase,
            single_track: single_track && !self.ignore_single_track.load(Ordering::SeqCst),
            on_output,
        }))
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn noop_handler() -> FilterCompleteHandler {
    Arc::new(|_, _| {})
}

fn video_frame(width: u32, height: u32, pts: i64) -> Frame {
    let geometry = VideoGeometry {
        pixel_format: PixelFormat::Yuv420p,
        width,
        height,
    };
    Frame::video(1, geometry, Bytes::new()).with_pts(pts)
}

fn audio_frame(pts: i64) -> Frame {
    let geometry = AudioGeometry {
        sample_format: SampleFormat::F32,
        channel_layout: ChannelLayout::Stereo,
        samples: 1024,
        sample_rate: 48000,
    };
    Frame::audio(1, geometry, Bytes::new()).with_pts(pts)
}

/// Collects formatted log output for assertions
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn with_captured_logs(f: impl FnOnce()) -> String {
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    logs.contents()
}

fn video_filter(factory: &Arc<MockFactory>, config: FilterConfig) -> FilterStage {
    let input = TrackDescriptor::video(1, CodecId::H264, 1280, 720).into_shared();
    let output = TrackDescriptor::video(2, CodecId::H264, 1280, 720).into_shared();
    FilterStage::new(3, input, output, factory.clone(), config, noop_handler()).unwrap()
}

fn audio_filter(factory: &Arc<MockFactory>) -> FilterStage {
    let input = TrackDescriptor::audio(1, CodecId::Aac, 48000, ChannelLayout::Stereo).into_shared();
    let output = TrackDescriptor::audio(2, CodecId::Opus, 48000, ChannelLayout::Stereo).into_shared();
    FilterStage::new(4, input, output, factory.clone(), FilterConfig::default(), noop_handler()).unwrap()
}

// ============================================================================
// REBUILD TRIGGER TESTS
// ============================================================================

#[test]
fn test_resolution_change_rebuilds_once() {
    let factory = Arc::new(MockFactory::default());
    let filter = video_filter(&factory, FilterConfig::default());
    assert_eq!(factory.created(), 1);
    assert_eq!(filter.generation(), 1);

    filter.send_buffer(video_frame(1280, 720, 0)).unwrap();
    filter.send_buffer(video_frame(1920, 1080, 3000)).unwrap();
    filter.send_buffer(video_frame(1920, 1080, 6000)).unwrap();

    assert_eq!(factory.created(), 2);
    assert_eq!(filter.generation(), 2);

    let old = factory.engine(0);
    assert!(old.stopped.load(Ordering::SeqCst));
    // Triggering frame never reached the old engine
    assert_eq!(old.received.lock().len(), 1);
    assert_eq!(old.received.lock()[0].width(), 1280);

    let new = factory.engine(1);
    let widths: Vec<u32> = new.received.lock().iter().map(|f| f.width()).collect();
    assert_eq!(widths, vec![1920, 1920]);

    let input = filter.input_track().read();
    assert_eq!((input.width, input.height), (1920, 1080));
}

#[test]
fn test_trigger_frame_dropped_without_replay() {
    let factory = Arc::new(MockFactory::default());
    let config = FilterConfig {
        replay_trigger_frame: false,
        ..Default::default()
    };
    let filter = video_filter(&factory, config);

    filter.send_buffer(video_frame(1920, 1080, 0)).unwrap();

    assert_eq!(factory.created(), 2);
    assert!(factory.engine(0).received.lock().is_empty());
    assert!(factory.engine(1).received.lock().is_empty());
}

#[test]
fn test_timestamp_jump_rebuilds_once() {
    let factory = Arc::new(MockFactory::default());
    let filter = audio_filter(&factory);

    filter.send_buffer(audio_frame(0)).unwrap();
    filter.send_buffer(audio_frame(48000 * 16)).unwrap();
    filter.send_buffer(audio_frame(48000 * 16 + 1024)).unwrap();

    assert_eq!(factory.created(), 2);
    assert_eq!(factory.engine(0).received.lock().len(), 1);
    assert_eq!(factory.engine(1).received.lock().len(), 2);
}

#[test]
fn test_timestamp_jump_logs_warning() {
    let factory = Arc::new(MockFactory::default());
    let filter = audio_filter(&factory);

    let logs = with_captured_logs(|| {
        filter.send_buffer(audio_frame(0)).unwrap();
        filter.send_buffer(audio_frame(48000 * 16)).unwrap();
    });

    assert_eq!(factory.created(), 2);
    assert!(logs.contains("WARN"), "missing warning in: {}", logs);
    assert!(logs.contains("The timestamp has changed unexpectedly. 0 -> 768000"));
    assert_eq!(logs.matches("The timestamp has changed unexpectedly").count(), 1);
}

#[test]
fn test_timestamp_jump_at_limit_is_tolerated() {
    let factory = Arc::new(MockFactory::default());
    let filter = audio_filter(&factory);

    filter.send_buffer(audio_frame(0)).unwrap();
    filter.send_buffer(audio_frame(48000 * 15)).unwrap();
    // Backwards jumps count too
    filter.send_buffer(audio_frame(0)).unwrap();

    assert_eq!(factory.created(), 1);
    assert_eq!(factory.engine(0).received.lock().len(), 3);
}

#[test]
fn test_audio_never_rebuilds_on_geometry() {
    let factory = Arc::new(MockFactory::default());
    let filter = audio_filter(&factory);

    for i in 0..10 {
        filter.send_buffer(audio_frame(i * 1024)).unwrap();
    }
    assert_eq!(factory.created(), 1);
}

#[test]
fn test_single_track_never_rebuilds() {
    let factory = Arc::new(MockFactory::default());
    let track = TrackDescriptor::audio(5, CodecId::Opus, 48000, ChannelLayout::Stereo).into_shared();
    let filter = FilterStage::single_track(
        5,
        track,
        factory.clone(),
        FilterConfig::default(),
        noop_handler(),
    )
    .unwrap();

    assert!(filter.is_single_track());
    filter.send_buffer(audio_frame(0)).unwrap();
    filter.send_buffer(audio_frame(48000 * 3600)).unwrap();

    assert_eq!(factory.created(), 1);
    assert_eq!(factory.engine(0).received.lock().len(), 2);
}

#[test]
fn test_xma_error_state_triggers_rebuild() {
    let factory = Arc::new(MockFactory::default());
    let input = TrackDescriptor::video(1, CodecId::H264, 1280, 720)
        .with_codec_module(CodecModule::Xma)
        .into_shared();
    let output = TrackDescriptor::video(2, CodecId::H265, 1280, 720)
        .with_codec_module(CodecModule::Xma)
        .into_shared();
    let filter = FilterStage::new(1, input, output, factory.clone(), FilterConfig::default(), noop_handler())
        .unwrap();

    filter.send_buffer(video_frame(1280, 720, 0)).unwrap();
    factory.engine(0).failed.store(true, Ordering::SeqCst);
    filter.send_buffer(video_frame(1280, 720, 3000)).unwrap();

    assert_eq!(factory.created(), 2);
    assert_eq!(factory.engine(1).received.lock().len(), 1);
}

#[test]
fn test_xma_error_on_shared_track_does_not_hang() {
    let factory = Arc::new(MockFactory::default());
    factory.ignore_single_track.store(true, Ordering::SeqCst);
    let track = TrackDescriptor::video(1, CodecId::H264, 1280, 720)
        .with_codec_module(CodecModule::Xma)
        .into_shared();
    let filter = Arc::new(
        FilterStage::single_track(1, track, factory.clone(), FilterConfig::default(), noop_handler())
            .unwrap(),
    );
    factory.engine(0).failed.store(true, Ordering::SeqCst);

    let (done_tx, done_rx) = mpsc::channel();
    let sender = filter.clone();
    thread::spawn(move || {
        let result = sender.send_buffer(video_frame(1280, 720, 0));
        let _ = done_tx.send(result.is_ok());
    });

    assert_eq!(done_rx.recv_timeout(Duration::from_secs(3)), Ok(true));
    assert_eq!(factory.created(), 2);
    assert_eq!(factory.engine(1).received.lock().len(), 1);
}

#[test]
fn test_error_state_ignored_without_xma() {
    let factory = Arc::new(MockFactory::default());
    let filter = video_filter(&factory, FilterConfig::default());

    factory.engine(0).failed.store(true, Ordering::SeqCst);
    filter.send_buffer(video_frame(1280, 720, 0)).unwrap();

    assert_eq!(factory.created(), 1);
}

// ============================================================================
// LIFECYCLE TESTS
// ============================================================================

#[test]
fn test_send_after_stop_is_not_initialized() {
    let factory = Arc::new(MockFactory::default());
    let filter = audio_filter(&factory);

    filter.stop();
    assert!(!filter.is_running());

    let err = filter.send_buffer(audio_frame(0)).unwrap_err();
    assert!(matches!(err, TranscodeError::NotInitialized { .. }));
    assert_eq!(factory.engine(0).calls_after_stop.load(Ordering::SeqCst), 0);

    // Stopping again is harmless
    filter.stop();

    filter.rebuild().unwrap();
    assert!(filter.is_running());
    filter.send_buffer(audio_frame(0)).unwrap();
}

#[test]
fn test_flush_reaches_engine() {
    let factory = Arc::new(MockFactory::default());
    let filter = audio_filter(&factory);

    filter.flush();
    assert_eq!(factory.engine(0).flushes.load(Ordering::SeqCst), 1);

    filter.stop();
    filter.flush();
    assert_eq!(factory.engine(0).calls_after_stop.load(Ordering::SeqCst), 0);
}

#[test]
fn test_unsupported_media_type() {
    let factory = Arc::new(MockFactory::default());
    let mut descriptor = TrackDescriptor::audio(1, CodecId::Aac, 48000, ChannelLayout::Stereo);
    descriptor.media_type = MediaType::Data;
    let track = descriptor.into_shared();

    let result = FilterStage::single_track(1, track, factory.clone(), FilterConfig::default(), noop_handler());
    assert!(matches!(result, Err(TranscodeError::UnsupportedMediaType { media_type: MediaType::Data })));
    assert_eq!(factory.created(), 0);
}

#[test]
fn test_engine_start_failure() {
    let factory = Arc::new(MockFactory::default());
    factory.refuse_start.store(true, Ordering::SeqCst);

    let input = TrackDescriptor::video(1, CodecId::H264, 640, 360).into_shared();
    let output = TrackDescriptor::video(2, CodecId::H264, 640, 360).into_shared();
    let result = FilterStage::new(1, input, output, factory, FilterConfig::default(), noop_handler());

    match result {
        Err(err) => {
            assert!(matches!(err, TranscodeError::EngineStartFailed { .. }));
            assert_eq!(err.category(), ErrorCategory::Engine);
        }
        Ok(_) => panic!("filter must not start"),
    }
}

#[test]
fn test_output_carries_filter_id() {
    let factory = Arc::new(MockFactory::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handler: FilterCompleteHandler = Arc::new(move |id, frame: Frame| sink.lock().push((id, frame.pts)));

    let input = TrackDescriptor::audio(1, CodecId::Aac, 48000, ChannelLayout::Stereo).into_shared();
    let output = TrackDescriptor::audio(2, CodecId::Opus, 48000, ChannelLayout::Stereo).into_shared();
    let filter = FilterStage::new(42, input, output, factory, FilterConfig::default(), handler).unwrap();

    filter.send_buffer(audio_frame(1024)).unwrap();
    assert_eq!(*seen.lock(), vec![(42, Some(1024))]);
    assert_eq!(filter.input_timebase(), Timebase::new(1, 48000));
    assert_eq!(filter.output_timebase(), Timebase::new(1, 48000));
}

// ============================================================================
// CONCURRENCY TESTS
// ============================================================================

#[test]
fn test_concurrent_send_stop_rebuild() {
    let factory = Arc::new(MockFactory::default());
    let filter = Arc::new(video_filter(&factory, FilterConfig::default()));
    let deadline = Instant::now() + Duration::from_millis(300);

    let senders: Vec<_> = (0..4)
        .map(|_| {
            let filter = filter.clone();
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                let mut pts = 0i64;
                while Instant::now() < deadline {
                    let (w, h) = if rng.gen_bool(0.1) { (1920, 1080) } else { (1280, 720) };
                    pts += rng.gen_range(0..3000);
                    // NotInitialized is expected while the stage is stopped
                    let _ = filter.send_buffer(video_frame(w, h, pts));
                    if rng.gen_bool(0.05) {
                        filter.flush();
                    }
                }
            })
        })
        .collect();

    let controller = {
        let filter = filter.clone();
        thread::spawn(move || {
            while Instant::now() < deadline {
                filter.stop();
                thread::sleep(Duration::from_millis(2));
                let _ = filter.rebuild();
                thread::sleep(Duration::from_millis(5));
            }
        })
    };

    for sender in senders {
        sender.join().expect("sender panicked");
    }
    controller.join().expect("controller panicked");

    let engines = factory.engines.lock();
    assert!(engines.len() > 1);
    for record in engines.iter() {
        assert_eq!(record.calls_after_stop.load(Ordering::SeqCst), 0);
    }
}

// ============================================================================
// BUILT-IN ENGINE TESTS
// ============================================================================

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
fn test_builtin_rescaler_pipeline() {
    let outputs = Arc::new(Mutex::new(Vec::new()));
    let sink = outputs.clone();
    let handler: FilterCompleteHandler = Arc::new(move |_, frame| sink.lock().push(frame));

    let input = TrackDescriptor::video(1, CodecId::H264, 4, 4)
        .with_pixel_format(PixelFormat::Gray8)
        .into_shared();
    let output = TrackDescriptor::video(2, CodecId::H264, 2, 2)
        .with_pixel_format(PixelFormat::Gray8)
        .into_shared();
    let filter = FilterStage::new(
        1,
        input,
        output,
        Arc::new(BuiltinEngineFactory::default()),
        FilterConfig::default(),
        handler,
    )
    .unwrap();

    let geometry = VideoGeometry {
        pixel_format: PixelFormat::Gray8,
        width: 4,
        height: 4,
    };
    filter
        .send_buffer(Frame::video(1, geometry, vec![7u8; 16]).with_pts(0))
        .unwrap();

    assert!(wait_for(|| outputs.lock().len() == 1));
    let frame = outputs.lock()[0].clone();
    assert_eq!((frame.width(), frame.height()), (2, 2));
    assert_eq!(&frame.data[..], &[7, 7, 7, 7]);

    filter.stop();
}

#[test]
fn test_rebuild_drains_old_engine() {
    let outputs = Arc::new(Mutex::new(Vec::new()));
    let sink = outputs.clone();
    let handler: FilterCompleteHandler = Arc::new(move |_, frame: Frame| sink.lock().push(frame.samples()));

    let input = TrackDescriptor::audio(1, CodecId::Pcm, 48000, ChannelLayout::Mono).into_shared();
    let output = TrackDescriptor::audio(2, CodecId::Opus, 48000, ChannelLayout::Mono).into_shared();
    let filter = FilterStage::new(
        1,
        input,
        output,
        Arc::new(BuiltinEngineFactory::default()),
        FilterConfig::default(),
        handler,
    )
    .unwrap();

    let geometry = AudioGeometry {
        sample_format: SampleFormat::F32,
        channel_layout: ChannelLayout::Mono,
        samples: 480,
        sample_rate: 48000,
    };
    filter
        .send_buffer(Frame::audio(1, geometry, vec![0u8; 480 * 4]).with_pts(0))
        .unwrap();
    // A 16 second jump replaces the engine
    filter
        .send_buffer(Frame::audio(1, geometry, vec![0u8; 480 * 4]).with_pts(48000 * 16))
        .unwrap();
    assert_eq!(filter.generation(), 2);

    filter.flush();
    assert_eq!(outputs.lock().iter().sum::<usize>(), 960);

    filter.stop();
}

#[test]
fn test_builtin_resampler_flush_drains() {
    let outputs = Arc::new(Mutex::new(Vec::new()));
    let sink = outputs.clone();
    let handler: FilterCompleteHandler = Arc::new(move |_, frame: Frame| sink.lock().push(frame.samples()));

    let input = TrackDescriptor::audio(1, CodecId::Pcm, 48000, ChannelLayout::Mono).into_shared();
    let output = TrackDescriptor::audio(2, CodecId::Opus, 48000, ChannelLayout::Mono).into_shared();
    let filter = FilterStage::new(
        1,
        input,
        output,
        Arc::new(BuiltinEngineFactory::default()),
        FilterConfig::default(),
        handler,
    )
    .unwrap();

    let geometry = AudioGeometry {
        sample_format: SampleFormat::F32,
        channel_layout: ChannelLayout::Mono,
        samples: 480,
        sample_rate: 48000,
    };
    filter
        .send_buffer(Frame::audio(1, geometry, vec![0u8; 480 * 4]).with_pts(0))
        .unwrap();

    // Flush waits for the engine to emit the held sample
    filter.flush();
    assert_eq!(outputs.lock().iter().sum::<usize>(), 480);

    filter.stop();
}
