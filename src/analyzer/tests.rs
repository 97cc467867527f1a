use super::*;
use crate::buffer_pool::BufferPool;
use crate::camera::{CameraState, Resolution};
use crate::error::DecodeError;
use crate::events::{EventBus, ScannerEvent};
use crate::frame::{FrameData, PixelFormat};
use crate::luminance::LuminanceSource;

use parking_lot::Mutex;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::time::{sleep, timeout};

const WIDTH: u32 = 8;
const HEIGHT: u32 = 4;
const FRAME_INTERVAL: Duration = Duration::from_millis(150);
const POST_SCAN_INTERVAL: Duration = Duration::from_millis(1000);

struct FixedDecoder {
    text: Option<&'static str>,
    seen: Mutex<Vec<(u32, u32)>>,
}

impl FixedDecoder {
    fn finding(text: &'static str) -> Arc<Self> {
        Arc::new(Self {
            text: Some(text),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn empty() -> Arc<Self> {
        Arc::new(Self {
            text: None,
            seen: Mutex::new(Vec::new()),
        })
    }
}

impl BarcodeDecoder for FixedDecoder {
    fn name(&self) -> &str {
        "fixed"
    }

    fn decode(
        &self,
        source: &LuminanceSource<'_>,
        _hints: &DecodeHints,
    ) -> Result<Option<DecodeResult>, DecodeError> {
        self.seen.lock().push((source.width(), source.height()));
        Ok(self
            .text
            .map(|text| DecodeResult::new(text, BarcodeFormat::QrCode)))
    }
}

struct PanickingDecoder;

impl BarcodeDecoder for PanickingDecoder {
    fn name(&self) -> &str {
        "panicking"
    }

    fn decode(
        &self,
        _source: &LuminanceSource<'_>,
        _hints: &DecodeHints,
    ) -> Result<Option<DecodeResult>, DecodeError> {
        panic!("decoder blew up");
    }
}

struct FailingDecoder;

impl BarcodeDecoder for FailingDecoder {
    fn name(&self) -> &str {
        "failing"
    }

    fn decode(
        &self,
        _source: &LuminanceSource<'_>,
        _hints: &DecodeHints,
    ) -> Result<Option<DecodeResult>, DecodeError> {
        Err(DecodeError::Decoder {
            decoder: "failing".to_string(),
            details: "checksum mismatch".to_string(),
        })
    }
}

/// Holds each decode until the test sends a release signal
struct BlockingDecoder {
    release: Mutex<mpsc::Receiver<()>>,
}

impl BlockingDecoder {
    fn new() -> (Arc<Self>, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        (
            Arc::new(Self {
                release: Mutex::new(rx),
            }),
            tx,
        )
    }
}

impl BarcodeDecoder for BlockingDecoder {
    fn name(&self) -> &str {
        "blocking"
    }

    fn decode(
        &self,
        _source: &LuminanceSource<'_>,
        _hints: &DecodeHints,
    ) -> Result<Option<DecodeResult>, DecodeError> {
        let _ = self.release.lock().recv();
        Ok(Some(DecodeResult::new("late", BarcodeFormat::Code128)))
    }
}

fn create_processor(decoder: Arc<dyn BarcodeDecoder>, event_bus: Arc<EventBus>) -> (FrameProcessor, Arc<CameraState>) {
    let camera_state = Arc::new(CameraState::default());
    camera_state.set_preview_size(Some(Resolution::new(WIDTH, HEIGHT)));
    camera_state.orientation().store(0);

    let processor = FrameProcessor::new(
        FrameGate::new(FRAME_INTERVAL, POST_SCAN_INTERVAL),
        Arc::clone(&camera_state),
        DecoderSet::new(decoder),
        DecodeHints::default(),
        event_bus,
    )
    .expect("processor");

    (processor, camera_state)
}

fn create_pool() -> Arc<BufferPool> {
    BufferPool::new(3, PixelFormat::Nv21.buffer_size(WIDTH, HEIGHT))
}

fn create_frame(pool: &Arc<BufferPool>, id: u64) -> FrameData {
    let mut buffer = pool.acquire().expect("free buffer");
    buffer.fill(0x40);
    FrameData::new(id, SystemTime::now(), buffer, WIDTH, HEIGHT, PixelFormat::Nv21)
}

async fn wait_for_idle(processor: &FrameProcessor) {
    for _ in 0..400 {
        if !processor.is_decode_in_flight() {
            return;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!("decode never finished");
}

#[tokio::test]
async fn test_end_to_end_barcode_found() {
    let event_bus = Arc::new(EventBus::new(16));
    let mut rx = event_bus.subscribe();
    let (processor, _state) = create_processor(FixedDecoder::finding("hello"), Arc::clone(&event_bus));
    let pool = create_pool();

    processor.resume_analysis();
    let now = Instant::now() + POST_SCAN_INTERVAL * 2;
    assert!(processor.on_frame_at(create_frame(&pool, 1), now));

    let event = timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("event in time")
        .expect("event");
    match event {
        ScannerEvent::BarcodeFound { result, frame_id } => {
            assert_eq!(result.text, "hello");
            assert_eq!(result.format, BarcodeFormat::QrCode);
            assert_eq!(frame_id, 1);
        }
        other => panic!("Expected BarcodeFound, got {:?}", other),
    }

    wait_for_idle(&processor).await;
    assert!(processor.scheduling_state().was_scanned);
    assert_eq!(pool.available(), 3);
    assert!(rx.try_recv().is_err());

    let stats = processor.stats();
    assert_eq!(stats.frames_received, 1);
    assert_eq!(stats.frames_analyzed, 1);
    assert_eq!(stats.barcodes_found, 1);
}

#[tokio::test]
async fn test_frames_dropped_while_paused() {
    let event_bus = Arc::new(EventBus::new(16));
    let (processor, _state) = create_processor(FixedDecoder::finding("x"), event_bus);
    let pool = create_pool();

    assert!(!processor.is_analyzing());
    let later = Instant::now() + Duration::from_secs(60);
    assert!(!processor.on_frame_at(create_frame(&pool, 1), later));

    assert_eq!(pool.available(), 3);
    assert_eq!(processor.stats().frames_dropped, 1);
    assert!(!processor.is_decode_in_flight());
}

#[tokio::test]
async fn test_single_flight_drops_frames() {
    let event_bus = Arc::new(EventBus::new(16));
    let (decoder, release) = BlockingDecoder::new();
    let (processor, _state) = create_processor(decoder, event_bus);
    let pool = create_pool();
    processor.resume_analysis();

    let start = Instant::now() + POST_SCAN_INTERVAL;
    assert!(processor.on_frame_at(create_frame(&pool, 1), start));
    assert!(processor.is_decode_in_flight());

    // far past every interval, still denied while the first decode runs
    assert!(!processor.on_frame_at(create_frame(&pool, 2), start + Duration::from_secs(30)));
    assert_eq!(pool.available(), 2);

    release.send(()).expect("release decode");
    wait_for_idle(&processor).await;
    assert_eq!(pool.available(), 3);
    assert_eq!(processor.stats().frames_dropped, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_single_flight_under_concurrent_delivery() {
    let event_bus = Arc::new(EventBus::new(16));
    let (decoder, release) = BlockingDecoder::new();
    let (processor, _state) = create_processor(decoder, event_bus);
    let processor = Arc::new(processor);
    let pool = BufferPool::new(16, PixelFormat::Nv21.buffer_size(WIDTH, HEIGHT));
    processor.resume_analysis();

    let now = Instant::now() + POST_SCAN_INTERVAL;
    let threads: Vec<_> = (0..8)
        .map(|i| {
            let processor = Arc::clone(&processor);
            let frame = create_frame(&pool, i);
            std::thread::spawn(move || processor.on_frame_at(frame, now))
        })
        .collect();

    let accepted = threads
        .into_iter()
        .map(|t| t.join().expect("delivery thread"))
        .filter(|accepted| *accepted)
        .count();
    assert_eq!(accepted, 1);

    release.send(()).expect("release decode");
    wait_for_idle(&processor).await;
    assert_eq!(pool.available(), 16);
}

#[tokio::test]
async fn test_decoder_panic_is_contained() {
    let event_bus = Arc::new(EventBus::new(16));
    let mut rx = event_bus.subscribe();
    let (processor, _state) = create_processor(Arc::new(PanickingDecoder), Arc::clone(&event_bus));
    let pool = create_pool();
    processor.resume_analysis();

    let start = Instant::now() + POST_SCAN_INTERVAL;
    assert!(processor.on_frame_at(create_frame(&pool, 1), start));
    wait_for_idle(&processor).await;

    assert_eq!(pool.available(), 3);
    assert_eq!(processor.stats().decode_failures, 1);
    assert!(!processor.scheduling_state().was_scanned);
    assert!(rx.try_recv().is_err());

    // the stream keeps going
    assert!(processor.on_frame_at(create_frame(&pool, 2), start + FRAME_INTERVAL));
    wait_for_idle(&processor).await;
    assert_eq!(processor.stats().decode_failures, 2);
}

#[tokio::test]
async fn test_decoder_error_treated_as_no_result() {
    let event_bus = Arc::new(EventBus::new(16));
    let mut rx = event_bus.subscribe();
    let (processor, _state) = create_processor(Arc::new(FailingDecoder), Arc::clone(&event_bus));
    let pool = create_pool();
    processor.resume_analysis();

    assert!(processor.on_frame_at(create_frame(&pool, 1), Instant::now() + POST_SCAN_INTERVAL));
    wait_for_idle(&processor).await;

    assert_eq!(pool.available(), 3);
    assert_eq!(processor.stats().decode_failures, 1);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_empty_result_releases_buffer() {
    let event_bus = Arc::new(EventBus::new(16));
    let (processor, _state) = create_processor(FixedDecoder::empty(), event_bus);
    let pool = create_pool();
    processor.resume_analysis();

    assert!(processor.on_frame_at(create_frame(&pool, 1), Instant::now() + POST_SCAN_INTERVAL));
    wait_for_idle(&processor).await;

    assert_eq!(pool.available(), 3);
    assert!(!processor.scheduling_state().was_scanned);
    assert_eq!(processor.stats().barcodes_found, 0);
}

#[tokio::test]
async fn test_portrait_orientation_rotates_luminance() {
    let event_bus = Arc::new(EventBus::new(16));
    let decoder = FixedDecoder::empty();
    let (processor, state) = create_processor(decoder.clone(), event_bus);
    let pool = create_pool();
    processor.resume_analysis();

    let start = Instant::now() + POST_SCAN_INTERVAL;
    assert!(processor.on_frame_at(create_frame(&pool, 1), start));
    wait_for_idle(&processor).await;

    state.orientation().store(90);
    assert!(processor.on_frame_at(create_frame(&pool, 2), start + FRAME_INTERVAL));
    wait_for_idle(&processor).await;

    state.orientation().store(180);
    assert!(processor.on_frame_at(create_frame(&pool, 3), start + FRAME_INTERVAL * 2));
    wait_for_idle(&processor).await;

    let seen = decoder.seen.lock().clone();
    assert_eq!(seen, vec![(WIDTH, HEIGHT), (HEIGHT, WIDTH), (WIDTH, HEIGHT)]);
}

#[tokio::test]
async fn test_post_scan_cooldown_after_success() {
    let event_bus = Arc::new(EventBus::new(16));
    let (processor, _state) = create_processor(FixedDecoder::finding("again"), event_bus);
    let pool = create_pool();
    processor.resume_analysis();

    let start = Instant::now() + POST_SCAN_INTERVAL;
    assert!(processor.on_frame_at(create_frame(&pool, 1), start));
    wait_for_idle(&processor).await;
    assert!(processor.scheduling_state().was_scanned);

    assert!(!processor.on_frame_at(create_frame(&pool, 2), start + Duration::from_millis(500)));
    assert!(processor.on_frame_at(create_frame(&pool, 3), start + POST_SCAN_INTERVAL));
    wait_for_idle(&processor).await;
    assert_eq!(processor.stats().barcodes_found, 2);
}

#[tokio::test]
async fn test_result_discarded_after_shutdown() {
    let event_bus = Arc::new(EventBus::new(16));
    let mut rx = event_bus.subscribe();
    let (decoder, release) = BlockingDecoder::new();
    let (processor, _state) = create_processor(decoder, Arc::clone(&event_bus));
    let pool = create_pool();
    processor.resume_analysis();

    assert!(processor.on_frame_at(create_frame(&pool, 1), Instant::now() + POST_SCAN_INTERVAL));
    processor.shutdown();
    assert!(!processor.is_analyzing());

    release.send(()).expect("release decode");
    wait_for_idle(&processor).await;

    assert_eq!(pool.available(), 3);
    assert!(!processor.scheduling_state().was_scanned);
    assert_eq!(processor.stats().barcodes_found, 0);
    assert!(rx.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_racing_a_finishing_decode() {
    for round in 0..50u64 {
        let event_bus = Arc::new(EventBus::new(16));
        let mut rx = event_bus.subscribe();
        let (processor, _state) = create_processor(FixedDecoder::finding("race"), Arc::clone(&event_bus));
        let pool = create_pool();
        processor.resume_analysis();

        assert!(processor.on_frame_at(create_frame(&pool, round), Instant::now() + POST_SCAN_INTERVAL));
        // vary where the shutdown lands relative to the result
        std::thread::sleep(Duration::from_micros(round * 20));
        processor.shutdown();
        let found_at_shutdown = processor.stats().barcodes_found;
        let scanned_at_shutdown = processor.scheduling_state().was_scanned;

        wait_for_idle(&processor).await;

        assert_eq!(processor.stats().barcodes_found, found_at_shutdown);
        assert_eq!(processor.scheduling_state().was_scanned, scanned_at_shutdown);
        let mut delivered = 0u64;
        while rx.try_recv().is_ok() {
            delivered += 1;
        }
        assert_eq!(delivered, found_at_shutdown);
        assert_eq!(pool.available(), 3);
    }
}

#[tokio::test]
async fn test_preview_callback_delivers_to_processor() {
    use crate::camera::PreviewCallback;

    let event_bus = Arc::new(EventBus::new(16));
    let (processor, _state) = create_processor(FixedDecoder::empty(), event_bus);
    let pool = create_pool();

    processor.on_preview_frame(create_frame(&pool, 1));
    assert_eq!(processor.stats().frames_received, 1);
    assert_eq!(pool.available(), 3);
}
