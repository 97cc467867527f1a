use crate::analyzer::decoder::{BarcodeDecoder, DecodeHints, DecodeResult, DecoderSet};
use crate::analyzer::gate::{FrameGate, ScanSchedulingState};
use crate::camera::{CameraState, PreviewCallback};
use crate::error::{BarcamError, DecodeError, Result};
use crate::events::{EventBus, ScannerEvent};
use crate::frame::FrameData;
use crate::luminance::LuminanceSource;
use crate::orientation::needs_rotation;

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tracing::{debug, error, trace, warn};

/// Counters for frame throughput monitoring
#[derive(Debug, Default)]
pub struct ProcessorStats {
    pub frames_received: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub frames_analyzed: AtomicU64,
    pub barcodes_found: AtomicU64,
    pub decode_failures: AtomicU64,
}

impl ProcessorStats {
    pub fn snapshot(&self) -> ProcessorStatsSnapshot {
        ProcessorStatsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_analyzed: self.frames_analyzed.load(Ordering::Relaxed),
            barcodes_found: self.barcodes_found.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorStatsSnapshot {
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub frames_analyzed: u64,
    pub barcodes_found: u64,
    pub decode_failures: u64,
}

/// Single-flight decode dispatcher fed by the capture layer
///
/// `on_frame` never blocks on a decode: frames arriving while a decode is
/// running, or before the throttle interval has passed, are dropped and
/// their buffers go straight back to the pool.
pub struct FrameProcessor {
    inner: Arc<ProcessorInner>,
}

struct ProcessorInner {
    gate: FrameGate,
    state: Mutex<ScanSchedulingState>,
    in_flight: AtomicBool,
    /// Bumped on shutdown so late results are discarded
    generation: AtomicU64,
    camera_state: Arc<CameraState>,
    decoders: DecoderSet,
    hints: DecodeHints,
    event_bus: Arc<EventBus>,
    stats: ProcessorStats,
    runtime: Handle,
}

/// Clears the in-flight flag however the decode task ends
struct InFlightGuard(Arc<ProcessorInner>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.store(false, Ordering::Release);
    }
}

impl FrameProcessor {
    /// Create a processor bound to the current tokio runtime
    pub fn new(
        gate: FrameGate,
        camera_state: Arc<CameraState>,
        decoders: DecoderSet,
        hints: DecodeHints,
        event_bus: Arc<EventBus>,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            BarcamError::component("frame_processor".to_string(), format!("No tokio runtime: {}", e))
        })?;

        Ok(Self {
            inner: Arc::new(ProcessorInner {
                gate,
                state: Mutex::new(ScanSchedulingState::new(Instant::now())),
                in_flight: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                camera_state,
                decoders,
                hints,
                event_bus,
                stats: ProcessorStats::default(),
                runtime,
            }),
        })
    }

    /// Handle a frame delivered by the camera
    pub fn on_frame(&self, frame: FrameData) -> bool {
        self.on_frame_at(frame, Instant::now())
    }

    /// Handle a frame as if it arrived at `now`; returns whether a decode was dispatched
    pub fn on_frame_at(&self, frame: FrameData, now: Instant) -> bool {
        let inner = &self.inner;
        inner.stats.frames_received.fetch_add(1, Ordering::Relaxed);

        let accepted = {
            let mut state = inner.state.lock();
            let busy = inner.in_flight.load(Ordering::Acquire);
            if inner.gate.try_accept(now, &mut state, busy) {
                inner.in_flight.store(true, Ordering::Release);
                true
            } else {
                false
            }
        };

        if !accepted {
            inner.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            trace!("Dropping frame {}", frame.id);
            return false;
        }

        inner.stats.frames_analyzed.fetch_add(1, Ordering::Relaxed);

        // cached values only; a commit racing this decode leaves the previous ones in place
        let (width, height) = inner
            .camera_state
            .preview_size()
            .map(|size| (size.width, size.height))
            .unwrap_or((frame.width, frame.height));
        let degrees = inner.camera_state.orientation().degrees();
        let generation = inner.generation.load(Ordering::Acquire);

        let guard = InFlightGuard(Arc::clone(inner));
        let task_inner = Arc::clone(inner);
        inner.runtime.spawn(async move {
            let _guard = guard;
            task_inner
                .run_decode(frame, width, height, degrees, generation)
                .await;
        });

        true
    }

    pub fn pause_analysis(&self) {
        self.inner.state.lock().is_analyzing = false;
        debug!("Frame analysis paused");
    }

    pub fn resume_analysis(&self) {
        self.inner.state.lock().is_analyzing = true;
        debug!("Frame analysis resumed");
    }

    pub fn is_analyzing(&self) -> bool {
        self.inner.state.lock().is_analyzing
    }

    /// Stop analysis and orphan any decode still running
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        state.is_analyzing = false;
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        drop(state);
        debug!("Frame processor shut down");
    }

    pub fn is_decode_in_flight(&self) -> bool {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    pub fn scheduling_state(&self) -> ScanSchedulingState {
        *self.inner.state.lock()
    }

    pub fn stats(&self) -> ProcessorStatsSnapshot {
        self.inner.stats.snapshot()
    }
}

impl PreviewCallback for FrameProcessor {
    fn on_preview_frame(&self, frame: FrameData) {
        self.on_frame(frame);
    }
}

impl ProcessorInner {
    async fn run_decode(&self, frame: FrameData, width: u32, height: u32, degrees: u16, generation: u64) {
        let frame_id = frame.id;
        let hints = self.hints.clone();
        let decoder = Arc::clone(self.decoders.select(&hints));

        debug!(
            "Analyzing frame {} ({}x{}, orientation {})",
            frame_id, width, height, degrees
        );

        let outcome = tokio::task::spawn_blocking(move || {
            decode_frame(frame, width, height, degrees, decoder.as_ref(), &hints)
        })
        .await
        .unwrap_or_else(|e| {
            Err(DecodeError::TaskAborted {
                details: e.to_string(),
            })
        });

        let result = match outcome {
            Ok(Some(result)) => result,
            Ok(None) => {
                trace!("No barcode in frame {}", frame_id);
                return;
            }
            Err(e) => {
                self.stats.decode_failures.fetch_add(1, Ordering::Relaxed);
                match e {
                    DecodeError::TaskAborted { .. } => error!("Decode of frame {} aborted: {}", frame_id, e),
                    _ => warn!("Decode of frame {} failed: {}", frame_id, e),
                }
                return;
            }
        };

        // shutdown bumps the generation under this lock
        let mut state = self.state.lock();
        if generation != self.generation.load(Ordering::Acquire) {
            debug!("Discarding result of frame {} after camera shutdown", frame_id);
            return;
        }

        state.was_scanned = true;
        self.stats.barcodes_found.fetch_add(1, Ordering::Relaxed);

        if let Err(e) = self
            .event_bus
            .publish_now(ScannerEvent::BarcodeFound { result, frame_id })
        {
            debug!("No subscriber for barcode from frame {}: {}", frame_id, e);
        }
    }
}

/// Decode one frame, releasing its buffer before returning
fn decode_frame(
    frame: FrameData,
    width: u32,
    height: u32,
    degrees: u16,
    decoder: &dyn BarcodeDecoder,
    hints: &DecodeHints,
) -> std::result::Result<Option<DecodeResult>, DecodeError> {
    let outcome = LuminanceSource::from_preview(&frame.data, width, height).and_then(|source| {
        if needs_rotation(degrees) {
            decoder.decode(&source.rotate_counter_clockwise(), hints)
        } else {
            decoder.decode(&source, hints)
        }
    });

    frame.release();
    outcome
}
