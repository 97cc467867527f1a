use std::time::{Duration, Instant};
use tracing::trace;

/// Scheduling state shared by the gate and the decode dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSchedulingState {
    pub is_analyzing: bool,
    pub last_analysis_at: Instant,
    /// Set by a successful decode, cleared by the next accepted frame
    pub was_scanned: bool,
}

impl ScanSchedulingState {
    /// Fresh state; the first frame still waits one frame interval from `created_at`
    pub fn new(created_at: Instant) -> Self {
        Self {
            is_analyzing: false,
            last_analysis_at: created_at,
            was_scanned: false,
        }
    }
}

/// Whether the frame arriving at `now` should be analyzed.
///
/// Checks run in order and the first failing one denies: analysis enabled,
/// nothing in flight, frame-rate throttle, and the longer post-scan cooldown
/// when the previous decode succeeded.
pub fn should_analyze(
    now: Instant,
    state: &ScanSchedulingState,
    in_flight_decode_active: bool,
    min_frame_interval: Duration,
    min_post_scan_interval: Duration,
) -> bool {
    if !state.is_analyzing {
        return false;
    }

    if in_flight_decode_active {
        return false;
    }

    let elapsed = now.saturating_duration_since(state.last_analysis_at);
    if elapsed < min_frame_interval {
        return false;
    }

    if state.was_scanned && elapsed < min_post_scan_interval {
        return false;
    }

    true
}

/// Frame-rate throttle configured from the scanning options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGate {
    min_frame_interval: Duration,
    min_post_scan_interval: Duration,
}

impl FrameGate {
    pub fn new(min_frame_interval: Duration, min_post_scan_interval: Duration) -> Self {
        Self {
            min_frame_interval,
            min_post_scan_interval,
        }
    }

    pub fn should_analyze(&self, now: Instant, state: &ScanSchedulingState, in_flight: bool) -> bool {
        should_analyze(
            now,
            state,
            in_flight,
            self.min_frame_interval,
            self.min_post_scan_interval,
        )
    }

    /// Evaluate the gate and, on acceptance, stamp the state before the
    /// decode starts so dispatch rate follows frame arrival, not decode
    /// latency.
    pub fn try_accept(&self, now: Instant, state: &mut ScanSchedulingState, in_flight: bool) -> bool {
        if !self.should_analyze(now, state, in_flight) {
            return false;
        }

        state.was_scanned = false;
        state.last_analysis_at = now;
        trace!("Frame accepted for analysis");
        true
    }

    pub fn min_frame_interval(&self) -> Duration {
        self.min_frame_interval
    }

    pub fn min_post_scan_interval(&self) -> Duration {
        self.min_post_scan_interval
    }
}
