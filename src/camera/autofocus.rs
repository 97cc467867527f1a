use super::capabilities::{FocusMode, MeteringArea, AREA_MAX, AREA_MIN};
use super::configurator::middle_area;
use super::device::{OpenCamera, SharedCamera};
use crate::error::{BarcamError, CameraError, Result};
use crate::events::{EventBus, ScannerEvent};

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Side of the square focused around a touch point
const FOCUS_AREA_SIZE: i32 = 20;
const FOCUS_AREA_WEIGHT: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutofocusState {
    /// One-shot or fixed focus; nothing to restore
    Idle,
    ContinuousActive,
    /// A touch focus replaced continuous mode
    ManualOverride,
    /// Continuous mode will be restored when the timer fires
    ReactivationPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusRequest {
    /// Focus with whatever areas are configured
    Center,
    /// Focus around a point in -1000..1000 sensor coordinates
    Point { x: i32, y: i32 },
}

/// Translate a view pixel coordinate into the -1000..1000 focus space
pub fn focus_coordinate(pixel: f32, view_dimension: u32) -> i32 {
    if view_dimension == 0 {
        return 0;
    }
    let scaled = (pixel / view_dimension as f32) * 2000.0 - 1000.0;
    (scaled.round() as i32).clamp(AREA_MIN, AREA_MAX)
}

/// Fixed-size focus rectangle centered on a point, kept inside the area bounds
pub fn focus_area_around(x: i32, y: i32) -> MeteringArea {
    let half = FOCUS_AREA_SIZE / 2;
    let left = (x - half).clamp(AREA_MIN, AREA_MAX - FOCUS_AREA_SIZE);
    let top = (y - half).clamp(AREA_MIN, AREA_MAX - FOCUS_AREA_SIZE);

    MeteringArea::new(
        left,
        top,
        left + FOCUS_AREA_SIZE,
        top + FOCUS_AREA_SIZE,
        FOCUS_AREA_WEIGHT,
    )
}

struct ReactivationTimer {
    generation: u64,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ReactivationTimer {
    fn cancel(self) {
        self.token.cancel();
        self.handle.abort();
    }
}

/// Drives one-shot focus requests and restores continuous autofocus
/// after a touch focus.
///
/// At most one reactivation timer is armed at a time; arming a new one
/// cancels the previous one.
pub struct AutofocusCoordinator {
    inner: Arc<AutofocusInner>,
}

struct AutofocusInner {
    camera: SharedCamera,
    disabled: bool,
    area_fraction: f32,
    reactivation_delay: Duration,
    state: Mutex<AutofocusState>,
    continuous_capable: AtomicBool,
    timer: Mutex<Option<ReactivationTimer>>,
    next_generation: AtomicU64,
    reactivations: AtomicU64,
    event_bus: Arc<EventBus>,
    runtime: Handle,
}

impl AutofocusCoordinator {
    pub fn new(
        camera: SharedCamera,
        disabled: bool,
        area_fraction: f32,
        reactivation_delay: Duration,
        event_bus: Arc<EventBus>,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            BarcamError::component("autofocus".to_string(), format!("No tokio runtime: {}", e))
        })?;

        Ok(Self {
            inner: Arc::new(AutofocusInner {
                camera,
                disabled,
                area_fraction,
                reactivation_delay,
                state: Mutex::new(AutofocusState::Idle),
                continuous_capable: AtomicBool::new(false),
                timer: Mutex::new(None),
                next_generation: AtomicU64::new(0),
                reactivations: AtomicU64::new(0),
                event_bus,
                runtime,
            }),
        })
    }

    /// Record the focus mode a configuration pass committed
    pub fn on_configured(&self, mode: FocusMode) {
        self.inner.cancel_timer();
        self.inner
            .continuous_capable
            .store(mode.is_continuous(), Ordering::Release);
        *self.inner.state.lock() = if mode.is_continuous() {
            AutofocusState::ContinuousActive
        } else {
            AutofocusState::Idle
        };
    }

    /// Run a focus request, retrying once on failure.
    ///
    /// Failures after the retry are logged and swallowed.
    pub fn request(&self, request: FocusRequest) {
        if self.inner.disabled {
            debug!("Autofocus disabled, ignoring {:?}", request);
            return;
        }

        let mut camera = self.inner.camera.lock();
        let Some(cam) = camera.as_mut() else {
            debug!("Autofocus requested with no open camera");
            return;
        };

        debug!("Autofocus requested: {:?}", request);
        if let Err(e) = self.focus_once(cam, request) {
            debug!("Autofocus failed ({}), retrying", e);
            if let Err(e) = self.focus_once(cam, request) {
                warn!("Autofocus failed after retry: {}", e);
            }
        }
    }

    fn focus_once(&self, cam: &mut OpenCamera, request: FocusRequest) -> std::result::Result<(), CameraError> {
        cam.device.cancel_auto_focus();

        match request {
            FocusRequest::Point { x, y } if cam.capabilities.supports_focus_mode(FocusMode::Auto) => {
                let area = focus_area_around(x, y);
                debug!("Focus area: {}", area);

                let mut params = cam.device.parameters()?;
                params.focus_areas = vec![area];
                params.focus_mode = FocusMode::Auto;
                cam.device.commit(&params)?;

                *self.inner.state.lock() = AutofocusState::ManualOverride;
                self.schedule_reactivation();
            }
            FocusRequest::Point { .. } => {
                debug!("Camera has no auto focus mode, focusing without coordinates");
            }
            FocusRequest::Center => {
                let pending = matches!(
                    *self.inner.state.lock(),
                    AutofocusState::ManualOverride | AutofocusState::ReactivationPending
                );
                if pending {
                    self.schedule_reactivation();
                }
            }
        }

        cam.device.auto_focus()
    }

    /// Arm the reactivation timer, replacing any pending one
    fn schedule_reactivation(&self) {
        if !self.inner.continuous_capable.load(Ordering::Acquire) {
            return;
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::AcqRel) + 1;
        let token = CancellationToken::new();
        let delay = self.inner.reactivation_delay;

        let inner = Arc::clone(&self.inner);
        let task_token = token.clone();
        let handle = self.inner.runtime.spawn(async move {
            tokio::select! {
                _ = task_token.cancelled() => {
                    debug!("Autofocus reactivation canceled");
                }
                _ = sleep(delay) => {
                    inner.reactivate(generation);
                }
            }
        });

        let previous = self.inner.timer.lock().replace(ReactivationTimer {
            generation,
            token,
            handle,
        });
        if let Some(previous) = previous {
            debug!("Replacing pending autofocus reactivation");
            previous.cancel();
        }

        *self.inner.state.lock() = AutofocusState::ReactivationPending;
        debug!("Continuous autofocus reactivation in {:?}", delay);
    }

    /// Cancel any pending reactivation and return to Idle
    pub fn shutdown(&self) {
        self.inner.cancel_timer();
        self.inner.continuous_capable.store(false, Ordering::Release);
        *self.inner.state.lock() = AutofocusState::Idle;
    }

    pub fn state(&self) -> AutofocusState {
        *self.inner.state.lock()
    }

    pub fn is_continuous_capable(&self) -> bool {
        self.inner.continuous_capable.load(Ordering::Acquire)
    }

    pub fn has_pending_reactivation(&self) -> bool {
        self.inner.timer.lock().is_some()
    }

    /// Times continuous autofocus was restored
    pub fn reactivation_count(&self) -> u64 {
        self.inner.reactivations.load(Ordering::Relaxed)
    }
}

impl Drop for AutofocusCoordinator {
    fn drop(&mut self) {
        self.inner.cancel_timer();
    }
}

impl AutofocusInner {
    fn cancel_timer(&self) {
        if let Some(timer) = self.timer.lock().take() {
            timer.cancel();
        }
    }

    fn reactivate(&self, generation: u64) {
        let mut camera = self.camera.lock();

        {
            // a superseded timer that slipped past its cancellation
            let mut timer = self.timer.lock();
            if timer.as_ref().map(|current| current.generation) != Some(generation) {
                return;
            }
            timer.take();
        }

        let Some(cam) = camera.as_mut() else {
            debug!("Camera closed before autofocus reactivation");
            return;
        };

        if let Err(e) = self.restore_continuous(cam) {
            warn!("Failed to reactivate continuous autofocus: {}", e);
            return;
        }

        *self.state.lock() = AutofocusState::ContinuousActive;
        self.reactivations.fetch_add(1, Ordering::Relaxed);
        info!("Continuous autofocus reactivated");

        if let Err(e) = self.event_bus.publish_now(ScannerEvent::AutofocusReactivated {
            timestamp: SystemTime::now(),
        }) {
            debug!("No subscriber for autofocus reactivation: {}", e);
        }
    }

    fn restore_continuous(&self, cam: &mut OpenCamera) -> std::result::Result<(), CameraError> {
        let mut params = cam.device.parameters()?;

        if cam.capabilities.max_focus_areas > 0 {
            params.focus_areas = vec![middle_area(self.area_fraction)];
        }

        if let Some(mode) = [FocusMode::ContinuousPicture, FocusMode::ContinuousVideo]
            .into_iter()
            .find(|mode| cam.capabilities.supports_focus_mode(*mode))
        {
            params.focus_mode = mode;
        }

        cam.device.commit(&params)
    }
}
