//! In-process camera used by tests and the simulation mode of the binary.

use super::capabilities::{
    CameraCapabilities, CameraConfig, FocusMode, FpsRange, Resolution, SceneMode, SensorInfo,
};
use super::device::{CameraDevice, CameraProvider, PreviewCallback};
use crate::buffer_pool::BufferPool;
use crate::error::CameraError;
use crate::frame::{FrameData, PixelFormat};
use crate::orientation::CameraFacing;

use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Observable state of a mock camera
pub struct MockCameraState {
    pub sensor: SensorInfo,
    pub capabilities: CameraCapabilities,
    pub parameters: CameraConfig,
    pub commits: Vec<CameraConfig>,
    pub display_orientation: Option<u16>,
    pub autofocus_calls: u32,
    pub cancel_autofocus_calls: u32,
    /// Upcoming autofocus calls that fail
    pub autofocus_failures: u32,
    /// Upcoming commits that fail
    pub commit_failures: u32,
    pub fail_start_preview: bool,
    pub previewing: bool,
    pub open: bool,
    pub released: bool,
    pub callback: Option<Arc<dyn PreviewCallback>>,
    pub pool: Option<Arc<BufferPool>>,
    pub next_frame_id: u64,
}

/// Shared handle to a scriptable camera; clones observe the same state
#[derive(Clone)]
pub struct MockCamera {
    inner: Arc<Mutex<MockCameraState>>,
}

impl MockCamera {
    pub fn new(sensor: SensorInfo, capabilities: CameraCapabilities) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockCameraState {
                sensor,
                capabilities,
                parameters: CameraConfig::default(),
                commits: Vec::new(),
                display_orientation: None,
                autofocus_calls: 0,
                cancel_autofocus_calls: 0,
                autofocus_failures: 0,
                commit_failures: 0,
                fail_start_preview: false,
                previewing: false,
                open: false,
                released: false,
                callback: None,
                pool: None,
                next_frame_id: 0,
            })),
        }
    }

    /// Back camera mounted at 90 degrees with a typical phone feature set
    pub fn typical_back() -> Self {
        Self::new(
            SensorInfo {
                facing: CameraFacing::Back,
                orientation: 90,
            },
            typical_capabilities(),
        )
    }

    pub fn state(&self) -> MutexGuard<'_, MockCameraState> {
        self.inner.lock()
    }

    pub fn last_commit(&self) -> Option<CameraConfig> {
        self.inner.lock().commits.last().cloned()
    }

    /// Deliver one frame from the pool, filled by `fill`.
    ///
    /// Returns false when the camera is not previewing, has no callback,
    /// or the pool is exhausted.
    pub fn emit_frame(&self, fill: impl FnOnce(&mut [u8])) -> bool {
        let (callback, pool, size, id) = {
            let mut state = self.inner.lock();
            if !state.previewing {
                return false;
            }
            let (Some(callback), Some(pool), Some(size)) = (
                state.callback.clone(),
                state.pool.clone(),
                state.parameters.preview_size,
            ) else {
                return false;
            };
            state.next_frame_id += 1;
            (callback, pool, size, state.next_frame_id)
        };

        let Some(mut buffer) = pool.acquire() else {
            trace!("Mock camera dropped frame {}: no free buffer", id);
            return false;
        };
        fill(&mut buffer);

        let frame = FrameData::new(
            id,
            SystemTime::now(),
            buffer,
            size.width,
            size.height,
            PixelFormat::Nv21,
        );
        callback.on_preview_frame(frame);
        true
    }

    /// Emit frames at a fixed interval until the returned task is aborted
    pub fn spawn_capture_loop(&self, interval: Duration, pattern: Arc<dyn Fn(u64, &mut [u8]) + Send + Sync>) -> JoinHandle<()> {
        let camera = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut tick: u64 = 0;
            loop {
                ticker.tick().await;
                tick += 1;
                let pattern = Arc::clone(&pattern);
                camera.emit_frame(move |buf| pattern(tick, buf));
            }
        })
    }
}

/// Capabilities of a common phone back camera
pub fn typical_capabilities() -> CameraCapabilities {
    CameraCapabilities {
        model: "Mock Camera".to_string(),
        preview_sizes: vec![
            Resolution::new(1920, 1080),
            Resolution::new(1280, 720),
            Resolution::new(800, 480),
            Resolution::new(640, 480),
        ],
        fps_ranges: vec![FpsRange::new(15_000, 15_000), FpsRange::new(15_000, 30_000)],
        focus_modes: vec![
            FocusMode::Fixed,
            FocusMode::Auto,
            FocusMode::ContinuousPicture,
            FocusMode::ContinuousVideo,
        ],
        scene_modes: vec![SceneMode::Auto, SceneMode::Barcode, SceneMode::Night],
        min_exposure_compensation: -12,
        max_exposure_compensation: 12,
        exposure_compensation_step: 0.5,
        max_focus_areas: 1,
        max_metering_areas: 1,
        video_stabilization_supported: true,
    }
}

pub struct MockCameraDevice {
    camera: MockCamera,
}

impl MockCameraDevice {
    pub fn new(camera: MockCamera) -> Self {
        camera.state().open = true;
        Self { camera }
    }
}

impl CameraDevice for MockCameraDevice {
    fn capabilities(&self) -> Result<CameraCapabilities, CameraError> {
        Ok(self.camera.state().capabilities.clone())
    }

    fn parameters(&self) -> Result<CameraConfig, CameraError> {
        Ok(self.camera.state().parameters.clone())
    }

    fn commit(&mut self, config: &CameraConfig) -> Result<(), CameraError> {
        let mut state = self.camera.state();
        if state.commit_failures > 0 {
            state.commit_failures -= 1;
            return Err(CameraError::ParameterCommit {
                details: "scripted commit failure".to_string(),
            });
        }
        state.parameters = config.clone();
        state.commits.push(config.clone());
        Ok(())
    }

    fn set_display_orientation(&mut self, degrees: u16) -> Result<(), CameraError> {
        self.camera.state().display_orientation = Some(degrees);
        Ok(())
    }

    fn set_buffer_pool(&mut self, pool: Arc<BufferPool>) {
        self.camera.state().pool = Some(pool);
    }

    fn set_preview_callback(&mut self, callback: Option<Arc<dyn PreviewCallback>>) {
        self.camera.state().callback = callback;
    }

    fn start_preview(&mut self) -> Result<(), CameraError> {
        let mut state = self.camera.state();
        if state.fail_start_preview {
            return Err(CameraError::Preview {
                details: "scripted preview failure".to_string(),
            });
        }
        state.previewing = true;
        Ok(())
    }

    fn stop_preview(&mut self) -> Result<(), CameraError> {
        self.camera.state().previewing = false;
        Ok(())
    }

    fn auto_focus(&mut self) -> Result<(), CameraError> {
        let mut state = self.camera.state();
        state.autofocus_calls += 1;
        if state.autofocus_failures > 0 {
            state.autofocus_failures -= 1;
            return Err(CameraError::Autofocus {
                details: "scripted autofocus failure".to_string(),
            });
        }
        Ok(())
    }

    fn cancel_auto_focus(&mut self) {
        self.camera.state().cancel_autofocus_calls += 1;
    }

    fn release(&mut self) {
        let mut state = self.camera.state();
        state.previewing = false;
        state.open = false;
        state.released = true;
        state.callback = None;
        debug!("Mock camera released");
    }
}

/// Provider over a fixed list of mock cameras
#[derive(Clone, Default)]
pub struct MockCameraProvider {
    cameras: Vec<MockCamera>,
    fail_open: bool,
}

impl MockCameraProvider {
    pub fn new(cameras: Vec<MockCamera>) -> Self {
        Self {
            cameras,
            fail_open: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            cameras: vec![MockCamera::typical_back()],
            fail_open: true,
        }
    }

    pub fn camera(&self, id: u32) -> Option<&MockCamera> {
        self.cameras.get(id as usize)
    }
}

impl CameraProvider for MockCameraProvider {
    fn camera_count(&self) -> u32 {
        self.cameras.len() as u32
    }

    fn camera_info(&self, id: u32) -> Option<SensorInfo> {
        self.camera(id).map(|camera| camera.state().sensor)
    }

    fn open(&self, id: u32) -> Result<Box<dyn CameraDevice>, CameraError> {
        if self.fail_open {
            return Err(CameraError::DeviceOpen {
                id,
                details: "scripted open failure".to_string(),
            });
        }
        let camera = self.camera(id).ok_or(CameraError::DeviceOpen {
            id,
            details: "no such camera".to_string(),
        })?;
        Ok(Box::new(MockCameraDevice::new(camera.clone())))
    }
}
