use super::autofocus::{focus_coordinate, AutofocusCoordinator, AutofocusState, FocusRequest};
use super::capabilities::{CameraCapabilities, CameraConfig, FocusMode, Resolution};
use super::configurator::{best_exposure, negotiate, CameraPreferences};
use super::device::{CameraProvider, OpenCamera, PreviewCallback, SharedCamera};
use super::state::CameraState;
use crate::buffer_pool::BufferPool;
use crate::config::CameraSettings;
use crate::error::{CameraError, Result};
use crate::events::{EventBus, ScannerEvent};
use crate::frame::PixelFormat;
use crate::orientation::{corrected_degrees, CameraFacing, DisplayRotation};

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, error, info, warn};

/// Single owner of the camera hardware handle.
///
/// Every hardware call goes through the handle's mutex, so configuration,
/// rotation and focus requests are serialized against each other.
pub struct CameraController {
    provider: Arc<dyn CameraProvider>,
    camera: SharedCamera,
    state: Arc<CameraState>,
    preferences: CameraPreferences,
    settings: CameraSettings,
    autofocus: AutofocusCoordinator,
    torch_on: AtomicBool,
    event_bus: Arc<EventBus>,
}

impl CameraController {
    pub fn new(
        provider: Arc<dyn CameraProvider>,
        preferences: CameraPreferences,
        settings: CameraSettings,
        event_bus: Arc<EventBus>,
    ) -> Result<Self> {
        let camera: SharedCamera = Arc::new(Mutex::new(None));
        let rotation = DisplayRotation::from_degrees(settings.initial_rotation).unwrap_or_default();

        let autofocus = AutofocusCoordinator::new(
            Arc::clone(&camera),
            preferences.options.disable_autofocus,
            preferences.focus_area_fraction,
            settings.reactivation_delay(),
            Arc::clone(&event_bus),
        )?;

        Ok(Self {
            provider,
            camera,
            state: Arc::new(CameraState::new(rotation)),
            preferences,
            settings,
            autofocus,
            torch_on: AtomicBool::new(false),
            event_bus,
        })
    }

    /// State shared with the decode path
    pub fn camera_state(&self) -> Arc<CameraState> {
        Arc::clone(&self.state)
    }

    pub fn is_open(&self) -> bool {
        self.camera.lock().is_some()
    }

    pub fn active_camera_id(&self) -> Option<u32> {
        self.camera.lock().as_ref().map(|cam| cam.id)
    }

    pub fn capabilities(&self) -> Option<CameraCapabilities> {
        self.camera.lock().as_ref().map(|cam| cam.capabilities.clone())
    }

    /// Parameters currently applied to the open camera
    pub fn current_config(&self) -> Option<CameraConfig> {
        let camera = self.camera.lock();
        let cam = camera.as_ref()?;
        match cam.device.parameters() {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("Failed to read camera parameters: {}", e);
                None
            }
        }
    }

    pub fn autofocus(&self) -> &AutofocusCoordinator {
        &self.autofocus
    }

    pub fn autofocus_state(&self) -> AutofocusState {
        self.autofocus.state()
    }

    /// Open, configure and start the camera, delivering frames to `callback`.
    ///
    /// Does nothing when a camera is already open. On failure the device is
    /// released again and the handle stays unset.
    pub fn setup(&self, callback: Arc<dyn PreviewCallback>) -> Result<()> {
        let mut camera = self.camera.lock();
        if camera.is_some() {
            debug!("Camera already open");
            return Ok(());
        }

        let mut cam = self.open_camera()?;

        let config = match self.start(&mut cam, callback) {
            Ok(config) => config,
            Err(e) => {
                error!("Camera {} setup failed: {}", cam.id, e);
                cam.device.set_preview_callback(None);
                cam.device.release();
                self.autofocus.shutdown();
                self.state.orientation().invalidate();
                self.state.set_preview_size(None);
                return Err(e.into());
            }
        };

        info!("Camera {} started", cam.id);
        *camera = Some(cam);
        drop(camera);

        if config.focus_mode == FocusMode::Auto {
            debug!("Running initial autofocus");
            self.autofocus.request(FocusRequest::Center);
        }

        Ok(())
    }

    fn open_camera(&self) -> std::result::Result<OpenCamera, CameraError> {
        let count = self.provider.camera_count();
        if count == 0 {
            return Err(CameraError::NoCamera);
        }

        let wanted = if self.preferences.options.use_front_camera {
            CameraFacing::Front
        } else {
            CameraFacing::Back
        };

        let id = (0..count)
            .find(|id| {
                self.provider
                    .camera_info(*id)
                    .is_some_and(|info| info.facing == wanted)
            })
            .unwrap_or_else(|| {
                warn!("No {:?} facing camera found, using camera 0", wanted);
                0
            });

        let sensor = self.provider.camera_info(id).ok_or(CameraError::DeviceOpen {
            id,
            details: "camera info unavailable".to_string(),
        })?;

        info!(
            "Opening camera {} ({:?}, mounted at {} degrees)",
            id, sensor.facing, sensor.orientation
        );
        let device = self.provider.open(id)?;

        Ok(OpenCamera {
            id,
            sensor,
            device,
            capabilities: CameraCapabilities::default(),
            pool: None,
        })
    }

    fn start(
        &self,
        cam: &mut OpenCamera,
        callback: Arc<dyn PreviewCallback>,
    ) -> std::result::Result<CameraConfig, CameraError> {
        let config = self.configure(cam)?;
        self.allocate_buffers(cam, &config)?;
        cam.device.start_preview()?;
        cam.device.set_preview_callback(Some(callback));
        Ok(config)
    }

    /// Negotiate and commit parameters, then refresh the cached orientation
    fn configure(&self, cam: &mut OpenCamera) -> std::result::Result<CameraConfig, CameraError> {
        let capabilities = cam.device.capabilities()?;
        let current = cam.device.parameters()?;
        let torch_on = self.torch_on.load(Ordering::Acquire);

        let config = negotiate(&capabilities, &current, &self.preferences, torch_on);
        cam.device.commit(&config)?;
        debug!("Committed camera parameters: {:?}", config);

        cam.capabilities = capabilities;
        self.state.set_preview_size(config.preview_size);
        self.autofocus.on_configured(config.focus_mode);
        self.apply_orientation(cam);

        Ok(config)
    }

    fn allocate_buffers(&self, cam: &mut OpenCamera, config: &CameraConfig) -> std::result::Result<(), CameraError> {
        let size: Resolution = config.preview_size.ok_or(CameraError::Configuration {
            details: "preview size unknown after commit".to_string(),
        })?;
        let bytes = PixelFormat::Nv21.buffer_size(size.width, size.height);

        if let Some(pool) = &cam.pool {
            if pool.buffer_size() == bytes {
                return Ok(());
            }
        }

        let count = self.settings.preview_buffer_count;
        debug!("Allocating {} preview buffers of {} bytes", count, bytes);
        let pool = BufferPool::new(count, bytes);
        cam.device.set_buffer_pool(Arc::clone(&pool));
        cam.pool = Some(pool);
        Ok(())
    }

    fn apply_orientation(&self, cam: &mut OpenCamera) {
        let degrees = corrected_degrees(
            self.state.display_rotation(),
            cam.sensor.facing,
            cam.sensor.orientation,
        );

        let cache = self.state.orientation();
        let changed = !cache.is_valid() || cache.degrees() != degrees;
        cache.store(degrees);

        if let Err(e) = cam.device.set_display_orientation(degrees) {
            warn!("Failed to set display orientation: {}", e);
        }

        if changed {
            info!("Camera orientation set to {} degrees", degrees);
            if let Err(e) = self.event_bus.publish_now(ScannerEvent::OrientationChanged {
                degrees,
                timestamp: SystemTime::now(),
            }) {
                debug!("No subscriber for orientation change: {}", e);
            }
        }
    }

    /// Stop preview, renegotiate and restart preview
    pub fn refresh(&self) -> Result<()> {
        let mut camera = self.camera.lock();
        let Some(cam) = camera.as_mut() else {
            debug!("Refresh requested with no open camera");
            return Ok(());
        };

        if let Err(e) = cam.device.stop_preview() {
            warn!("Failed to stop preview before refresh: {}", e);
        }

        let config = self.configure(cam)?;
        self.allocate_buffers(cam, &config)?;
        cam.device.start_preview()?;

        info!("Camera {} refreshed", cam.id);
        Ok(())
    }

    /// Record a display rotation and re-derive the corrected orientation
    pub fn set_display_rotation(&self, rotation: DisplayRotation) {
        if self.state.set_display_rotation(rotation) {
            debug!("Display rotation changed to {} degrees", rotation.degrees());
        }

        let mut camera = self.camera.lock();
        match camera.as_mut() {
            Some(cam) => self.apply_orientation(cam),
            None => debug!("Rotation change with no open camera"),
        }
    }

    /// Record the torch state; exposure follows it in low-light mode
    pub fn set_torch(&self, on: bool) -> Result<()> {
        self.torch_on.store(on, Ordering::Release);

        if !self.preferences.options.low_light_mode {
            debug!("Torch {} without low-light mode", if on { "on" } else { "off" });
            return Ok(());
        }

        self.set_best_exposure(on)
    }

    pub fn is_torch_on(&self) -> bool {
        self.torch_on.load(Ordering::Acquire)
    }

    fn set_best_exposure(&self, torch_on: bool) -> Result<()> {
        let mut camera = self.camera.lock();
        let Some(cam) = camera.as_mut() else {
            debug!("Exposure change with no open camera");
            return Ok(());
        };

        let mut params = cam.device.parameters()?;
        match best_exposure(&cam.capabilities, torch_on) {
            Some(steps) if steps != params.exposure_compensation => {
                info!("Setting exposure compensation to {}", steps);
                params.exposure_compensation = steps;
                cam.device.commit(&params)?;
            }
            Some(steps) => debug!("Exposure compensation already at {}", steps),
            None => debug!("Camera does not support exposure compensation"),
        }

        Ok(())
    }

    /// One-shot autofocus with the configured areas
    pub fn auto_focus(&self) {
        self.autofocus.request(FocusRequest::Center);
    }

    /// Focus on a point given in view pixels
    pub fn auto_focus_at(&self, x: f32, y: f32, view: Resolution) {
        let request = FocusRequest::Point {
            x: focus_coordinate(x, view.width),
            y: focus_coordinate(y, view.height),
        };
        self.autofocus.request(request);
    }

    /// Cancel focus work, stop preview and release the device
    pub fn shutdown(&self) {
        self.autofocus.shutdown();

        let taken = self.camera.lock().take();
        if let Some(mut cam) = taken {
            cam.device.set_preview_callback(None);
            if let Err(e) = cam.device.stop_preview() {
                warn!("Failed to stop preview: {}", e);
            }
            cam.device.cancel_auto_focus();
            cam.device.release();
            info!("Camera {} released", cam.id);
        } else {
            debug!("Shutdown with no open camera");
        }

        self.state.orientation().invalidate();
        self.state.set_preview_size(None);
    }
}

impl Drop for CameraController {
    fn drop(&mut self) {
        if let Some(mut cam) = self.camera.lock().take() {
            cam.device.set_preview_callback(None);
            cam.device.release();
        }
    }
}
