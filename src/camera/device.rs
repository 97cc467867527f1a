use super::capabilities::{CameraCapabilities, CameraConfig, SensorInfo};
use crate::buffer_pool::BufferPool;
use crate::error::CameraError;
use crate::frame::FrameData;
use parking_lot::Mutex;
use std::sync::Arc;

/// Receiver for frames delivered by the capture layer.
///
/// Called on the camera's delivery thread; implementations must return
/// quickly and must not panic.
pub trait PreviewCallback: Send + Sync {
    fn on_preview_frame(&self, frame: FrameData);
}

/// Narrow command interface over one opened camera
pub trait CameraDevice: Send {
    fn capabilities(&self) -> Result<CameraCapabilities, CameraError>;

    /// Currently applied parameters
    fn parameters(&self) -> Result<CameraConfig, CameraError>;

    /// Apply a full parameter snapshot atomically
    fn commit(&mut self, config: &CameraConfig) -> Result<(), CameraError>;

    fn set_display_orientation(&mut self, degrees: u16) -> Result<(), CameraError>;

    /// Buffers the capture layer fills with preview frames
    fn set_buffer_pool(&mut self, pool: Arc<BufferPool>);

    fn set_preview_callback(&mut self, callback: Option<Arc<dyn PreviewCallback>>);

    fn start_preview(&mut self) -> Result<(), CameraError>;

    fn stop_preview(&mut self) -> Result<(), CameraError>;

    /// Start a one-shot focus sweep in the current focus mode
    fn auto_focus(&mut self) -> Result<(), CameraError>;

    fn cancel_auto_focus(&mut self);

    fn release(&mut self);
}

/// Enumerates and opens cameras
pub trait CameraProvider: Send + Sync {
    fn camera_count(&self) -> u32;

    fn camera_info(&self, id: u32) -> Option<SensorInfo>;

    fn open(&self, id: u32) -> Result<Box<dyn CameraDevice>, CameraError>;
}

/// An opened camera with the facts gathered at open and at the last
/// configuration pass
pub struct OpenCamera {
    pub id: u32,
    pub sensor: SensorInfo,
    pub device: Box<dyn CameraDevice>,
    pub capabilities: CameraCapabilities,
    pub pool: Option<Arc<BufferPool>>,
}

/// Single owner of the hardware handle; `None` while no camera is open
pub type SharedCamera = Arc<Mutex<Option<OpenCamera>>>;
