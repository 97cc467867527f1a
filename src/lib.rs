pub mod analyzer;
pub mod buffer_pool;
pub mod camera;
pub mod config;
pub mod error;
pub mod events;
pub mod frame;
pub mod luminance;
pub mod orientation;
pub mod session;

pub use analyzer::{
    BarcodeDecoder, BarcodeFormat, DecodeHints, DecodeResult, DecoderSet, FrameGate,
    FrameProcessor, ProcessorStatsSnapshot, ScanSchedulingState,
};
pub use buffer_pool::{BufferPool, PooledBuffer};
pub use camera::{
    AutofocusState, CameraCapabilities, CameraConfig, CameraController, CameraDevice,
    CameraPreferences, CameraProvider, FocusMode, PreviewCallback, Resolution,
};
pub use config::{BarcamConfig, CameraSettings, ScanningOptions, SystemConfig};
pub use error::{BarcamError, CameraError, DecodeError, Result};
pub use events::{
    spawn_event_handler, EventBus, EventFilter, EventHandler, EventReceiver, ScannerEvent,
};
pub use frame::{FrameData, PixelFormat};
pub use luminance::LuminanceSource;
pub use orientation::{corrected_degrees, CameraFacing, DisplayRotation};
pub use session::{ScannerSession, ScannerSessionBuilder};
