mod autofocus;
mod builder;
mod capabilities;
mod configurator;
mod controller;
mod device;
pub mod mock;
mod state;

pub use autofocus::{
    focus_area_around, focus_coordinate, AutofocusCoordinator, AutofocusState, FocusRequest,
};
pub use builder::CameraControllerBuilder;
pub use capabilities::{
    CameraCapabilities, CameraConfig, FocusMode, FpsRange, MeteringArea, Resolution, SceneMode,
    SensorInfo, AREA_MAX, AREA_MIN,
};
pub use configurator::{
    best_exposure, middle_area, negotiate, select_focus_mode, select_fps_range,
    select_resolution, CameraPreferences, ResolutionChoice, ResolutionSelector,
    DEFAULT_FOCUS_AREA_FRACTION,
};
pub use controller::CameraController;
pub use device::{CameraDevice, CameraProvider, OpenCamera, PreviewCallback, SharedCamera};
pub use state::CameraState;
