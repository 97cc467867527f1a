use crate::frame::PixelFormat;
use crate::orientation::CameraFacing;
use serde::{Deserialize, Serialize};

/// Bounds of the focus/metering coordinate space
pub const AREA_MIN: i32 = -1000;
pub const AREA_MAX: i32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Preview frame-rate range, in frames per second scaled by 1000
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FpsRange {
    pub min: u32,
    pub max: u32,
}

impl FpsRange {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// At least as wide as `other` on both ends and strictly wider on one
    pub fn dominates(&self, other: &FpsRange) -> bool {
        self.max >= other.max && self.min <= other.min && (self.max > other.max || self.min < other.min)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FocusMode {
    Fixed,
    Auto,
    ContinuousPicture,
    ContinuousVideo,
}

impl FocusMode {
    pub fn is_continuous(&self) -> bool {
        matches!(self, FocusMode::ContinuousPicture | FocusMode::ContinuousVideo)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SceneMode {
    Auto,
    Barcode,
    Action,
    Night,
}

/// Weighted rectangle in the -1000..1000 sensor coordinate space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeteringArea {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub weight: u32,
}

impl MeteringArea {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32, weight: u32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
            weight,
        }
    }

    pub fn is_within_bounds(&self) -> bool {
        [self.left, self.top, self.right, self.bottom]
            .iter()
            .all(|v| (AREA_MIN..=AREA_MAX).contains(v))
    }
}

impl std::fmt::Display for MeteringArea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} {} (weight {})",
            self.left, self.top, self.right, self.bottom, self.weight
        )
    }
}

/// Static description of a camera sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorInfo {
    pub facing: CameraFacing,
    /// Vendor-reported mounting rotation in degrees
    pub orientation: u16,
}

/// Everything the device reports about what it can do, read once per
/// configuration pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraCapabilities {
    pub model: String,
    pub preview_sizes: Vec<Resolution>,
    pub fps_ranges: Vec<FpsRange>,
    pub focus_modes: Vec<FocusMode>,
    pub scene_modes: Vec<SceneMode>,
    pub min_exposure_compensation: i32,
    pub max_exposure_compensation: i32,
    pub exposure_compensation_step: f32,
    pub max_focus_areas: u32,
    pub max_metering_areas: u32,
    pub video_stabilization_supported: bool,
}

impl CameraCapabilities {
    pub fn supports_focus_mode(&self, mode: FocusMode) -> bool {
        self.focus_modes.contains(&mode)
    }

    pub fn supports_scene_mode(&self, mode: SceneMode) -> bool {
        self.scene_modes.contains(&mode)
    }

    pub fn supports_exposure_compensation(&self) -> bool {
        (self.min_exposure_compensation != 0 || self.max_exposure_compensation != 0)
            && self.exposure_compensation_step > 0.0
    }
}

impl Default for CameraCapabilities {
    fn default() -> Self {
        Self {
            model: String::new(),
            preview_sizes: Vec::new(),
            fps_ranges: Vec::new(),
            focus_modes: vec![FocusMode::Fixed],
            scene_modes: vec![SceneMode::Auto],
            min_exposure_compensation: 0,
            max_exposure_compensation: 0,
            exposure_compensation_step: 0.0,
            max_focus_areas: 0,
            max_metering_areas: 0,
            video_stabilization_supported: false,
        }
    }
}

/// Parameter snapshot committed to the hardware in a single call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub preview_size: Option<Resolution>,
    pub preview_format: PixelFormat,
    pub fps_range: Option<FpsRange>,
    pub focus_mode: FocusMode,
    pub focus_areas: Vec<MeteringArea>,
    pub metering_areas: Vec<MeteringArea>,
    pub exposure_compensation: i32,
    pub scene_mode: SceneMode,
    pub video_stabilization: bool,
    pub recording_hint: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            preview_size: None,
            preview_format: PixelFormat::Nv21,
            fps_range: None,
            focus_mode: FocusMode::Fixed,
            focus_areas: Vec::new(),
            metering_areas: Vec::new(),
            exposure_compensation: 0,
            scene_mode: SceneMode::Auto,
            video_stabilization: false,
            recording_hint: false,
        }
    }
}
