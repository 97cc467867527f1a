use super::capabilities::{
    CameraCapabilities, CameraConfig, FocusMode, FpsRange, MeteringArea, Resolution, SceneMode,
};
use crate::config::ScanningOptions;
use crate::frame::PixelFormat;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Smallest acceptable preview, as (width, height)
const MIN_PREVIEW: (u32, u32) = (640, 360);
/// Largest acceptable preview, as (width, height)
const MAX_PREVIEW: (u32, u32) = (1000, 1000);

/// Devices whose model name contains this are forced to a fixed preview mode
const HEAD_MOUNTED_MODEL: &str = "Glass";
const HEAD_MOUNTED_PREVIEW: Resolution = Resolution::new(640, 360);
const HEAD_MOUNTED_FPS: FpsRange = FpsRange::new(30_000, 30_000);

/// Exposure compensation targets, in EV
const EXPOSURE_TARGET_TORCH_ON: f32 = 0.0;
const EXPOSURE_TARGET_TORCH_OFF: f32 = 1.5;

pub const DEFAULT_FOCUS_AREA_FRACTION: f32 = 0.8;

/// Caller hook that picks a preview size from the supported list
pub type ResolutionSelector = Arc<dyn Fn(&[Resolution]) -> Option<Resolution> + Send + Sync>;

/// Inputs to parameter negotiation that come from the caller
#[derive(Clone)]
pub struct CameraPreferences {
    pub options: ScanningOptions,
    pub focus_area_fraction: f32,
    pub resolution_selector: Option<ResolutionSelector>,
}

impl Default for CameraPreferences {
    fn default() -> Self {
        Self {
            options: ScanningOptions::default(),
            focus_area_fraction: DEFAULT_FOCUS_AREA_FRACTION,
            resolution_selector: None,
        }
    }
}

impl fmt::Debug for CameraPreferences {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraPreferences")
            .field("options", &self.options)
            .field("focus_area_fraction", &self.focus_area_fraction)
            .field("resolution_selector", &self.resolution_selector.is_some())
            .finish()
    }
}

/// Preview size picked for this device, with an optional frame-rate override
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionChoice {
    pub size: Resolution,
    pub fps_override: Option<FpsRange>,
}

/// Pick the focus mode by fixed priority
pub fn select_focus_mode(capabilities: &CameraCapabilities, disable_autofocus: bool) -> FocusMode {
    if disable_autofocus {
        return FocusMode::Fixed;
    }

    [
        FocusMode::ContinuousPicture,
        FocusMode::ContinuousVideo,
        FocusMode::Auto,
    ]
    .into_iter()
    .find(|mode| capabilities.supports_focus_mode(*mode))
    .unwrap_or(FocusMode::Fixed)
}

/// Pick the widest frame-rate range.
///
/// A candidate replaces the current best only when it reaches at least as
/// high and at least as low with one of the two strictly better, so the
/// first of several equally good ranges is kept.
pub fn select_fps_range(ranges: &[FpsRange]) -> Option<FpsRange> {
    let mut best: Option<FpsRange> = None;
    for candidate in ranges {
        match best {
            Some(current) if !candidate.dominates(&current) => {}
            _ => best = Some(*candidate),
        }
    }
    best
}

/// Pick a preview size, or `None` to keep the device default.
///
/// Head-mounted devices always get their fixed mode, whatever the
/// selector or the range search picked.
pub fn select_resolution(
    capabilities: &CameraCapabilities,
    selector: Option<&ResolutionSelector>,
) -> Option<ResolutionChoice> {
    let mut choice = None;

    if !capabilities.preview_sizes.is_empty() {
        choice = selector
            .and_then(|selector| selector(&capabilities.preview_sizes))
            .or_else(|| {
                capabilities
                    .preview_sizes
                    .iter()
                    .find(|size| {
                        (MIN_PREVIEW.0..=MAX_PREVIEW.0).contains(&size.width)
                            && (MIN_PREVIEW.1..=MAX_PREVIEW.1).contains(&size.height)
                    })
                    .copied()
            })
            .map(|size| ResolutionChoice {
                size,
                fps_override: None,
            });
    }

    if capabilities.model.contains(HEAD_MOUNTED_MODEL) {
        if let Some(previous) = &choice {
            debug!(
                "Head-mounted device, replacing preview size {:?} with {:?}",
                previous.size, HEAD_MOUNTED_PREVIEW
            );
        }
        choice = Some(ResolutionChoice {
            size: HEAD_MOUNTED_PREVIEW,
            fps_override: Some(HEAD_MOUNTED_FPS),
        });
    }

    choice
}

/// Centered area covering `fraction` of the coordinate space on each axis
pub fn middle_area(fraction: f32) -> MeteringArea {
    let half = (1000.0 * fraction.clamp(0.0, 1.0)).round() as i32;
    MeteringArea::new(-half, -half, half, half, 1)
}

/// Exposure compensation steps for the torch state, or `None` when the
/// device has no usable compensation range
pub fn best_exposure(capabilities: &CameraCapabilities, torch_on: bool) -> Option<i32> {
    if !capabilities.supports_exposure_compensation() {
        return None;
    }

    let target = if torch_on {
        EXPOSURE_TARGET_TORCH_ON
    } else {
        EXPOSURE_TARGET_TORCH_OFF
    };
    let steps = (target / capabilities.exposure_compensation_step) as i32;

    Some(steps.clamp(
        capabilities.min_exposure_compensation,
        capabilities.max_exposure_compensation,
    ))
}

/// Derive the parameter snapshot to commit from device capabilities,
/// the currently applied parameters and caller preferences.
pub fn negotiate(
    capabilities: &CameraCapabilities,
    current: &CameraConfig,
    preferences: &CameraPreferences,
    torch_on: bool,
) -> CameraConfig {
    let options = &preferences.options;
    let mut config = current.clone();

    if options.pure_barcode && capabilities.supports_scene_mode(SceneMode::Barcode) {
        if current.scene_mode == SceneMode::Barcode {
            debug!("Barcode scene mode already set");
        } else {
            info!("Enabling barcode scene mode");
            config.scene_mode = SceneMode::Barcode;
        }
    }

    if capabilities.video_stabilization_supported {
        if current.video_stabilization {
            debug!("Video stabilization already enabled");
        } else {
            info!("Enabling video stabilization");
            config.video_stabilization = true;
        }
    }

    config.focus_mode = select_focus_mode(capabilities, options.disable_autofocus);
    info!("Focus mode: {:?}", config.focus_mode);

    match best_exposure(capabilities, torch_on) {
        Some(steps) if steps == current.exposure_compensation => {
            debug!("Exposure compensation already at {}", steps);
        }
        Some(steps) => {
            info!(
                "Setting exposure compensation to {} ({:.2} EV)",
                steps,
                steps as f32 * capabilities.exposure_compensation_step
            );
            config.exposure_compensation = steps;
        }
        None => debug!("Camera does not support exposure compensation"),
    }

    if let Some(range) = select_fps_range(&capabilities.fps_ranges) {
        info!("FPS range: {} - {}", range.min, range.max);
        config.fps_range = Some(range);
    }

    match select_resolution(capabilities, preferences.resolution_selector.as_ref()) {
        Some(choice) => {
            info!("Preview size: {}x{}", choice.size.width, choice.size.height);
            config.preview_size = Some(choice.size);
            if let Some(range) = choice.fps_override {
                info!("FPS range forced to {} - {}", range.min, range.max);
                config.fps_range = Some(range);
            }
        }
        None => warn!("No suitable preview size, keeping device default"),
    }

    let area = middle_area(preferences.focus_area_fraction);
    if capabilities.max_focus_areas > 0 {
        debug!("Focus area: {}", area);
        config.focus_areas = vec![area];
    }
    if capabilities.max_metering_areas > 0 {
        debug!("Metering area: {}", area);
        config.metering_areas = vec![area];
    }

    config.recording_hint = true;
    config.preview_format = PixelFormat::Nv21;

    config
}
