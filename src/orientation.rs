//! Display-orientation correction for camera sensor data.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};

/// Device display rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DisplayRotation {
    #[default]
    Rotation0,
    Rotation90,
    Rotation180,
    Rotation270,
}

impl DisplayRotation {
    /// Get rotation angle in degrees
    pub fn degrees(&self) -> u16 {
        match self {
            DisplayRotation::Rotation0 => 0,
            DisplayRotation::Rotation90 => 90,
            DisplayRotation::Rotation180 => 180,
            DisplayRotation::Rotation270 => 270,
        }
    }

    pub fn from_degrees(degrees: u16) -> Option<Self> {
        match degrees {
            0 => Some(DisplayRotation::Rotation0),
            90 => Some(DisplayRotation::Rotation90),
            180 => Some(DisplayRotation::Rotation180),
            270 => Some(DisplayRotation::Rotation270),
            _ => None,
        }
    }
}

/// Which way the sensor faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraFacing {
    Back,
    Front,
}

/// Rotation needed to align sensor pixels with the current display orientation.
///
/// `mount_offset` is the vendor-reported sensor orientation in degrees. Front
/// sensors are mirrored, so their result is reflected back into the
/// 0..360 range.
pub fn corrected_degrees(rotation: DisplayRotation, facing: CameraFacing, mount_offset: u16) -> u16 {
    let mount = u32::from(mount_offset % 360);
    let display = u32::from(rotation.degrees());

    let corrected = match facing {
        CameraFacing::Front => {
            let raw = (mount + display) % 360;
            (360 - raw) % 360
        }
        CameraFacing::Back => (mount + 360 - display) % 360,
    };

    corrected as u16
}

/// Whether a luminance view must be rotated before decoding
pub fn needs_rotation(corrected: u16) -> bool {
    corrected == 90 || corrected == 270
}

/// Last corrected orientation, written by the control path and read on
/// every decode.
#[derive(Debug, Default)]
pub struct OrientationCache {
    degrees: AtomicU16,
    valid: AtomicBool,
}

impl OrientationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, degrees: u16) {
        self.degrees.store(degrees, Ordering::Release);
        self.valid.store(true, Ordering::Release);
    }

    /// Cached degrees, or 0 before the first commit
    pub fn degrees(&self) -> u16 {
        self.degrees.load(Ordering::Acquire)
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }
}
