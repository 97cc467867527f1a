use super::capabilities::Resolution;
use crate::orientation::{DisplayRotation, OrientationCache};
use parking_lot::RwLock;

/// Camera facts read on the decode path, written only by the control path
#[derive(Debug, Default)]
pub struct CameraState {
    orientation: OrientationCache,
    preview_size: RwLock<Option<Resolution>>,
    display_rotation: RwLock<DisplayRotation>,
}

impl CameraState {
    pub fn new(display_rotation: DisplayRotation) -> Self {
        Self {
            orientation: OrientationCache::new(),
            preview_size: RwLock::new(None),
            display_rotation: RwLock::new(display_rotation),
        }
    }

    pub fn orientation(&self) -> &OrientationCache {
        &self.orientation
    }

    pub fn preview_size(&self) -> Option<Resolution> {
        *self.preview_size.read()
    }

    pub(crate) fn set_preview_size(&self, size: Option<Resolution>) {
        *self.preview_size.write() = size;
    }

    pub fn display_rotation(&self) -> DisplayRotation {
        *self.display_rotation.read()
    }

    /// Returns whether the rotation changed
    pub(crate) fn set_display_rotation(&self, rotation: DisplayRotation) -> bool {
        let mut current = self.display_rotation.write();
        let changed = *current != rotation;
        *current = rotation;
        changed
    }
}
