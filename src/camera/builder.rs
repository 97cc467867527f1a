use super::configurator::{CameraPreferences, ResolutionSelector};
use super::controller::CameraController;
use super::device::CameraProvider;
use crate::config::{CameraSettings, ScanningOptions};
use crate::error::{BarcamError, Result};
use crate::events::EventBus;
use std::sync::Arc;

/// Builder for the camera controller
pub struct CameraControllerBuilder {
    provider: Option<Arc<dyn CameraProvider>>,
    options: ScanningOptions,
    settings: CameraSettings,
    resolution_selector: Option<ResolutionSelector>,
    event_bus: Option<Arc<EventBus>>,
}

impl CameraControllerBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            options: ScanningOptions::default(),
            settings: CameraSettings::default(),
            resolution_selector: None,
            event_bus: None,
        }
    }

    pub fn provider(mut self, provider: Arc<dyn CameraProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn options(mut self, options: ScanningOptions) -> Self {
        self.options = options;
        self
    }

    pub fn settings(mut self, settings: CameraSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn resolution_selector(mut self, selector: ResolutionSelector) -> Self {
        self.resolution_selector = Some(selector);
        self
    }

    pub fn event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn build(self) -> Result<CameraController> {
        let provider = self
            .provider
            .ok_or_else(|| BarcamError::system("Camera provider must be specified"))?;
        let event_bus = self
            .event_bus
            .ok_or_else(|| BarcamError::system("Event bus must be specified"))?;

        let preferences = CameraPreferences {
            options: self.options,
            focus_area_fraction: self.settings.focus_area_fraction,
            resolution_selector: self.resolution_selector,
        };

        CameraController::new(provider, preferences, self.settings, event_bus)
    }
}

impl Default for CameraControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
