use crate::analyzer::BarcodeFormat;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct BarcamConfig {
    #[serde(default)]
    pub scanning: ScanningOptions,
    #[serde(default)]
    pub camera: CameraSettings,
    #[serde(default)]
    pub system: SystemConfig,
}

/// Read-only preference bag consumed by the scheduling and camera layers
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScanningOptions {
    /// Minimum delay between two analyzed frames, in milliseconds
    #[serde(default = "default_delay_between_analyzing_frames")]
    pub delay_between_analyzing_frames_ms: u64,

    /// Cooldown after a successful decode before the next analysis, in milliseconds
    #[serde(default = "default_delay_between_continuous_scans")]
    pub delay_between_continuous_scans_ms: u64,

    /// Force fixed focus and ignore focus requests
    #[serde(default)]
    pub disable_autofocus: bool,

    /// Prefer a front-facing camera when one exists
    #[serde(default)]
    pub use_front_camera: bool,

    /// Request the barcode scene mode and forward the pure-barcode hint
    #[serde(default)]
    pub pure_barcode: bool,

    /// Lower exposure compensation while the torch is lit
    #[serde(default)]
    pub low_light_mode: bool,

    /// Prefer the native vision decoder when one is registered
    #[serde(default)]
    pub use_native_scanning: bool,

    /// Forwarded to the decoder
    #[serde(default)]
    pub try_harder: bool,

    /// Formats the decoder should look for (empty means all)
    #[serde(default)]
    pub possible_formats: Vec<BarcodeFormat>,
}

impl ScanningOptions {
    pub fn min_frame_interval(&self) -> Duration {
        Duration::from_millis(self.delay_between_analyzing_frames_ms)
    }

    pub fn min_post_scan_interval(&self) -> Duration {
        Duration::from_millis(self.delay_between_continuous_scans_ms)
    }
}

impl Default for ScanningOptions {
    fn default() -> Self {
        Self {
            delay_between_analyzing_frames_ms: default_delay_between_analyzing_frames(),
            delay_between_continuous_scans_ms: default_delay_between_continuous_scans(),
            disable_autofocus: false,
            use_front_camera: false,
            pure_barcode: false,
            low_light_mode: false,
            use_native_scanning: false,
            try_harder: false,
            possible_formats: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraSettings {
    /// Size of the centered focus/metering rectangle as a fraction of the area space
    #[serde(default = "default_focus_area_fraction")]
    pub focus_area_fraction: f32,

    /// Delay before continuous autofocus is restored after a manual focus, in milliseconds
    #[serde(default = "default_reactivation_delay")]
    pub reactivation_delay_ms: u64,

    /// Number of preview buffers handed to the capture layer
    #[serde(default = "default_preview_buffer_count")]
    pub preview_buffer_count: usize,

    /// Display rotation assumed at setup, in degrees
    #[serde(default)]
    pub initial_rotation: u16,
}

impl CameraSettings {
    pub fn reactivation_delay(&self) -> Duration {
        Duration::from_millis(self.reactivation_delay_ms)
    }
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            focus_area_fraction: default_focus_area_fraction(),
            reactivation_delay_ms: default_reactivation_delay(),
            preview_buffer_count: default_preview_buffer_count(),
            initial_rotation: 0,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            event_bus_capacity: default_event_bus_capacity(),
        }
    }
}

impl BarcamConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("barcam.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default(
                "scanning.delay_between_analyzing_frames_ms",
                default_delay_between_analyzing_frames(),
            )?
            .set_default(
                "scanning.delay_between_continuous_scans_ms",
                default_delay_between_continuous_scans(),
            )?
            .set_default("scanning.disable_autofocus", false)?
            .set_default("scanning.use_front_camera", false)?
            .set_default("scanning.pure_barcode", false)?
            .set_default("scanning.low_light_mode", false)?
            .set_default("scanning.use_native_scanning", false)?
            .set_default("scanning.try_harder", false)?
            .set_default(
                "camera.focus_area_fraction",
                default_focus_area_fraction() as f64,
            )?
            .set_default("camera.reactivation_delay_ms", default_reactivation_delay())?
            .set_default(
                "camera.preview_buffer_count",
                default_preview_buffer_count() as i64,
            )?
            .set_default("camera.initial_rotation", 0)?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .add_source(File::with_name(&path_str).required(false))
            // BARCAM_SCANNING__PURE_BARCODE=true
            .add_source(
                Environment::with_prefix("BARCAM")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: BarcamConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scanning.delay_between_continuous_scans_ms
            < self.scanning.delay_between_analyzing_frames_ms
        {
            return Err(ConfigError::Message(
                "delay_between_continuous_scans_ms must not be shorter than delay_between_analyzing_frames_ms"
                    .to_string(),
            ));
        }

        if !(self.camera.focus_area_fraction > 0.0 && self.camera.focus_area_fraction <= 1.0) {
            return Err(ConfigError::Message(
                "Camera focus_area_fraction must be in (0, 1]".to_string(),
            ));
        }

        if self.camera.preview_buffer_count == 0 {
            return Err(ConfigError::Message(
                "Camera preview_buffer_count must be greater than 0".to_string(),
            ));
        }

        if !matches!(self.camera.initial_rotation, 0 | 90 | 180 | 270) {
            return Err(ConfigError::Message(format!(
                "Camera initial_rotation must be 0, 90, 180 or 270 (got {})",
                self.camera.initial_rotation
            )));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

// Default value functions
fn default_delay_between_analyzing_frames() -> u64 {
    150
}
fn default_delay_between_continuous_scans() -> u64 {
    1000
}

fn default_focus_area_fraction() -> f32 {
    0.8
}
fn default_reactivation_delay() -> u64 {
    2000
}
fn default_preview_buffer_count() -> usize {
    5
}

fn default_event_bus_capacity() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = BarcamConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(
            config.scanning.min_frame_interval(),
            Duration::from_millis(150)
        );
        assert_eq!(
            config.scanning.min_post_scan_interval(),
            Duration::from_millis(1000)
        );
        assert_eq!(config.camera.reactivation_delay(), Duration::from_secs(2));
        assert_eq!(config.camera.preview_buffer_count, 5);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[scanning]
delay_between_analyzing_frames_ms = 50
pure_barcode = true
possible_formats = ["QrCode", "Ean13"]

[camera]
reactivation_delay_ms = 500
"#
        )
        .unwrap();

        let config = BarcamConfig::load_from_file(file.path()).unwrap();

        assert_eq!(config.scanning.delay_between_analyzing_frames_ms, 50);
        assert_eq!(config.scanning.delay_between_continuous_scans_ms, 1000);
        assert!(config.scanning.pure_barcode);
        assert_eq!(
            config.scanning.possible_formats,
            vec![BarcodeFormat::QrCode, BarcodeFormat::Ean13]
        );
        assert_eq!(config.camera.reactivation_delay_ms, 500);
        assert_eq!(config.camera.focus_area_fraction, 0.8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_environment_variable_override() {
        env::set_var("BARCAM_SCANNING__LOW_LIGHT_MODE", "true");

        let config = BarcamConfig::load_from_file("does-not-exist.toml").unwrap();
        assert!(config.scanning.low_light_mode);

        env::remove_var("BARCAM_SCANNING__LOW_LIGHT_MODE");
    }

    #[test]
    fn test_config_validation() {
        let mut config = BarcamConfig::default();

        config.scanning.delay_between_continuous_scans_ms = 10;
        assert!(config.validate().is_err());
        config.scanning.delay_between_continuous_scans_ms = 1000;

        config.camera.focus_area_fraction = 1.5;
        assert!(config.validate().is_err());
        config.camera.focus_area_fraction = 0.8;

        config.camera.initial_rotation = 45;
        assert!(config.validate().is_err());
        config.camera.initial_rotation = 270;

        config.camera.preview_buffer_count = 0;
        assert!(config.validate().is_err());
        config.camera.preview_buffer_count = 3;

        assert!(config.validate().is_ok());
    }
}
