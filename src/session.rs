use crate::analyzer::{
    BarcodeDecoder, DecodeHints, DecoderSet, FrameGate, FrameProcessor, ProcessorStatsSnapshot,
};
use crate::camera::{
    AutofocusState, CameraController, CameraControllerBuilder, CameraProvider, PreviewCallback,
    Resolution, ResolutionSelector,
};
use crate::config::BarcamConfig;
use crate::error::{BarcamError, Result};
use crate::events::{EventBus, ScannerEvent};
use crate::orientation::DisplayRotation;

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One camera scanning session: the camera controller plus the frame
/// processor it feeds.
pub struct ScannerSession {
    id: Uuid,
    config: BarcamConfig,
    event_bus: Arc<EventBus>,
    controller: CameraController,
    processor: Arc<FrameProcessor>,
    configured: AtomicBool,
    view_size: RwLock<Option<Resolution>>,
}

impl ScannerSession {
    pub fn builder() -> ScannerSessionBuilder {
        ScannerSessionBuilder::new()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &BarcamConfig {
        &self.config
    }

    pub fn is_configured(&self) -> bool {
        self.configured.load(Ordering::Acquire)
    }

    /// Open and start the camera. Analysis stays paused until
    /// [`resume_analysis`](Self::resume_analysis).
    pub fn setup_camera(&self) -> Result<()> {
        if self.configured.swap(true, Ordering::AcqRel) {
            debug!("Session {} camera already configured", self.id);
            return Ok(());
        }

        let callback: Arc<dyn PreviewCallback> = self.processor.clone();
        match self.controller.setup(callback) {
            Ok(()) => {
                info!("Session {} camera configured", self.id);
                self.publish(ScannerEvent::CameraStatusChanged {
                    configured: true,
                    timestamp: SystemTime::now(),
                });
                Ok(())
            }
            Err(e) => {
                self.configured.store(false, Ordering::Release);
                self.publish(ScannerEvent::SystemError {
                    component: "camera".to_string(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Stop analysis, cancel focus work and release the camera
    pub fn shutdown_camera(&self) {
        if !self.configured.swap(false, Ordering::AcqRel) {
            debug!("Session {} camera not configured", self.id);
            return;
        }

        self.processor.shutdown();
        self.controller.shutdown();

        info!("Session {} camera shut down", self.id);
        self.publish(ScannerEvent::CameraStatusChanged {
            configured: false,
            timestamp: SystemTime::now(),
        });
    }

    pub fn pause_analysis(&self) {
        self.processor.pause_analysis();
    }

    pub fn resume_analysis(&self) {
        self.processor.resume_analysis();
    }

    pub fn is_analyzing(&self) -> bool {
        self.processor.is_analyzing()
    }

    pub fn auto_focus(&self) {
        self.controller.auto_focus();
    }

    /// Focus on a point in view pixels.
    ///
    /// Coordinates are scaled by the view size set with
    /// [`set_view_size`](Self::set_view_size), or by the preview size when
    /// none was given.
    pub fn auto_focus_at(&self, x: f32, y: f32) {
        let view = (*self.view_size.read()).or_else(|| self.controller.camera_state().preview_size());
        match view {
            Some(view) => self.controller.auto_focus_at(x, y, view),
            None => debug!("Focus at ({}, {}) with unknown view size", x, y),
        }
    }

    /// Size of the view that touch coordinates refer to
    pub fn set_view_size(&self, width: u32, height: u32) {
        *self.view_size.write() = Some(Resolution::new(width, height));
    }

    pub fn set_torch(&self, on: bool) -> Result<()> {
        self.controller.set_torch(on)
    }

    pub fn refresh_camera(&self) -> Result<()> {
        if !self.is_configured() {
            debug!("Refresh requested before setup");
            return Ok(());
        }
        self.controller.refresh()
    }

    pub fn set_display_rotation(&self, rotation: DisplayRotation) {
        self.controller.set_display_rotation(rotation);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScannerEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn stats(&self) -> ProcessorStatsSnapshot {
        self.processor.stats()
    }

    pub fn autofocus_state(&self) -> AutofocusState {
        self.controller.autofocus_state()
    }

    pub fn camera(&self) -> &CameraController {
        &self.controller
    }

    pub fn processor(&self) -> &FrameProcessor {
        &self.processor
    }

    fn publish(&self, event: ScannerEvent) {
        if let Err(e) = self.event_bus.publish_now(event) {
            debug!("Session event not delivered: {}", e);
        }
    }
}

impl Drop for ScannerSession {
    fn drop(&mut self) {
        if self.is_configured() {
            self.shutdown_camera();
        }
    }
}

/// Builder for [`ScannerSession`]
pub struct ScannerSessionBuilder {
    config: Option<BarcamConfig>,
    provider: Option<Arc<dyn CameraProvider>>,
    decoder: Option<Arc<dyn BarcodeDecoder>>,
    native_decoder: Option<Arc<dyn BarcodeDecoder>>,
    resolution_selector: Option<ResolutionSelector>,
    event_bus: Option<Arc<EventBus>>,
}

impl ScannerSessionBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            provider: None,
            decoder: None,
            native_decoder: None,
            resolution_selector: None,
            event_bus: None,
        }
    }

    pub fn config(mut self, config: BarcamConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn CameraProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn BarcodeDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Alternative decoder used when `use_native_scanning` is set
    pub fn native_decoder(mut self, decoder: Arc<dyn BarcodeDecoder>) -> Self {
        self.native_decoder = Some(decoder);
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

    /// Build the session; must be called within a tokio runtime
    pub fn build(self) -> Result<ScannerSession> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let provider = self
            .provider
            .ok_or_else(|| BarcamError::system("Camera provider must be specified"))?;
        let decoder = self
            .decoder
            .ok_or_else(|| BarcamError::system("Barcode decoder must be specified"))?;
        let event_bus = self
            .event_bus
            .unwrap_or_else(|| Arc::new(EventBus::new(config.system.event_bus_capacity)));

        let options = &config.scanning;
        let mut decoders = DecoderSet::new(decoder);
        match self.native_decoder {
            Some(native) => decoders = decoders.with_native(native, options.use_native_scanning),
            None if options.use_native_scanning => {
                warn!("Native scanning requested but no native decoder registered")
            }
            None => {}
        }

        let mut camera = CameraControllerBuilder::new()
            .provider(provider)
            .options(options.clone())
            .settings(config.camera.clone())
            .event_bus(Arc::clone(&event_bus));
        if let Some(selector) = self.resolution_selector {
            camera = camera.resolution_selector(selector);
        }
        let controller = camera.build()?;

        let processor = FrameProcessor::new(
            FrameGate::new(options.min_frame_interval(), options.min_post_scan_interval()),
            controller.camera_state(),
            decoders,
            DecodeHints::from(options),
            Arc::clone(&event_bus),
        )?;

        let id = Uuid::new_v4();
        info!("Scanner session {} created", id);

        Ok(ScannerSession {
            id,
            config,
            event_bus,
            controller,
            processor: Arc::new(processor),
            configured: AtomicBool::new(false),
            view_size: RwLock::new(None),
        })
    }
}

impl Default for ScannerSessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{BarcodeFormat, DecodeResult};
    use crate::camera::mock::{MockCamera, MockCameraProvider};
    use crate::camera::{FocusMode, MeteringArea};
    use crate::error::DecodeError;
    use crate::luminance::LuminanceSource;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    struct MarkerDecoder;

    impl BarcodeDecoder for MarkerDecoder {
        fn name(&self) -> &str {
            "marker"
        }

        fn decode(
            &self,
            source: &LuminanceSource<'_>,
            _hints: &DecodeHints,
        ) -> std::result::Result<Option<DecodeResult>, DecodeError> {
            if source.pixel(0, 0) == 0xFF {
                Ok(Some(DecodeResult::new("4006381333931", BarcodeFormat::Ean13)))
            } else {
                Ok(None)
            }
        }
    }

    fn fast_config() -> BarcamConfig {
        let mut config = BarcamConfig::default();
        config.scanning.delay_between_analyzing_frames_ms = 0;
        config.scanning.delay_between_continuous_scans_ms = 0;
        config
    }

    fn build_session(camera: &MockCamera, config: BarcamConfig) -> ScannerSession {
        ScannerSession::builder()
            .config(config)
            .provider(Arc::new(MockCameraProvider::new(vec![camera.clone()])))
            .decoder(Arc::new(MarkerDecoder))
            .build()
            .expect("session")
    }

    #[tokio::test]
    async fn test_builder_requires_decoder() {
        let result = ScannerSession::builder()
            .provider(Arc::new(MockCameraProvider::new(vec![MockCamera::typical_back()])))
            .build();

        match result {
            Err(BarcamError::System { message }) => {
                assert!(message.contains("Barcode decoder must be specified"))
            }
            _ => panic!("Expected system error for missing decoder"),
        }
    }

    #[tokio::test]
    async fn test_builder_rejects_invalid_config() {
        let mut config = BarcamConfig::default();
        config.camera.preview_buffer_count = 0;

        let result = ScannerSession::builder()
            .config(config)
            .provider(Arc::new(MockCameraProvider::new(vec![MockCamera::typical_back()])))
            .decoder(Arc::new(MarkerDecoder))
            .build();
        assert!(matches!(result, Err(BarcamError::Config(_))));
    }

    #[tokio::test]
    async fn test_scan_flow_publishes_barcode() {
        let camera = MockCamera::typical_back();
        let session = build_session(&camera, fast_config());
        let mut rx = session.subscribe();

        session.setup_camera().expect("setup");
        assert!(session.is_configured());
        assert!(!session.is_analyzing());

        // paused: frames are dropped
        assert!(camera.emit_frame(|buf| buf.fill(0xFF)));
        assert_eq!(session.stats().frames_dropped, 1);

        session.resume_analysis();
        assert!(camera.emit_frame(|buf| buf.fill(0xFF)));

        let found = timeout(Duration::from_secs(2), async {
            loop {
                match rx.recv().await {
                    Ok(ScannerEvent::BarcodeFound { result, .. }) => return result,
                    Ok(_) => continue,
                    Err(e) => panic!("event bus closed: {}", e),
                }
            }
        })
        .await
        .expect("barcode in time");

        assert_eq!(found.text, "4006381333931");
        assert_eq!(found.format, BarcodeFormat::Ean13);
        assert_eq!(session.stats().barcodes_found, 1);
    }

    #[tokio::test]
    async fn test_setup_and_shutdown_are_guarded() {
        let camera = MockCamera::typical_back();
        let session = build_session(&camera, BarcamConfig::default());
        let mut rx = session.subscribe();

        session.setup_camera().expect("setup");
        session.setup_camera().expect("second setup");
        assert_eq!(camera.state().commits.len(), 1);

        session.resume_analysis();
        session.shutdown_camera();
        session.shutdown_camera();
        assert!(!session.is_configured());
        assert!(!session.is_analyzing());
        assert!(camera.state().released);

        let mut statuses = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ScannerEvent::CameraStatusChanged { configured, .. } = event {
                statuses.push(configured);
            }
        }
        assert_eq!(statuses, vec![true, false]);
    }

    #[tokio::test]
    async fn test_failed_setup_clears_flag() {
        let camera = MockCamera::typical_back();
        camera.state().commit_failures = 1;
        let session = build_session(&camera, BarcamConfig::default());
        let mut rx = session.subscribe();

        assert!(session.setup_camera().is_err());
        assert!(!session.is_configured());
        assert!(matches!(
            rx.try_recv(),
            Ok(ScannerEvent::SystemError { .. })
        ));

        session.setup_camera().expect("retry");
        assert!(session.is_configured());
    }

    #[tokio::test]
    async fn test_focus_uses_view_size() {
        let camera = MockCamera::typical_back();
        let session = build_session(&camera, BarcamConfig::default());
        session.setup_camera().expect("setup");

        session.set_view_size(400, 200);
        session.auto_focus_at(400.0, 0.0);

        let last = camera.last_commit().expect("commit");
        assert_eq!(last.focus_mode, FocusMode::Auto);
        assert_eq!(last.focus_areas, vec![MeteringArea::new(980, -1000, 1000, -980, 1000)]);
        assert_eq!(session.autofocus_state(), AutofocusState::ReactivationPending);

        session.shutdown_camera();
        assert_eq!(session.autofocus_state(), AutofocusState::Idle);
    }

    /// Reports a code once the test releases it
    struct GatedDecoder {
        release: parking_lot::Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl BarcodeDecoder for GatedDecoder {
        fn name(&self) -> &str {
            "gated"
        }

        fn decode(
            &self,
            _source: &LuminanceSource<'_>,
            _hints: &DecodeHints,
        ) -> std::result::Result<Option<DecodeResult>, DecodeError> {
            let _ = self.release.lock().recv();
            Ok(Some(DecodeResult::new("late", BarcodeFormat::Code128)))
        }
    }

    #[tokio::test]
    async fn test_late_result_dropped_after_shutdown() {
        let camera = MockCamera::typical_back();
        let (release, rx_release) = std::sync::mpsc::channel();
        let session = ScannerSession::builder()
            .config(fast_config())
            .provider(Arc::new(MockCameraProvider::new(vec![camera.clone()])))
            .decoder(Arc::new(GatedDecoder {
                release: parking_lot::Mutex::new(rx_release),
            }))
            .build()
            .expect("session");
        let mut rx = session.subscribe();

        session.setup_camera().expect("setup");
        session.resume_analysis();
        assert!(camera.emit_frame(|buf| buf.fill(0xFF)));
        assert!(session.processor().is_decode_in_flight());

        session.shutdown_camera();
        release.send(()).expect("release decode");

        timeout(Duration::from_secs(2), async {
            while session.processor().is_decode_in_flight() {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("decode finished");

        assert_eq!(session.stats().frames_analyzed, 1);
        assert_eq!(session.stats().barcodes_found, 0);
        while let Ok(event) = rx.try_recv() {
            assert!(
                !matches!(event, ScannerEvent::BarcodeFound { .. }),
                "late barcode published: {:?}",
                event
            );
        }

        // the camera no longer delivers frames
        assert!(!camera.emit_frame(|buf| buf.fill(0xFF)));
    }

    #[tokio::test]
    async fn test_session_ids_are_unique() {
        let camera = MockCamera::typical_back();
        let a = build_session(&camera, BarcamConfig::default());
        let b = build_session(&camera, BarcamConfig::default());
        assert_ne!(a.id(), b.id());
    }
}
