use crate::analyzer::DecodeResult;
use crate::error::EventBusError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Events published by the scanner core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScannerEvent {
    /// A frame was decoded successfully
    BarcodeFound {
        result: DecodeResult,
        frame_id: u64,
    },
    /// Camera setup or shutdown completed
    CameraStatusChanged {
        configured: bool,
        timestamp: SystemTime,
    },
    /// The cached display-correction orientation changed
    OrientationChanged {
        degrees: u16,
        timestamp: SystemTime,
    },
    /// Continuous autofocus was restored after a manual focus request
    AutofocusReactivated { timestamp: SystemTime },
    /// A component hit a failure it handled internally
    SystemError { component: String, error: String },
}

impl ScannerEvent {
    /// Get the timestamp of the event
    pub fn timestamp(&self) -> SystemTime {
        match self {
            ScannerEvent::BarcodeFound { result, .. } => result.timestamp.into(),
            ScannerEvent::CameraStatusChanged { timestamp, .. } => *timestamp,
            ScannerEvent::OrientationChanged { timestamp, .. } => *timestamp,
            ScannerEvent::AutofocusReactivated { timestamp } => *timestamp,
            ScannerEvent::SystemError { .. } => SystemTime::now(),
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            ScannerEvent::BarcodeFound { result, frame_id } => {
                format!(
                    "Barcode {:?} found in frame {}: {}",
                    result.format, frame_id, result.text
                )
            }
            ScannerEvent::CameraStatusChanged { configured, .. } => {
                format!(
                    "Camera {}",
                    if *configured { "configured" } else { "shut down" }
                )
            }
            ScannerEvent::OrientationChanged { degrees, .. } => {
                format!("Orientation corrected to {} degrees", degrees)
            }
            ScannerEvent::AutofocusReactivated { .. } => "Continuous autofocus reactivated".to_string(),
            ScannerEvent::SystemError { component, error } => {
                format!("Error in {}: {}", component, error)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            ScannerEvent::BarcodeFound { .. } => "barcode_found",
            ScannerEvent::CameraStatusChanged { .. } => "camera_status_changed",
            ScannerEvent::OrientationChanged { .. } => "orientation_changed",
            ScannerEvent::AutofocusReactivated { .. } => "autofocus_reactivated",
            ScannerEvent::SystemError { .. } => "system_error",
        }
    }
}

/// Async event bus for component coordination using broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<ScannerEvent>,
    debug_logging: bool,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            debug_logging: false,
        }
    }

    /// Create a new event bus with debug logging enabled
    pub fn with_debug_logging(capacity: usize) -> Self {
        let mut bus = Self::new(capacity);
        bus.debug_logging = true;
        bus
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<ScannerEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers
    pub async fn publish(&self, event: ScannerEvent) -> Result<usize, EventBusError> {
        self.publish_now(event)
    }

    /// Publish without an async context, for the control and capture paths
    pub fn publish_now(&self, event: ScannerEvent) -> Result<usize, EventBusError> {
        if self.debug_logging {
            debug!("Publishing event: {}", event.description());
        }

        match &event {
            ScannerEvent::BarcodeFound { result, frame_id } => {
                info!("Barcode {:?} found in frame {}", result.format, frame_id);
            }
            ScannerEvent::SystemError { component, error } => {
                error!("System error in {}: {}", component, error);
            }
            ScannerEvent::CameraStatusChanged { configured, .. } => {
                if *configured {
                    info!("Camera configured");
                } else {
                    info!("Camera shut down");
                }
            }
            _ => {
                if self.debug_logging {
                    debug!("Event: {}", event.description());
                }
            }
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if there are any active subscribers
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            debug_logging: self.debug_logging,
        }
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
    /// Custom filter function
    Custom(fn(&ScannerEvent) -> bool),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &ScannerEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<ScannerEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(receiver: broadcast::Receiver<ScannerEvent>, filter: EventFilter, name: String) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next event that passes the filter
    pub async fn recv(&mut self) -> Result<ScannerEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Receiver {} lagged, skipped {} events", self.name, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return Err(EventBusError::Closed),
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Event handler trait for observers registered on the bus
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an incoming event
    async fn handle_event(&self, event: ScannerEvent) -> Result<(), EventBusError>;

    /// Get the name of this handler for logging
    fn handler_name(&self) -> &str;

    /// Get the event filter for this handler
    fn event_filter(&self) -> EventFilter {
        EventFilter::All
    }
}

/// Run `handler` for every matching event until the bus closes or the task
/// is aborted. Aborting the returned handle unregisters the observer.
pub fn spawn_event_handler(bus: &EventBus, handler: Arc<dyn EventHandler>) -> JoinHandle<()> {
    let mut receiver = EventReceiver::new(
        bus.subscribe(),
        handler.event_filter(),
        handler.handler_name().to_string(),
    );

    tokio::spawn(async move {
        debug!("Event handler {} started", handler.handler_name());
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if let Err(e) = handler.handle_event(event).await {
                        warn!("Event handler {} failed: {}", handler.handler_name(), e);
                    }
                }
                Err(_) => break,
            }
        }
        debug!("Event handler {} stopped", handler.handler_name());
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::BarcodeFormat;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{timeout, Duration};

    fn barcode_event(text: &str) -> ScannerEvent {
        ScannerEvent::BarcodeFound {
            result: DecodeResult::new(text, BarcodeFormat::QrCode),
            frame_id: 1,
        }
    }

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let subscriber_count = event_bus.publish(barcode_event("hello")).await.unwrap();
        assert_eq!(subscriber_count, 1);

        match receiver.recv().await.unwrap() {
            ScannerEvent::BarcodeFound { result, .. } => {
                assert_eq!(result.text, "hello");
            }
            _ => panic!("Unexpected event type"),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_fails() {
        let event_bus = EventBus::new(10);
        assert!(!event_bus.has_subscribers());
        assert!(event_bus.publish(barcode_event("lost")).await.is_err());
    }

    #[tokio::test]
    async fn test_debug_bus_delivers_and_clones_flag() {
        let event_bus = EventBus::with_debug_logging(4);
        assert!(event_bus.debug_logging);
        assert!(event_bus.clone().debug_logging);

        let mut receiver = event_bus.subscribe();
        event_bus.publish_now(barcode_event("traced")).unwrap();
        assert!(matches!(
            receiver.recv().await.unwrap(),
            ScannerEvent::BarcodeFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let event_bus = EventBus::new(10);
        let filter = EventFilter::EventTypes(vec!["barcode_found"]);
        let mut filtered_receiver = EventReceiver::new(event_bus.subscribe(), filter, "test".to_string());

        event_bus
            .publish(ScannerEvent::OrientationChanged {
                degrees: 90,
                timestamp: SystemTime::now(),
            })
            .await
            .unwrap();
        event_bus.publish(barcode_event("filtered")).await.unwrap();

        let received = timeout(Duration::from_millis(100), filtered_receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.event_type(), "barcode_found");
    }

    struct CountingHandler {
        seen: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl EventHandler for CountingHandler {
        async fn handle_event(&self, _event: ScannerEvent) -> Result<(), EventBusError> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn handler_name(&self) -> &str {
            "counting"
        }

        fn event_filter(&self) -> EventFilter {
            EventFilter::EventTypes(vec!["barcode_found"])
        }
    }

    #[tokio::test]
    async fn test_spawned_handler_receives_matching_events() {
        let event_bus = EventBus::new(10);
        let handler = Arc::new(CountingHandler {
            seen: AtomicUsize::new(0),
        });
        let task = spawn_event_handler(&event_bus, handler.clone());

        event_bus.publish(barcode_event("one")).await.unwrap();
        event_bus
            .publish(ScannerEvent::AutofocusReactivated {
                timestamp: SystemTime::now(),
            })
            .await
            .unwrap();
        event_bus.publish(barcode_event("two")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handler.seen.load(Ordering::SeqCst), 2);

        task.abort();
    }

    #[test]
    fn test_event_properties() {
        let event = barcode_event("4006381333931");
        assert_eq!(event.event_type(), "barcode_found");
        assert!(event.description().contains("4006381333931"));
    }
}
