use thiserror::Error;

#[derive(Error, Debug)]
pub enum BarcamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl BarcamError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Failures reported by the camera hardware layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("No camera available")]
    NoCamera,

    #[error("Failed to open camera {id}: {details}")]
    DeviceOpen { id: u32, details: String },

    #[error("Camera is not open")]
    NotOpen,

    #[error("Failed to read camera parameters: {details}")]
    ParameterRead { details: String },

    #[error("Failed to commit camera parameters: {details}")]
    ParameterCommit { details: String },

    #[error("Preview error: {details}")]
    Preview { details: String },

    #[error("Autofocus failed: {details}")]
    Autofocus { details: String },

    #[error("Camera configuration error: {details}")]
    Configuration { details: String },
}

impl CameraError {
    /// Whether the caller may retry the operation that produced this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CameraError::ParameterRead { .. }
                | CameraError::ParameterCommit { .. }
                | CameraError::Preview { .. }
                | CameraError::Autofocus { .. }
        )
    }
}

/// Failures raised at the decode boundary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Frame buffer of {actual} bytes is too small for {width}x{height} luminance")]
    InvalidFrame {
        width: u32,
        height: u32,
        actual: usize,
    },

    #[error("Decoder {decoder} failed: {details}")]
    Decoder { decoder: String, details: String },

    #[error("Decode task aborted: {details}")]
    TaskAborted { details: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event receiver closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, BarcamError>;
