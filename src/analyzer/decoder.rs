use crate::config::ScanningOptions;
use crate::error::DecodeError;
use crate::luminance::LuminanceSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Barcode symbologies a decoder may report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BarcodeFormat {
    Aztec,
    Codabar,
    Code39,
    Code93,
    Code128,
    DataMatrix,
    Ean8,
    Ean13,
    Itf,
    MaxiCode,
    Pdf417,
    QrCode,
    Rss14,
    RssExpanded,
    UpcA,
    UpcE,
}

/// Payload produced by a successful decode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodeResult {
    pub text: String,
    pub format: BarcodeFormat,
    #[serde(default)]
    pub raw_bytes: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

impl DecodeResult {
    pub fn new(text: impl Into<String>, format: BarcodeFormat) -> Self {
        Self {
            text: text.into(),
            format,
            raw_bytes: Vec::new(),
            timestamp: Utc::now(),
        }
    }
}

/// Options forwarded to the decoder untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeHints {
    pub possible_formats: Vec<BarcodeFormat>,
    pub try_harder: bool,
    pub pure_barcode: bool,
}

impl From<&ScanningOptions> for DecodeHints {
    fn from(options: &ScanningOptions) -> Self {
        Self {
            possible_formats: options.possible_formats.clone(),
            try_harder: options.try_harder,
            pure_barcode: options.pure_barcode,
        }
    }
}

/// External barcode decoder
///
/// Implementations may fail or panic; both are contained at the decode
/// boundary and treated as "no result".
pub trait BarcodeDecoder: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the decoder can be used on this device
    fn is_available(&self) -> bool {
        true
    }

    /// Whether every requested format can be read; an empty list means any
    fn supports_formats(&self, _formats: &[BarcodeFormat]) -> bool {
        true
    }

    fn decode(
        &self,
        source: &LuminanceSource<'_>,
        hints: &DecodeHints,
    ) -> Result<Option<DecodeResult>, DecodeError>;
}

/// Generic decoder plus an optional native-vision alternative
#[derive(Clone)]
pub struct DecoderSet {
    generic: Arc<dyn BarcodeDecoder>,
    native: Option<Arc<dyn BarcodeDecoder>>,
    prefer_native: bool,
}

impl DecoderSet {
    pub fn new(generic: Arc<dyn BarcodeDecoder>) -> Self {
        Self {
            generic,
            native: None,
            prefer_native: false,
        }
    }

    pub fn with_native(mut self, native: Arc<dyn BarcodeDecoder>, prefer_native: bool) -> Self {
        self.native = Some(native);
        self.prefer_native = prefer_native;
        self
    }

    /// Native decoder when preferred, available and able to read every
    /// requested format, otherwise the generic one
    pub fn select(&self, hints: &DecodeHints) -> &Arc<dyn BarcodeDecoder> {
        if self.prefer_native {
            if let Some(native) = self.native.as_ref().filter(|d| d.is_available()) {
                if native.supports_formats(&hints.possible_formats) {
                    debug!("Reading barcode with {}", native.name());
                    return native;
                }
                info!(
                    "{} does not support all requested formats {:?}, using {} instead",
                    native.name(),
                    hints.possible_formats,
                    self.generic.name()
                );
            }
        }

        debug!("Reading barcode with {}", self.generic.name());
        &self.generic
    }
}
