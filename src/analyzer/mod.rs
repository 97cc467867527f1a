mod decoder;
mod gate;
mod processor;
#[cfg(test)]
mod tests;

pub use decoder::{BarcodeDecoder, BarcodeFormat, DecodeHints, DecodeResult, DecoderSet};
pub use gate::{should_analyze, FrameGate, ScanSchedulingState};
pub use processor::{FrameProcessor, ProcessorStats, ProcessorStatsSnapshot};
