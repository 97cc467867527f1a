use crate::buffer_pool::PooledBuffer;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Preview pixel formats the capture layer can deliver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// YUV 4:2:0 semi-planar, Y plane first
    Nv21,
    /// Single luminance plane
    Gray8,
}

impl PixelFormat {
    pub fn bits_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Nv21 => 12,
            PixelFormat::Gray8 => 8,
        }
    }

    /// Bytes needed for one frame at the given size
    pub fn buffer_size(&self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bits_per_pixel() / 8
    }
}

/// A single preview frame on loan from the capture layer
#[derive(Debug)]
pub struct FrameData {
    /// Unique frame identifier
    pub id: u64,
    /// Timestamp when frame was captured
    pub timestamp: SystemTime,
    /// Raw pixel data, returned to its pool when the frame is dropped
    pub data: PooledBuffer,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel format
    pub format: PixelFormat,
}

impl FrameData {
    pub fn new(
        id: u64,
        timestamp: SystemTime,
        data: PooledBuffer,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Self {
        Self {
            id,
            timestamp,
            data,
            width,
            height,
            format,
        }
    }

    pub fn expected_size(&self) -> usize {
        self.format.buffer_size(self.width, self.height)
    }

    /// Validate frame data size against expected size
    pub fn validate_size(&self) -> bool {
        self.data.len() >= self.expected_size()
    }

    /// Get frame age in milliseconds
    pub fn age_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.timestamp)
            .unwrap_or_default()
            .as_millis() as u64
    }

    /// Release the buffer back to the capture layer
    pub fn release(self) {
        drop(self);
    }
}
