//! Single-channel brightness view of a preview frame.
//!
//! NV21 and Gray8 frames both start with a full-resolution Y plane, so the
//! view borrows the first `width * height` bytes without copying. Rotation
//! produces an owned buffer.

use crate::error::DecodeError;
use std::borrow::Cow;

#[derive(Debug, Clone)]
pub struct LuminanceSource<'a> {
    data: Cow<'a, [u8]>,
    width: u32,
    height: u32,
}

impl<'a> LuminanceSource<'a> {
    /// Borrow the Y plane of a raw preview buffer
    pub fn from_preview(data: &'a [u8], width: u32, height: u32) -> Result<Self, DecodeError> {
        let len = width as usize * height as usize;
        if width == 0 || height == 0 || data.len() < len {
            return Err(DecodeError::InvalidFrame {
                width,
                height,
                actual: data.len(),
            });
        }

        Ok(Self {
            data: Cow::Borrowed(&data[..len]),
            width,
            height,
        })
    }

    /// Build a view over an owned luminance plane
    pub fn from_owned(data: Vec<u8>, width: u32, height: u32) -> Result<LuminanceSource<'static>, DecodeError> {
        if width == 0 || height == 0 || data.len() != width as usize * height as usize {
            return Err(DecodeError::InvalidFrame {
                width,
                height,
                actual: data.len(),
            });
        }

        Ok(LuminanceSource {
            data: Cow::Owned(data),
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.width as usize;
        &self.data[start..start + self.width as usize]
    }

    pub fn pixel(&self, x: u32, y: u32) -> u8 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// Rotate 90 degrees counter-clockwise; width and height swap
    pub fn rotate_counter_clockwise(&self) -> LuminanceSource<'static> {
        let (w, h) = (self.width as usize, self.height as usize);
        let mut rotated = vec![0u8; w * h];

        for y in 0..h {
            let row = &self.data[y * w..(y + 1) * w];
            for (x, &value) in row.iter().enumerate() {
                rotated[(w - 1 - x) * h + y] = value;
            }
        }

        LuminanceSource {
            data: Cow::Owned(rotated),
            width: self.height,
            height: self.width,
        }
    }

    pub fn into_owned(self) -> LuminanceSource<'static> {
        LuminanceSource {
            data: Cow::Owned(self.data.into_owned()),
            width: self.width,
            height: self.height,
        }
    }

    /// Copy the view into a grayscale image for inspection
    #[cfg(feature = "debug_frames")]
    pub fn to_gray_image(&self) -> image::GrayImage {
        image::GrayImage::from_fn(self.width, self.height, |x, y| image::Luma([self.pixel(x, y)]))
    }
}
