//! Captured frames.
//!
//! A `Frame` is an RGB pixel grid produced by a `FrameSource` once per cycle.
//! It is moved through the pipeline: read by the source, borrowed by the
//! detector, consumed by the annotator and handed to the display sink. Nothing
//! upstream keeps a copy, so sources are free to allocate a fresh buffer for
//! every read.

use anyhow::{anyhow, Result};
use image::imageops::FilterType;
use image::RgbImage;

pub struct Frame {
    image: RgbImage,
    /// Position of this frame in its source, starting at 1.
    pub seq: u64,
}

impl Frame {
    pub fn new(image: RgbImage, seq: u64) -> Self {
        Self { image, seq }
    }

    /// Build a frame from packed RGB24 bytes.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32, seq: u64) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                pixels.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("RGB buffer does not fit {}x{}", width, height))?;
        Ok(Self::new(image, seq))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }

    /// Resize to exactly `width` x `height`, ignoring aspect ratio.
    ///
    /// This is the resize policy used in front of square model inputs; box
    /// coordinates are mapped back with independent x and y scale factors.
    pub fn stretched(&self, width: u32, height: u32) -> RgbImage {
        if self.width() == width && self.height() == height {
            return self.image.clone();
        }
        image::imageops::resize(&self.image, width, height, FilterType::Triangle)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("seq", &self.seq)
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

pub(crate) fn rgb_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rgb_validates_length() {
        assert!(Frame::from_rgb(vec![0u8; 12], 2, 2, 1).is_ok());
        assert!(Frame::from_rgb(vec![0u8; 11], 2, 2, 1).is_err());
    }

    #[test]
    fn stretched_ignores_aspect_ratio() {
        let frame = Frame::new(RgbImage::new(320, 240), 1);
        let resized = frame.stretched(640, 640);
        assert_eq!(resized.dimensions(), (640, 640));
        assert_eq!((frame.width(), frame.height()), (320, 240));
    }
}
