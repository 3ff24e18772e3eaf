//! # Presentation Sink
//!
//! Where popped video frames end up. Texture upload belongs to the host;
//! the core only decides which frame is shown and when.

use thiserror::Error;

use crate::frame::VideoFrame;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("Empty frame")]
    EmptyFrame,
    #[error("Frame buffer is {actual} bytes, expected {expected} for RGBA8")]
    BufferSize { expected: usize, actual: usize },
}

/// How a frame was applied to the displayable image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageUpdate {
    /// Dimensions matched, pixels updated in place
    Updated,
    /// New image allocated (first frame or dimension change)
    Replaced,
}

/// Consumer of presented video frames.
///
/// A failed conversion skips that frame; it never stops playback.
pub trait VideoSink: Send {
    fn present(&mut self, frame: VideoFrame) -> Result<ImageUpdate, SinkError>;
}

/// CPU-side displayable image, the last presented frame
#[derive(Debug, Default)]
pub struct DisplayImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    presentation_time: Option<f64>,
    updates: u64,
    replacements: u64,
}

impl DisplayImage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Timestamp of the frame currently shown
    pub fn presentation_time(&self) -> Option<f64> {
        self.presentation_time
    }

    /// `(in-place updates, full replacements)`
    pub fn counts(&self) -> (u64, u64) {
        (self.updates, self.replacements)
    }

    fn validate(frame: &VideoFrame) -> Result<(), SinkError> {
        if frame.data.is_empty() || frame.width == 0 || frame.height == 0 {
            return Err(SinkError::EmptyFrame);
        }
        let expected = VideoFrame::expected_len(frame.width, frame.height);
        if frame.data.len() != expected {
            return Err(SinkError::BufferSize {
                expected,
                actual: frame.data.len(),
            });
        }
        Ok(())
    }
}

impl VideoSink for DisplayImage {
    fn present(&mut self, frame: VideoFrame) -> Result<ImageUpdate, SinkError> {
        Self::validate(&frame)?;
        self.presentation_time = Some(frame.presentation_time);

        if !self.pixels.is_empty() && frame.width == self.width && frame.height == self.height {
            self.pixels.copy_from_slice(&frame.data);
            self.updates += 1;
            return Ok(ImageUpdate::Updated);
        }

        self.width = frame.width;
        self.height = frame.height;
        self.pixels = frame.data;
        self.replacements += 1;
        Ok(ImageUpdate::Replaced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, value: u8, t: f64) -> VideoFrame {
        VideoFrame::new(vec![value; VideoFrame::expected_len(width, height)], width, height, t)
    }

    #[test]
    fn test_dimension_change_replaces() {
        let mut image = DisplayImage::new();

        assert_eq!(image.present(solid(4, 4, 1, 0.0)), Ok(ImageUpdate::Replaced));
        assert_eq!(image.present(solid(4, 4, 2, 0.1)), Ok(ImageUpdate::Updated));
        assert_eq!(image.pixels()[0], 2);

        assert_eq!(image.present(solid(8, 2, 3, 0.2)), Ok(ImageUpdate::Replaced));
        assert_eq!((image.width(), image.height()), (8, 2));
        assert_eq!(image.counts(), (1, 2));
        assert_eq!(image.presentation_time(), Some(0.2));
    }

    #[test]
    fn test_malformed_frame_is_rejected() {
        let mut image = DisplayImage::new();
        image.present(solid(2, 2, 9, 0.0)).unwrap();

        let bad = VideoFrame::new(vec![0; 7], 2, 2, 0.1);
        assert_eq!(
            image.present(bad),
            Err(SinkError::BufferSize { expected: 16, actual: 7 })
        );
        let empty = VideoFrame::new(Vec::new(), 0, 0, 0.2);
        assert_eq!(image.present(empty), Err(SinkError::EmptyFrame));

        // previous image untouched
        assert_eq!(image.pixels(), &[9; 16][..]);
        assert_eq!(image.presentation_time(), Some(0.0));
    }
}
