//! # Media Frames
//!
//! Decoded payloads travelling from the media player to the presentation side.
//! Frames are moved through the pipeline, never copied: the decoder hands them
//! to a queue, the queue hands them to the sink or the mixer.

// ============================================================================
// Timestamps
// ============================================================================

/// Anything that carries a presentation timestamp in seconds.
pub trait Timestamped {
    fn presentation_time(&self) -> f64;

    /// Time at which the payload stops covering the timeline
    fn end_time(&self) -> f64 {
        self.presentation_time()
    }
}

// ============================================================================
// Video
// ============================================================================

/// Bytes per RGBA8 pixel
pub const RGBA_BYTES_PER_PIXEL: usize = 4;

/// A decoded video frame in RGBA8 layout
#[derive(Debug, PartialEq)]
pub struct VideoFrame {
    /// Pixel data, one byte per channel, rows packed without padding
    pub data: Vec<u8>,
    /// Presentation timestamp (seconds from stream start)
    pub presentation_time: f64,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
}

impl VideoFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, presentation_time: f64) -> Self {
        Self {
            data,
            presentation_time,
            width,
            height,
        }
    }

    /// Buffer length an RGBA8 frame of these dimensions must have
    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * RGBA_BYTES_PER_PIXEL
    }

    /// Whether the buffer length matches `width * height * 4`
    pub fn is_well_formed(&self) -> bool {
        !self.data.is_empty() && self.data.len() == Self::expected_len(self.width, self.height)
    }
}

impl Timestamped for VideoFrame {
    fn presentation_time(&self) -> f64 {
        self.presentation_time
    }
}

// ============================================================================
// Audio
// ============================================================================

/// A block of interleaved float PCM audio
#[derive(Debug, PartialEq)]
pub struct AudioFrame {
    /// Interleaved samples (`channels` samples per audio frame)
    pub samples: Vec<f32>,
    /// Presentation timestamp (seconds from stream start)
    pub presentation_time: f64,
    /// Channel count
    pub channels: u16,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32, presentation_time: f64) -> Self {
        Self {
            samples,
            presentation_time,
            channels,
            sample_rate,
        }
    }

    /// Samples per channel
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// Playback duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.sample_rate as f64
    }

    /// Whether the sample count is a whole number of interleaved frames
    pub fn is_well_formed(&self) -> bool {
        self.channels > 0 && self.samples.len() % self.channels as usize == 0
    }
}

impl Timestamped for AudioFrame {
    fn presentation_time(&self) -> f64 {
        self.presentation_time
    }

    fn end_time(&self) -> f64 {
        self.presentation_time + self.duration()
    }
}
