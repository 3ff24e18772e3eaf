//! # ReelSync Core
//!
//! Video playback synchronization: bounded frame queues, sync and threaded
//! decoders, and the controller that paces both streams against engine time.

// ============================================================================
// Frames / Buffering
// ============================================================================
pub mod frame;
pub mod frame_queue;

// ============================================================================
// Backend Interfaces
// ============================================================================
pub mod player;
pub mod mixer;
pub mod sink;

// ============================================================================
// Decode / Sync
// ============================================================================
pub mod decoder;
pub mod sync;
pub mod time;

// ============================================================================
// Playback
// ============================================================================
pub mod config;
pub mod controller;

// ============================================================================
// Sources
// ============================================================================
pub mod test_pattern;

pub use config::{ConfigError, PlaybackConfig};
pub use controller::{PlaybackController, PlaybackError, PlaybackState, PlaybackStats};
pub use decoder::{DecodeMode, FrameDecoder};
pub use frame::{AudioFrame, Timestamped, VideoFrame};
pub use frame_queue::{AudioFrameQueue, FrameQueue, QueueError, VideoFrameQueue};
pub use mixer::AudioMixer;
pub use player::{MediaInfo, MediaPlayer, PlayerError, StreamKind};
pub use sink::{DisplayImage, VideoSink};

// ============================================================================
// Version
// ============================================================================
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
