//! # Media Player Contract
//!
//! The narrow boundary to platform decode backends (AVFoundation, Media
//! Foundation, software sources). The playback core only ever talks to a
//! backend through [`MediaPlayer`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::frame::{AudioFrame, VideoFrame};

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("Cannot read {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },
    #[error("Unsupported media: {0}")]
    Unsupported(String),
    #[error("No decodable streams in {0}")]
    NoStreams(PathBuf),
}

/// Backend playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlayerState {
    #[default]
    Stopped,
    Playing,
    Paused,
    Error,
}

/// Elementary stream type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamKind {
    Video,
    Audio,
}

/// Snapshot of the opened media, refreshed on open and on format changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Duration in seconds
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub framerate: f32,
    /// 0 = no audio
    pub audio_channels: u16,
    pub audio_sample_rate: u32,
    pub audio_track_count: usize,
}

impl Default for MediaInfo {
    fn default() -> Self {
        Self {
            duration: 0.0,
            width: 0,
            height: 0,
            framerate: 30.0,
            audio_channels: 0,
            audio_sample_rate: 0,
            audio_track_count: 0,
        }
    }
}

impl MediaInfo {
    pub fn has_video(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    pub fn has_audio(&self) -> bool {
        self.audio_channels > 0 && self.audio_sample_rate > 0
    }
}

/// Audio track description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub index: usize,
    /// Language code, empty if unknown
    pub language: String,
    /// Track name, empty if unknown
    pub name: String,
}

/// Platform media backend.
///
/// Reads are non-blocking: `None` means "nothing available right now", not
/// end of stream. End of stream is reported only by [`has_ended`](Self::has_ended).
pub trait MediaPlayer: Send {
    fn open(&mut self, path: &Path) -> Result<(), PlayerError>;

    /// Release backend handles. Must not panic, even if the backend fails.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    fn play(&mut self);
    fn pause(&mut self);
    fn stop(&mut self);
    fn seek(&mut self, time: f64);

    fn state(&self) -> PlayerState;

    fn is_playing(&self) -> bool {
        self.state() == PlayerState::Playing
    }

    fn is_paused(&self) -> bool {
        self.state() == PlayerState::Paused
    }

    fn has_ended(&self) -> bool;

    fn media_info(&self) -> MediaInfo;

    /// Authoritative playback position, if the backend keeps a clock of its
    /// own. Pull-only backends return `None`.
    fn position(&self) -> Option<f64>;

    fn read_video_frame(&mut self) -> Option<VideoFrame>;

    /// `current_time` is a lower bound: backends may discard audio older than it.
    fn read_audio_frame(&mut self, current_time: f64) -> Option<AudioFrame>;

    fn audio_track_count(&self) -> usize {
        self.media_info().audio_track_count
    }

    fn audio_track_info(&self, index: usize) -> Option<TrackInfo>;

    fn set_audio_track(&mut self, index: usize);

    fn current_audio_track(&self) -> usize;

    /// Stream whose format changed since the last call, if any
    fn take_format_change(&mut self) -> Option<StreamKind> {
        None
    }

    /// Move the audio read cursor to `time` without touching video
    fn resync_audio(&mut self, time: f64) {
        let _ = time;
    }
}

/// Player handle shared between the controller and decoder workers
pub type SharedPlayer = Arc<Mutex<Box<dyn MediaPlayer>>>;

pub fn share(player: Box<dyn MediaPlayer>) -> SharedPlayer {
    Arc::new(Mutex::new(player))
}
