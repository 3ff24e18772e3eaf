//! # Test Pattern Source
//!
//! Deterministic software [`MediaPlayer`]: an RGBA gradient that shifts every
//! frame and a sine tone per audio track. Useful for exercising the playback
//! core without a platform backend.

use std::f32::consts::TAU;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::frame::{AudioFrame, VideoFrame};
use crate::player::{MediaInfo, MediaPlayer, PlayerError, PlayerState, StreamKind, TrackInfo};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestPatternConfig {
    /// 0 disables video
    pub width: u32,
    pub height: u32,
    pub fps: f32,
    /// Seconds
    pub duration: f64,
    /// 0 disables audio
    pub channels: u16,
    pub sample_rate: u32,
    /// Audio frames per packet
    pub packet_frames: usize,
    pub audio_tracks: usize,
    /// Tone of track 0; track n plays `(n + 1) * tone_hz`
    pub tone_hz: f32,
}

impl Default for TestPatternConfig {
    fn default() -> Self {
        Self {
            width: 64,
            height: 36,
            fps: 30.0,
            duration: 5.0,
            channels: 2,
            sample_rate: 48_000,
            packet_frames: 1024,
            audio_tracks: 1,
            tone_hz: 440.0,
        }
    }
}

pub struct TestPatternPlayer {
    config: TestPatternConfig,
    path: Option<PathBuf>,
    state: PlayerState,
    /// Index of the next video frame
    video_cursor: u64,
    /// Next audio frame (per-channel sample index)
    audio_cursor: u64,
    audio_track: usize,
    format_change: Option<StreamKind>,
}

impl TestPatternPlayer {
    pub fn new(config: TestPatternConfig) -> Self {
        Self {
            config,
            path: None,
            state: PlayerState::Stopped,
            video_cursor: 0,
            audio_cursor: 0,
            audio_track: 0,
            format_change: None,
        }
    }

    fn has_video(&self) -> bool {
        self.config.width > 0 && self.config.height > 0 && self.config.fps > 0.0
    }

    fn has_audio(&self) -> bool {
        self.config.channels > 0 && self.config.sample_rate > 0 && self.config.packet_frames > 0
    }

    fn video_ended(&self) -> bool {
        !self.has_video() || self.video_cursor as f64 / self.config.fps as f64 >= self.config.duration
    }

    fn audio_ended(&self) -> bool {
        !self.has_audio()
            || self.audio_cursor as f64 / self.config.sample_rate as f64 >= self.config.duration
    }

    fn render_frame(&self, index: u64) -> Vec<u8> {
        let (w, h) = (self.config.width as usize, self.config.height as usize);
        let shift = (index % 256) as u8;
        let mut data = Vec::with_capacity(w * h * 4);
        for y in 0..h {
            for x in 0..w {
                data.push(((x * 255) / w.max(1)) as u8);
                data.push(((y * 255) / h.max(1)) as u8);
                data.push(shift);
                data.push(255);
            }
        }
        data
    }
}

impl MediaPlayer for TestPatternPlayer {
    fn open(&mut self, path: &Path) -> Result<(), PlayerError> {
        if !self.has_video() && !self.has_audio() {
            return Err(PlayerError::NoStreams(path.to_path_buf()));
        }
        if !(self.config.duration > 0.0) {
            return Err(PlayerError::Unsupported(format!(
                "pattern duration {} is not positive",
                self.config.duration
            )));
        }
        self.path = Some(path.to_path_buf());
        self.state = PlayerState::Stopped;
        self.video_cursor = 0;
        self.audio_cursor = 0;
        Ok(())
    }

    fn close(&mut self) {
        self.path = None;
        self.state = PlayerState::Stopped;
    }

    fn is_open(&self) -> bool {
        self.path.is_some()
    }

    fn play(&mut self) {
        if self.is_open() {
            self.state = PlayerState::Playing;
        }
    }

    fn pause(&mut self) {
        if self.state == PlayerState::Playing {
            self.state = PlayerState::Paused;
        }
    }

    fn stop(&mut self) {
        self.state = PlayerState::Stopped;
        self.video_cursor = 0;
        self.audio_cursor = 0;
    }

    fn seek(&mut self, time: f64) {
        let time = time.clamp(0.0, self.config.duration);
        self.video_cursor = (time * self.config.fps as f64).ceil() as u64;
        self.audio_cursor = (time * self.config.sample_rate as f64).round() as u64;
    }

    fn state(&self) -> PlayerState {
        self.state
    }

    fn has_ended(&self) -> bool {
        self.is_open() && self.video_ended() && self.audio_ended()
    }

    fn media_info(&self) -> MediaInfo {
        let c = &self.config;
        MediaInfo {
            duration: c.duration,
            width: if self.has_video() { c.width } else { 0 },
            height: if self.has_video() { c.height } else { 0 },
            framerate: c.fps,
            audio_channels: if self.has_audio() { c.channels } else { 0 },
            audio_sample_rate: if self.has_audio() { c.sample_rate } else { 0 },
            audio_track_count: if self.has_audio() { c.audio_tracks.max(1) } else { 0 },
        }
    }

    fn position(&self) -> Option<f64> {
        None
    }

    fn read_video_frame(&mut self) -> Option<VideoFrame> {
        if !self.is_open() || self.video_ended() {
            return None;
        }
        let index = self.video_cursor;
        self.video_cursor += 1;
        let t = index as f64 / self.config.fps as f64;
        Some(VideoFrame::new(self.render_frame(index), self.config.width, self.config.height, t))
    }

    fn read_audio_frame(&mut self, current_time: f64) -> Option<AudioFrame> {
        if !self.is_open() || !self.has_audio() {
            return None;
        }

        let rate = self.config.sample_rate as f64;
        let packet = self.config.packet_frames as u64;
        // skip packets that would already be late
        let floor = (current_time.max(0.0) * rate) as u64;
        if self.audio_cursor + packet <= floor {
            self.audio_cursor = floor;
        }
        if self.audio_ended() {
            return None;
        }

        let total = (self.config.duration * rate) as u64;
        let frames = packet.min(total.saturating_sub(self.audio_cursor));
        if frames == 0 {
            return None;
        }

        let channels = self.config.channels as usize;
        let freq = self.config.tone_hz * (self.audio_track + 1) as f32;
        let mut samples = Vec::with_capacity(frames as usize * channels);
        for i in 0..frames {
            let n = (self.audio_cursor + i) as f32;
            let value = 0.25 * (TAU * freq * n / self.config.sample_rate as f32).sin();
            samples.extend(std::iter::repeat(value).take(channels));
        }

        let t = self.audio_cursor as f64 / rate;
        self.audio_cursor += frames;
        Some(AudioFrame::new(samples, self.config.channels, self.config.sample_rate, t))
    }

    fn audio_track_info(&self, index: usize) -> Option<TrackInfo> {
        if index >= self.audio_track_count() {
            return None;
        }
        Some(TrackInfo {
            index,
            language: String::new(),
            name: format!("Tone {} Hz", self.config.tone_hz * (index + 1) as f32),
        })
    }

    fn set_audio_track(&mut self, index: usize) {
        if index < self.audio_track_count() && index != self.audio_track {
            self.audio_track = index;
            self.format_change = Some(StreamKind::Audio);
        }
    }

    fn current_audio_track(&self) -> usize {
        self.audio_track
    }

    fn take_format_change(&mut self) -> Option<StreamKind> {
        self.format_change.take()
    }

    fn resync_audio(&mut self, time: f64) {
        let time = time.clamp(0.0, self.config.duration);
        self.audio_cursor = (time * self.config.sample_rate as f64).round() as u64;
    }
}
