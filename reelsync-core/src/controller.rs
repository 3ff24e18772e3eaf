//! # Playback Controller
//!
//! The state machine tying decode, buffering and presentation together:
//!
//! ```text
//!            play()              set_paused(true)
//! Stopped ──────────► Playing ◄──────────────────► Paused
//!    ▲                   │     set_paused(false)      │
//!    └────── stop() / end of stream ──────────────────┘
//! ```
//!
//! ## Threading contract
//!
//! `tick()` and every control method take `&mut self`: control calls and ticks
//! must be serialized on one thread (typically the host's main thread). The
//! only concurrency lives inside the decoder, whose workers touch nothing but
//! the two queues and the shared player.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::config::PlaybackConfig;
use crate::decoder::{create_decoder, fill_audio, fill_video, DecodeMode, FrameDecoder};
use crate::frame::Timestamped;
use crate::frame_queue::{AudioFrameQueue, FrameQueue, QueueStats, VideoFrameQueue};
use crate::mixer::AudioMixer;
use crate::player::{share, MediaInfo, MediaPlayer, PlayerError, SharedPlayer, StreamKind, TrackInfo};
use crate::sink::VideoSink;
use crate::sync::{needs_audio_resync, DriftCorrector};
use crate::time::{effective_fps, format_time};

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error(transparent)]
    Open(#[from] PlayerError),
}

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

/// Combined playback statistics
#[derive(Debug, Clone, Default)]
pub struct PlaybackStats {
    pub engine_time: f64,
    pub video: QueueStats,
    pub audio: QueueStats,
    pub frames_presented: u64,
    /// Frames the sink could not convert
    pub frames_skipped: u64,
    pub audio_frames_mixed: u64,
    pub drift_corrections: u64,
    pub audio_resyncs: u64,
}

pub struct PlaybackController {
    config: PlaybackConfig,

    player: Option<SharedPlayer>,
    media_info: MediaInfo,

    video: Arc<VideoFrameQueue>,
    audio: Arc<AudioFrameQueue>,
    decoder: Option<Box<dyn FrameDecoder>>,

    sink: Box<dyn VideoSink>,
    mixer: Box<dyn AudioMixer>,

    playing: bool,
    paused: bool,
    engine_time: f64,
    detected_fps: f32,
    audio_track_index: usize,

    drift: DriftCorrector,
    /// `(start, end)` of the last audio frame mixed since the last flush
    last_audio_span: Option<(f64, f64)>,
    last_video_time: Option<f64>,

    frames_presented: u64,
    frames_skipped: u64,
    audio_frames_mixed: u64,
    audio_resyncs: u64,
}

impl PlaybackController {
    pub fn new(config: PlaybackConfig, sink: Box<dyn VideoSink>, mixer: Box<dyn AudioMixer>) -> Self {
        let video = Arc::new(FrameQueue::with_buffer_ahead(
            config.video_queue_capacity,
            config.video_buffer_ahead,
        ));
        let audio = Arc::new(FrameQueue::with_buffer_ahead(
            config.audio_queue_capacity,
            config.audio_buffer_ahead,
        ));
        let drift = DriftCorrector::new(config.drift_tolerance);

        Self {
            config,
            player: None,
            media_info: MediaInfo::default(),
            video,
            audio,
            decoder: None,
            sink,
            mixer,
            playing: false,
            paused: false,
            engine_time: 0.0,
            detected_fps: effective_fps(0.0),
            audio_track_index: 0,
            drift,
            last_audio_span: None,
            last_video_time: None,
            frames_presented: 0,
            frames_skipped: 0,
            audio_frames_mixed: 0,
            audio_resyncs: 0,
        }
    }

    // ========================================================================
    // Media lifecycle
    // ========================================================================

    /// Open `path` with `player`. On failure the player is closed and dropped
    /// and the controller stays Stopped with no media attached.
    pub fn open(&mut self, mut player: Box<dyn MediaPlayer>, path: impl AsRef<Path>) -> Result<(), PlaybackError> {
        let path = path.as_ref();
        self.close();

        if let Err(e) = player.open(path) {
            tracing::error!("Failed to open {}: {}", path.display(), e);
            player.close();
            return Err(e.into());
        }

        let info = player.media_info();
        if !info.has_video() && !info.has_audio() {
            tracing::error!("No usable streams in {}", path.display());
            player.close();
            return Err(PlayerError::NoStreams(path.to_path_buf()).into());
        }
        if !info.has_audio() {
            tracing::warn!("{} has no audio, playing video only", path.display());
        }
        if !info.has_video() {
            tracing::warn!("{} has no video, playing audio only", path.display());
        }

        tracing::info!(
            "Opened {}: {}x{} @ {:.2} fps, {} ch @ {} Hz, {} audio track(s), length {}",
            path.display(),
            info.width,
            info.height,
            info.framerate,
            info.audio_channels,
            info.audio_sample_rate,
            info.audio_track_count,
            format_time(info.duration)
        );

        self.audio_track_index = player.current_audio_track();
        self.apply_media_info(info);

        let player = share(player);
        self.decoder = Some(self.build_decoder(self.config.decode_mode, player.clone()));
        self.player = Some(player);
        Ok(())
    }

    /// Stop playback and release the player. Best-effort; never panics.
    pub fn close(&mut self) {
        self.stop();
        // drop (and join) the decoder before releasing the player it reads from
        self.decoder = None;
        if let Some(player) = self.player.take() {
            player.lock().close();
            tracing::debug!("Media player released");
        }
        self.media_info = MediaInfo::default();
        self.detected_fps = effective_fps(0.0);
        self.audio_track_index = 0;
    }

    pub fn has_media(&self) -> bool {
        self.player.is_some()
    }

    // ========================================================================
    // Transport
    // ========================================================================

    pub fn play(&mut self) {
        let Some(player) = self.player.clone() else {
            tracing::warn!("play() without media");
            return;
        };

        if !self.playing {
            self.engine_time = 0.0;
            self.flush_queues();
            {
                let mut player = player.lock();
                player.seek(0.0);
                player.play();
            }

            // decoder is stopped here, so the player is ours to read
            self.prebuffer(&player);
            if let Some(decoder) = self.decoder.as_mut() {
                decoder.start();
            }
            tracing::info!("Playback started");
        } else if self.paused {
            player.lock().play();
            if let Some(decoder) = self.decoder.as_mut() {
                decoder.resume();
            }
            tracing::info!("Playback resumed at {}", format_time(self.engine_time));
        } else {
            return;
        }

        self.playing = true;
        self.paused = false;
    }

    /// Safe from any state, idempotent
    pub fn stop(&mut self) {
        let was_playing = self.playing;

        if let Some(decoder) = self.decoder.as_mut() {
            decoder.stop();
        }
        if let Some(player) = &self.player {
            player.lock().stop();
        }

        self.flush_queues();
        self.engine_time = 0.0;
        self.playing = false;
        self.paused = false;

        if was_playing {
            tracing::info!("Playback stopped");
        }
    }

    /// Pausing is only meaningful while playing; no-op if unchanged
    pub fn set_paused(&mut self, paused: bool) {
        if self.player.is_none() || self.paused == paused {
            return;
        }
        if paused && !self.playing {
            tracing::debug!("Ignoring pause while stopped");
            return;
        }

        self.paused = paused;
        if paused {
            if let Some(decoder) = self.decoder.as_mut() {
                decoder.pause();
            }
            if let Some(player) = &self.player {
                player.lock().pause();
            }
            tracing::info!("Playback paused at {}", format_time(self.engine_time));
        } else {
            if let Some(player) = &self.player {
                player.lock().play();
            }
            if let Some(decoder) = self.decoder.as_mut() {
                decoder.resume();
            }
            tracing::info!("Playback resumed at {}", format_time(self.engine_time));
        }
    }

    /// Jump to `time`. No pre-seek frame survives in either queue.
    pub fn seek(&mut self, time: f64) {
        let Some(player) = self.player.clone() else {
            return;
        };
        let time = if self.media_info.duration > 0.0 {
            time.clamp(0.0, self.media_info.duration)
        } else {
            time.max(0.0)
        };

        if let Some(decoder) = self.decoder.as_mut() {
            decoder.pause();
        }

        {
            // a worker that sees the new generation must also see the new position
            let mut player = player.lock();
            self.flush_queues();
            player.seek(time);
        }
        self.engine_time = time;

        if let Some(decoder) = self.decoder.as_mut() {
            if !self.paused {
                decoder.resume();
            }
        }
        // threaded workers refill on their own
        if self.playing && self.decode_mode() == DecodeMode::Sync {
            self.prebuffer(&player);
        }

        tracing::info!("Seeked to {}", format_time(time));
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Advance engine time by `delta` seconds and present whatever is due
    pub fn tick(&mut self, delta: f64) {
        if !self.playing || self.paused {
            return;
        }
        let Some(player) = self.player.clone() else {
            return;
        };

        self.engine_time += delta.max(0.0);

        self.poll_format_change(&player);
        self.correct_drift(&player);

        let now = self.engine_time;
        let rate = self.config.playback_rate;
        if let Some(decoder) = self.decoder.as_mut() {
            if decoder.mode() == DecodeMode::Sync {
                decoder.decode_frames(now);
            }
            if self.video.should_buffer_more(now, rate) {
                decoder.request_more(StreamKind::Video, now);
            }
            if self.audio.should_buffer_more(now, rate) {
                decoder.request_more(StreamKind::Audio, now);
            }
        }

        self.present_video();
        self.mix_due_audio(&player);

        let ended = player.lock().has_ended();
        if ended && self.video.is_empty() && self.audio.is_empty() {
            tracing::info!("End of stream at {}", format_time(self.engine_time));
            self.stop();
        }
    }

    fn present_video(&mut self) {
        let Some(frame) = self.video.try_pop_at_or_before(self.engine_time) else {
            return;
        };
        let pts = frame.presentation_time;
        match self.sink.present(frame) {
            Ok(_) => {
                self.frames_presented += 1;
                self.last_video_time = Some(pts);
            }
            Err(e) => {
                self.frames_skipped += 1;
                tracing::warn!("Skipping video frame at {:.3}s: {}", pts, e);
            }
        }
    }

    fn mix_due_audio(&mut self, player: &SharedPlayer) {
        if let Some(last_mixed) = self.last_audio_span {
            if let Some(buffered) = self.audio.buffered_span() {
                let tolerance = self.config.audio_sync_tolerance;
                if needs_audio_resync(self.engine_time, buffered, last_mixed, tolerance) {
                    self.resync_audio(player, buffered);
                }
            }
        }

        while let Some(frame) = self.audio.try_pop_at_or_before(self.engine_time) {
            let frame_count = frame.frame_count();
            if frame_count == 0 {
                continue;
            }
            self.mixer.mix_audio(frame_count, &frame.samples, 0);
            self.audio_frames_mixed += 1;
            self.last_audio_span = Some((frame.presentation_time, frame.end_time()));
        }
    }

    fn resync_audio(&mut self, player: &SharedPlayer, buffered: (f64, f64)) {
        tracing::info!(
            "Audio resync at {:.3}s (buffered {:.3}..{:.3})",
            self.engine_time,
            buffered.0,
            buffered.1
        );
        // flush under the player lock so no worker reads at the old cursor
        // with the new generation
        let mut player = player.lock();
        self.audio.clear();
        self.audio_resyncs += 1;
        self.last_audio_span = None;

        player.resync_audio(self.engine_time);
        if self.decode_mode() == DecodeMode::Sync {
            fill_audio(player.as_mut(), &self.audio, self.engine_time);
        }
    }

    fn correct_drift(&mut self, player: &SharedPlayer) {
        if !self.config.drift_correction {
            return;
        }
        let Some(position) = player.lock().position() else {
            return;
        };
        if let Some(corrected) = self.drift.correct(self.engine_time, position) {
            tracing::debug!(
                "Correcting time drift: engine={:.3}s, media={:.3}s",
                self.engine_time,
                corrected
            );
            self.engine_time = corrected;
        }
    }

    fn poll_format_change(&mut self, player: &SharedPlayer) {
        let (kind, info) = {
            let mut player = player.lock();
            let Some(kind) = player.take_format_change() else {
                return;
            };
            (kind, player.media_info())
        };

        match kind {
            StreamKind::Video => tracing::info!(
                "Video format changed: {}x{} @ {:.2} fps",
                info.width,
                info.height,
                info.framerate
            ),
            StreamKind::Audio => tracing::info!(
                "Audio format changed: {} ch @ {} Hz",
                info.audio_channels,
                info.audio_sample_rate
            ),
        }
        self.apply_media_info(info);
    }

    // ========================================================================
    // Audio tracks
    // ========================================================================

    pub fn audio_tracks(&self) -> Vec<TrackInfo> {
        let Some(player) = &self.player else {
            return Vec::new();
        };
        let player = player.lock();
        (0..player.audio_track_count())
            .filter_map(|i| player.audio_track_info(i))
            .collect()
    }

    pub fn set_audio_track(&mut self, index: usize) {
        let Some(player) = self.player.clone() else {
            return;
        };
        if index >= self.media_info.audio_track_count {
            tracing::warn!(
                "Audio track {} out of range ({} available)",
                index,
                self.media_info.audio_track_count
            );
            return;
        }
        if index == self.audio_track_index {
            return;
        }

        let sync = self.decode_mode() == DecodeMode::Sync;
        let mut player = player.lock();
        player.set_audio_track(index);
        self.audio_track_index = index;
        tracing::info!("Switched to audio track {}", index);

        if self.playing {
            self.audio.clear();
            self.last_audio_span = None;
            player.resync_audio(self.engine_time);
            if sync {
                fill_audio(player.as_mut(), &self.audio, self.engine_time);
            }
        }
    }

    pub fn audio_track(&self) -> usize {
        self.audio_track_index
    }

    // ========================================================================
    // Decode mode
    // ========================================================================

    pub fn decode_mode(&self) -> DecodeMode {
        self.decoder
            .as_ref()
            .map(|d| d.mode())
            .unwrap_or(self.config.decode_mode)
    }

    /// Fully stops the current decoder before the new one may start
    pub fn set_decode_mode(&mut self, mode: DecodeMode) {
        self.config.decode_mode = mode;
        let Some(player) = self.player.clone() else {
            return;
        };
        if self.decoder.as_ref().is_some_and(|d| d.mode() == mode) {
            return;
        }

        if let Some(mut old) = self.decoder.take() {
            old.stop();
        }
        self.video.reset();
        self.audio.reset();

        let mut decoder = self.build_decoder(mode, player);
        if self.playing {
            decoder.start();
            if self.paused {
                decoder.pause();
            }
        }
        self.decoder = Some(decoder);
        tracing::info!("Decode mode switched to {:?}", mode);
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> PlaybackState {
        match (self.playing, self.paused) {
            (false, _) => PlaybackState::Stopped,
            (true, false) => PlaybackState::Playing,
            (true, true) => PlaybackState::Paused,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Engine time in seconds
    pub fn playback_position(&self) -> f64 {
        self.engine_time
    }

    pub fn media_info(&self) -> &MediaInfo {
        &self.media_info
    }

    pub fn length(&self) -> f64 {
        self.media_info.duration
    }

    pub fn channels(&self) -> u16 {
        self.media_info.audio_channels
    }

    pub fn mix_rate(&self) -> u32 {
        self.media_info.audio_sample_rate
    }

    pub fn detected_fps(&self) -> f32 {
        self.detected_fps
    }

    pub fn last_video_time(&self) -> Option<f64> {
        self.last_video_time
    }

    pub fn video_queue(&self) -> &VideoFrameQueue {
        &self.video
    }

    pub fn audio_queue(&self) -> &AudioFrameQueue {
        &self.audio
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    pub fn stats(&self) -> PlaybackStats {
        PlaybackStats {
            engine_time: self.engine_time,
            video: self.video.stats(),
            audio: self.audio.stats(),
            frames_presented: self.frames_presented,
            frames_skipped: self.frames_skipped,
            audio_frames_mixed: self.audio_frames_mixed,
            drift_corrections: self.drift.corrections(),
            audio_resyncs: self.audio_resyncs,
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn build_decoder(&self, mode: DecodeMode, player: SharedPlayer) -> Box<dyn FrameDecoder> {
        create_decoder(
            mode,
            player,
            self.video.clone(),
            self.audio.clone(),
            self.config.worker_timing(),
        )
    }

    fn apply_media_info(&mut self, info: MediaInfo) {
        self.detected_fps = effective_fps(info.framerate);
        self.media_info = info;
    }

    fn flush_queues(&mut self) {
        self.video.clear();
        self.audio.clear();
        self.last_audio_span = None;
        self.last_video_time = None;
    }

    /// One synchronous fill of both queues. Only valid while no worker runs.
    fn prebuffer(&mut self, player: &SharedPlayer) {
        let mut player = player.lock();
        let video = fill_video(player.as_mut(), &self.video);
        let audio = fill_audio(player.as_mut(), &self.audio, self.engine_time);
        tracing::debug!("Pre-buffered {} video / {} audio frames", video, audio);
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.close();
    }
}

// ============================================================================
// Tests
// ============================================================================
