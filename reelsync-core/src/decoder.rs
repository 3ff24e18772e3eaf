//! # Frame Decoder
//!
//! Moves frames from a [`MediaPlayer`] into the video and audio queues.
//!
//! ## Scheduling models:
//! 1. Sync - the tick loop calls `decode_frames()`; no threads, no blocking
//! 2. Threaded - one background worker per stream, blocking pushes with timeout
//!
//! Only one model touches the player at a time. Switching models means fully
//! stopping one decoder before starting the other.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::frame::Timestamped;
use crate::frame_queue::{AudioFrameQueue, FrameQueue, QueueError, VideoFrameQueue};
use crate::player::{MediaPlayer, SharedPlayer, StreamKind};

/// Decode scheduling model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DecodeMode {
    #[default]
    Sync,
    Threaded,
}

/// Worker sleep and timeout intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerTiming {
    pub push_timeout: Duration,
    pub idle: Duration,
    pub retry: Duration,
}

impl Default for WorkerTiming {
    fn default() -> Self {
        Self {
            push_timeout: Duration::from_millis(50),
            idle: Duration::from_millis(10),
            retry: Duration::from_millis(5),
        }
    }
}

/// Decoder trait - implemented by both scheduling models
pub trait FrameDecoder: Send {
    /// Idempotent
    fn start(&mut self);

    /// Idempotent. No push happens after this returns.
    fn stop(&mut self);

    /// Suspend decoding without releasing anything
    fn pause(&mut self);

    fn resume(&mut self);

    fn is_running(&self) -> bool;

    fn is_paused(&self) -> bool;

    fn mode(&self) -> DecodeMode;

    /// Caller-driven decode pass. Threaded decoders produce on their own and
    /// return 0.
    fn decode_frames(&mut self, current_time: f64) -> usize {
        let _ = current_time;
        0
    }

    /// Top up one stream whose queue ran low. Threaded decoders ignore this.
    fn request_more(&mut self, kind: StreamKind, current_time: f64) -> usize {
        let _ = (kind, current_time);
        0
    }
}

/// Build the decoder for `mode`. The decoder is returned stopped.
pub fn create_decoder(
    mode: DecodeMode,
    player: SharedPlayer,
    video: Arc<VideoFrameQueue>,
    audio: Arc<AudioFrameQueue>,
    timing: WorkerTiming,
) -> Box<dyn FrameDecoder> {
    match mode {
        DecodeMode::Sync => Box::new(SyncFrameDecoder::new(player, video, audio)),
        DecodeMode::Threaded => Box::new(ThreadedFrameDecoder::new(player, video, audio, timing)),
    }
}

// ============================================================================
// Queue filling
// ============================================================================

/// Read video frames until the queue is full or the player has nothing ready
pub fn fill_video(player: &mut dyn MediaPlayer, queue: &VideoFrameQueue) -> usize {
    let mut pushed = 0;
    while !queue.is_full() {
        let Some(frame) = player.read_video_frame() else {
            break;
        };
        if queue.push(frame).is_err() {
            break;
        }
        pushed += 1;
    }
    pushed
}

/// Read audio frames until the queue is full or the player has nothing ready
pub fn fill_audio(player: &mut dyn MediaPlayer, queue: &AudioFrameQueue, current_time: f64) -> usize {
    let mut pushed = 0;
    while !queue.is_full() {
        let Some(frame) = player.read_audio_frame(current_time) else {
            break;
        };
        if queue.push(frame).is_err() {
            break;
        }
        pushed += 1;
    }
    pushed
}

// ============================================================================
// Sync decoder
// ============================================================================

/// Decodes on the calling thread when asked to
pub struct SyncFrameDecoder {
    player: SharedPlayer,
    video: Arc<VideoFrameQueue>,
    audio: Arc<AudioFrameQueue>,
    running: bool,
    paused: bool,
}

impl SyncFrameDecoder {
    pub fn new(player: SharedPlayer, video: Arc<VideoFrameQueue>, audio: Arc<AudioFrameQueue>) -> Self {
        Self {
            player,
            video,
            audio,
            running: false,
            paused: false,
        }
    }

    fn active(&self) -> bool {
        self.running && !self.paused
    }
}

impl FrameDecoder for SyncFrameDecoder {
    fn start(&mut self) {
        self.running = true;
        self.paused = false;
    }

    fn stop(&mut self) {
        self.running = false;
        self.paused = false;
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn resume(&mut self) {
        self.paused = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn mode(&self) -> DecodeMode {
        DecodeMode::Sync
    }

    fn decode_frames(&mut self, current_time: f64) -> usize {
        if !self.active() {
            return 0;
        }
        let mut player = self.player.lock();
        fill_video(player.as_mut(), &self.video) + fill_audio(player.as_mut(), &self.audio, current_time)
    }

    fn request_more(&mut self, kind: StreamKind, current_time: f64) -> usize {
        if !self.active() {
            return 0;
        }
        let mut player = self.player.lock();
        match kind {
            StreamKind::Video => fill_video(player.as_mut(), &self.video),
            StreamKind::Audio => fill_audio(player.as_mut(), &self.audio, current_time),
        }
    }
}

// ============================================================================
// Threaded decoder
// ============================================================================

struct WorkerFlags {
    running: AtomicBool,
    paused: AtomicBool,
}

/// One background worker per stream, communicating only through the queues
pub struct ThreadedFrameDecoder {
    player: SharedPlayer,
    video: Arc<VideoFrameQueue>,
    audio: Arc<AudioFrameQueue>,
    timing: WorkerTiming,
    flags: Arc<WorkerFlags>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadedFrameDecoder {
    pub fn new(
        player: SharedPlayer,
        video: Arc<VideoFrameQueue>,
        audio: Arc<AudioFrameQueue>,
        timing: WorkerTiming,
    ) -> Self {
        Self {
            player,
            video,
            audio,
            timing,
            flags: Arc::new(WorkerFlags {
                running: AtomicBool::new(false),
                paused: AtomicBool::new(false),
            }),
            workers: Vec::with_capacity(2),
        }
    }

    fn spawn_worker<T, F>(&mut self, kind: StreamKind, queue: Arc<FrameQueue<T>>, read: F)
    where
        T: Timestamped + Send + 'static,
        F: Fn(&mut dyn MediaPlayer, &FrameQueue<T>) -> Option<T> + Send + 'static,
    {
        let worker = Worker {
            kind,
            flags: self.flags.clone(),
            player: self.player.clone(),
            queue,
            timing: self.timing,
        };
        let name = match kind {
            StreamKind::Video => "reelsync-video",
            StreamKind::Audio => "reelsync-audio",
        };

        match thread::Builder::new()
            .name(name.into())
            .spawn(move || worker.run(read))
        {
            Ok(handle) => self.workers.push(handle),
            Err(e) => tracing::error!("Failed to spawn {:?} decode worker: {}", kind, e),
        }
    }
}

impl FrameDecoder for ThreadedFrameDecoder {
    fn start(&mut self) {
        if self.flags.running.load(Ordering::SeqCst) {
            return;
        }

        self.video.reset();
        self.audio.reset();
        self.flags.paused.store(false, Ordering::SeqCst);
        self.flags.running.store(true, Ordering::SeqCst);

        self.spawn_worker(StreamKind::Video, self.video.clone(), |player, _| {
            player.read_video_frame()
        });
        self.spawn_worker(StreamKind::Audio, self.audio.clone(), |player, queue| {
            let hint = queue.latest_timestamp().unwrap_or(0.0);
            player.read_audio_frame(hint)
        });

        tracing::debug!("Threaded frame decoder started ({} workers)", self.workers.len());
    }

    fn stop(&mut self) {
        if !self.flags.running.load(Ordering::SeqCst) && self.workers.is_empty() {
            return;
        }

        // Abort first: a worker blocked in push_blocking has no consumer to wake it
        self.video.abort();
        self.audio.abort();
        self.flags.running.store(false, Ordering::SeqCst);

        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!("Decode worker panicked");
            }
        }

        // Workers are gone; the queues are usable again
        self.video.reset();
        self.audio.reset();
        self.flags.paused.store(false, Ordering::SeqCst);

        tracing::debug!("Threaded frame decoder stopped");
    }

    fn pause(&mut self) {
        self.flags.paused.store(true, Ordering::SeqCst);
    }

    fn resume(&mut self) {
        self.flags.paused.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.flags.running.load(Ordering::SeqCst)
    }

    fn is_paused(&self) -> bool {
        self.flags.paused.load(Ordering::SeqCst)
    }

    fn mode(&self) -> DecodeMode {
        DecodeMode::Threaded
    }
}

impl Drop for ThreadedFrameDecoder {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker<T> {
    kind: StreamKind,
    flags: Arc<WorkerFlags>,
    player: SharedPlayer,
    queue: Arc<FrameQueue<T>>,
    timing: WorkerTiming,
}

impl<T: Timestamped> Worker<T> {
    fn run<F>(self, read: F)
    where
        F: Fn(&mut dyn MediaPlayer, &FrameQueue<T>) -> Option<T>,
    {
        // A frame that timed out waiting for space, with the generation it was read in
        let mut pending: Option<(T, u64)> = None;
        let mut ended = false;

        while self.flags.running.load(Ordering::SeqCst) {
            if self.flags.paused.load(Ordering::SeqCst) {
                thread::sleep(self.timing.idle);
                continue;
            }

            let (frame, generation) = match pending.take() {
                Some(p) => p,
                None => {
                    let (frame, generation, at_end) = {
                        // flushes happen under the player lock, so the generation
                        // seen here matches the position the read comes from
                        let mut player = self.player.lock();
                        let generation = self.queue.generation();
                        let frame = read(player.as_mut(), &self.queue);
                        let at_end = frame.is_none() && player.has_ended();
                        (frame, generation, at_end)
                    };

                    match frame {
                        Some(frame) => {
                            ended = false;
                            (frame, generation)
                        }
                        None if at_end => {
                            if !ended {
                                tracing::debug!("{:?} worker reached end of stream", self.kind);
                                ended = true;
                            }
                            thread::sleep(self.timing.idle);
                            continue;
                        }
                        None => {
                            thread::sleep(self.timing.retry);
                            continue;
                        }
                    }
                }
            };

            match self.queue.push_blocking_from(frame, generation, self.timing.push_timeout) {
                Ok(()) => {}
                Err(rejected) => match rejected.error {
                    QueueError::TimedOut => pending = Some((rejected.frame, generation)),
                    QueueError::Stale => {
                        tracing::trace!("{:?} worker dropped a pre-flush frame", self.kind);
                    }
                    QueueError::Aborted => break,
                },
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{AudioFrame, VideoFrame};
    use crate::player::{share, MediaInfo, PlayerError, PlayerState, TrackInfo};
    use std::path::Path;
    use std::time::Instant;

    /// Endless 100 fps video, 10ms audio packets
    struct Counter {
        video_next: u64,
        audio_next: u64,
        video_limit: Option<u64>,
    }

    impl Counter {
        fn endless() -> Self {
            Self { video_next: 0, audio_next: 0, video_limit: None }
        }
    }

    impl MediaPlayer for Counter {
        fn open(&mut self, _path: &Path) -> Result<(), PlayerError> {
            Ok(())
        }
        fn close(&mut self) {}
        fn is_open(&self) -> bool {
            true
        }
        fn play(&mut self) {}
        fn pause(&mut self) {}
        fn stop(&mut self) {}
        fn seek(&mut self, time: f64) {
            self.video_next = (time * 100.0).round() as u64;
            self.audio_next = self.video_next;
        }
        fn state(&self) -> PlayerState {
            PlayerState::Playing
        }
        fn has_ended(&self) -> bool {
            self.video_limit.is_some_and(|limit| self.video_next >= limit)
        }
        fn media_info(&self) -> MediaInfo {
            MediaInfo::default()
        }
        fn position(&self) -> Option<f64> {
            None
        }
        fn read_video_frame(&mut self) -> Option<VideoFrame> {
            if self.video_limit.is_some_and(|limit| self.video_next >= limit) {
                return None;
            }
            let t = self.video_next as f64 / 100.0;
            self.video_next += 1;
            Some(VideoFrame::new(vec![0; 4], 1, 1, t))
        }
        fn read_audio_frame(&mut self, _current_time: f64) -> Option<AudioFrame> {
            let t = self.audio_next as f64 / 100.0;
            self.audio_next += 1;
            Some(AudioFrame::new(vec![0.0; 960], 2, 48_000, t))
        }
        fn audio_track_info(&self, _index: usize) -> Option<TrackInfo> {
            None
        }
        fn set_audio_track(&mut self, _index: usize) {}
        fn current_audio_track(&self) -> usize {
            0
        }
    }

    fn queues(capacity: usize) -> (Arc<VideoFrameQueue>, Arc<AudioFrameQueue>) {
        (Arc::new(FrameQueue::new(capacity)), Arc::new(FrameQueue::new(capacity)))
    }

    fn fast_timing() -> WorkerTiming {
        WorkerTiming {
            push_timeout: Duration::from_millis(10),
            idle: Duration::from_millis(2),
            retry: Duration::from_millis(1),
        }
    }

    fn wait_until(what: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if what() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_sync_decoder_fills_to_capacity() {
        let (video, audio) = queues(4);
        let mut decoder = SyncFrameDecoder::new(share(Box::new(Counter::endless())), video.clone(), audio.clone());

        // not started: nothing happens
        assert_eq!(decoder.decode_frames(0.0), 0);

        decoder.start();
        assert_eq!(decoder.decode_frames(0.0), 8);
        assert_eq!(video.len(), 4);
        assert_eq!(audio.len(), 4);
        assert_eq!(video.stats().dropped, 0);

        // queues full: a second pass reads nothing
        assert_eq!(decoder.decode_frames(0.0), 0);

        decoder.pause();
        video.clear();
        assert_eq!(decoder.request_more(StreamKind::Video, 0.0), 0);
        decoder.resume();
        assert_eq!(decoder.request_more(StreamKind::Video, 0.0), 4);
    }

    #[test]
    fn test_sync_decoder_stops_at_end_of_stream() {
        let (video, audio) = queues(10);
        let player = Counter { video_limit: Some(3), ..Counter::endless() };
        let mut decoder = SyncFrameDecoder::new(share(Box::new(player)), video.clone(), audio);
        decoder.start();
        decoder.decode_frames(0.0);
        assert_eq!(video.len(), 3);
        assert_eq!(video.latest_timestamp(), Some(0.02));
    }

    #[test]
    fn test_threaded_decoder_fills_and_stops() {
        let (video, audio) = queues(3);
        let mut decoder =
            ThreadedFrameDecoder::new(share(Box::new(Counter::endless())), video.clone(), audio.clone(), fast_timing());

        decoder.start();
        decoder.start();
        assert!(decoder.is_running());
        assert!(wait_until(|| video.is_full() && audio.is_full()));

        decoder.stop();
        assert!(!decoder.is_running());
        assert!(!video.is_aborted());

        // nothing is pushed after stop() returns
        video.clear();
        audio.clear();
        thread::sleep(Duration::from_millis(30));
        assert!(video.is_empty());
        assert!(audio.is_empty());

        decoder.stop();
    }

    #[test]
    fn test_threaded_decoder_keeps_frames_in_order_while_consumer_drains() {
        let (video, audio) = queues(2);
        let mut decoder =
            ThreadedFrameDecoder::new(share(Box::new(Counter::endless())), video.clone(), audio, fast_timing());
        decoder.start();

        // slow consumer: producers block and retry, no frame is lost
        let mut seen = Vec::new();
        while seen.len() < 20 {
            if let Some(frame) = video.pop_blocking(Duration::from_secs(5)) {
                seen.push((frame.presentation_time * 100.0).round() as u64);
            } else {
                break;
            }
        }
        decoder.stop();

        let expected: Vec<u64> = (0..20).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_threaded_pause_halts_production() {
        let (video, audio) = queues(50);
        let mut decoder =
            ThreadedFrameDecoder::new(share(Box::new(Counter::endless())), video.clone(), audio.clone(), fast_timing());
        decoder.start();
        decoder.pause();
        assert!(decoder.is_paused());

        // let any in-flight read land, then flush it
        thread::sleep(Duration::from_millis(20));
        video.clear();
        audio.clear();
        thread::sleep(Duration::from_millis(30));
        assert!(video.is_empty());

        decoder.resume();
        assert!(wait_until(|| !video.is_empty()));
        decoder.stop();
    }

    #[test]
    fn test_factory_selects_mode() {
        let player = share(Box::new(Counter::endless()));
        let (video, audio) = queues(2);
        let sync = create_decoder(DecodeMode::Sync, player.clone(), video.clone(), audio.clone(), fast_timing());
        let threaded = create_decoder(DecodeMode::Threaded, player, video, audio, fast_timing());
        assert_eq!(sync.mode(), DecodeMode::Sync);
        assert_eq!(threaded.mode(), DecodeMode::Threaded);
        assert!(!threaded.is_running());
    }
}
