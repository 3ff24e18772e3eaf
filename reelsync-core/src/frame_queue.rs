//! # Frame Queue - Bounded Hand-off Between Decoder and Tick Loop
//!
//! One queue carries video frames, another carries audio frames:
//! - Fixed capacity, drop-oldest on non-blocking push
//! - Blocking push/pop with explicit timeouts (never unbounded)
//! - Presentation pacing via `try_pop_at_or_before`
//! - Abort/reset for cancelling blocked producers
//! - Clear generation, so frames read before a flush are rejected
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  push   ┌────────────┐  try_pop_at_or_before  ┌────────────┐
//! │ Decoder  │────────►│ FrameQueue │───────────────────────►│ Tick loop  │
//! │ (worker) │         │  (bounded) │      (engine time)     │ sink/mixer │
//! └──────────┘         └────────────┘                        └────────────┘
//! ```
//!
//! Push order is assumed to be presentation order. The queue never re-sorts.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

use crate::frame::{AudioFrame, Timestamped, VideoFrame};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue aborted")]
    Aborted,
    #[error("timed out waiting for queue space")]
    TimedOut,
    #[error("frame predates the last flush")]
    Stale,
}

/// A frame the queue refused, handed back with the reason
#[derive(Debug)]
pub struct Rejected<T> {
    pub error: QueueError,
    pub frame: T,
}

impl<T> Rejected<T> {
    pub fn into_frame(self) -> T {
        self.frame
    }
}

// ============================================================================
// Defaults
// ============================================================================

/// Default capacity for both streams
pub const DEFAULT_CAPACITY: usize = 5;

/// Default look-ahead window in seconds (at 1x playback)
pub const DEFAULT_BUFFER_AHEAD: f64 = 0.5;

// ============================================================================
// Frame Queue
// ============================================================================

struct Inner<T> {
    frames: VecDeque<T>,
    aborted: bool,
    /// Incremented by every `clear()`
    generation: u64,
}

/// Thread-safe, fixed-capacity, timestamp-paced frame queue
pub struct FrameQueue<T> {
    capacity: usize,
    buffer_ahead: f64,

    inner: Mutex<Inner<T>>,

    /// Signalled when a frame arrives
    ready_cond: Condvar,

    /// Signalled when space frees up (or waiters must re-check their state)
    space_cond: Condvar,

    frames_pushed: AtomicU64,
    frames_popped: AtomicU64,
    frames_dropped: AtomicU64,
}

pub type VideoFrameQueue = FrameQueue<VideoFrame>;
pub type AudioFrameQueue = FrameQueue<AudioFrame>;

impl<T: Timestamped> FrameQueue<T> {
    /// Create a queue with the default look-ahead window
    pub fn new(capacity: usize) -> Self {
        Self::with_buffer_ahead(capacity, DEFAULT_BUFFER_AHEAD)
    }

    /// Create a queue with an explicit look-ahead window (seconds at 1x)
    pub fn with_buffer_ahead(capacity: usize, buffer_ahead: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            buffer_ahead: buffer_ahead.max(0.0),
            inner: Mutex::new(Inner {
                frames: VecDeque::with_capacity(capacity + 1),
                aborted: false,
                generation: 0,
            }),
            ready_cond: Condvar::new(),
            space_cond: Condvar::new(),
            frames_pushed: AtomicU64::new(0),
            frames_popped: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
        }
    }

    // ========================================================================
    // Producer API
    // ========================================================================

    /// Append a frame, evicting the oldest frames if the queue overflows.
    /// Never blocks. Fails only on an aborted queue.
    pub fn push(&self, frame: T) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        if inner.aborted {
            return Err(QueueError::Aborted);
        }

        inner.frames.push_back(frame);
        self.frames_pushed.fetch_add(1, Ordering::Relaxed);

        while inner.frames.len() > self.capacity {
            inner.frames.pop_front();
            self.frames_dropped.fetch_add(1, Ordering::Relaxed);
        }

        self.ready_cond.notify_one();
        Ok(())
    }

    /// Append a frame, waiting up to `timeout` for space
    pub fn push_blocking(&self, frame: T, timeout: Duration) -> Result<(), Rejected<T>> {
        let generation = self.generation();
        self.push_blocking_from(frame, generation, timeout)
    }

    /// Like [`push_blocking`](Self::push_blocking), but the frame is rejected
    /// as `Stale` if the queue was cleared after `generation` was observed.
    pub fn push_blocking_from(
        &self,
        frame: T,
        generation: u64,
        timeout: Duration,
    ) -> Result<(), Rejected<T>> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();

        loop {
            if inner.aborted {
                return Err(Rejected { error: QueueError::Aborted, frame });
            }
            if inner.generation != generation {
                return Err(Rejected { error: QueueError::Stale, frame });
            }
            if inner.frames.len() < self.capacity {
                break;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Rejected { error: QueueError::TimedOut, frame });
            }
            self.space_cond.wait_for(&mut inner, remaining);
        }

        inner.frames.push_back(frame);
        self.frames_pushed.fetch_add(1, Ordering::Relaxed);
        self.ready_cond.notify_one();
        Ok(())
    }

    // ========================================================================
    // Consumer API
    // ========================================================================

    /// Remove the front frame only if it is due at `current_time`
    pub fn try_pop_at_or_before(&self, current_time: f64) -> Option<T> {
        let mut inner = self.inner.lock();

        let due = inner
            .frames
            .front()
            .is_some_and(|f| f.presentation_time() <= current_time);
        if !due {
            return None;
        }

        let frame = inner.frames.pop_front();
        self.frames_popped.fetch_add(1, Ordering::Relaxed);
        self.space_cond.notify_one();
        frame
    }

    /// Remove the front frame regardless of its timestamp, waiting up to
    /// `timeout` for one to arrive. `None` on timeout or abort, even if the
    /// aborted queue still holds frames.
    pub fn pop_blocking(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();

        loop {
            if inner.aborted {
                return None;
            }
            if !inner.frames.is_empty() {
                break;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            self.ready_cond.wait_for(&mut inner, remaining);
        }

        let frame = inner.frames.pop_front();
        self.frames_popped.fetch_add(1, Ordering::Relaxed);
        self.space_cond.notify_one();
        frame
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Timestamp of the next frame to be popped
    pub fn peek_front(&self) -> Option<f64> {
        self.inner.lock().frames.front().map(|f| f.presentation_time())
    }

    /// Timestamp of the most recently queued frame
    pub fn latest_timestamp(&self) -> Option<f64> {
        self.inner.lock().frames.back().map(|f| f.presentation_time())
    }

    /// `(front, back)` timestamps under a single lock
    pub fn time_range(&self) -> Option<(f64, f64)> {
        let inner = self.inner.lock();
        let front = inner.frames.front()?.presentation_time();
        let back = inner.frames.back()?.presentation_time();
        Some((front, back))
    }

    /// `(front start, back end)`: the stretch of timeline the queue covers,
    /// including the duration of the last frame
    pub fn buffered_span(&self) -> Option<(f64, f64)> {
        let inner = self.inner.lock();
        let front = inner.frames.front()?.presentation_time();
        let back = inner.frames.back()?.end_time();
        Some((front, back))
    }

    /// True if the queue is empty or holds less than
    /// `buffer_ahead * playback_rate` seconds beyond `current_time`
    pub fn should_buffer_more(&self, current_time: f64, playback_rate: f64) -> bool {
        let window = self.buffer_ahead * playback_rate;
        match self.latest_timestamp() {
            None => true,
            Some(latest) => latest - current_time < window,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().frames.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.inner.lock().frames.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn buffer_ahead(&self) -> f64 {
        self.buffer_ahead
    }

    /// Current clear generation
    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.lock().aborted
    }

    // ========================================================================
    // Control API
    // ========================================================================

    /// Drop every queued frame and start a new generation
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.frames.clear();
        inner.generation = inner.generation.wrapping_add(1);

        // Producers blocked on a full queue must notice the new generation
        self.space_cond.notify_all();
    }

    /// Fail every blocked and future blocking operation until `reset()`
    pub fn abort(&self) {
        self.inner.lock().aborted = true;
        self.ready_cond.notify_all();
        self.space_cond.notify_all();
    }

    /// Clear the abort condition
    pub fn reset(&self) {
        self.inner.lock().aborted = false;
    }

    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.lock();
        QueueStats {
            buffered: inner.frames.len(),
            capacity: self.capacity,
            pushed: self.frames_pushed.load(Ordering::Relaxed),
            popped: self.frames_popped.load(Ordering::Relaxed),
            dropped: self.frames_dropped.load(Ordering::Relaxed),
            front_time: inner.frames.front().map(|f| f.presentation_time()),
            back_time: inner.frames.back().map(|f| f.presentation_time()),
            aborted: inner.aborted,
        }
    }
}

/// Queue statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueStats {
    pub buffered: usize,
    pub capacity: usize,
    pub pushed: u64,
    pub popped: u64,
    /// Frames evicted by drop-oldest
    pub dropped: u64,
    pub front_time: Option<f64>,
    pub back_time: Option<f64>,
    pub aborted: bool,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[derive(Debug, PartialEq)]
    struct Tick(f64);

    impl Timestamped for Tick {
        fn presentation_time(&self) -> f64 {
            self.0
        }
    }

    fn filled(capacity: usize, times: &[f64]) -> FrameQueue<Tick> {
        let queue = FrameQueue::new(capacity);
        for &t in times {
            queue.push(Tick(t)).unwrap();
        }
        queue
    }

    #[test]
    fn test_size_never_exceeds_capacity() {
        for capacity in 1..=6 {
            let queue = FrameQueue::new(capacity);
            for i in 0..20 {
                queue.push(Tick(i as f64 * 0.04)).unwrap();
                assert!(queue.len() <= capacity);
            }
        }
    }

    #[test]
    fn test_drop_oldest_keeps_last_frames() {
        // capacity 3, four pushes: the frame at 0.0 is evicted
        let queue = filled(3, &[0.0, 0.1, 0.2, 0.3]);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.time_range(), Some((0.1, 0.3)));
        assert_eq!(queue.stats().dropped, 1);

        // C + k pushes leave exactly the last C
        let queue = filled(4, &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let mut kept = Vec::new();
        while let Some(Tick(t)) = queue.try_pop_at_or_before(f64::MAX) {
            kept.push(t);
        }
        assert_eq!(kept, vec![3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_capacity_one_always_replaces() {
        let queue = filled(1, &[0.0, 0.5, 1.0]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.peek_front(), Some(1.0));
    }

    #[test]
    fn test_pacing_yields_due_prefix_in_order() {
        let queue = filled(8, &[0.1, 0.2, 0.3, 0.4, 0.5]);

        assert!(queue.try_pop_at_or_before(0.05).is_none());

        let mut seen = Vec::new();
        for now in [0.15, 0.25, 0.45, 0.5] {
            while let Some(Tick(t)) = queue.try_pop_at_or_before(now) {
                assert!(t <= now);
                seen.push(t);
            }
        }
        assert_eq!(seen, vec![0.1, 0.2, 0.3, 0.4, 0.5]);
        assert!(queue.try_pop_at_or_before(10.0).is_none());
    }

    #[test]
    fn test_should_buffer_more() {
        let queue: FrameQueue<Tick> = FrameQueue::with_buffer_ahead(5, 0.5);
        assert!(queue.should_buffer_more(0.0, 1.0));

        queue.push(Tick(0.3)).unwrap();
        assert!(queue.should_buffer_more(0.0, 1.0));

        queue.push(Tick(0.6)).unwrap();
        assert!(!queue.should_buffer_more(0.0, 1.0));
        // 2x playback doubles the window
        assert!(queue.should_buffer_more(0.0, 2.0));
    }

    #[test]
    fn test_clear_advances_generation() {
        let queue = filled(5, &[0.0, 0.1]);
        let before = queue.generation();
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.generation(), before + 1);

        let rejected = queue
            .push_blocking_from(Tick(0.2), before, Duration::from_millis(10))
            .unwrap_err();
        assert_eq!(rejected.error, QueueError::Stale);
        assert_eq!(rejected.into_frame(), Tick(0.2));
    }

    #[test]
    fn test_aborted_queue_rejects_pushes() {
        let queue: FrameQueue<Tick> = FrameQueue::new(2);
        queue.abort();
        assert_eq!(queue.push(Tick(0.0)), Err(QueueError::Aborted));
        let rejected = queue
            .push_blocking(Tick(0.0), Duration::from_millis(10))
            .unwrap_err();
        assert_eq!(rejected.error, QueueError::Aborted);
        assert!(queue.pop_blocking(Duration::from_millis(10)).is_none());

        queue.reset();
        assert!(queue.push(Tick(0.0)).is_ok());
    }

    #[test]
    fn test_push_blocking_times_out_when_full() {
        let queue = filled(2, &[0.0, 0.1]);
        let start = Instant::now();
        let rejected = queue
            .push_blocking(Tick(0.2), Duration::from_millis(30))
            .unwrap_err();
        assert_eq!(rejected.error, QueueError::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_push_blocking_resumes_after_pop() {
        let queue = Arc::new(filled(1, &[0.0]));
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || queue.push_blocking(Tick(0.1), Duration::from_secs(5)))
        };

        thread::sleep(Duration::from_millis(20));
        assert_eq!(queue.try_pop_at_or_before(0.0), Some(Tick(0.0)));

        assert!(producer.join().unwrap().is_ok());
        assert_eq!(queue.peek_front(), Some(0.1));
    }

    #[test]
    fn test_abort_wakes_blocked_producer() {
        let queue = Arc::new(filled(1, &[0.0]));
        let timeout = Duration::from_secs(5);

        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                let start = Instant::now();
                let result = queue.push_blocking(Tick(0.1), timeout);
                (result.map_err(|r| r.error), start.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(50));
        queue.abort();

        let (result, waited) = producer.join().unwrap();
        assert_eq!(result, Err(QueueError::Aborted));
        assert!(waited < timeout);
    }

    #[test]
    fn test_pop_blocking_waits_for_frame() {
        let queue: Arc<FrameQueue<Tick>> = Arc::new(FrameQueue::new(3));
        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || queue.pop_blocking(Duration::from_secs(5)))
        };

        thread::sleep(Duration::from_millis(20));
        queue.push(Tick(7.0)).unwrap();
        assert_eq!(consumer.join().unwrap(), Some(Tick(7.0)));

        assert!(queue.pop_blocking(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn test_pop_blocking_fails_on_abort_with_frames_queued() {
        let queue = filled(3, &[0.0, 0.1]);
        queue.abort();
        assert!(queue.pop_blocking(Duration::from_secs(5)).is_none());
        assert_eq!(queue.len(), 2);

        queue.reset();
        assert_eq!(queue.pop_blocking(Duration::from_millis(10)), Some(Tick(0.0)));
    }

    /// Payload spanning `[start, end)`
    struct Clip(f64, f64);

    impl Timestamped for Clip {
        fn presentation_time(&self) -> f64 {
            self.0
        }

        fn end_time(&self) -> f64 {
            self.1
        }
    }

    #[test]
    fn test_buffered_span_includes_last_duration() {
        let queue: FrameQueue<Clip> = FrameQueue::new(4);
        assert_eq!(queue.buffered_span(), None);

        queue.push(Clip(1.0, 1.2)).unwrap();
        queue.push(Clip(1.2, 1.4)).unwrap();
        assert_eq!(queue.buffered_span(), Some((1.0, 1.4)));
        assert_eq!(queue.time_range(), Some((1.0, 1.2)));

        let ticks = filled(3, &[0.5, 0.6]);
        assert_eq!(ticks.buffered_span(), Some((0.5, 0.6)));
    }

    #[test]
    fn test_stats() {
        let queue = filled(2, &[0.0, 0.1, 0.2]);
        queue.try_pop_at_or_before(0.15);
        let stats = queue.stats();
        assert_eq!(stats.pushed, 3);
        assert_eq!(stats.popped, 1);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.buffered, 1);
        assert_eq!(stats.front_time, Some(0.2));
        assert!(!stats.aborted);
    }
}
