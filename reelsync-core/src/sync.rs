//! Audio/Video Synchronization
//!
//! Engine time is the master clock. Both queues are paced against it; when a
//! backend keeps its own clock, engine time snaps to it on large drift.

/// Snaps engine time to an authoritative position once drift exceeds the
/// tolerance. Correction is a direct assignment, never smoothed.
#[derive(Debug, Clone)]
pub struct DriftCorrector {
    tolerance: f64,
    corrections: u64,
}

impl DriftCorrector {
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance: tolerance.max(0.0),
            corrections: 0,
        }
    }

    /// Drift in seconds. Positive = engine ahead of the backend.
    pub fn drift(engine_time: f64, authoritative: f64) -> f64 {
        engine_time - authoritative
    }

    /// Corrected engine time, or `None` if within tolerance
    pub fn correct(&mut self, engine_time: f64, authoritative: f64) -> Option<f64> {
        if !authoritative.is_finite() {
            return None;
        }
        if Self::drift(engine_time, authoritative).abs() > self.tolerance {
            self.corrections += 1;
            Some(authoritative)
        } else {
            None
        }
    }

    pub fn corrections(&self) -> u64 {
        self.corrections
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }
}

/// Whether audio has lost track of engine time.
///
/// `buffered` is the queued span `(front start, back end)`, `last_mixed` the
/// span of the packet mixed most recently. Engine time running past the end
/// of the buffer is a desync. Engine time before the buffer is only a desync
/// when the last mixed packet no longer covers it: either time went backwards
/// past that packet, or it sits in a gap wider than `tolerance` between that
/// packet and the buffer.
pub fn needs_audio_resync(
    engine_time: f64,
    buffered: (f64, f64),
    last_mixed: (f64, f64),
    tolerance: f64,
) -> bool {
    let (front, back_end) = buffered;
    if engine_time > back_end + tolerance {
        return true;
    }
    if engine_time >= front - tolerance {
        return false;
    }
    let (mixed_start, mixed_end) = last_mixed;
    engine_time < mixed_start - tolerance || engine_time > mixed_end + tolerance
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drift_within_tolerance_is_ignored() {
        let mut drift = DriftCorrector::new(0.1);
        assert_eq!(drift.correct(5.0, 5.05), None);
        assert_eq!(drift.correct(5.0, 4.95), None);
        assert_eq!(drift.corrections(), 0);
    }

    #[test]
    fn test_drift_snaps_to_authoritative() {
        let mut drift = DriftCorrector::new(0.1);
        assert_eq!(drift.correct(5.016, 5.3), Some(5.3));
        assert_eq!(drift.correct(8.0, 7.5), Some(7.5));
        assert_eq!(drift.correct(8.0, f64::NAN), None);
        assert_eq!(drift.corrections(), 2);
    }

    #[test]
    fn test_audio_resync_window() {
        let buffered = (2.0, 2.5);
        let mixed = (1.99, 2.0);
        assert!(!needs_audio_resync(2.2, buffered, mixed, 0.1));
        assert!(!needs_audio_resync(1.95, buffered, mixed, 0.1));
        assert!(!needs_audio_resync(2.58, buffered, mixed, 0.1));
        assert!(needs_audio_resync(2.7, buffered, mixed, 0.1));
        // time jumped back past everything mixed
        assert!(needs_audio_resync(1.5, buffered, mixed, 0.1));
    }

    #[test]
    fn test_long_packets_do_not_resync() {
        // 0.2s contiguous packets: engine sits inside the mixed packet,
        // well before the next buffered one
        let mixed = (0.0, 0.2);
        let buffered = (0.2, 1.0);
        for engine in [0.017, 0.05, 0.099, 0.15, 0.199] {
            assert!(!needs_audio_resync(engine, buffered, mixed, 0.1), "{}", engine);
            assert!(!needs_audio_resync(engine, buffered, mixed, 0.01), "{}", engine);
        }
    }

    #[test]
    fn test_gap_before_buffer_resyncs() {
        // mixed packet ended at 1.0, next buffered audio starts at 2.0
        let mixed = (0.9, 1.0);
        let buffered = (2.0, 2.5);
        assert!(!needs_audio_resync(1.05, buffered, mixed, 0.1));
        assert!(needs_audio_resync(1.3, buffered, mixed, 0.1));
    }
}
