//! Media time conversions shared by backends and logging.

/// Media Foundation clock units per second (100 ns ticks)
pub const HNS_PER_SECOND: f64 = 10_000_000.0;

/// Default CoreMedia timescale
pub const DEFAULT_TIMESCALE: i32 = 600;

/// Framerate assumed when a source does not report one
pub const FALLBACK_FPS: f32 = 30.0;

/// `HH:MM:SS.mmm`
pub fn format_time(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0) as u64;
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60,
        ms
    )
}

pub fn seconds_to_hns(seconds: f64) -> i64 {
    (seconds * HNS_PER_SECOND) as i64
}

pub fn hns_to_seconds(hns: i64) -> f64 {
    hns as f64 / HNS_PER_SECOND
}

pub fn seconds_to_timescale(seconds: f64, timescale: i32) -> i64 {
    (seconds * timescale as f64) as i64
}

pub fn timescale_to_seconds(value: i64, timescale: i32) -> f64 {
    if timescale == 0 {
        return 0.0;
    }
    value as f64 / timescale as f64
}

/// Framerate to use for a reported value (fallback when missing or bogus)
pub fn effective_fps(reported: f32) -> f32 {
    if reported.is_finite() && reported > 0.0 {
        reported
    } else {
        FALLBACK_FPS
    }
}

pub fn predict_next_frame_time(current_time: f64, fps: f32) -> f64 {
    current_time + 1.0 / effective_fps(fps) as f64
}
