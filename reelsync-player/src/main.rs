//! # ReelSync Player
//!
//! Headless driver for the playback core: opens a test-pattern source, runs
//! the tick loop at a fixed host cadence and reports playback statistics.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use parking_lot::Mutex;

use reelsync_core::decoder::DecodeMode;
use reelsync_core::frame::VideoFrame;
use reelsync_core::sink::{ImageUpdate, SinkError};
use reelsync_core::test_pattern::{TestPatternConfig, TestPatternPlayer};
use reelsync_core::time::format_time;
use reelsync_core::{
    AudioMixer, DisplayImage, PlaybackConfig, PlaybackController, PlaybackStats, VideoSink,
};

/// Host tick cadence
const TICK_HZ: f64 = 60.0;

// ============================================================================
// Options
// ============================================================================

struct Options {
    config: Option<PathBuf>,
    threaded: bool,
    verbose: bool,
    realtime: bool,
    seek: Option<f64>,
    duration: f64,
    fps: f32,
    audio_tracks: usize,
    audio_track: Option<usize>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            config: None,
            threaded: false,
            verbose: false,
            realtime: false,
            seek: None,
            duration: 3.0,
            fps: 30.0,
            audio_tracks: 1,
            audio_track: None,
        }
    }
}

fn parse_value<T>(args: &[String], i: usize, flag: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let value = args
        .get(i + 1)
        .ok_or_else(|| anyhow::anyhow!("Missing value for {}", flag))?;
    value
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("Invalid value {} for {}: {}", value, flag, e))
}

fn parse_args(args: &[String]) -> Result<Options> {
    let mut options = Options::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow::anyhow!("Missing value for --config"))?;
                options.config = Some(PathBuf::from(value));
                i += 2;
            }
            "--threaded" => {
                options.threaded = true;
                i += 1;
            }
            "--verbose" | "-v" => {
                options.verbose = true;
                i += 1;
            }
            "--realtime" => {
                options.realtime = true;
                i += 1;
            }
            "--seek" => {
                options.seek = Some(parse_value(args, i, "--seek")?);
                i += 2;
            }
            "--duration" | "-d" => {
                options.duration = parse_value(args, i, "--duration")?;
                i += 2;
            }
            "--fps" => {
                options.fps = parse_value(args, i, "--fps")?;
                i += 2;
            }
            "--tracks" => {
                options.audio_tracks = parse_value(args, i, "--tracks")?;
                i += 2;
            }
            "--audio-track" => {
                options.audio_track = Some(parse_value(args, i, "--audio-track")?);
                i += 2;
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                print_usage();
                anyhow::bail!("Unknown argument {:?}", other);
            }
        }
    }

    Ok(options)
}

fn print_usage() {
    eprintln!(
        "\nUsage:\n  reelsync [--config <file.json>] [--threaded] [--realtime] [--verbose]\n           \
         [--duration <secs>] [--fps <n>] [--seek <secs>] [--tracks <n>] [--audio-track <i>]\n"
    );
}

// ============================================================================
// Host-side sink and mixer
// ============================================================================

/// Presents into a `DisplayImage` the host can inspect after the run
struct SharedImage(Arc<Mutex<DisplayImage>>);

impl VideoSink for SharedImage {
    fn present(&mut self, frame: VideoFrame) -> Result<ImageUpdate, SinkError> {
        self.0.lock().present(frame)
    }
}

#[derive(Default)]
struct Meter {
    frames: u64,
    peak: f32,
}

/// Stands in for an audio device: counts mixed frames and tracks the peak level
struct LevelMeter(Arc<Mutex<Meter>>);

impl AudioMixer for LevelMeter {
    fn mix_audio(&mut self, frame_count: usize, samples: &[f32], offset: usize) {
        let mut meter = self.0.lock();
        meter.frames += frame_count as u64;
        let channels = if frame_count > 0 { samples.len() / frame_count } else { 0 };
        let start = (offset * channels).min(samples.len());
        for sample in &samples[start..] {
            meter.peak = meter.peak.max(sample.abs());
        }
    }
}

// ============================================================================
// Main
// ============================================================================

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let options = parse_args(&args)?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(if options.verbose { "reelsync=debug" } else { "reelsync=info" })
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("ReelSync v{} (core {})", env!("CARGO_PKG_VERSION"), reelsync_core::VERSION);

    run(&options)
}

fn load_config(options: &Options) -> Result<PlaybackConfig> {
    let mut config = match &options.config {
        Some(path) => PlaybackConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PlaybackConfig::default(),
    };
    if options.threaded {
        config = config.with_decode_mode(DecodeMode::Threaded);
    }
    Ok(config)
}

fn run(options: &Options) -> Result<()> {
    let config = load_config(options)?;
    tracing::debug!("Config: {:?}", config);

    let image = Arc::new(Mutex::new(DisplayImage::new()));
    let meter = Arc::new(Mutex::new(Meter::default()));

    let mut controller = PlaybackController::new(
        config,
        Box::new(SharedImage(image.clone())),
        Box::new(LevelMeter(meter.clone())),
    );

    let source = TestPatternPlayer::new(TestPatternConfig {
        fps: options.fps,
        duration: options.duration,
        audio_tracks: options.audio_tracks,
        ..Default::default()
    });
    controller
        .open(Box::new(source), "pattern://reelsync")
        .context("Failed to open test pattern")?;

    for track in controller.audio_tracks() {
        tracing::debug!("Audio track {}: {}", track.index, track.name);
    }
    if let Some(index) = options.audio_track {
        controller.set_audio_track(index);
    }

    controller.play();
    if let Some(target) = options.seek {
        controller.seek(target);
    }

    let delta = 1.0 / TICK_HZ;
    let interval = Duration::from_secs_f64(delta);
    // generous upper bound so a stalled source cannot spin forever
    let max_ticks = ((controller.length() + 5.0) * TICK_HZ) as u64;
    let started = Instant::now();
    let mut ticks = 0u64;
    let mut next_report = 1.0;

    while controller.is_playing() && ticks < max_ticks {
        let tick_start = Instant::now();
        controller.tick(delta);
        ticks += 1;

        if controller.playback_position() >= next_report {
            report(&controller.stats(), false);
            next_report = controller.playback_position().floor() + 1.0;
        }

        if options.realtime {
            if let Some(rest) = interval.checked_sub(tick_start.elapsed()) {
                std::thread::sleep(rest);
            }
        } else if controller.decode_mode() == DecodeMode::Threaded {
            // let the workers keep up with simulated time
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    if controller.is_playing() {
        tracing::warn!("Tick budget exhausted at {}", format_time(controller.playback_position()));
    }
    let stats = controller.stats();
    controller.close();

    report(&stats, true);
    let image = image.lock();
    let meter = meter.lock();
    let (updates, replacements) = image.counts();
    tracing::info!(
        "Done in {:.2}s wall / {} ticks: last image {}x{} at {}, {} updates / {} replacements, {} audio frames (peak {:.3})",
        started.elapsed().as_secs_f64(),
        ticks,
        image.width(),
        image.height(),
        image.presentation_time().map(format_time).unwrap_or_else(|| "-".into()),
        updates,
        replacements,
        meter.frames,
        meter.peak
    );

    Ok(())
}

fn report(stats: &PlaybackStats, last: bool) {
    let line = format!(
        "t={} video {}/{} (dropped {}) audio {}/{} (dropped {}) presented={} skipped={} mixed={} drift={} resyncs={}",
        format_time(stats.engine_time),
        stats.video.buffered,
        stats.video.capacity,
        stats.video.dropped,
        stats.audio.buffered,
        stats.audio.capacity,
        stats.audio.dropped,
        stats.frames_presented,
        stats.frames_skipped,
        stats.audio_frames_mixed,
        stats.drift_corrections,
        stats.audio_resyncs
    );
    if last {
        tracing::info!("Final: {}", line);
    } else {
        tracing::debug!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("reelsync")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_args() {
        let options = parse_args(&args(&["--threaded", "--seek", "1.5", "--fps", "24", "--tracks", "2"])).unwrap();
        assert!(options.threaded);
        assert_eq!(options.seek, Some(1.5));
        assert_eq!(options.fps, 24.0);
        assert_eq!(options.audio_tracks, 2);
        assert!(!options.realtime);
    }

    #[test]
    fn test_parse_args_rejects_bad_values() {
        assert!(parse_args(&args(&["--seek"])).is_err());
        assert!(parse_args(&args(&["--duration", "soon"])).is_err());
        assert!(parse_args(&args(&["--loop"])).is_err());
    }

    #[test]
    fn test_level_meter_tracks_peak() {
        let meter = Arc::new(Mutex::new(Meter::default()));
        let mut mixer = LevelMeter(meter.clone());
        mixer.mix_audio(2, &[0.1, -0.6, 0.2, 0.3], 0);
        mixer.mix_audio(2, &[0.9, 0.9, 0.1, 0.1], 1);
        let meter = meter.lock();
        assert_eq!(meter.frames, 4);
        assert_eq!(meter.peak, 0.6);
    }

    #[test]
    fn test_short_run_completes() {
        let options = Options {
            duration: 0.5,
            ..Options::default()
        };
        run(&options).unwrap();
    }

    #[test]
    fn test_run_reports_open_failure() {
        let options = Options {
            duration: 0.0,
            ..Options::default()
        };
        let err = run(&options).unwrap_err();
        assert!(err.to_string().contains("Failed to open test pattern"));
    }
}
