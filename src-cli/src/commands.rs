//! CLI command implementations.

use crate::colors;
use crate::exit_codes::ExitCode;
use crate::scene::{RenderClock, Scene};
use crate::RecordOptions;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use steadyrec::config::{self, RecorderSettings, RecordingConfig};
use steadyrec::encoder::{ensure_ffmpeg, FfmpegLauncher, LosslessEncoder};
use steadyrec::{ConversionPolicy, Recorder, RecorderError, RecordingSummary, SoftwareDevice, SoftwareSurface};
use tokio::runtime::Runtime;
use tracing::{debug, info};

/// Print a value as pretty JSON on stdout.
fn print_json<T: Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::Success
        }
        Err(e) => {
            eprintln!("{}", colors::error(&format!("Failed to serialize output: {}", e)));
            ExitCode::GeneralError
        }
    }
}

fn report_error(quiet: bool, msg: &str) {
    if !quiet {
        eprintln!("{}", colors::error(msg));
    }
}

/// Build the session configuration from settings plus command-line overrides.
fn recording_config(
    settings: &RecorderSettings,
    options: &RecordOptions,
) -> Result<RecordingConfig, (ExitCode, String)> {
    let output_path = match &options.output {
        Some(path) => path.clone(),
        None => config::generate_output_path(settings).map_err(|e| (ExitCode::GeneralError, e))?,
    };

    let mut cfg = RecordingConfig::from_settings(settings, output_path);
    if let Some(fps) = options.output_fps {
        cfg.output_fps = fps;
    }
    if let Some(fps) = options.input_fps {
        cfg.input_fps_hint = fps;
    }
    if let Some(policy) = &options.policy {
        cfg.policy = ConversionPolicy::parse(policy).ok_or_else(|| {
            (
                ExitCode::InvalidArguments,
                format!("Invalid policy '{}'. Valid policies: constant, interpolate", policy),
            )
        })?;
    }
    cfg.validate()
        .map_err(|e| (ExitCode::InvalidArguments, e.to_string()))?;
    Ok(cfg)
}

/// Longest recording the test scene will run, in render-clock seconds.
const MAX_DURATION_SECS: f64 = 24.0 * 60.0 * 60.0;

/// Largest test scene edge, in pixels.
const MAX_DIMENSION: u32 = 8192;

fn duration_limit(seconds: f64) -> Result<Duration, String> {
    if !seconds.is_finite() || seconds <= 0.0 || seconds > MAX_DURATION_SECS {
        return Err(format!(
            "Duration must be between 0 and {} seconds, got {}.",
            MAX_DURATION_SECS, seconds
        ));
    }
    Ok(Duration::from_secs_f64(seconds))
}

fn check_dimensions(width: u32, height: u32) -> Result<(), String> {
    if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(format!(
            "Width and height must be between 1 and {}, got {}x{}.",
            MAX_DIMENSION, width, height
        ));
    }
    Ok(())
}

/// Record the synthetic scene for the requested duration.
pub fn record(options: RecordOptions, runtime: &Runtime, json: bool, quiet: bool, verbose: bool) -> ExitCode {
    if let Err(msg) = check_dimensions(options.width, options.height) {
        report_error(quiet, &msg);
        return ExitCode::InvalidArguments;
    }
    let limit = match duration_limit(options.duration) {
        Ok(limit) => limit,
        Err(msg) => {
            report_error(quiet, &msg);
            return ExitCode::InvalidArguments;
        }
    };

    let settings = config::load_settings();
    let cfg = match recording_config(&settings, &options) {
        Ok(cfg) => cfg,
        Err((code, msg)) => {
            report_error(quiet, &msg);
            return code;
        }
    };

    let explicit = options
        .ffmpeg
        .clone()
        .or_else(|| settings.encoder.ffmpeg_path.as_ref().map(PathBuf::from));
    let ffmpeg = match ensure_ffmpeg(explicit.as_deref()) {
        Ok(path) => path,
        Err(e) => {
            report_error(quiet, &e);
            return ExitCode::FfmpegUnavailable;
        }
    };
    let launcher = FfmpegLauncher::new(Some(&ffmpeg));
    if verbose && !quiet {
        eprintln!(
            "{}",
            colors::info(&format!("Encoding with {} via {}", launcher.encoder().name(), ffmpeg.display()))
        );
    }

    // Ctrl-C stops the loop; the render loop itself stays off the runtime
    // because the encoder hand-off blocks.
    let stop_flag = Arc::new(AtomicBool::new(false));
    let flag = stop_flag.clone();
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            flag.store(true, Ordering::SeqCst);
        }
    });

    let mut device = SoftwareDevice::new();
    let mut surface = SoftwareSurface::new(options.width, options.height);
    let mut scene = Scene::new(options.width, options.height, cfg.input_fps_hint, options.seed);
    let mut recorder: Recorder<SoftwareDevice> = Recorder::new(Box::new(launcher));

    let output_path = cfg.output_path.clone();
    if let Err(e) = recorder.start(&mut device, &surface, cfg) {
        report_error(quiet, &format!("Error starting recording: {}", e));
        return ExitCode::RecordingFailedToStart;
    }
    if !quiet && !json {
        eprintln!(
            "{} {}",
            colors::info("Recording to"),
            colors::path(&output_path.display().to_string())
        );
    }

    let mut clock = if options.offline {
        RenderClock::simulated()
    } else {
        RenderClock::realtime()
    };
    let show_progress = !quiet && !json && !options.offline && colors::is_stderr_interactive();
    let mut last_shown = None;

    loop {
        let now = clock.now();
        if now >= limit {
            debug!("Duration limit reached");
            break;
        }
        if stop_flag.load(Ordering::SeqCst) {
            if !quiet && !json {
                eprintln!("\n{}", colors::info("Stopping recording..."));
            }
            break;
        }

        scene.render(&mut surface, now.as_secs_f64());
        if let Err(e) = recorder.on_tick(&mut device, &surface, now) {
            report_error(quiet, &format!("Recording failed: {}", e));
            return ExitCode::RecordingFailedDuringCapture;
        }

        if show_progress {
            let tenths = now.as_millis() / 100;
            if last_shown != Some(tenths) {
                last_shown = Some(tenths);
                eprint!(
                    "\r{} {}",
                    colors::recording("Recording:"),
                    colors::elapsed_time(now.as_secs_f64())
                );
                std::io::stderr().flush().ok();
            }
        }

        let interval = scene.next_interval();
        clock.advance(now, interval);
    }
    if show_progress {
        eprintln!();
    }

    match recorder.stop(&mut device) {
        Ok(summary) => {
            info!("Recording saved to {}", summary.output_path);
            if json {
                print_json(&summary)
            } else {
                if !quiet {
                    print_summary(&summary);
                }
                ExitCode::Success
            }
        }
        Err(e @ RecorderError::Encode(_)) => {
            report_error(quiet, &format!("Error finalizing recording: {}", e));
            ExitCode::EncodingFailed
        }
        Err(e) => {
            report_error(quiet, &format!("Error stopping recording: {}", e));
            ExitCode::RecordingFailedDuringCapture
        }
    }
}

fn print_summary(summary: &RecordingSummary) {
    println!("{} {}", colors::success("Recording saved:"), colors::path(&summary.output_path));
    let rows = [
        ("Resolution", format!("{}x{}", summary.width, summary.height)),
        ("Output rate", format!("{} fps ({})", summary.output_fps, summary.policy)),
        ("Input frames", summary.input_frames.to_string()),
        (
            "Output frames",
            format!(
                "{} ({} held, {} blended)",
                summary.output_frames, summary.held_frames, summary.blended_frames
            ),
        ),
        ("Captured", format!("{:.3} s", summary.captured_seconds)),
        (
            "Mean input",
            summary
                .mean_input_fps
                .map(|fps| format!("{:.2} fps", fps))
                .unwrap_or_else(|| "-".to_string()),
        ),
        ("Bytes", summary.bytes_written.to_string()),
    ];
    for (label, value) in rows {
        println!("  {}  {}", colors::pad_left(label, 14, colors::dim), colors::number(&value));
    }
}

/// Show the effective settings.
pub fn config_show(json: bool, quiet: bool) -> ExitCode {
    let settings = config::load_settings();
    if json {
        return print_json(&settings);
    }

    let output_dir = match config::output_dir(&settings) {
        Ok(dir) => dir.display().to_string(),
        Err(e) => {
            report_error(quiet, &e);
            return ExitCode::ConfigError;
        }
    };
    let queue_depth = match settings.encoder.queue_depth {
        0 => "auto (1 s of output)".to_string(),
        n => n.to_string(),
    };

    println!("{}", colors::header("Output"));
    println!("  {}  {}", colors::pad_left("directory", 16, colors::dim), colors::path(&output_dir));
    println!("  {}  {}", colors::pad_left("extension", 16, colors::dim), settings.output.extension);
    println!("{}", colors::header("Capture"));
    println!("  {}  {}", colors::pad_left("input_fps_hint", 16, colors::dim), settings.capture.input_fps_hint);
    println!("  {}  {}", colors::pad_left("output_fps", 16, colors::dim), settings.capture.output_fps);
    println!("  {}  {}", colors::pad_left("policy", 16, colors::dim), settings.capture.policy);
    println!("  {}  {}", colors::pad_left("staging_slots", 16, colors::dim), settings.capture.staging_slots);
    println!("{}", colors::header("Encoder"));
    println!(
        "  {}  {}",
        colors::pad_left("ffmpeg_path", 16, colors::dim),
        settings.encoder.ffmpeg_path.as_deref().unwrap_or("auto")
    );
    println!("  {}  {}", colors::pad_left("queue_depth", 16, colors::dim), queue_depth);
    ExitCode::Success
}

/// Print the settings file location.
pub fn config_path(json: bool, quiet: bool) -> ExitCode {
    match config::config_path() {
        Ok(path) => {
            if json {
                print_json(&serde_json::json!({
                    "path": path.display().to_string(),
                    "exists": path.exists(),
                }))
            } else {
                println!("{}", path.display());
                ExitCode::Success
            }
        }
        Err(e) => {
            report_error(quiet, &e);
            ExitCode::ConfigError
        }
    }
}

/// Overwrite the settings file with defaults.
pub fn config_reset(json: bool, quiet: bool) -> ExitCode {
    match config::save_settings(&RecorderSettings::default()) {
        Ok(path) => {
            if json {
                print_json(&serde_json::json!({
                    "status": "reset",
                    "path": path.display().to_string(),
                }))
            } else {
                if !quiet {
                    println!("{} {}", colors::success("Settings reset:"), colors::path(&path.display().to_string()));
                }
                ExitCode::Success
            }
        }
        Err(e) => {
            report_error(quiet, &e);
            ExitCode::ConfigError
        }
    }
}

#[derive(Serialize)]
struct CheckReport {
    ffmpeg: String,
    encoder: &'static str,
    lossless_h264: bool,
}

/// Verify FFmpeg and report the lossless codec that recordings will use.
pub fn check(ffmpeg: Option<&Path>, json: bool, quiet: bool) -> ExitCode {
    let settings = config::load_settings();
    let explicit = ffmpeg
        .map(Path::to_path_buf)
        .or_else(|| settings.encoder.ffmpeg_path.as_ref().map(PathBuf::from));

    let path = match ensure_ffmpeg(explicit.as_deref()) {
        Ok(path) => path,
        Err(e) => {
            report_error(quiet, &e);
            return ExitCode::FfmpegUnavailable;
        }
    };
    let encoder = LosslessEncoder::detect(&path);
    let report = CheckReport {
        ffmpeg: path.display().to_string(),
        encoder: encoder.name(),
        lossless_h264: encoder == LosslessEncoder::X264Rgb,
    };

    if json {
        return print_json(&report);
    }
    if !quiet {
        println!("{} {}", colors::success("FFmpeg:"), colors::path(&report.ffmpeg));
        println!("{} {}", colors::success("Encoder:"), report.encoder);
        if !report.lossless_h264 {
            eprintln!(
                "{}",
                colors::warning("libx264rgb not available; recordings will use FFV1 (use .mkv or .avi)")
            );
        }
    }
    ExitCode::Success
}

/// Show version information.
pub fn version(json: bool) {
    let version = env!("CARGO_PKG_VERSION");
    if json {
        println!(r#"{{"version": "{}"}}"#, version);
    } else {
        println!("steadyrec {}", version);
    }
}
