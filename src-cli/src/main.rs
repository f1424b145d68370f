//! SteadyRec Command-Line Interface
//!
//! Drives a synthetic, irregularly paced render loop through the recorder
//! to produce constant frame-rate lossless video, and manages settings.

mod colors;
mod commands;
mod exit_codes;
mod logging;
mod scene;

use clap::{Parser, Subcommand};
use exit_codes::ExitCode;
use std::path::PathBuf;

/// SteadyRec - constant frame-rate capture for real-time renderers
#[derive(Parser, Debug)]
#[command(name = "steadyrec")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format for scripting
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Don't write a log file
    #[arg(long, global = true)]
    no_log_file: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record the built-in test scene
    Record {
        #[command(flatten)]
        options: RecordOptions,
    },
    /// Show or reset settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Verify FFmpeg and the lossless encoder
    Check {
        /// FFmpeg binary to check instead of the configured one
        #[arg(long)]
        ffmpeg: Option<PathBuf>,
    },
    /// Show version information
    Version,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective settings
    Show,
    /// Print the settings file location
    Path,
    /// Restore default settings
    Reset,
}

#[derive(Parser, Debug, Clone)]
pub struct RecordOptions {
    /// Output file path (overrides configured output directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Render-clock seconds to record
    #[arg(short, long, default_value_t = 5.0)]
    duration: f64,

    /// Output frame rate (default from settings)
    #[arg(long)]
    output_fps: Option<f64>,

    /// Nominal render rate of the test scene (default from settings)
    #[arg(long)]
    input_fps: Option<f64>,

    /// Rate conversion policy: constant, interpolate
    #[arg(short, long)]
    policy: Option<String>,

    /// Surface width in pixels
    #[arg(long, default_value_t = 320)]
    width: u32,

    /// Surface height in pixels
    #[arg(long, default_value_t = 240)]
    height: u32,

    /// Advance a simulated clock instead of rendering in real time
    #[arg(long)]
    offline: bool,

    /// Seed for the frame timing jitter
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// FFmpeg binary to use
    #[arg(long)]
    ffmpeg: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    let log_guard = logging::init(cli.verbose, cli.quiet, !cli.no_log_file);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{}", colors::error(&format!("Failed to create Tokio runtime: {}", e)));
            std::process::exit(ExitCode::GeneralError.as_i32());
        }
    };

    let exit_code = run(cli, &runtime);
    drop(runtime);
    drop(log_guard);
    std::process::exit(exit_code.as_i32());
}

fn run(cli: Cli, runtime: &tokio::runtime::Runtime) -> ExitCode {
    match cli.command {
        Commands::Record { options } => {
            commands::record(options, runtime, cli.json, cli.quiet, cli.verbose)
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_show(cli.json, cli.quiet),
            ConfigAction::Path => commands::config_path(cli.json, cli.quiet),
            ConfigAction::Reset => commands::config_reset(cli.json, cli.quiet),
        },
        Commands::Check { ffmpeg } => commands::check(ffmpeg.as_deref(), cli.json, cli.quiet),
        Commands::Version => {
            commands::version(cli.json);
            ExitCode::Success
        }
    }
}
