//! Tracing setup for the CLI.
//!
//! Human-facing output goes through `println!`; diagnostics go through
//! `tracing` to stderr and, unless disabled, a daily rolling log file.

use steadyrec_common::logging::{ensure_log_dir, LOG_FILE_PREFIX};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
fn default_filter(verbose: bool, quiet: bool) -> &'static str {
    match (verbose, quiet) {
        (true, _) => "debug",
        (false, true) => "error",
        (false, false) => "info",
    }
}

/// Install the global subscriber.
///
/// The returned guard flushes the log file on drop and must live until exit.
pub fn init(verbose: bool, quiet: bool, log_file: bool) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose, quiet)));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(verbose);

    let file = if log_file {
        match ensure_log_dir() {
            Ok(dir) => Some(tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX)),
            Err(e) => {
                eprintln!("warning: log file disabled: {}", e);
                None
            }
        }
    } else {
        None
    };

    match file {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_levels() {
        assert_eq!(default_filter(false, false), "info");
        assert_eq!(default_filter(true, true), "debug");
        assert_eq!(default_filter(false, true), "error");
    }
}
