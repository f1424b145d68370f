//! Terminal color support for CLI output.
//!
//! Colors are applied only when the stream is a terminal, so piped or
//! redirected output stays plain.

use owo_colors::OwoColorize;
use is_terminal::IsTerminal;

/// Pad a string to a minimum width (left-aligned), then apply a color function.
/// Padding happens before colorizing so ANSI codes don't skew the width.
pub fn pad_left<F>(msg: &str, width: usize, color_fn: F) -> String
where
    F: FnOnce(&str) -> String,
{
    let padded = format!("{:<width$}", msg);
    color_fn(&padded)
}

/// Check if stdout is a terminal (interactive mode).
pub fn is_interactive() -> bool {
    std::io::stdout().is_terminal()
}

/// Check if stderr is a terminal (interactive mode).
pub fn is_stderr_interactive() -> bool {
    std::io::stderr().is_terminal()
}

/// Style for error messages.
pub fn error(msg: &str) -> String {
    if is_stderr_interactive() {
        format!("{} {}", "error:".red().bold(), msg)
    } else {
        format!("error: {}", msg)
    }
}

/// Style for warning messages.
pub fn warning(msg: &str) -> String {
    if is_stderr_interactive() {
        format!("{} {}", "warning:".yellow().bold(), msg)
    } else {
        format!("warning: {}", msg)
    }
}

pub fn success(msg: &str) -> String {
    if is_interactive() {
        format!("{}", msg.green())
    } else {
        msg.to_string()
    }
}

pub fn info(msg: &str) -> String {
    if is_stderr_interactive() {
        format!("{}", msg.cyan())
    } else {
        msg.to_string()
    }
}

pub fn dim(msg: &str) -> String {
    if is_interactive() {
        format!("{}", msg.dimmed())
    } else {
        msg.to_string()
    }
}

/// Style for table and section headers.
pub fn header(msg: &str) -> String {
    if is_interactive() {
        format!("{}", msg.bold().blue())
    } else {
        msg.to_string()
    }
}

/// Style for the live recording indicator (written to stderr).
pub fn recording(msg: &str) -> String {
    if is_stderr_interactive() {
        format!("{}", msg.red().bold())
    } else {
        msg.to_string()
    }
}

pub fn path(msg: &str) -> String {
    if is_interactive() {
        format!("{}", msg.underline())
    } else {
        msg.to_string()
    }
}

/// Style for numeric values (frame counts, rates).
pub fn number(msg: &str) -> String {
    if is_interactive() {
        format!("{}", msg.cyan())
    } else {
        msg.to_string()
    }
}

/// Format elapsed render time as `MM:SS.s`.
pub fn elapsed_time(seconds: f64) -> String {
    let mins = (seconds / 60.0).floor() as u64;
    let secs = seconds - (mins * 60) as f64;
    let time_str = format!("{:02}:{:04.1}", mins, secs);
    if is_stderr_interactive() {
        format!("{}", time_str.yellow().bold())
    } else {
        time_str
    }
}
