//! Exit codes for the CLI.
//!
//! These codes enable scripting integration by providing structured
//! feedback about operation results.

/// Exit codes for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Operation completed successfully
    Success = 0,
    /// General/unspecified error
    GeneralError = 1,
    /// Invalid command-line arguments or recording configuration
    InvalidArguments = 2,
    /// FFmpeg could not be found or installed
    FfmpegUnavailable = 3,
    /// Recording failed to start
    RecordingFailedToStart = 4,
    /// Recording failed during capture
    RecordingFailedDuringCapture = 5,
    /// The encoder failed while finalizing the file
    EncodingFailed = 6,
    /// Settings could not be read or written
    ConfigError = 7,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitCode::Success => write!(f, "success"),
            ExitCode::GeneralError => write!(f, "general error"),
            ExitCode::InvalidArguments => write!(f, "invalid arguments"),
            ExitCode::FfmpegUnavailable => write!(f, "ffmpeg unavailable"),
            ExitCode::RecordingFailedToStart => write!(f, "recording failed to start"),
            ExitCode::RecordingFailedDuringCapture => write!(f, "recording failed during capture"),
            ExitCode::EncodingFailed => write!(f, "encoding failed"),
            ExitCode::ConfigError => write!(f, "configuration error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::InvalidArguments.as_i32(), 2);
        assert_eq!(ExitCode::EncodingFailed.as_i32(), 6);
        assert_eq!(ExitCode::ConfigError.to_string(), "configuration error");
    }
}
