//! Error types for recording operations.

use std::fmt;

/// Error type for the capture pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderError {
    /// Surface copy or staging map failed; the device state is suspect
    Device(String),
    /// Encoder process could not be launched, written to, or exited with failure
    Encode(String),
    /// `start` was called while a session is active
    AlreadyRecording,
    /// A session operation was called while idle
    NotRecording,
    /// The recording configuration was rejected
    InvalidConfig(String),
}

impl RecorderError {
    /// Whether this error ends the active session.
    ///
    /// State-machine misuse and configuration errors leave the recorder
    /// untouched and the caller may retry.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RecorderError::Device(_) | RecorderError::Encode(_))
    }
}

impl fmt::Display for RecorderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecorderError::Device(msg) => write!(f, "Device error: {}", msg),
            RecorderError::Encode(msg) => write!(f, "Encode error: {}", msg),
            RecorderError::AlreadyRecording => write!(f, "Already recording"),
            RecorderError::NotRecording => write!(f, "Not recording"),
            RecorderError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for RecorderError {}

impl From<RecorderError> for String {
    fn from(err: RecorderError) -> Self {
        err.to_string()
    }
}
