//! Shared types for recording sessions.

use serde::{Deserialize, Serialize};

/// How captured frames are mapped onto the constant-rate output timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConversionPolicy {
    /// Nearest-hold: repeat the most recent capture until a newer one supersedes it
    Constant,
    /// Blend the two captures bracketing each output tick
    #[default]
    Interpolate,
}

impl ConversionPolicy {
    /// Parse from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "constant" | "hold" | "duplicate" => Some(Self::Constant),
            "interpolate" | "blend" => Some(Self::Interpolate),
            _ => None,
        }
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Constant => "constant",
            Self::Interpolate => "interpolate",
        }
    }
}

impl std::fmt::Display for ConversionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recorder state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecorderState {
    /// Not recording, ready to start
    #[default]
    Idle,
    /// A session is active and consuming frames
    Recording,
}

/// Result of a completed recording session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordingSummary {
    /// Path of the video file handed to the encoder
    pub output_path: String,
    pub width: u32,
    pub height: u32,
    /// Declared output frame rate
    pub output_fps: f64,
    pub policy: ConversionPolicy,
    /// Frames read back from the device
    pub input_frames: u64,
    /// Frames delivered to the encoder
    pub output_frames: u64,
    /// Output frames that reused a capture unchanged
    pub held_frames: u64,
    /// Output frames synthesized by blending two captures
    pub blended_frames: u64,
    /// Render-clock span between the first and last capture, in seconds
    pub captured_seconds: f64,
    /// Mean observed input rate, if at least two frames were captured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_input_fps: Option<f64>,
    /// Raw bytes streamed to the encoder
    pub bytes_written: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parse() {
        assert_eq!(ConversionPolicy::parse("constant"), Some(ConversionPolicy::Constant));
        assert_eq!(ConversionPolicy::parse("DUPLICATE"), Some(ConversionPolicy::Constant));
        assert_eq!(ConversionPolicy::parse("Interpolate"), Some(ConversionPolicy::Interpolate));
        assert_eq!(ConversionPolicy::parse("cubic"), None);
    }

    #[test]
    fn test_policy_serialization() {
        let json = serde_json::to_string(&ConversionPolicy::Constant).unwrap();
        assert_eq!(json, "\"constant\"");
        let parsed: ConversionPolicy = serde_json::from_str("\"interpolate\"").unwrap();
        assert_eq!(parsed, ConversionPolicy::Interpolate);
    }

    #[test]
    fn test_summary_omits_unknown_input_rate() {
        let summary = RecordingSummary::default();
        let json = serde_json::to_string(&summary).unwrap();
        assert!(!json.contains("mean_input_fps"));
        assert!(json.contains("\"policy\":\"interpolate\""));
    }
}
