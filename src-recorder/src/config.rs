//! Configuration management for SteadyRec.
//!
//! User settings are persisted as JSON in the platform config directory:
//! - Linux: `~/.config/steadyrec/config.json`
//! - macOS: `~/Library/Application Support/steadyrec/config.json`
//! - Windows: `%APPDATA%\steadyrec\config\config.json`
//!
//! A [`RecordingConfig`] is the immutable configuration of one session,
//! usually built from the settings plus per-recording overrides.

use crate::capture::source::DEFAULT_STAGING_SLOTS;
use crate::convert::MAX_FRAME_RATE;
use crate::error::RecorderError;
use chrono::Local;
use directories::{ProjectDirs, UserDirs};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use steadyrec_common::ConversionPolicy;
use tracing::{debug, info, warn};

/// Output-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Custom output directory. If None, uses the system Videos folder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    /// Container extension for generated file names.
    #[serde(default = "default_extension")]
    pub extension: String,
}

fn default_extension() -> String {
    "mkv".to_string()
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            directory: None,
            extension: default_extension(),
        }
    }
}

/// Capture and rate-conversion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSettings {
    /// Expected render rate. Only used to sanity-check the observed cadence.
    #[serde(default = "default_input_fps")]
    pub input_fps_hint: f64,
    /// Frame rate of the recorded video.
    #[serde(default = "default_output_fps")]
    pub output_fps: f64,
    #[serde(default)]
    pub policy: ConversionPolicy,
    /// Staging buffers in the readback ring (at least 2).
    #[serde(default = "default_staging_slots")]
    pub staging_slots: usize,
}

fn default_input_fps() -> f64 {
    25.0
}

fn default_output_fps() -> f64 {
    21.0
}

fn default_staging_slots() -> usize {
    DEFAULT_STAGING_SLOTS
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            input_fps_hint: default_input_fps(),
            output_fps: default_output_fps(),
            policy: ConversionPolicy::default(),
            staging_slots: default_staging_slots(),
        }
    }
}

/// Encoder-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EncoderSettings {
    /// Explicit FFmpeg binary. If None, PATH and the sidecar location are searched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ffmpeg_path: Option<String>,
    /// Frames buffered ahead of the encoder; 0 means one second of output.
    #[serde(default)]
    pub queue_depth: usize,
}

/// Persisted user settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RecorderSettings {
    #[serde(default)]
    pub output: OutputSettings,
    #[serde(default)]
    pub capture: CaptureSettings,
    #[serde(default)]
    pub encoder: EncoderSettings,
}

/// Get the path to the config file.
pub fn config_path() -> Result<PathBuf, String> {
    let proj_dirs = ProjectDirs::from("", "", "steadyrec")
        .ok_or("Could not determine config directory")?;
    Ok(proj_dirs.config_dir().join("config.json"))
}

/// Load settings from disk.
/// Returns defaults if the file doesn't exist or is invalid.
pub fn load_settings() -> RecorderSettings {
    let path = match config_path() {
        Ok(path) => path,
        Err(e) => {
            warn!("Failed to get config path: {}", e);
            return RecorderSettings::default();
        }
    };

    if !path.exists() {
        debug!("No config file found, using defaults");
        return RecorderSettings::default();
    }

    match fs::read_to_string(&path) {
        Ok(contents) => match serde_json::from_str::<RecorderSettings>(&contents) {
            Ok(settings) => {
                debug!("Loaded config from {}", path.display());
                settings
            }
            Err(e) => {
                warn!("Failed to parse config file: {}. Using defaults.", e);
                RecorderSettings::default()
            }
        },
        Err(e) => {
            warn!("Failed to read config file: {}. Using defaults.", e);
            RecorderSettings::default()
        }
    }
}

/// Save settings to disk, creating the config directory if needed.
pub fn save_settings(settings: &RecorderSettings) -> Result<PathBuf, String> {
    let path = config_path()?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }

    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(&path, json).map_err(|e| format!("Failed to write config file: {}", e))?;

    info!("Saved config to {}", path.display());
    Ok(path)
}

/// Get the default output directory (system Videos folder).
pub fn default_output_dir() -> Result<PathBuf, String> {
    let user_dirs = UserDirs::new().ok_or("Could not determine user directories")?;
    Ok(user_dirs
        .video_dir()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| user_dirs.home_dir().join("Videos")))
}

/// Get the configured output directory, falling back to the default if unset.
pub fn output_dir(settings: &RecorderSettings) -> Result<PathBuf, String> {
    match &settings.output.directory {
        Some(dir) if !dir.is_empty() => Ok(PathBuf::from(dir)),
        _ => default_output_dir(),
    }
}

/// Generate a timestamped file name in the configured output directory,
/// creating the directory if it is missing.
pub fn generate_output_path(settings: &RecorderSettings) -> Result<PathBuf, String> {
    let dir = output_dir(settings)?;
    if !dir.exists() {
        fs::create_dir_all(&dir).map_err(|e| format!("Failed to create output directory: {}", e))?;
    }
    Ok(dir.join(output_file_name(&settings.output.extension)))
}

fn output_file_name(extension: &str) -> String {
    let timestamp = Local::now().format("%Y-%m-%d_%H%M%S");
    format!("recording_{}.{}", timestamp, extension.trim_start_matches('.'))
}

/// Most staging buffers a session may allocate.
pub const MAX_STAGING_SLOTS: usize = 8;

/// Most frames buffered ahead of the encoder.
pub const MAX_QUEUE_DEPTH: usize = 1024;

/// Configuration of a single recording session. Immutable once started.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingConfig {
    pub output_path: PathBuf,
    /// Expected input tick rate; a hint, never used for timing.
    pub input_fps_hint: f64,
    /// Authoritative output frame rate.
    pub output_fps: f64,
    pub policy: ConversionPolicy,
    pub staging_slots: usize,
    /// Frames buffered ahead of the encoder; 0 means one second of output.
    pub queue_depth: usize,
}

impl RecordingConfig {
    pub fn new(
        output_path: impl Into<PathBuf>,
        input_fps_hint: f64,
        output_fps: f64,
        policy: ConversionPolicy,
    ) -> Self {
        Self {
            output_path: output_path.into(),
            input_fps_hint,
            output_fps,
            policy,
            staging_slots: DEFAULT_STAGING_SLOTS,
            queue_depth: 0,
        }
    }

    /// Build a session config from persisted settings.
    pub fn from_settings(settings: &RecorderSettings, output_path: PathBuf) -> Self {
        Self {
            output_path,
            input_fps_hint: settings.capture.input_fps_hint,
            output_fps: settings.capture.output_fps,
            policy: settings.capture.policy,
            staging_slots: settings.capture.staging_slots,
            queue_depth: settings.encoder.queue_depth,
        }
    }

    pub fn validate(&self) -> Result<(), RecorderError> {
        if self.output_path.as_os_str().is_empty() {
            return Err(RecorderError::InvalidConfig("output path is empty".to_string()));
        }
        for (name, value) in [
            ("output frame rate", self.output_fps),
            ("input frame rate hint", self.input_fps_hint),
        ] {
            if !value.is_finite() || value <= 0.0 || value > MAX_FRAME_RATE {
                return Err(RecorderError::InvalidConfig(format!(
                    "{} must be in (0, {}], got {}",
                    name, MAX_FRAME_RATE, value
                )));
            }
        }
        if !(2..=MAX_STAGING_SLOTS).contains(&self.staging_slots) {
            return Err(RecorderError::InvalidConfig(format!(
                "staging buffers must be between 2 and {}, got {}",
                MAX_STAGING_SLOTS, self.staging_slots
            )));
        }
        Ok(())
    }

    /// Encoder hand-off depth in frames, at most [`MAX_QUEUE_DEPTH`].
    pub fn effective_queue_depth(&self) -> usize {
        let depth = if self.queue_depth > 0 {
            self.queue_depth
        } else {
            self.output_fps.ceil() as usize
        };
        depth.clamp(1, MAX_QUEUE_DEPTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = RecorderSettings::default();
        assert!(settings.output.directory.is_none());
        assert_eq!(settings.output.extension, "mkv");
        assert_eq!(settings.capture.input_fps_hint, 25.0);
        assert_eq!(settings.capture.output_fps, 21.0);
        assert_eq!(settings.capture.policy, ConversionPolicy::Interpolate);
        assert_eq!(settings.capture.staging_slots, 2);
        assert!(settings.encoder.ffmpeg_path.is_none());
    }

    #[test]
    fn test_settings_serialization() {
        let mut settings = RecorderSettings::default();
        settings.output.directory = Some("/custom/path".to_string());
        settings.capture.policy = ConversionPolicy::Constant;
        settings.encoder.queue_depth = 8;

        let json = serde_json::to_string(&settings).unwrap();
        let parsed: RecorderSettings = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.output.directory, Some("/custom/path".to_string()));
        assert_eq!(parsed.capture.policy, ConversionPolicy::Constant);
        assert_eq!(parsed.encoder.queue_depth, 8);
    }

    #[test]
    fn test_empty_optionals_not_serialized() {
        let json = serde_json::to_string(&RecorderSettings::default()).unwrap();
        assert!(!json.contains("directory"));
        assert!(!json.contains("ffmpeg_path"));
    }

    #[test]
    fn test_partial_config_backward_compatible() {
        let json = r#"{"capture": {"output_fps": 60}}"#;
        let parsed: RecorderSettings = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.capture.output_fps, 60.0);
        assert_eq!(parsed.capture.input_fps_hint, 25.0);
        assert_eq!(parsed.capture.staging_slots, 2);
        assert_eq!(parsed.output.extension, "mkv");
    }

    #[test]
    fn test_output_dir_override() {
        let mut settings = RecorderSettings::default();
        settings.output.directory = Some("/data/captures".to_string());
        assert_eq!(output_dir(&settings).unwrap(), PathBuf::from("/data/captures"));
    }

    #[test]
    fn test_output_file_name() {
        let name = output_file_name(".avi");
        assert!(name.starts_with("recording_"));
        assert!(name.ends_with(".avi"));
        assert!(!name.contains(".."));
    }

    #[test]
    fn test_recording_config_validation() {
        let config = RecordingConfig::new("out.mkv", 25.0, 21.0, ConversionPolicy::Interpolate);
        assert!(config.validate().is_ok());

        let mut bad = config.clone();
        bad.output_fps = 0.0;
        assert!(matches!(bad.validate(), Err(RecorderError::InvalidConfig(_))));

        let mut bad = config.clone();
        bad.input_fps_hint = f64::INFINITY;
        assert!(bad.validate().is_err());

        let mut bad = config.clone();
        bad.staging_slots = 1;
        assert!(bad.validate().is_err());

        let mut bad = config.clone();
        bad.output_path = PathBuf::new();
        assert!(bad.validate().is_err());

        let mut bad = config.clone();
        bad.staging_slots = MAX_STAGING_SLOTS + 1;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_rates_are_bounded() {
        let config = RecordingConfig::new("out.mkv", 25.0, 1e20, ConversionPolicy::Constant);
        assert!(matches!(config.validate(), Err(RecorderError::InvalidConfig(_))));

        let config = RecordingConfig::new("out.mkv", 1e20, 21.0, ConversionPolicy::Constant);
        assert!(config.validate().is_err());

        let config = RecordingConfig::new("out.mkv", MAX_FRAME_RATE, MAX_FRAME_RATE, ConversionPolicy::Constant);
        assert!(config.validate().is_ok());
        assert_eq!(config.effective_queue_depth(), 1000);
    }

    #[test]
    fn test_queue_depth_defaults_to_one_second() {
        let mut config = RecordingConfig::new("out.mkv", 60.0, 29.97, ConversionPolicy::Constant);
        assert_eq!(config.effective_queue_depth(), 30);
        config.queue_depth = 4;
        assert_eq!(config.effective_queue_depth(), 4);
        config.queue_depth = usize::MAX;
        assert_eq!(config.effective_queue_depth(), MAX_QUEUE_DEPTH);

        // Never reaches the channel unvalidated, but stays bounded regardless.
        let unchecked = RecordingConfig::new("out.mkv", 25.0, 1e20, ConversionPolicy::Constant);
        assert_eq!(unchecked.effective_queue_depth(), MAX_QUEUE_DEPTH);
    }
}
