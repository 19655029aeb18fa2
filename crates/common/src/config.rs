//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{MediamarkError, MediamarkResult};

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Where processed files are written.
    pub output: OutputConfig,

    /// Export pipeline settings.
    pub export: ExportSettings,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Destination policy for processed files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory processed videos are written to.
    pub dir: PathBuf,

    /// File name used when `unique_names` is off.
    pub file_name: String,

    /// Give every export its own file instead of reusing `file_name`.
    pub unique_names: bool,
}

/// Encode and timing parameters for video exports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Interval between progress reports, in milliseconds.
    pub progress_interval_ms: u64,

    /// Composition frame rate (frame duration is `1 / frame_rate`).
    pub frame_rate: u32,

    /// Video encoder passed to ffmpeg.
    pub video_codec: String,

    /// Encoder preset.
    pub preset: String,

    /// Constant rate factor (lower = higher quality).
    pub crf: u8,

    /// Audio encoder used when the source carries audio.
    pub audio_codec: String,

    /// Audio bitrate in kbps.
    pub audio_bitrate_kbps: u32,

    /// Font used for text overlays. `None` lets ffmpeg pick its default.
    pub font_file: Option<PathBuf>,

    /// Pin a uniform scale factor for the video layer instead of fitting
    /// the upright frame to the render size.
    pub scale_factor: Option<f64>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "mediamark=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir().join("mediamark"),
            file_name: "processed.mp4".to_string(),
            unique_names: false,
        }
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            progress_interval_ms: 100,
            frame_rate: 30,
            video_codec: "libx264".to_string(),
            preset: "slow".to_string(),
            crf: 18,
            audio_codec: "aac".to_string(),
            audio_bitrate_kbps: 192,
            font_file: None,
            scale_factor: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl ExportSettings {
    /// Progress interval as a [`std::time::Duration`], never zero.
    pub fn progress_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.progress_interval_ms.max(1))
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(path = %config_path.display(), error = %e, "Ignoring unreadable config");
                }
            }
        }
        Self::default()
    }

    /// Load and validate config from an explicit file.
    pub fn load_from(path: &Path) -> MediamarkResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the export pipeline cannot honour.
    pub fn validate(&self) -> MediamarkResult<()> {
        if self.export.frame_rate == 0 {
            return Err(MediamarkError::config("export.frame_rate must be positive"));
        }
        if self.output.file_name.trim().is_empty() {
            return Err(MediamarkError::config("output.file_name must not be empty"));
        }
        if let Some(scale) = self.export.scale_factor {
            if !scale.is_finite() || scale <= 0.0 {
                return Err(MediamarkError::config(format!(
                    "export.scale_factor must be a positive number, got {scale}"
                )));
            }
        }
        Ok(())
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("mediamark").join("config.json")
}
