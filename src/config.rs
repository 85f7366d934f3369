//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\music-mender\config.toml
//! - macOS: ~/Library/Application Support/music-mender/config.toml
//! - Linux: ~/.config/music-mender/config.toml
//!
//! The file is human-readable and editable. [`Config::transform_settings`]
//! turns it into the runtime [`TransformSettings`] handed to transforms.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// External transcoder settings
    pub tool: ToolConfig,

    /// Transform parameters
    pub transform: TransformConfig,

    /// Preserved-original archive settings
    pub archive: ArchiveConfig,

    /// Batch scheduling settings
    pub batch: BatchConfig,
}

/// External transcoder settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Path or command name of the FFmpeg-compatible transcoder
    pub path: PathBuf,

    /// Deadline for read-only probe invocations
    pub probe_timeout_secs: u64,

    /// Deadline for transform invocations
    pub transform_timeout_secs: u64,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("ffmpeg"),
            probe_timeout_secs: 30,
            transform_timeout_secs: 300,
        }
    }
}

/// How a finished transform lands on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplaceMode {
    /// Archive the original before promoting the new file
    #[default]
    Preserve,
    /// Delete the original once the new file is in place
    Replace,
}

/// Per-operation output suffixes, appended to the file stem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSuffixes {
    pub repair: String,
    pub normalize: String,
    pub trim: String,
    pub amplify: String,
}

impl Default for OutputSuffixes {
    fn default() -> Self {
        Self {
            repair: "-repaired".to_string(),
            normalize: "-normalized".to_string(),
            trim: "-trimmed".to_string(),
            amplify: "-amplified".to_string(),
        }
    }
}

/// Transform parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Amplitude below which audio counts as silence (dB)
    pub silence_threshold_db: f64,

    /// Shortest quiet stretch reported by silence detection (seconds)
    pub min_silence_duration: f64,

    /// Leading silence shorter than this is left alone (seconds)
    pub min_silence_to_trim: f64,

    /// Audio kept before the detected end of silence (milliseconds)
    pub trim_buffer_ms: u64,

    /// Default gain for amplify (dB)
    pub gain_db: f64,

    /// Integrated loudness target (LUFS)
    pub target_lufs: f64,

    /// Maximum true peak (dBTP)
    pub true_peak_db: f64,

    /// Loudness range target (LU)
    pub loudness_range: f64,

    /// Skip files whose name already carries the trim suffix
    pub skip_if_trimmed: bool,

    /// Preserve originals or replace them
    pub mode: ReplaceMode,

    /// Output suffixes per operation
    pub suffixes: OutputSuffixes,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            silence_threshold_db: -50.0,
            min_silence_duration: 0.1,
            min_silence_to_trim: 0.5,
            trim_buffer_ms: 150,
            gain_db: 0.0,
            target_lufs: -16.0,
            true_peak_db: -1.5,
            loudness_range: 11.0,
            skip_if_trimmed: true,
            mode: ReplaceMode::Preserve,
            suffixes: OutputSuffixes::default(),
        }
    }
}

/// Preserved-original archive settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Root of the backup tree
    pub root: PathBuf,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            root: default_archive_root(),
        }
    }
}

/// Batch scheduling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Upper bound on concurrent transcoder processes
    pub max_workers: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { max_workers: 3 }
    }
}

/// Loudness normalization target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoudnessTarget {
    pub integrated_lufs: f64,
    pub true_peak_db: f64,
    pub loudness_range: f64,
}

/// Runtime parameters for every transform.
#[derive(Debug, Clone)]
pub struct TransformSettings {
    pub tool_path: PathBuf,
    pub probe_timeout: Duration,
    pub transform_timeout: Duration,
    pub silence_threshold_db: f64,
    pub min_silence_duration: f64,
    pub min_silence_to_trim: f64,
    pub trim_buffer: Duration,
    pub gain_db: f64,
    pub loudness: LoudnessTarget,
    pub suffixes: OutputSuffixes,
    pub skip_if_trimmed: bool,
    pub mode: ReplaceMode,
    /// Pause after stopping playback, before touching the file
    pub settle_delay: Duration,
}

impl Default for TransformSettings {
    fn default() -> Self {
        Config::default().transform_settings()
    }
}

impl Config {
    /// Build the runtime transform settings from this config.
    pub fn transform_settings(&self) -> TransformSettings {
        let t = &self.transform;
        TransformSettings {
            tool_path: self.tool.path.clone(),
            probe_timeout: Duration::from_secs(self.tool.probe_timeout_secs),
            transform_timeout: Duration::from_secs(self.tool.transform_timeout_secs),
            silence_threshold_db: t.silence_threshold_db,
            min_silence_duration: t.min_silence_duration,
            min_silence_to_trim: t.min_silence_to_trim,
            trim_buffer: Duration::from_millis(t.trim_buffer_ms),
            gain_db: t.gain_db,
            loudness: LoudnessTarget {
                integrated_lufs: t.target_lufs,
                true_peak_db: t.true_peak_db,
                loudness_range: t.loudness_range,
            },
            suffixes: t.suffixes.clone(),
            skip_if_trimmed: t.skip_if_trimmed,
            mode: t.mode,
            settle_delay: Duration::from_millis(200),
        }
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("music-mender"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

fn default_archive_root() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("music-mender"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("preserved-originals")
}

/// Load configuration from disk
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };

    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to parse config file {:?}: {}", path, e);
                tracing::warn!("Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

/// Save configuration to disk
///
/// Creates the config directory if it doesn't exist.
pub fn save(config: &Config) -> Result<(), ConfigError> {
    let dir = config_dir().ok_or(ConfigError::NoConfigDir)?;
    let path = dir.join("config.toml");

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::CreateDir(dir.clone(), e))?;

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write to temp, then rename
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, &path)
        .map_err(|e| ConfigError::Rename(temp_path, path.clone(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[tool]"));
        assert!(toml.contains("[transform]"));
        assert!(toml.contains("[archive]"));
        assert!(toml.contains("[batch]"));
        assert!(toml.contains("mode = \"preserve\""));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.tool.path = PathBuf::from("/opt/ffmpeg/bin/ffmpeg");
        config.transform.mode = ReplaceMode::Replace;
        config.transform.gain_db = 3.5;
        config.batch.max_workers = 2;

        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();

        assert_eq!(parsed.tool.path, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        assert_eq!(parsed.transform.mode, ReplaceMode::Replace);
        assert_eq!(parsed.transform.gain_db, 3.5);
        assert_eq!(parsed.batch.max_workers, 2);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml = r#"
[transform]
silence_threshold_db = -40.0

[transform.suffixes]
trim = "_cut"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.transform.silence_threshold_db, -40.0);
        assert_eq!(config.transform.suffixes.trim, "_cut");

        // Other fields use defaults
        assert_eq!(config.transform.suffixes.repair, "-repaired");
        assert_eq!(config.tool.path, PathBuf::from("ffmpeg"));
        assert_eq!(config.tool.probe_timeout_secs, 30);
        assert_eq!(config.batch.max_workers, 3);
    }

    #[test]
    fn test_transform_settings_from_config() {
        let mut config = Config::default();
        config.tool.transform_timeout_secs = 120;
        config.transform.trim_buffer_ms = 250;
        config.transform.target_lufs = -14.0;

        let settings = config.transform_settings();
        assert_eq!(settings.transform_timeout, Duration::from_secs(120));
        assert_eq!(settings.probe_timeout, Duration::from_secs(30));
        assert_eq!(settings.trim_buffer, Duration::from_millis(250));
        assert_eq!(settings.loudness.integrated_lufs, -14.0);
        assert_eq!(settings.settle_delay, Duration::from_millis(200));
    }
}
