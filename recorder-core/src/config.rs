//! # Configuration Module
//!
//! Session and application settings. A `CaptureConfig` is fixed when a
//! session starts; `AppConfig` bundles it with the upload settings and the
//! export directory and is persisted as JSON next to the application.
//!
//! ## Defaults
//! - Sample Rate: 40 kHz
//! - Rolling window: 15 s
//! - Spectrum shown up to 20 kHz
//! - Capture blocks of 1024 samples (~26ms at 40kHz)

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{RecorderError, Result};

/// Environment variable that overrides `UploadConfig::api_key`.
pub const API_KEY_ENV: &str = "RECORDER_UPLOAD_API_KEY";

pub const DEFAULT_SAMPLE_RATE: u32 = 40_000;
pub const DEFAULT_DURATION_SECS: u32 = 15;
pub const DEFAULT_MAX_FREQUENCY: f32 = 20_000.0;
pub const DEFAULT_BLOCK_SIZE: usize = 1024;

/// Immutable per-session capture settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Requested device sample rate in Hz. The device must support it exactly.
    pub sample_rate: u32,
    /// Length of the rolling window in seconds.
    pub duration_secs: u32,
    /// Highest frequency kept in the published spectrum, in Hz.
    pub max_frequency: f32,
    /// Number of samples per block delivered to the session.
    pub block_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            duration_secs: DEFAULT_DURATION_SECS,
            max_frequency: DEFAULT_MAX_FREQUENCY,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl CaptureConfig {
    pub fn new(sample_rate: u32, duration_secs: u32, max_frequency: f32) -> Self {
        Self {
            sample_rate,
            duration_secs,
            max_frequency,
            ..Self::default()
        }
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Number of samples held by the rolling window.
    pub fn buffer_len(&self) -> usize {
        self.sample_rate as usize * self.duration_secs as usize
    }

    pub fn nyquist(&self) -> f32 {
        self.sample_rate as f32 / 2.0
    }

    /// Wall-clock time covered by one block.
    pub fn block_period(&self) -> Duration {
        Duration::from_secs_f64(self.block_size as f64 / self.sample_rate as f64)
    }

    /// Rejects configurations that cannot describe a session.
    ///
    /// A `max_frequency` above Nyquist is accepted: the spectrum simply ends
    /// at the last available bin.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(RecorderError::InvalidConfig("sample rate must be non-zero".into()));
        }
        if self.duration_secs == 0 {
            return Err(RecorderError::InvalidConfig("duration must be non-zero".into()));
        }
        if self.block_size == 0 {
            return Err(RecorderError::InvalidConfig("block size must be non-zero".into()));
        }
        if self.max_frequency.is_nan() || self.max_frequency <= 0.0 {
            return Err(RecorderError::InvalidConfig(format!(
                "max frequency must be positive, got {}",
                self.max_frequency
            )));
        }
        if self.max_frequency > self.nyquist() {
            warn!(
                "[CONFIG] Max frequency {} Hz is above Nyquist ({} Hz); spectrum will stop at Nyquist",
                self.max_frequency,
                self.nyquist()
            );
        }
        Ok(())
    }
}

/// Settings for posting finished recordings to the ingestion service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub endpoint: String,
    /// Sent as `x-api-key`. Prefer the environment variable over the file.
    pub api_key: String,
    /// Default label attached to uploads (`x-label`).
    pub label: String,
    pub timeout_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://ingestion.edgeimpulse.com/api/testing/files".to_string(),
            api_key: String::new(),
            label: "recording".to_string(),
            timeout_secs: 30,
        }
    }
}

impl UploadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Replaces the API key with `RECORDER_UPLOAD_API_KEY` when it is set.
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.api_key = key.trim().to_string();
            }
        }
    }
}

/// Top-level settings object saved to and loaded from disk.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub capture: CaptureConfig,
    pub upload: UploadConfig,
    /// Directory exported WAV files are written to. Empty means the working directory.
    pub output_dir: PathBuf,
    /// Input device name; `None` uses the host default.
    pub input_device: Option<String>,
}

impl AppConfig {
    /// Loads a config from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)
            .map_err(|e| RecorderError::Config(format!("{}: {}", path.display(), e)))?;
        let mut data = String::new();
        file.read_to_string(&mut data)
            .map_err(|e| RecorderError::Config(format!("{}: {}", path.display(), e)))?;
        let config: AppConfig = serde_json::from_str(&data)?;
        config.capture.validate()?;
        Ok(config)
    }

    /// Loads `path` if it exists, otherwise falls back to defaults.
    /// The upload API key is taken from the environment when present.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::load(path)?
        } else {
            Self::default()
        };
        config.upload.apply_env();
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json_string = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)
            .map_err(|e| RecorderError::Config(format!("{}: {}", path.display(), e)))?;
        file.write_all(json_string.as_bytes())
            .map_err(|e| RecorderError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_buffer_len() {
        let config = CaptureConfig::default();
        assert_eq!(config.buffer_len(), 40_000 * 15);
        assert_eq!(config.nyquist(), 20_000.0);
    }

    #[test]
    fn test_block_period() {
        let config = CaptureConfig::new(40_000, 1, 20_000.0).with_block_size(4000);
        assert!((config.block_period().as_secs_f64() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        assert!(CaptureConfig::new(0, 1, 100.0).validate().is_err());
        assert!(CaptureConfig::new(8000, 0, 100.0).validate().is_err());
        assert!(CaptureConfig::new(8000, 1, 100.0).with_block_size(0).validate().is_err());
        assert!(CaptureConfig::new(8000, 1, 0.0).validate().is_err());
    }

    #[test]
    fn test_validate_accepts_max_frequency_above_nyquist() {
        let config = CaptureConfig::new(8000, 1, 10_000.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recorder.json");

        let mut config = AppConfig::default();
        config.capture = CaptureConfig::new(44_100, 5, 8_000.0);
        config.upload.label = "cough".to_string();
        config.output_dir = PathBuf::from("takes");
        config.input_device = Some("USB Microphone".to_string());
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recorder.json");
        std::fs::write(&path, r#"{ "capture": { "duration_secs": 3 } }"#).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.capture.duration_secs, 3);
        assert_eq!(loaded.capture.sample_rate, DEFAULT_SAMPLE_RATE);
        assert_eq!(loaded.upload, UploadConfig::default());
        assert_eq!(loaded.input_device, None);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_or_default(dir.path().join("absent.json")).unwrap();
        assert_eq!(config.capture, CaptureConfig::default());
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recorder.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(RecorderError::Config(_))));
    }
}
