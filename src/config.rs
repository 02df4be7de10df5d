//! Application configuration
//!
//! Loaded from an optional TOML file; every section falls back to the
//! defaults in [`crate::constants`].

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::constants::*;
use crate::error::{Error, Result};

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub recording: RecordingConfig,
    pub network: NetworkConfig,
    pub storage: StorageConfig,
}

/// Audio format configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            bits_per_sample: BITS_PER_SAMPLE,
        }
    }
}

/// Recording window configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub standard_duration_ms: u64,
    pub max_duration_ms: u64,
    pub min_duration_ms: u64,
    pub settle_delay_ms: u64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            standard_duration_ms: STANDARD_DURATION_MS,
            max_duration_ms: MAX_DURATION_MS,
            min_duration_ms: MIN_DURATION_MS,
            settle_delay_ms: SETTLE_DELAY_MS,
        }
    }
}

impl RecordingConfig {
    pub fn standard_duration(&self) -> Duration {
        Duration::from_millis(self.standard_duration_ms)
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_millis(self.max_duration_ms)
    }

    pub fn min_duration(&self) -> Duration {
        Duration::from_millis(self.min_duration_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Device network configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub device_port: u16,
    pub status_path: String,
    pub upload_path: String,
    pub request_timeout_ms: u64,
    pub probe_timeout_ms: u64,
    pub probe_concurrency: usize,
    /// Overrides auto-detection of the host's local address
    pub local_address: Option<Ipv4Addr>,
    /// Skips subnet discovery entirely when set
    pub device_address: Option<Ipv4Addr>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            device_port: DEVICE_PORT,
            status_path: "/status".to_string(),
            upload_path: "/upload-audio".to_string(),
            request_timeout_ms: REQUEST_TIMEOUT_MS,
            probe_timeout_ms: PROBE_TIMEOUT_MS,
            probe_concurrency: PROBE_CONCURRENCY,
            local_address: None,
            device_address: None,
        }
    }
}

impl NetworkConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Artifact storage configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub save_recordings: bool,
    pub recordings_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub min_upload_bytes: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            save_recordings: true,
            recordings_dir: PathBuf::from("./recordings"),
            temp_dir: PathBuf::from("./temp"),
            min_upload_bytes: MIN_UPLOAD_BYTES,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Create the recordings and temp directories if missing
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.storage.recordings_dir)?;
        std::fs::create_dir_all(&self.storage.temp_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let config = AppConfig::default();
        assert_eq!(config.audio.sample_rate, 16_000);
        assert_eq!(config.audio.channels, 1);
        assert_eq!(config.recording.standard_duration_ms, 5_000);
        assert_eq!(config.recording.min_duration_ms, 500);
        assert_eq!(config.network.device_port, 80);
        assert_eq!(config.storage.min_upload_bytes, 1_000);
        assert!(config.network.device_address.is_none());
    }

    #[test]
    fn partial_toml_overrides_one_section() {
        let config: AppConfig = toml::from_str(
            r#"
            [recording]
            standard_duration_ms = 3000

            [network]
            device_address = "192.168.1.77"
            "#,
        )
        .unwrap();

        assert_eq!(config.recording.standard_duration_ms, 3_000);
        // Untouched fields keep their defaults
        assert_eq!(config.recording.min_duration_ms, 500);
        assert_eq!(
            config.network.device_address,
            Some(Ipv4Addr::new(192, 168, 1, 77))
        );
    }
}
