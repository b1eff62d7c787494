//! Configuration management for Bigdrop.
//!
//! ## Configuration File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/bigdrop/config.toml` |
//! | macOS | `~/Library/Application Support/Bigdrop/config.toml` |
//! | Windows | `%APPDATA%\Bigdrop\config.toml` |
//!
//! Every field has a default, so a partial file (or none at all) works.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration struct for Bigdrop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Transfer settings
    pub transfer: TransferConfig,
    /// Store server settings
    pub server: ServerConfig,
    /// Client settings
    pub client: ClientConfig,
}

/// Transfer configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Chunk size in bytes
    pub chunk_size: u64,
    /// Number of parallel chunk uploads
    pub parallel_chunks: usize,
    /// Failures allowed per chunk before the upload fails
    pub max_retries: u32,
    /// Per-chunk upload timeout
    #[serde(with = "humantime_serde")]
    pub chunk_timeout: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
            parallel_chunks: crate::DEFAULT_PARALLEL_CHUNKS,
            max_retries: crate::MAX_CHUNK_RETRIES,
            chunk_timeout: Duration::from_secs(crate::DEFAULT_CHUNK_TIMEOUT_SECS),
        }
    }
}

/// Store server configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Bind to localhost only
    pub localhost_only: bool,
    /// Directory holding artifacts and in-flight chunks
    /// (defaults to `uploads` in the working directory)
    pub storage_dir: Option<PathBuf>,
    /// Largest accepted request body in bytes
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: crate::DEFAULT_SERVER_PORT,
            localhost_only: false,
            storage_dir: None,
            body_limit_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Client configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the store server
    pub server_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: format!("http://localhost:{}", crate::DEFAULT_SERVER_PORT),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// If the configuration file doesn't exist, returns the default
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("failed to read config: {e}")))?;

        toml::from_str(&content).map_err(|e| Error::Config(format!("failed to parse config: {e}")))
    }

    /// Save configuration to the default location, creating the
    /// configuration directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("failed to create config directory: {e}")))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("failed to serialize config: {e}")))?;

        std::fs::write(&path, content)
            .map_err(|e| Error::Config(format!("failed to write config: {e}")))
    }

    /// Get the default configuration directory path.
    #[must_use]
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "bigdrop", "Bigdrop")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the full path to the configuration file.
    #[must_use]
    pub fn config_path() -> PathBuf {
        Self::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.strip_suffix('s')
            .map(|secs| {
                secs.parse()
                    .map(Duration::from_secs)
                    .map_err(serde::de::Error::custom)
            })
            .or_else(|| {
                s.strip_suffix('m').map(|mins| {
                    mins.parse::<u64>()
                        .map(|m| Duration::from_secs(m * 60))
                        .map_err(serde::de::Error::custom)
                })
            })
            .unwrap_or_else(|| Err(serde::de::Error::custom("invalid duration format")))
    }
}
