//! TOML-based configuration persisted in the backend's storage directory.
//!
//! The file is `<storage>/devbridge.toml`.  Every field has a default, so a
//! missing file, or a file written by an older version, still loads:
//!
//! ```toml
//! [device]
//! vendor_id = 1003      # 0x03eb
//! product_id = 9219     # 0x2403
//!
//! [transport]
//! timeout_secs = 5000
//!
//! [network]
//! lost_debounce_ms = 250
//!
//! [bridge]
//! log_level = "info"
//! deep_link_schemes = ["aopp", "bitcoin", "litecoin", "ethereum"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use devbridge_core::{DeviceFilter, DEFAULT_PRODUCT_ID, DEFAULT_VENDOR_ID};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::deep_link::{DeepLinkPolicy, DEFAULT_SCHEMES};

/// File name of the configuration inside the storage directory.
pub const CONFIG_FILE_NAME: &str = "devbridge.toml";

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BridgeConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub bridge: BridgeSection,
}

/// Which USB device is bridged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    #[serde(default = "default_vendor_id")]
    pub vendor_id: u16,
    #[serde(default = "default_product_id")]
    pub product_id: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransportConfig {
    /// Timeout of a single bulk transfer.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// Delay before re-checking after the network is lost.
    #[serde(default = "default_lost_debounce_ms")]
    pub lost_debounce_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeSection {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// URI schemes forwarded to the backend.
    #[serde(default = "default_deep_link_schemes")]
    pub deep_link_schemes: Vec<String>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_vendor_id() -> u16 {
    DEFAULT_VENDOR_ID
}
fn default_product_id() -> u16 {
    DEFAULT_PRODUCT_ID
}
fn default_timeout_secs() -> u64 {
    5_000
}
fn default_lost_debounce_ms() -> u64 {
    250
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_deep_link_schemes() -> Vec<String> {
    DEFAULT_SCHEMES.iter().map(|s| s.to_string()).collect()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self { vendor_id: default_vendor_id(), product_id: default_product_id() }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self { timeout_secs: default_timeout_secs() }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { lost_debounce_ms: default_lost_debounce_ms() }
    }
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self { log_level: default_log_level(), deep_link_schemes: default_deep_link_schemes() }
    }
}

impl BridgeConfig {
    pub fn device_filter(&self) -> DeviceFilter {
        DeviceFilter::new(self.device.vendor_id, self.device.product_id)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transport.timeout_secs)
    }

    pub fn lost_debounce(&self) -> Duration {
        Duration::from_millis(self.network.lost_debounce_ms)
    }

    pub fn deep_link_policy(&self) -> DeepLinkPolicy {
        DeepLinkPolicy::new(&self.bridge.deep_link_schemes)
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

pub fn config_file_path(storage_dir: &Path) -> PathBuf {
    storage_dir.join(CONFIG_FILE_NAME)
}

/// Loads the config from `storage_dir`, returning defaults if the file does
/// not exist yet.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(storage_dir: &Path) -> Result<BridgeConfig, ConfigError> {
    let path = config_file_path(storage_dir);

    match std::fs::read_to_string(&path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BridgeConfig::default()),
        Err(e) => Err(ConfigError::Io { path, source: e }),
    }
}

/// Writes `config` to `storage_dir`, creating the directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(storage_dir: &Path, config: &BridgeConfig) -> Result<(), ConfigError> {
    std::fs::create_dir_all(storage_dir).map_err(|source| ConfigError::Io {
        path: storage_dir.to_path_buf(),
        source,
    })?;

    let path = config_file_path(storage_dir);
    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content).map_err(|source| ConfigError::Io { path, source })?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
