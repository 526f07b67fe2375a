//! Configuration
//!
//! Reads config from ~/.config/unifs/config.toml:
//!
//! ```toml
//! [monitor]
//! poll_interval_ms = 2000
//! attributes = ["modified", "size"]
//!
//! [nfs]
//! version = "v3"
//! transport = "TCP"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, VfsError};
use crate::monitor::FileAttributes;
use crate::nfs::{NfsTransport, NfsVersion};

/// File monitor defaults
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub poll_interval_ms: u64,
    /// Attribute names, see [`FileAttributes::from_config_name`]
    pub attributes: Vec<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10_000,
            attributes: vec!["modified".to_string()],
        }
    }
}

impl MonitorConfig {
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Monitored attributes; unknown names are ignored
    pub fn attribute_mask(&self) -> FileAttributes {
        self.attributes
            .iter()
            .filter_map(|name| FileAttributes::from_config_name(name))
            .fold(FileAttributes::empty(), |acc, attr| acc | attr)
    }
}

/// NFS connection defaults, used when an address carries no options
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NfsConfig {
    pub version: NfsVersion,
    pub transport: NfsTransport,
}

/// Full configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VfsConfig {
    pub monitor: MonitorConfig,
    pub nfs: NfsConfig,
}

impl VfsConfig {
    /// Load configuration from default path, defaults when missing or invalid
    pub fn load() -> Self {
        Self::load_from_path(&Self::default_config_path()).unwrap_or_default()
    }

    /// Get default config path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("unifs")
            .join("config.toml")
    }

    /// Load from specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| VfsError::io(format!("cannot read {}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| VfsError::io(format!("invalid configuration: {e}")))
    }
}
