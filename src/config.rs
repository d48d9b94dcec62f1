//! Listener configuration
//!
//! Supports TOML files; every field is optional and falls back to the
//! defaults below, which match the timings the device firmware expects.

use rawhid_transport::{DeviceProfile, DEFAULT_PROFILES};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Timeouts, retry budgets and device profiles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Receive timeout for polling and identification (ms)
    pub rx_timeout_ms: u32,
    /// Send timeout (ms)
    pub tx_timeout_ms: u32,
    /// Sleep between polls while no device is open (ms)
    pub idle_poll_ms: u64,
    /// Extra attempts after a failed send of one chunk
    pub send_retries: u32,
    /// Maximum devices opened by discovery
    pub discovery_limit: usize,
    /// Receive attempts while waiting for an identification response
    pub identify_attempts: usize,
    /// Console lines are cut to this many characters before processing
    pub max_line_len: usize,
    /// Device profiles, tried in order
    pub profiles: Vec<DeviceProfile>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            rx_timeout_ms: 100,
            tx_timeout_ms: 100,
            idle_poll_ms: 5,
            send_retries: 1,
            discovery_limit: 10,
            identify_attempts: 100,
            max_line_len: 99,
            profiles: DEFAULT_PROFILES.to_vec(),
        }
    }
}

impl ListenerConfig {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rawhid-listener")
            .join("config.toml")
    }

    /// Load config from a file, or return default if not found
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: ListenerConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }
}
