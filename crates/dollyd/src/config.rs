//! Configuration management for dollyd.
//!
//! Loads settings from /etc/dolly/config.toml or uses defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/dolly/config.toml";

fn default_state_dir() -> String {
    "/var/lib/dolly".to_string()
}

fn default_scan_interval() -> u64 {
    3600
}

fn default_scan_backoff() -> u64 {
    60
}

fn default_stop_timeout() -> u64 {
    5
}

fn default_history_cap() -> usize {
    500
}

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Directory holding the registry, pattern and network fact files
    #[serde(default = "default_state_dir")]
    pub state_dir: String,

    /// Default background scan interval for new clones, in seconds
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,

    /// Retry delay after a failed scan cycle, in seconds
    #[serde(default = "default_scan_backoff")]
    pub scan_backoff_secs: u64,

    /// How long to wait for a scan worker to observe its stop signal
    /// before force-terminating it, in seconds
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,

    /// Bound on each clone's accumulated finding history
    #[serde(default = "default_history_cap")]
    pub finding_history_cap: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            scan_interval_secs: default_scan_interval(),
            scan_backoff_secs: default_scan_backoff(),
            stop_timeout_secs: default_stop_timeout(),
            finding_history_cap: default_history_cap(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from the default path
    pub fn load() -> Self {
        Self::load_from(Path::new(CONFIG_PATH))
    }

    /// Load configuration from a specific path, falling back to defaults
    /// on a missing or malformed file
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            info!("No config file at {}, using defaults", path.display());
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("Failed to parse {}: {}. Using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read {}: {}. Using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn registry_path(&self) -> PathBuf {
        Path::new(&self.state_dir).join("registry.json")
    }

    pub fn patterns_path(&self) -> PathBuf {
        Path::new(&self.state_dir).join("patterns.json")
    }

    pub fn facts_path(&self) -> PathBuf {
        Path::new(&self.state_dir).join("network.json")
    }
}
