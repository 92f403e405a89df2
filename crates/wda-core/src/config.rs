//! Persistent configuration for wda.
//!
//! Stores user settings in `~/.wda/config.json`: where the device server
//! listens, the request timeout, and optional defaults for the bundle to
//! automate and the directory screenshots land in.
//!
//! # Example
//!
//! ```no_run
//! use wda_core::config::WdaConfig;
//!
//! // Load (returns defaults if file doesn't exist)
//! let config = WdaConfig::load();
//! println!("device server at {}", config.base_url);
//! ```

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::transport::{HttpTransport, TransportError, DEFAULT_TIMEOUT};

const CONFIG_FILENAME: &str = "config.json";

/// Base URL of a device server forwarded to the default local port.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8100";

/// Returns `~/.wda`, creating it if needed.
pub fn wda_dir() -> PathBuf {
    let dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".wda");
    std::fs::create_dir_all(&dir).ok();
    dir
}

/// The `User-Agent` sent when none is configured.
pub fn default_user_agent() -> String {
    format!("wda-rs/{}", env!("CARGO_PKG_VERSION"))
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

/// Persistent wda configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WdaConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds. Zero selects the transport default.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Directory screenshots and page dumps are written to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_dir: Option<PathBuf>,

    /// Bundle used when a command needs a session and none was given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_id: Option<String>,
}

impl Default for WdaConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            artifact_dir: None,
            bundle_id: None,
        }
    }
}

impl WdaConfig {
    /// Load config from `~/.wda/config.json`.
    ///
    /// Returns [`Default`] if the file does not exist or cannot be parsed.
    pub fn load() -> Self {
        Self::load_from(&Self::path())
    }

    /// Load config from an explicit file, falling back to defaults.
    pub fn load_from(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Save config to `~/.wda/config.json`.
    pub fn save(&self) -> io::Result<()> {
        self.save_to(&Self::path())
    }

    /// Save config to an explicit file as pretty-printed JSON.
    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Location of the config file.
    pub fn path() -> PathBuf {
        wda_dir().join(CONFIG_FILENAME)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Builds an [`HttpTransport`] with the configured timeout.
    pub fn transport(&self) -> Result<HttpTransport, TransportError> {
        HttpTransport::new(self.timeout())
    }

    /// Directory for artifacts: the configured one, or the current directory.
    pub fn artifact_dir(&self) -> PathBuf {
        self.artifact_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
