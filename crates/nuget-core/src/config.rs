//! Centralized configuration for the NuGet client.
//!
//! Constants for network behaviour and feed protocol limits, plus the
//! serde-loadable client options and source list used by front ends.

use crate::error::{NugetError, Result};
use crate::source::SourceConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const USER_AGENT: &'static str = "nuget-client/0.4";
    pub const DEFAULT_REQUEST_TIMEOUT_SECS: i64 = 100;
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DOWNLOAD_RETRY_ATTEMPTS: u32 = 3;
    pub const DOWNLOAD_TEMP_SUFFIX: &'static str = ".part";
    pub const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);
}

/// Feed protocol limits and defaults.
pub struct FeedConfig;

impl FeedConfig {
    /// Packages per v2 `GetUpdates()` request; longer id lists overflow
    /// server URL limits.
    pub const LEGACY_UPDATE_BATCH_SIZE: usize = 10;
    /// Upper bound on `<link rel="next">` pages followed for one query.
    pub const LEGACY_MAX_PAGES: usize = 50;
    pub const DEFAULT_SEARCH_TAKE: usize = 15;
    pub const SEMVER_LEVEL: &'static str = "2.0.0";
}

/// Options for the shared HTTP client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientOptions {
    /// Request timeout in seconds; `-1` disables the timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: i64,
    #[serde(default)]
    pub user_agent: Option<String>,
}

fn default_request_timeout() -> i64 {
    NetworkConfig::DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout_secs: NetworkConfig::DEFAULT_REQUEST_TIMEOUT_SECS,
            user_agent: None,
        }
    }
}

impl ClientOptions {
    /// Effective request timeout. `None` means requests may run indefinitely.
    pub fn request_timeout(&self) -> Result<Option<Duration>> {
        match self.request_timeout_secs {
            -1 => Ok(None),
            secs if secs >= 0 => Ok(Some(Duration::from_secs(secs as u64))),
            other => Err(NugetError::Config {
                message: format!(
                    "requestTimeoutSecs must be -1 or a non-negative number, got {}",
                    other
                ),
            }),
        }
    }
}

/// On-disk list of configured package sources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcesFile {
    #[serde(default)]
    pub client: ClientOptions,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl SourcesFile {
    /// Load a sources file from JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| NugetError::io_with_path(e, path))?;
        let file: SourcesFile = serde_json::from_str(&contents).map_err(|e| NugetError::Config {
            message: format!("Failed to parse {}: {}", path.display(), e),
        })?;
        Ok(file)
    }

    /// Write the sources file as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| NugetError::io_with_path(e, parent))?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents).map_err(|e| NugetError::io_with_path(e, path))?;
        Ok(())
    }
}
