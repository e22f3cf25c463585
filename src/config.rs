//! Application configuration and on-disk store layout.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application version
    pub version: String,
    /// Data directory path
    #[serde(skip)]
    pub data_dir: PathBuf,
    /// Remote telemetry API settings
    pub api: ApiSettings,
    /// Synchronization settings
    pub sync: SyncSettings,
    /// Tracked account settings
    pub accounts: AccountSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            data_dir: PathBuf::new(),
            api: ApiSettings::default(),
            sync: SyncSettings::default(),
            accounts: AccountSettings::default(),
        }
    }
}

/// Remote telemetry API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Base URL of the telemetry API
    pub base_url: String,
    /// Bearer token for authentication
    pub api_key: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u32,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.matchvault.io/v1".to_string(),
            api_key: String::new(),
            timeout_secs: 30,
        }
    }
}

/// Synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Maximum outbound requests per second
    pub requests_per_second: f64,
    /// Maximum concurrent in-flight matches
    pub max_in_flight: u32,
    /// Matches per commit batch
    pub batch_size: u32,
    /// Page cap for a full sync
    pub max_matches: u32,
    /// Defer percentile scoring to a single post-pass
    pub deferred_scoring: bool,
    /// Gap in minutes that still groups two matches into one session
    pub session_gap_minutes: i64,
    /// Retry attempts for transient remote errors
    pub retry_attempts: u32,
    /// Base retry delay in milliseconds (doubles per attempt)
    pub retry_base_delay_ms: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            requests_per_second: 5.0,
            max_in_flight: 4,
            batch_size: 25,
            max_matches: 1000,
            deferred_scoring: false,
            session_gap_minutes: 30,
            retry_attempts: 3,
            retry_base_delay_ms: 500,
        }
    }
}

/// Tracked account settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AccountSettings {
    /// Account ids with an actively maintained enrichment store
    pub tracked: Vec<String>,
}

/// Locations of the physical stores under a data directory.
#[derive(Debug, Clone)]
pub struct StorePaths {
    data_dir: PathBuf,
}

impl StorePaths {
    /// Create a layout rooted at the given data directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// The data directory itself.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of the shared match registry.
    pub fn registry(&self) -> PathBuf {
        self.data_dir.join("registry.db")
    }

    /// Path of one account's enrichment store.
    pub fn account_store(&self, account_id: &str) -> PathBuf {
        self.data_dir
            .join("accounts")
            .join(format!("{}.db", sanitize_account_id(account_id)))
    }
}

/// Account ids are opaque remote strings; keep file names portable.
fn sanitize_account_id(account_id: &str) -> String {
    account_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Get the application data directory.
pub fn get_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "matchvault", "MatchVault")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get the configuration file path.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("config.toml")
}

/// Load application configuration from file.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let path = get_config_path();

    if !path.exists() {
        let config = AppConfig {
            data_dir: get_data_dir(),
            ..Default::default()
        };
        return Ok(config);
    }

    let content =
        std::fs::read_to_string(&path).map_err(|e| ConfigError::IoError(e.to_string()))?;

    let mut config: AppConfig =
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    config.data_dir = get_data_dir();

    Ok(config)
}

/// Save application configuration to file.
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    let path = get_config_path();

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
    }

    let content =
        toml::to_string_pretty(config).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

    Ok(())
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.sync.retry_attempts, 3);
        assert_eq!(config.sync.batch_size, 25);
        assert!(!config.sync.deferred_scoring);
        assert!(config.accounts.tracked.is_empty());
    }

    #[test]
    fn test_store_paths() {
        let paths = StorePaths::new("/tmp/mv-data");
        assert!(paths.registry().ends_with("registry.db"));
        assert!(paths
            .account_store("xuid(123)")
            .ends_with("accounts/xuid_123_.db"));
    }

    #[test]
    fn test_config_round_trip() {
        let mut config = AppConfig::default();
        config.api.api_key = "secret".to_string();
        config.accounts.tracked = vec!["acct-a".to_string(), "acct-b".to_string()];

        let text = toml::to_string_pretty(&config).expect("Failed to serialize");
        let parsed: AppConfig = toml::from_str(&text).expect("Failed to parse");

        assert_eq!(parsed.api.api_key, "secret");
        assert_eq!(parsed.accounts.tracked.len(), 2);
        assert_eq!(parsed.sync.session_gap_minutes, 30);
    }
}
