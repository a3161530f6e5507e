use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::Error;

// Default configuration values
const DEFAULT_API_URL: &str = "http://localhost:3000/api";
const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;
const DEFAULT_HISTORY_PAGE_SIZE: u32 = 20;
const CREDENTIALS_FILENAME: &str = "credentials.json";

/// Main configuration struct for the admin client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Remote API configuration
    #[serde(default)]
    pub api: ApiConfig,
    /// Credential persistence
    #[serde(default)]
    pub auth: AuthConfig,
    /// Session observation settings
    #[serde(default)]
    pub sessions: SessionConfig,
}

/// Remote API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL every endpoint path is joined onto
    #[serde(default = "default_api_url")]
    pub base_url: String,
}

/// Credential persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Whether credentials survive process restarts
    #[serde(default = "default_persist_credentials")]
    pub persist_credentials: bool,
    /// Where the credential set is written (defaults next to the config file)
    #[serde(default = "default_credentials_path")]
    pub credentials_path: Option<PathBuf>,
}

/// Session observation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Fixed cadence for session and list polling
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Page size used by history listings when none is given
    #[serde(default = "default_history_page_size")]
    pub history_page_size: u32,
}

impl SessionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// Default functions
fn default_api_url() -> String {
    std::env::var("LINEUP_ADMIN_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string())
}

fn default_persist_credentials() -> bool {
    std::env::var("LINEUP_ADMIN_PERSIST_CREDENTIALS")
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(true)
}

fn default_credentials_path() -> Option<PathBuf> {
    std::env::var("LINEUP_ADMIN_CREDENTIALS_PATH")
        .ok()
        .map(PathBuf::from)
}

fn default_poll_interval() -> u64 {
    std::env::var("LINEUP_ADMIN_POLL_INTERVAL_MS")
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(DEFAULT_POLL_INTERVAL_MS)
}

fn default_history_page_size() -> u32 {
    std::env::var("LINEUP_ADMIN_PAGE_SIZE")
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(DEFAULT_HISTORY_PAGE_SIZE)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            auth: AuthConfig::default(),
            sessions: SessionConfig::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_url(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            persist_credentials: default_persist_credentials(),
            credentials_path: default_credentials_path(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            history_page_size: default_history_page_size(),
        }
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if url::Url::parse(&self.api.base_url).is_err() {
            return Err(Error::Config {
                key: "api.base_url".into(),
                reason: format!("'{}' is not an absolute URL", self.api.base_url),
            });
        }
        if self.sessions.poll_interval_ms == 0 {
            return Err(Error::Config {
                key: "sessions.poll_interval_ms".into(),
                reason: "must be greater than zero".into(),
            });
        }
        if self.sessions.history_page_size == 0 {
            return Err(Error::Config {
                key: "sessions.history_page_size".into(),
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

/// Manages configuration for the application
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: Arc<RwLock<Config>>,
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new configuration manager
    pub async fn new() -> Result<Self> {
        let config_path = get_config_path()?;
        Self::with_path(config_path).await
    }

    /// Create a configuration manager backed by an explicit file
    pub async fn with_path(config_path: PathBuf) -> Result<Self> {
        let mut config = load_or_create_config(&config_path).await?;

        // Keep the credential file next to the config unless told otherwise
        if config.auth.persist_credentials && config.auth.credentials_path.is_none() {
            if let Some(dir) = config_path.parent() {
                config.auth.credentials_path = Some(dir.join(CREDENTIALS_FILENAME));
            }
        }

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    /// Get a clone of the current configuration
    pub async fn get_config(&self) -> Config {
        self.config.read().await.clone()
    }

    /// Path of the backing configuration file
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

/// Get the path to the configuration file
fn get_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("LINEUP_ADMIN_CONFIG_PATH") {
        return Ok(PathBuf::from(path));
    }

    if let Some(user_config_dir) = dirs_next::config_dir() {
        let config_dir = user_config_dir.join("lineup-admin");
        std::fs::create_dir_all(&config_dir)?;
        return Ok(config_dir.join("config.json"));
    }

    // Fallback to current directory
    Ok(PathBuf::from("config.json"))
}

/// Load configuration from file or create default
async fn load_or_create_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        let default_config = Config::default();
        save_config(path, &default_config).await?;
        info!("Created default configuration at {}", path.display());
        return Ok(default_config);
    }

    let config_str = fs::read_to_string(path).await?;
    let config: Config = serde_json::from_str(&config_str)?;
    debug!("Loaded configuration from {}", path.display());

    Ok(config)
}

/// Save configuration to file
async fn save_config(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let config_str = serde_json::to_string_pretty(config)?;
    fs::write(path, config_str).await?;
    debug!("Saved configuration to {}", path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_creates_default_config_and_credentials_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let manager = ConfigManager::with_path(path.clone()).await.unwrap();
        assert!(path.exists());

        let config = manager.get_config().await;
        if config.auth.persist_credentials && default_credentials_path().is_none() {
            assert_eq!(
                config.auth.credentials_path,
                Some(dir.path().join(CREDENTIALS_FILENAME))
            );
        }
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"api": {"base_url": "https://admin.example.com/api"}}"#)
                .unwrap();
        assert_eq!(config.api.base_url, "https://admin.example.com/api");
        assert!(config.sessions.poll_interval_ms > 0);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.api.base_url = "https://admin.example.com/api".into();
        config.sessions.poll_interval_ms = 5000;
        config.sessions.history_page_size = 20;
        assert!(config.validate().is_ok());

        config.sessions.poll_interval_ms = 0;
        assert!(matches!(config.validate(), Err(Error::Config { .. })));

        config.sessions.poll_interval_ms = 5000;
        config.api.base_url = "not a url".into();
        assert!(matches!(config.validate(), Err(Error::Config { .. })));
    }
}
