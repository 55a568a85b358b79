use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;
use tracing::info;

use crate::types::error::SyncError;

/// Global configuration instance
static CONFIG: OnceCell<RwLock<AppConfig>> = OnceCell::new();

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote threads API
    #[serde(default)]
    pub server: ServerConfig,

    /// Pagination, debounce and reconciliation tuning
    #[serde(default)]
    pub sync: SyncConfig,

    /// Local cache database
    #[serde(default)]
    pub store: StoreConfig,
}

/// Remote server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the server, e.g. `https://chat.example.com`
    #[serde(default = "default_server_url")]
    pub url: String,

    /// Value sent as `X-User-Id`
    #[serde(default)]
    pub user_id: String,

    /// Value sent as `X-Auth-Token`
    #[serde(default)]
    pub auth_token: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Sync engine tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Number of threads requested per page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Trailing debounce window for "load more" triggers
    #[serde(default = "default_load_debounce_ms")]
    pub load_debounce_ms: u64,

    /// Leading-edge window during which repeated item presses are dropped
    #[serde(default = "default_press_debounce_ms")]
    pub press_debounce_ms: u64,

    /// Local-only fields kept when a remote update overwrites a thread
    #[serde(default)]
    pub preserve_local_fields: Vec<LocalField>,
}

/// Local cache database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

/// Thread columns that exist only locally and never arrive from the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalField {
    DraftMessage,
}

fn default_server_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_page_size() -> usize {
    50
}

fn default_load_debounce_ms() -> u64 {
    300
}

fn default_press_debounce_ms() -> u64 {
    1000
}

fn default_pool_size() -> u32 {
    8
}

fn default_db_path() -> PathBuf {
    // In dev mode, use .sqlite relative to project root for easier debugging
    if cfg!(debug_assertions) {
        PathBuf::from("../.sqlite/thread_sync.db")
    } else {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("thread-sync")
            .join("threads.db")
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            user_id: String::new(),
            auth_token: String::new(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            load_debounce_ms: default_load_debounce_ms(),
            press_debounce_ms: default_press_debounce_ms(),
            preserve_local_fields: Vec::new(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            pool_size: default_pool_size(),
        }
    }
}

impl SyncConfig {
    pub fn load_debounce(&self) -> Duration {
        Duration::from_millis(self.load_debounce_ms)
    }

    pub fn press_debounce(&self) -> Duration {
        Duration::from_millis(self.press_debounce_ms)
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.page_size == 0 {
            return Err(SyncError::Config("sync.page_size must be at least 1".to_string()));
        }
        Ok(())
    }
}

impl AppConfig {
    /// Parse a TOML document, filling every missing field with its default
    pub fn from_toml(content: &str) -> Result<Self, SyncError> {
        let config: AppConfig = toml::from_str(content)
            .map_err(|e| SyncError::Config(format!("Failed to parse config: {}", e)))?;
        config.sync.validate()?;
        Ok(config)
    }
}

/// Get default config paths
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // XDG config path
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("thread-sync").join("config.toml"));
    }

    // Home directory fallback
    if let Some(home_dir) = dirs::home_dir() {
        paths.push(
            home_dir
                .join(".config")
                .join("thread-sync")
                .join("config.toml"),
        );
    }

    paths
}

/// Initialize configuration from default paths
pub fn init_config() -> Result<(), SyncError> {
    info!("Initializing configuration from default paths");

    for path in default_config_paths() {
        if path.exists() {
            info!("Found config at: {:?}", path);
            return init_config_from_path(&path);
        }
    }

    info!("No config file found, using defaults");
    set_config(AppConfig::default())
}

/// Initialize configuration from a specific path
pub fn init_config_from_path(path: &Path) -> Result<(), SyncError> {
    info!("Loading configuration from: {:?}", path);

    let content = fs::read_to_string(path)
        .map_err(|e| SyncError::Config(format!("Failed to read config: {}", e)))?;

    set_config(AppConfig::from_toml(&content)?)
}

/// Set the global configuration
fn set_config(config: AppConfig) -> Result<(), SyncError> {
    match CONFIG.get() {
        Some(lock) => {
            let mut guard = lock
                .write()
                .map_err(|e| SyncError::Config(format!("Failed to lock config: {}", e)))?;
            *guard = config;
        }
        None => {
            CONFIG.set(RwLock::new(config)).ok();
        }
    }
    Ok(())
}

/// Check if configuration is initialized
pub fn is_initialized() -> bool {
    CONFIG.get().is_some()
}

/// Snapshot of the current configuration
pub fn get_config() -> Result<AppConfig, SyncError> {
    let lock = CONFIG
        .get()
        .ok_or_else(|| SyncError::Config("Configuration not initialized".to_string()))?;
    let guard = lock
        .read()
        .map_err(|e| SyncError::Config(format!("Failed to lock config: {}", e)))?;
    Ok(guard.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.sync.page_size, 50);
        assert_eq!(config.sync.load_debounce(), Duration::from_millis(300));
        assert_eq!(config.sync.press_debounce(), Duration::from_millis(1000));
        assert!(config.sync.preserve_local_fields.is_empty());
        assert_eq!(config.store.pool_size, 8);
    }

    #[test]
    fn test_partial_document() {
        let config = AppConfig::from_toml(
            r#"
            [server]
            url = "https://chat.example.com"
            user_id = "u1"
            auth_token = "secret"

            [sync]
            page_size = 25
            preserve_local_fields = ["draft_message"]
            "#,
        )
        .unwrap();

        assert_eq!(config.server.url, "https://chat.example.com");
        assert_eq!(config.server.request_timeout_secs, 30);
        assert_eq!(config.sync.page_size, 25);
        assert_eq!(config.sync.load_debounce_ms, 300);
        assert_eq!(config.sync.preserve_local_fields, vec![LocalField::DraftMessage]);
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let err = AppConfig::from_toml("[sync]\npage_size = 0\n").unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn test_init_from_path_sets_global() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[store]\npool_size = 3").unwrap();

        init_config_from_path(file.path()).unwrap();
        assert!(is_initialized());
        assert_eq!(get_config().unwrap().store.pool_size, 3);
    }
}
