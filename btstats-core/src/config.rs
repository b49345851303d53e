//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/btstats/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/btstats/` (~/.config/btstats/)
//! - State/Logs: `$XDG_STATE_HOME/btstats/` (~/.local/state/btstats/)
//!
//! The store location itself is not in the config file. It is read from a
//! separate secret file (`store.url_file`) into [`StoreSettings`] at startup.

use crate::actions::policy::{DEFAULT_TOP_N, DEFAULT_WINDOW_DAYS};
use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Event store location
    #[serde(default)]
    pub store: StoreConfig,

    /// HTTP listener
    #[serde(default)]
    pub server: ServerConfig,

    /// Window and ranking defaults
    #[serde(default)]
    pub query: QueryConfig,

    /// Remote user color map
    #[serde(default)]
    pub usercolors: UserColorsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where to find the store connection secret
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// File holding the store URL; relative paths resolve against the working directory
    #[serde(default = "default_url_file")]
    pub url_file: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url_file: default_url_file(),
        }
    }
}

fn default_url_file() -> PathBuf {
    PathBuf::from(".storeurl")
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Shared query policy
#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    /// Days of history considered by windowed actions
    #[serde(default = "default_window_days")]
    pub window_days: u32,

    /// Rows kept by ranked actions
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            top_n: default_top_n(),
        }
    }
}

fn default_window_days() -> u32 {
    DEFAULT_WINDOW_DAYS
}

fn default_top_n() -> usize {
    DEFAULT_TOP_N
}

/// User color proxy configuration
#[derive(Debug, Deserialize, Clone)]
pub struct UserColorsConfig {
    /// Script defining the nickname -> attributes map
    #[serde(default = "default_usercolors_url")]
    pub url: String,

    /// HTTP request timeout in seconds
    #[serde(default = "default_usercolors_timeout")]
    pub timeout_secs: u64,
}

impl Default for UserColorsConfig {
    fn default() -> Self {
        Self {
            url: default_usercolors_url(),
            timeout_secs: default_usercolors_timeout(),
        }
    }
}

fn default_usercolors_url() -> String {
    "https://btc.berrytube.tv/wut/wutColors/usercolors.js".to_string()
}

fn default_usercolors_timeout() -> u64 {
    10
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make every query empty or unreachable
    pub fn validate(&self) -> Result<()> {
        if self.query.window_days == 0 {
            return Err(Error::Config(
                "query.window_days must be at least 1".to_string(),
            ));
        }
        if self.query.top_n == 0 {
            return Err(Error::Config("query.top_n must be at least 1".to_string()));
        }
        if self.usercolors.url.trim().is_empty() {
            return Err(Error::Config("usercolors.url must not be empty".to_string()));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/btstats/config.toml` (~/.config/btstats/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("btstats").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/btstats/` (~/.local/state/btstats/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("btstats")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/btstats/btstats.log` (~/.local/state/btstats/btstats.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("btstats.log")
    }
}

/// Resolved store location, built once at startup and passed to every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    pub database_path: PathBuf,
}

impl StoreSettings {
    /// Read the store URL from its secret file. A missing or empty file is fatal.
    pub fn from_secret_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read store url file {:?}: {}", path, e))
        })?;
        Self::parse_url(content.trim())
    }

    /// Accepts `sqlite://<path>` or a bare path.
    pub fn parse_url(url: &str) -> Result<Self> {
        let path = url.strip_prefix("sqlite://").unwrap_or(url);
        if path.is_empty() {
            return Err(Error::Config("store url is empty".to_string()));
        }
        Ok(Self {
            database_path: PathBuf::from(path),
        })
    }
}
