//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from a small TOML file. Every field has a
//! built-in default, so a missing file is not an error: the service logs a
//! warning and starts with defaults.
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. `TANKWATCH_ROOT_FOLDER` environment variable
//! 3. `root_folder` key in the TOML config file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

/// Environment variable consulted for the root folder
pub const ROOT_FOLDER_ENV: &str = "TANKWATCH_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DEFAULT_DATABASE_FILE: &str = "tankwatch.db";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database (optional)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Explicit database path; defaults to `<root_folder>/tankwatch.db`
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Interface the HTTP server binds to
    #[serde(default = "default_bind_host")]
    pub bind_host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Persistence backend
    #[serde(default)]
    pub store: StoreKind,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub inventory: InventorySettings,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Inventory engine settings
#[derive(Debug, Clone, Deserialize)]
pub struct InventorySettings {
    /// How many of the most recent update-log entries feed staleness
    #[serde(default = "default_update_log_limit")]
    pub update_log_limit: usize,

    /// Enforce `x-tankwatch-role` checks on the HTTP API.
    /// When disabled every request acts as an admin.
    #[serde(default = "default_role_gating")]
    pub role_gating: bool,
}

/// Persistence backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Sqlite,
    Memory,
}

fn default_bind_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5730
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_update_log_limit() -> usize {
    500
}

fn default_role_gating() -> bool {
    true
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            database_path: None,
            bind_host: default_bind_host(),
            port: default_port(),
            store: StoreKind::default(),
            logging: LoggingConfig::default(),
            inventory: InventorySettings::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Default for InventorySettings {
    fn default() -> Self {
        Self {
            update_log_limit: default_update_log_limit(),
            role_gating: default_role_gating(),
        }
    }
}

impl FromStr for StoreKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(StoreKind::Sqlite),
            "memory" => Ok(StoreKind::Memory),
            other => Err(Error::Config(format!(
                "Unknown store backend '{}' (expected 'sqlite' or 'memory')",
                other
            ))),
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Sqlite => f.write_str("sqlite"),
            StoreKind::Memory => f.write_str("memory"),
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load configuration, falling back to defaults when no file exists
    ///
    /// An explicit path that does not exist is reported as a warning, not an
    /// error. A file that exists but fails to parse is an error.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        let candidate = match explicit {
            Some(path) if path.exists() => Some(path.to_path_buf()),
            Some(path) => {
                warn!("Config file {} not found, using defaults", path.display());
                None
            }
            None => find_config_file(),
        };

        match candidate {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                Self::load(&path)
            }
            None => {
                info!("No config file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// Database path for a resolved root folder
    pub fn database_path_in(&self, root_folder: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| root_folder.join(DEFAULT_DATABASE_FILE))
    }
}

/// Resolve the root folder following the documented priority order
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// Look for a config file in the per-user then system-wide location
fn find_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("tankwatch").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(unix) {
        let system_config = PathBuf::from("/etc/tankwatch/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("tankwatch"))
        .unwrap_or_else(|| PathBuf::from("./tankwatch_data"))
}
