//! TOML-based configuration for strata.
//!
//! Supports a config file (strata.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [view]
//! root_key_alias = "rootKey"
//! key_delimiter = "-"
//! strict_write_back = false
//! default_limit = 500
//!
//! [connection]
//! driver = "sqlite"
//! path = "${STRATA_DATA}/app.db"
//! ```

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::sql::Dialect;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Unsupported driver: {0}")]
    UnsupportedDriver(String),

    #[error("No database path configured")]
    MissingDatabasePath,
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// View compilation and write-back behaviour.
    pub view: ViewSettings,

    /// Database used by the CLI.
    pub connection: ConnectionSettings,
}

/// View compilation and write-back settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ViewSettings {
    /// Output alias of the synthetic root key column.
    pub root_key_alias: String,

    /// Delimiter joining composite key columns.
    pub key_delimiter: String,

    /// Fail the flush when a join mapping cannot be resolved during write-back.
    pub strict_write_back: bool,

    /// LIMIT applied when the caller gives none.
    pub default_limit: Option<u64>,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            root_key_alias: "rootKey".to_string(),
            key_delimiter: "-".to_string(),
            strict_write_back: false,
            default_limit: None,
        }
    }
}

/// Connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Database driver. Only `sqlite` is bundled.
    pub driver: String,

    /// Database file (supports ${ENV_VAR} expansion); `:memory:` for in-memory.
    pub path: Option<String>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            driver: "sqlite".to_string(),
            path: None,
        }
    }
}

impl ConnectionSettings {
    /// SQL dialect of the configured driver.
    pub fn dialect(&self) -> Result<Dialect, SettingsError> {
        match self.driver.to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            other => Err(SettingsError::UnsupportedDriver(other.to_string())),
        }
    }

    /// Get the database path with environment variables expanded.
    pub fn resolved_path(&self) -> Result<String, SettingsError> {
        let path = self
            .path
            .as_deref()
            .ok_or(SettingsError::MissingDatabasePath)?;
        expand_env_vars(path)
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `STRATA_CONFIG`
    /// 2. `./strata.toml`
    /// 3. `<config dir>/strata/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("STRATA_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("strata.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("strata").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }
}

static ENV_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .unwrap_or_else(|e| panic!("invalid env var pattern: {}", e))
});

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax; a lone `$` is kept.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut missing = None;
    let expanded = ENV_VAR.replace_all(s, |caps: &Captures| {
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        match env::var(name) {
            Ok(value) => value,
            Err(_) => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(name) => Err(SettingsError::MissingEnvVar(name)),
        None => Ok(expanded.into_owned()),
    }
}
