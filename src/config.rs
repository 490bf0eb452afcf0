//! Configuration module for Folio.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::{FolioError, Result};

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Maximum number of pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> String {
    "data/folio.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Blob storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FilesConfig {
    /// Path to the blob storage directory.
    #[serde(default = "default_storage_path")]
    pub storage_path: String,
    /// Maximum upload size in megabytes.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size_mb: u64,
    /// Base URL prepended to storage paths when building download links.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

fn default_storage_path() -> String {
    "data/files".to_string()
}

fn default_max_upload_size() -> u64 {
    10
}

fn default_public_base_url() -> String {
    "/files".to_string()
}

impl FilesConfig {
    /// Maximum upload size in bytes.
    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_size_mb * 1024 * 1024
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
            max_upload_size_mb: default_max_upload_size(),
            public_base_url: default_public_base_url(),
        }
    }
}

/// Library behaviour configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LibraryConfig {
    /// Maximum folder depth (levels) accepted when creating folders.
    #[serde(default = "default_max_folder_depth")]
    pub max_folder_depth: usize,
    /// Deadline for a whole cascading folder delete, in seconds.
    #[serde(default = "default_cascade_timeout")]
    pub cascade_timeout_secs: u64,
}

fn default_max_folder_depth() -> usize {
    crate::library::MAX_FOLDER_DEPTH
}

fn default_cascade_timeout() -> u64 {
    60
}

impl LibraryConfig {
    /// Cascade deadline as a [`Duration`].
    pub fn cascade_timeout(&self) -> Duration {
        Duration::from_secs(self.cascade_timeout_secs)
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            max_folder_depth: default_max_folder_depth(),
            cascade_timeout_secs: default_cascade_timeout(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/folio.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Blob storage configuration.
    #[serde(default)]
    pub files: FilesConfig,
    /// Library behaviour.
    #[serde(default)]
    pub library: LibraryConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(FolioError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| FolioError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `FOLIO_DB_PATH`: Override the database path
    /// - `FOLIO_STORAGE_PATH`: Override the blob storage directory
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("FOLIO_DB_PATH") {
            if !path.is_empty() {
                self.database.path = path;
            }
        }
        if let Ok(path) = std::env::var("FOLIO_STORAGE_PATH") {
            if !path.is_empty() {
                self.files.storage_path = path;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.database.max_connections == 0 {
            return Err(FolioError::Config(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if self.library.max_folder_depth == 0
            || self.library.max_folder_depth > crate::library::MAX_TRAVERSAL_DEPTH
        {
            return Err(FolioError::Config(format!(
                "library.max_folder_depth must be between 1 and {}",
                crate::library::MAX_TRAVERSAL_DEPTH
            )));
        }
        if self.library.cascade_timeout_secs == 0 {
            return Err(FolioError::Config(
                "library.cascade_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
