//! Configuration module for docstore.

use serde::Deserialize;
use std::path::Path;

use crate::{DocstoreError, Result};

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/docstore.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// File storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FilesConfig {
    /// Path to the file storage directory.
    #[serde(default = "default_storage_path")]
    pub storage_path: String,
    /// Retention policy applied at shutdown ("discard" purges, anything else retains).
    #[serde(default = "default_policy")]
    pub policy: String,
    /// Maximum upload size in megabytes.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size_mb: u64,
}

fn default_storage_path() -> String {
    "data/files".to_string()
}

fn default_policy() -> String {
    "retain".to_string()
}

fn default_max_upload_size() -> u64 {
    10
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
            policy: default_policy(),
            max_upload_size_mb: default_max_upload_size(),
        }
    }
}

/// Worker pool configuration for storage operations.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    /// Number of workers kept alive for the process lifetime.
    #[serde(default = "default_core_pool_size")]
    pub core_pool_size: usize,
    /// Upper bound on concurrently running workers.
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: usize,
    /// Number of accepted-but-not-yet-running operations.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_core_pool_size() -> usize {
    2
}

fn default_max_pool_size() -> usize {
    5
}

fn default_queue_capacity() -> usize {
    500
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            core_pool_size: default_core_pool_size(),
            max_pool_size: default_max_pool_size(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl ExecutorConfig {
    /// Create an executor configuration with explicit sizes.
    pub fn new(core_pool_size: usize, max_pool_size: usize, queue_capacity: usize) -> Self {
        Self {
            core_pool_size,
            max_pool_size,
            queue_capacity,
        }
    }

    /// Check that the pool sizes describe a usable pool.
    pub fn validate(&self) -> Result<()> {
        if self.core_pool_size == 0 {
            return Err(DocstoreError::Config(
                "executor.core_pool_size must be at least 1".to_string(),
            ));
        }
        if self.max_pool_size < self.core_pool_size {
            return Err(DocstoreError::Config(format!(
                "executor.max_pool_size ({}) must not be smaller than core_pool_size ({})",
                self.max_pool_size, self.core_pool_size
            )));
        }
        if self.queue_capacity == 0 {
            return Err(DocstoreError::Config(
                "executor.queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
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
    "logs/docstore.log".to_string()
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
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// File storage configuration.
    #[serde(default)]
    pub files: FilesConfig,
    /// Worker pool configuration.
    #[serde(default)]
    pub executor: ExecutorConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(DocstoreError::Io)?;
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
        toml::from_str(s).map_err(|e| DocstoreError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `DOCSTORE_STORAGE_PATH`: Override the storage root
    /// - `DOCSTORE_FILE_POLICY`: Override the retention policy
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("DOCSTORE_STORAGE_PATH") {
            if !path.is_empty() {
                self.files.storage_path = path;
            }
        }
        if let Ok(policy) = std::env::var("DOCSTORE_FILE_POLICY") {
            if !policy.is_empty() {
                self.files.policy = policy;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.files.storage_path.trim().is_empty() {
            return Err(DocstoreError::Config(
                "files.storage_path must not be empty".to_string(),
            ));
        }
        self.executor.validate()
    }

    /// Maximum upload size in bytes.
    pub fn max_upload_size_bytes(&self) -> u64 {
        self.files.max_upload_size_mb.saturating_mul(1024 * 1024)
    }
}
