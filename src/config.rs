//! Configuration management
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (custom-api.toml)
//! - Environment variables (CUSTOM_API__*)
//!
//! ## Example config file (custom-api.toml):
//! ```toml
//! [store]
//! backend = "file"
//! path = "./custom-api-data"
//!
//! [validation]
//! strict = false
//!
//! [logging]
//! filter = "custom_api_schemas=info"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::validator::ValidationOptions;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiSchemaConfig {
    /// Storage settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Validation settings
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which store backend to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    #[default]
    File,
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Root directory of the file store
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

/// Validation configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ValidationConfig {
    /// Run strict checks (duplicate ids, attributes, cycles, relationship names)
    #[serde(default)]
    pub strict: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive used when RUST_LOG is unset
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./custom-api-data")
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::File,
            path: default_store_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

impl ValidationConfig {
    pub fn options(&self) -> ValidationOptions {
        ValidationOptions {
            strict: self.strict,
        }
    }
}

impl ApiSchemaConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, optionally adding a required file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = [
            "custom-api.toml",
            ".custom-api.toml",
            "config/custom-api.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(dirs) = directories::ProjectDirs::from("dev", "playground", "custom-api") {
            let xdg_config = dirs.config_dir().join("custom-api.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("CUSTOM_API")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Store path with relative paths resolved against the working directory
    pub fn store_path(&self) -> PathBuf {
        if self.store.path.is_absolute() {
            self.store.path.clone()
        } else {
            std::env::current_dir()
                .unwrap_or_default()
                .join(&self.store.path)
        }
    }
}
