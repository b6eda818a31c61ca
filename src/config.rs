//! Configuration management for the registry
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (avro-registry.toml)
//! - Environment variables (AVRO_REGISTRY__*)
//!
//! ## Example config file (avro-registry.toml):
//! ```toml
//! [registry]
//! schema_evolution = "resolve"
//!
//! [loader]
//! extension = "avsc"
//! recursive = true
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// Registry settings
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Schema file loading settings
    #[serde(default)]
    pub loader: LoaderConfig,
}

/// Registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Evolution policy: "strict" or "resolve". Kept as text so an unknown
    /// value is reported when the registry is built.
    #[serde(default = "default_schema_evolution")]
    pub schema_evolution: String,
}

/// Schema file loading configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// File extension of schema files
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Descend into subdirectories
    #[serde(default = "default_true")]
    pub recursive: bool,
}

// Default value functions
fn default_schema_evolution() -> String {
    "strict".to_string()
}

fn default_extension() -> String {
    "avsc".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            schema_evolution: default_schema_evolution(),
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            extension: default_extension(),
            recursive: true,
        }
    }
}

impl RegistrySettings {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, layering a specific file over the defaults
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = [
            "avro-registry.toml",
            ".avro-registry.toml",
            "config/avro-registry.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "avro-registry") {
            let xdg_config = config_dir.config_dir().join("avro-registry.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // AVRO_REGISTRY__REGISTRY__SCHEMA_EVOLUTION=resolve
        builder = builder.add_source(
            Environment::with_prefix("AVRO_REGISTRY")
                .prefix_separator("__")
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
}
