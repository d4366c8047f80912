use std::path::Path;

use config::{Config, File, FileFormat};
use thiserror::Error;

use crate::config::{
    models::GatewayConfig,
    validation::{GatewayConfigValidator, ValidationError},
};

/// Why a configuration file could not be turned into a [`GatewayConfig`]
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConfigLoadError {
    #[error("Configuration file not found: {path}")]
    NotFound { path: String },

    #[error("Failed to read configuration from {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: config::ConfigError,
    },

    #[error("Invalid configuration in {path}: {source}")]
    Invalid {
        path: String,
        #[source]
        source: ValidationError,
    },
}

fn file_format(path: &Path) -> FileFormat {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("toml") => FileFormat::Toml,
        Some("ini") => FileFormat::Ini,
        _ => FileFormat::Json, // Default to JSON
    }
}

/// Load and validate configuration from a file using the config crate.
/// Supports JSON (default), YAML and TOML by extension.
pub fn load_config(config_path: impl AsRef<Path>) -> Result<GatewayConfig, ConfigLoadError> {
    let config_path = config_path.as_ref();
    let display = config_path.display().to_string();

    if !config_path.exists() {
        return Err(ConfigLoadError::NotFound { path: display });
    }

    let settings = Config::builder()
        .add_source(File::from(config_path).format(file_format(config_path)))
        .build()
        .map_err(|source| ConfigLoadError::Read {
            path: display.clone(),
            source,
        })?;

    let gateway_config: GatewayConfig =
        settings
            .try_deserialize()
            .map_err(|source| ConfigLoadError::Read {
                path: display.clone(),
                source,
            })?;

    GatewayConfigValidator::validate(&gateway_config).map_err(|source| {
        ConfigLoadError::Invalid {
            path: display,
            source,
        }
    })?;

    Ok(gateway_config)
}

/// Load configuration, falling back to [`GatewayConfig::default`] when the
/// file is missing, unreadable or invalid. The failure is logged, never
/// propagated.
pub fn load_config_or_default(config_path: impl AsRef<Path>) -> GatewayConfig {
    match load_config(config_path) {
        Ok(config) => {
            tracing::info!(
                routes = config.routes.len(),
                services = config.services.len(),
                "Loaded gateway configuration"
            );
            config
        }
        Err(ConfigLoadError::NotFound { path }) => {
            tracing::info!("No configuration file found at {path}, using defaults");
            GatewayConfig::default()
        }
        Err(e) => {
            tracing::error!("Error loading config: {e}. Falling back to defaults");
            GatewayConfig::default()
        }
    }
}
