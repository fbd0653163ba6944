//! Calm configuration system.
//!
//! TOML-based configuration for the presence tracker, the store client,
//! and the store server. All sections use `serde(default)` so a partial
//! file (or none at all) works out of the box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use calm_config::{load_config, config_to_json};
//!
//! let config = load_config().expect("failed to load config");
//! println!("{}", config_to_json(&config));
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{CalmConfig, CONFIG_SCHEMA_VERSION};

use std::path::Path;

use calm_common::ConfigError;

/// Load config from the platform default path and validate it.
///
/// Creates a commented default file if none exists.
pub fn load_config() -> Result<CalmConfig, ConfigError> {
    let config = toml_loader::load_default()?;
    validation::validate(&config)?;
    Ok(config)
}

/// Load config from an explicit path when given, else the default path.
///
/// Unlike [`load_config`], a missing explicit file is an error rather than
/// a trigger to write a template.
pub fn load_config_from(path: Option<&Path>) -> Result<CalmConfig, ConfigError> {
    let config = match path {
        Some(path) => {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.to_path_buf()));
            }
            toml_loader::load_from_path(path)?
        }
        None => toml_loader::load_default()?,
    };
    validation::validate(&config)?;
    Ok(config)
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &CalmConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}
