//! Full configuration validation.
//!
//! Validates numeric ranges and the ordering constraints between timers.
//! Each domain has its own function; this orchestrator calls them all and
//! collects errors into a single `ConfigError`.

mod helpers;
mod timing;


use crate::schema::CalmConfig;
use calm_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &CalmConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    timing::validate_presence(&mut errors, config);
    timing::validate_store(&mut errors, config);
    timing::validate_server(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}
