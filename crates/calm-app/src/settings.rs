//! Map loaded config onto the presence crate's runtime types.

use std::path::PathBuf;

use calm_common::ConfigError;
use calm_config::CalmConfig;
use calm_presence::{PresenceSettings, RemoteStoreConfig};

/// Apply CLI overrides and re-validate.
pub fn apply_overrides(
    mut config: CalmConfig,
    store_url: Option<&str>,
) -> Result<CalmConfig, ConfigError> {
    if let Some(url) = store_url {
        tracing::info!(url = %url.split('?').next().unwrap_or(""), "Using store URL override");
        config.store.url = url.to_string();
        calm_config::validation::validate(&config)?;
    }
    Ok(config)
}

pub fn presence_settings(config: &CalmConfig) -> PresenceSettings {
    PresenceSettings {
        heartbeat_interval: config.presence.heartbeat_interval(),
        reaper_interval: config.presence.reaper_interval(),
        stale_threshold: config.presence.stale_threshold(),
    }
}

pub fn remote_store_config(config: &CalmConfig) -> RemoteStoreConfig {
    RemoteStoreConfig {
        url: config.store.url.clone(),
        heartbeat_interval_secs: config.store.heartbeat_interval_secs,
        reconnect_delay_secs: config.store.reconnect_delay_secs,
        max_reconnect_delay_secs: config.store.max_reconnect_delay_secs,
        request_timeout_secs: config.store.request_timeout_secs,
    }
}

pub fn identity_path(config: &CalmConfig) -> PathBuf {
    config
        .identity
        .path
        .clone()
        .unwrap_or_else(calm_config::toml_loader::default_identity_path)
}
