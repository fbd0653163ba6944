//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# Calm Configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[presence]
# heartbeat_interval_ms = 3000   # 500-60000, must be below stale_threshold_ms
# stale_threshold_ms = 5000      # 1000-300000, must be below reaper_interval_ms
# reaper_interval_ms = 10000     # 1000-600000

[store]
# url = "ws://127.0.0.1:7410/ws"
# reconnect_delay_secs = 1       # 1-60
# max_reconnect_delay_secs = 30  # 1-600
# heartbeat_interval_secs = 10   # 1-300
# request_timeout_secs = 10      # 1-120

[server]
# bind = "127.0.0.1"
# port = 7410
# idle_timeout_secs = 30         # must exceed store.heartbeat_interval_secs

[identity]
# path = "/path/to/session_id"

[logging]
# level = "info"                 # trace, debug, info, warn, error
"##
    .to_string()
}
