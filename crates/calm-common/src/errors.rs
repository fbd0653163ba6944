use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Failures reported by a realtime store backend.
///
/// Presence components log and drop these; only the CLI surfaces them.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid store path: {0}")]
    InvalidPath(String),

    #[error("store disconnected")]
    Disconnected,

    #[error("store rejected request: {0}")]
    Rejected(String),

    #[error("store request timed out after {0}s")]
    Timeout(u64),
}

#[derive(Debug, thiserror::Error)]
pub enum CalmError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::FileNotFound(PathBuf::from("/tmp/missing.toml"));
        assert_eq!(err.to_string(), "config file not found: /tmp/missing.toml");

        let err = ConfigError::ParseError("unexpected token".into());
        assert_eq!(err.to_string(), "config parse error: unexpected token");

        let err = ConfigError::ValidationError("presence.stale_threshold_ms too large".into());
        assert_eq!(
            err.to_string(),
            "config validation error: presence.stale_threshold_ms too large"
        );
    }

    #[test]
    fn store_error_display() {
        let err = StoreError::InvalidPath("sessions/.info".into());
        assert_eq!(err.to_string(), "invalid store path: sessions/.info");

        assert_eq!(StoreError::Disconnected.to_string(), "store disconnected");
        assert_eq!(
            StoreError::Timeout(10).to_string(),
            "store request timed out after 10s"
        );
        assert_eq!(
            StoreError::Rejected("permission denied".into()).to_string(),
            "store rejected request: permission denied"
        );
    }

    #[test]
    fn calm_error_from_config() {
        let config_err = ConfigError::ParseError("bad toml".into());
        let calm_err: CalmError = config_err.into();
        assert!(matches!(calm_err, CalmError::Config(_)));
        assert!(calm_err.to_string().contains("bad toml"));
    }

    #[test]
    fn calm_error_from_store() {
        let calm_err: CalmError = StoreError::Disconnected.into();
        assert!(matches!(calm_err, CalmError::Store(_)));
        assert_eq!(calm_err.to_string(), "store disconnected");
    }

    #[test]
    fn calm_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let calm_err: CalmError = io_err.into();
        assert!(matches!(calm_err, CalmError::Io(_)));
        assert!(calm_err.to_string().contains("file missing"));
    }
}
