use std::path::PathBuf;
use std::sync::Arc;

use calm_common::{Clock, SessionId, SystemClock};
use tracing::{debug, info, warn};

/// Stable per-profile session identifier, persisted to a small file.
///
/// The first call generates `<epoch-millis>-<base36>` and writes it; later
/// calls (including from later processes) return the stored value.
pub struct SessionIdentity {
    path: PathBuf,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SessionIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionIdentity")
            .field("path", &self.path)
            .finish()
    }
}

impl SessionIdentity {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_clock(path, Arc::new(SystemClock))
    }

    pub fn with_clock(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            clock,
        }
    }

    /// Return the persisted id, creating and persisting one if needed.
    ///
    /// Storage failures are logged; the caller still gets a usable (but
    /// unpersisted) id.
    pub fn get_or_create_session_id(&self) -> SessionId {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => match SessionId::parse(&raw) {
                Some(id) => {
                    debug!(path = %self.path.display(), session = %id, "Reusing session id");
                    return id;
                }
                None => {
                    warn!(path = %self.path.display(), "Stored session id is invalid, regenerating");
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read session id");
            }
        }

        let id = SessionId::generate(self.clock.now_millis());
        if let Err(e) = self.persist(&id) {
            warn!(path = %self.path.display(), error = %e, "Failed to persist session id");
        } else {
            info!(path = %self.path.display(), session = %id, "Created session id");
        }
        id
    }

    fn persist(&self, id: &SessionId) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calm_common::ManualClock;
    use chrono::NaiveDate;

    fn clock(millis: i64) -> Arc<dyn Clock> {
        Arc::new(ManualClock::new(
            millis,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        ))
    }

    #[test]
    fn second_call_returns_same_id() {
        let dir = tempfile::tempdir().unwrap();
        let identity = SessionIdentity::new(dir.path().join("session_id"));
        let first = identity.get_or_create_session_id();
        let second = identity.get_or_create_session_id();
        assert_eq!(first, second);
    }

    #[test]
    fn id_survives_a_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session_id");
        let first = SessionIdentity::new(&path).get_or_create_session_id();
        let second = SessionIdentity::new(&path).get_or_create_session_id();
        assert_eq!(first, second);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), first.as_str());
    }

    #[test]
    fn generated_id_uses_clock_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let identity = SessionIdentity::with_clock(dir.path().join("id"), clock(1_704_067_200_000));
        let id = identity.get_or_create_session_id();
        assert!(id.as_str().starts_with("1704067200000-"));
    }

    #[test]
    fn existing_file_is_honored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id");
        std::fs::write(&path, "123-abc\n").unwrap();
        let id = SessionIdentity::new(&path).get_or_create_session_id();
        assert_eq!(id.as_str(), "123-abc");
    }

    #[test]
    fn invalid_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id");
        std::fs::write(&path, "bad/id").unwrap();
        let id = SessionIdentity::with_clock(&path, clock(5)).get_or_create_session_id();
        assert!(id.as_str().starts_with("5-"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), id.as_str());
    }

    #[test]
    fn unwritable_location_still_yields_an_id() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        // Parent is a regular file, so the directory cannot be created.
        let identity = SessionIdentity::new(blocker.join("session_id"));
        let id = identity.get_or_create_session_id();
        assert!(!id.as_str().is_empty());
    }
}
