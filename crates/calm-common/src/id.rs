use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of the random suffix appended to generated session ids.
pub const SUFFIX_LEN: usize = 11;

/// Random lowercase base-36 string of `len` characters.
pub fn base36_suffix(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}

/// Identifier of one session record, stored under `sessions/<id>`.
///
/// Generated ids have the form `<epoch-millis>-<base36 suffix>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate(now_millis: i64) -> Self {
        Self(format!("{now_millis}-{}", base36_suffix(SUFFIX_LEN)))
    }

    /// Wrap an existing id, e.g. one read back from disk.
    ///
    /// Returns `None` for empty strings or ids that cannot be used as a
    /// single store path segment.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty()
            || raw
                .chars()
                .any(|c| matches!(c, '/' | '.' | '#' | '$' | '[' | ']') || c.is_control())
        {
            return None;
        }
        Some(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
