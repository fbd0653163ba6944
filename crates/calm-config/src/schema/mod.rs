//! Configuration schema types for calm.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod presence;
mod store;
mod system;

pub use presence::*;
pub use store::*;
pub use system::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CalmConfig {
    pub presence: PresenceConfig,
    pub store: StoreConfig,
    pub server: ServerConfig,
    pub identity: IdentityConfig,
    pub logging: LoggingConfig,
}
