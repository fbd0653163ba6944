pub mod clock;
pub mod errors;
pub mod id;

pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::{CalmError, ConfigError, StoreError};
pub use id::{base36_suffix, SessionId};

pub type Result<T> = std::result::Result<T, CalmError>;
