pub mod identity;
pub mod protocol;
pub mod realtime;
pub mod reaper;
pub mod record;
pub mod stats;
pub mod store;
pub mod tracker;

pub use identity::SessionIdentity;
pub use protocol::{ClientFrame, ServerFrame};
pub use realtime::{RemoteStore, RemoteStoreConfig};
pub use reaper::{find_stale, ReapReport, SessionReaper};
pub use record::{DailyStat, SessionRecord, SessionStatus};
pub use stats::{count_online, DailyStatsAggregator};
pub use store::{DisconnectAction, MemoryClient, MemoryStore, RealtimeStore, Subscription};
pub use tracker::{PresenceHandle, PresenceSettings, PresenceTracker};
