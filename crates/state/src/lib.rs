//! Durable and semi-durable gateway state: router passwords, mudlist/
//! chanlist synchronization, response caches, counters, and the on-disk
//! snapshot format that survives a restart.
//!
//! `GatewayState` is the single owner of all of it — one task serializes
//! mutation while reads go through `parking_lot::RwLock`-guarded sub-stores.

pub mod cache;
pub mod list_sync;
pub mod persist;
pub mod stats;
pub mod store;

pub use cache::{TtlCache, UserCache};
pub use list_sync::{lpc_to_json, ListSync};
pub use persist::{persist_path, PersistedState};
pub use stats::{Stats, StatsSnapshot};
pub use store::GatewayState;
