//! SQLite-backed cache storage for intercepted responses.
//!
//! - Versioned partitions keyed `{name}:{version}:{partition}`
//! - One entry per normalized key, with overflow eviction by insertion order
//! - Automatic schema migrations
//! - WAL mode for concurrent access
//! - Persisted worker lifecycle state

pub mod connection;
pub mod entries;
pub mod hash;
pub mod key;
pub mod migrations;
pub mod partitions;
pub mod state;
pub mod store;
pub mod version;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::EntryMeta;
pub use key::{CacheKey, KeyNormalizer, VolatileParam, default_volatile_params};
pub use partitions::PartitionInfo;
pub use state::StoredWorkerState;
pub use store::{CacheStore, Partition};
pub use version::CacheVersion;
