//! Named response caches for offline support.
//!
//! This module provides the storage side of the offline cache:
//! - Request identities (method + URL) and immutable response snapshots
//! - A `CacheStorage` backend trait holding any number of named caches
//! - SQLite (persistent) and in-memory backends
//! - `CacheStore`, a handle on one named cache

mod storage;
mod store;
mod types;

pub use storage::{CacheStorage, MemoryStorage, SqliteStorage};
pub use store::CacheStore;
pub use types::{CachedResponse, Request, RequestKey, ResponseSnapshot};
