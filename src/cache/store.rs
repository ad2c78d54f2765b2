//! Handle on a single named cache.

use color_eyre::Result;
use std::sync::Arc;

use super::storage::CacheStorage;
use super::types::{CachedResponse, Request, ResponseSnapshot};

/// A named cache inside a storage backend.
///
/// Cheap to clone; all clones share the same backend.
pub struct CacheStore<S: CacheStorage> {
  name: String,
  storage: Arc<S>,
}

impl<S: CacheStorage> CacheStore<S> {
  /// Open the named cache, creating it if absent.
  pub fn open(storage: Arc<S>, name: &str) -> Result<Self> {
    storage.open(name)?;
    Ok(Self::existing(storage, name))
  }

  /// Refer to the named cache without creating it.
  ///
  /// Lookups on a cache that does not exist are misses.
  pub fn existing(storage: Arc<S>, name: &str) -> Self {
    Self {
      name: name.to_string(),
      storage,
    }
  }

  /// Find the stored response for a request.
  pub fn lookup(&self, request: &Request) -> Result<Option<CachedResponse>> {
    self.storage.lookup(&self.name, &request.key())
  }

  /// Store a response under the request's identity.
  pub fn put(&self, request: &Request, response: &ResponseSnapshot) -> Result<()> {
    self.storage.put(&self.name, &request.key(), response)
  }

  /// Store a batch of responses; all or nothing.
  pub fn put_all(&self, entries: Vec<(Request, ResponseSnapshot)>) -> Result<()> {
    let entries: Vec<_> = entries
      .into_iter()
      .map(|(request, response)| (request.key(), response))
      .collect();
    self.storage.put_all(&self.name, &entries)
  }

  pub fn len(&self) -> Result<usize> {
    self.storage.len(&self.name)
  }
}

impl<S: CacheStorage> Clone for CacheStore<S> {
  fn clone(&self) -> Self {
    Self {
      name: self.name.clone(),
      storage: Arc::clone(&self.storage),
    }
  }
}
