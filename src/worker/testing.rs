//! Test doubles for the worker: a scripted network and a storage that
//! records every call.

use color_eyre::{eyre::eyre, Result};
use reqwest::StatusCode;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

use super::{Worker, WorkerSettings};
use crate::cache::{CacheStorage, CachedResponse, MemoryStorage, Request, RequestKey, ResponseSnapshot};
use crate::manifest::CORE_ASSETS;
use crate::net::Fetcher;

pub const SCOPE: &str = "https://app.test/";

/// Worker over the compiled-in manifest, scoped to `SCOPE`.
pub fn shell_worker<S: CacheStorage + 'static>(
  storage: Arc<S>,
  fetcher: Arc<MockFetcher>,
) -> Worker<S, MockFetcher> {
  let settings = WorkerSettings::new(Url::parse(SCOPE).unwrap());
  Worker::new(settings, storage, fetcher)
}

pub fn request(path: &str) -> Request {
  Request::get(Url::parse(SCOPE).unwrap().join(path).unwrap())
}

/// Network that answers from a route table and counts calls.
/// Unknown URLs get a 404.
#[derive(Default)]
pub struct MockFetcher {
  routes: Mutex<HashMap<String, (StatusCode, Vec<u8>)>>,
  calls: AtomicUsize,
  offline: AtomicBool,
  delay: Mutex<Option<Duration>>,
}

impl MockFetcher {
  pub fn new() -> Self {
    Self::default()
  }

  /// Serves every core asset with a 200.
  pub fn serving_shell() -> Self {
    let fetcher = Self::new();
    for path in CORE_ASSETS {
      fetcher.route(path, StatusCode::OK, format!("asset {}", path));
    }
    fetcher
  }

  /// Add or replace a route. `path` is resolved against `SCOPE`.
  pub fn route(&self, path: &str, status: StatusCode, body: impl Into<Vec<u8>>) {
    let url = Url::parse(SCOPE).unwrap().join(path).unwrap();
    self
      .routes
      .lock()
      .unwrap()
      .insert(url.to_string(), (status, body.into()));
  }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  pub fn set_delay(&self, delay: Duration) {
    *self.delay.lock().unwrap() = Some(delay);
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

impl Fetcher for MockFetcher {
  async fn fetch(&self, request: &Request) -> Result<ResponseSnapshot> {
    self.calls.fetch_add(1, Ordering::SeqCst);

    let delay = *self.delay.lock().unwrap();
    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }

    if self.offline.load(Ordering::SeqCst) {
      return Err(eyre!("Network unreachable: {}", request.url));
    }

    let routes = self.routes.lock().unwrap();
    let response = match routes.get(request.url.as_str()) {
      Some((status, body)) => ResponseSnapshot::new(
        *status,
        vec![(
          "content-type".to_string(),
          "application/octet-stream".to_string(),
        )],
        body.clone(),
      ),
      None => ResponseSnapshot::new(StatusCode::NOT_FOUND, vec![], "not found"),
    };
    Ok(response)
  }
}

/// In-memory storage that counts calls and can be told to fail deletions.
#[derive(Default)]
pub struct RecordingStorage {
  inner: MemoryStorage,
  calls: AtomicUsize,
  failing_deletes: Mutex<HashSet<String>>,
  failing_writes: AtomicBool,
}

impl RecordingStorage {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn fail_delete(&self, name: &str) {
    self.failing_deletes.lock().unwrap().insert(name.to_string());
  }

  /// Make every open and put fail.
  pub fn fail_writes(&self) {
    self.failing_writes.store(true, Ordering::SeqCst);
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  fn check_write(&self, name: &str) -> Result<()> {
    if self.failing_writes.load(Ordering::SeqCst) {
      return Err(eyre!("Disk full, cannot write to {}", name));
    }
    Ok(())
  }

  fn record(&self) {
    self.calls.fetch_add(1, Ordering::SeqCst);
  }
}

impl CacheStorage for RecordingStorage {
  fn open(&self, name: &str) -> Result<()> {
    self.record();
    self.check_write(name)?;
    self.inner.open(name)
  }

  fn has(&self, name: &str) -> Result<bool> {
    self.record();
    self.inner.has(name)
  }

  fn keys(&self) -> Result<Vec<String>> {
    self.record();
    self.inner.keys()
  }

  fn delete(&self, name: &str) -> Result<bool> {
    self.record();
    if self.failing_deletes.lock().unwrap().contains(name) {
      return Err(eyre!("Storage busy, cannot delete {}", name));
    }
    self.inner.delete(name)
  }

  fn lookup(&self, name: &str, key: &RequestKey) -> Result<Option<CachedResponse>> {
    self.record();
    self.inner.lookup(name, key)
  }

  fn put(&self, name: &str, key: &RequestKey, response: &ResponseSnapshot) -> Result<()> {
    self.record();
    self.check_write(name)?;
    self.inner.put(name, key, response)
  }

  fn put_all(&self, name: &str, entries: &[(RequestKey, ResponseSnapshot)]) -> Result<()> {
    self.record();
    self.check_write(name)?;
    self.inner.put_all(name, entries)
  }

  fn len(&self, name: &str) -> Result<usize> {
    self.record();
    self.inner.len(name)
  }
}
