//! The offline cache interceptor.
//!
//! A `Worker` owns one versioned cache and handles the three lifecycle
//! events dispatched by the host:
//! - install: seed the cache with the application shell
//! - activate: drop caches of other versions and take control of clients
//! - fetch: cache-first for same-origin GETs, network fallback with refill
//!
//! Storage and network access are injected, so the same worker runs against
//! SQLite and reqwest in the CLI and against in-memory doubles in tests.

mod activate;
mod clients;
mod install;
mod intercept;
mod outcome;
mod refill;
#[cfg(test)]
mod testing;

use color_eyre::{eyre::eyre, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

use crate::cache::{CacheStorage, CacheStore, Request, ResponseSnapshot};
use crate::manifest;
use crate::net::Fetcher;

use clients::Clients;
pub use outcome::{FetchOutcome, ResponseSource};
use refill::RefillTracker;

/// Upper bound on a single network fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Deployment parameters of a worker.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
  /// Tag of the cache this worker owns
  pub version: String,
  /// Base URL; defines the worker origin and resolves relative asset paths
  pub scope: Url,
  /// Core assets, relative to `scope`
  pub assets: Vec<String>,
  pub fetch_timeout: Duration,
}

impl WorkerSettings {
  /// Settings for the compiled-in manifest under the given scope.
  pub fn new(scope: Url) -> Self {
    Self {
      version: manifest::CACHE_VERSION.to_string(),
      scope,
      assets: manifest::CORE_ASSETS.iter().map(|s| s.to_string()).collect(),
      fetch_timeout: DEFAULT_FETCH_TIMEOUT,
    }
  }

  pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
    self.fetch_timeout = fetch_timeout;
    self
  }

  #[allow(dead_code)]
  pub fn with_version(mut self, version: impl Into<String>) -> Self {
    self.version = version.into();
    self
  }
}

/// Lifecycle position of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  Parsed,
  Installing,
  Installed,
  Activating,
  Activated,
  /// Installation failed; the host must start over with a fresh worker
  Redundant,
}

impl std::fmt::Display for WorkerState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let label = match self {
      WorkerState::Parsed => "parsed",
      WorkerState::Installing => "installing",
      WorkerState::Installed => "installed",
      WorkerState::Activating => "activating",
      WorkerState::Activated => "activated",
      WorkerState::Redundant => "redundant",
    };
    f.write_str(label)
  }
}

/// Offline cache interceptor.
pub struct Worker<S: CacheStorage, F: Fetcher> {
  settings: WorkerSettings,
  storage: Arc<S>,
  fetcher: Arc<F>,
  clients: Clients,
  state: Mutex<WorkerState>,
  refills: RefillTracker,
}

impl<S: CacheStorage + 'static, F: Fetcher> Worker<S, F> {
  pub fn new(settings: WorkerSettings, storage: Arc<S>, fetcher: Arc<F>) -> Self {
    Self {
      settings,
      storage,
      fetcher,
      clients: Clients::default(),
      state: Mutex::new(WorkerState::Parsed),
      refills: RefillTracker::default(),
    }
  }

  pub fn version(&self) -> &str {
    &self.settings.version
  }

  pub fn scope(&self) -> &Url {
    &self.settings.scope
  }

  pub fn clients(&self) -> &Clients {
    &self.clients
  }

  pub fn state(&self) -> WorkerState {
    *self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn set_state(&self, state: WorkerState) {
    *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
  }

  /// Resolve a path (relative to the scope) or an absolute URL.
  pub fn resolve(&self, target: &str) -> Result<Url> {
    self
      .settings
      .scope
      .join(target)
      .map_err(|e| eyre!("Invalid target '{}': {}", target, e))
  }

  /// The cache owned by this version. Not created until something is written.
  pub fn active_store(&self) -> CacheStore<S> {
    CacheStore::existing(Arc::clone(&self.storage), &self.settings.version)
  }

  /// Number of cache refills still being written.
  pub fn pending_refills(&self) -> usize {
    self.refills.pending()
  }

  /// Wait for every background cache write to finish.
  ///
  /// The host calls this before shutting down.
  pub async fn settle(&self) {
    self.refills.wait_idle().await
  }

  async fn fetch_with_timeout(&self, request: &Request) -> Result<ResponseSnapshot> {
    let timeout = self.settings.fetch_timeout;
    tokio::time::timeout(timeout, self.fetcher.fetch(request))
      .await
      .map_err(|_| eyre!("Timed out fetching {} after {:?}", request.url, timeout))?
  }
}
