//! Fetch handler: cache-first with network fallback and opportunistic refill.

use reqwest::Method;
use std::sync::Arc;
use tracing::{debug, warn};

use super::outcome::{FetchOutcome, Served};
use super::refill::RefillHandle;
use super::{Worker, WorkerState};
use crate::cache::{CacheStorage, CacheStore, Request, ResponseSnapshot};
use crate::net::Fetcher;

impl<S: CacheStorage + 'static, F: Fetcher> Worker<S, F> {
  /// Whether the worker handles this request at all: GET to its own origin.
  pub fn is_eligible(&self, request: &Request) -> bool {
    request.method == Method::GET && request.url.origin() == self.settings.scope.origin()
  }

  /// Handle a fetch event.
  ///
  /// 1. Ineligible requests, and every request reaching a worker whose
  ///    install failed, pass through untouched, without touching storage
  /// 2. A cached response is returned as is, without any network request
  /// 3. On a miss the network is asked; a successful response is returned
  ///    and a copy is written to the cache in the background
  /// 4. If the network fails, an explicit 503 "unavailable" response is returned
  pub async fn on_fetch(&self, request: Request) -> FetchOutcome {
    if self.state() == WorkerState::Redundant {
      debug!("Passthrough {} {} (worker is redundant)", request.method, request.url);
      return FetchOutcome::Passthrough;
    }
    if !self.is_eligible(&request) {
      debug!("Passthrough {} {}", request.method, request.url);
      return FetchOutcome::Passthrough;
    }

    match self.active_store().lookup(&request) {
      Ok(Some(cached)) => {
        debug!("Cache hit {}", request.url);
        return FetchOutcome::Respond(Served::from_cache(cached));
      }
      Ok(None) => debug!("Cache miss {}", request.url),
      Err(e) => warn!("Cache lookup failed for {}, treating as miss: {}", request.url, e),
    }

    match self.fetch_with_timeout(&request).await {
      Ok(response) => {
        let refill = if response.is_success() {
          let copy = response.duplicate();
          Some(self.refill(request, copy))
        } else {
          debug!("Not caching {} ({})", request.url, response.status());
          None
        };
        FetchOutcome::Respond(Served::from_network(response, refill))
      }
      Err(e) => {
        warn!("Network fetch failed for {}: {}", request.url, e);
        FetchOutcome::Respond(Served::unavailable())
      }
    }
  }

  /// Write a response into the active cache without blocking the caller.
  /// Failures are logged and otherwise ignored.
  fn refill(&self, request: Request, response: ResponseSnapshot) -> RefillHandle {
    let storage = Arc::clone(&self.storage);
    let version = self.settings.version.clone();

    self.refills.spawn(async move {
      let result = CacheStore::open(storage, &version).and_then(|store| store.put(&request, &response));
      match result {
        Ok(()) => {
          debug!("Refilled {} into {}", request.url, version);
          true
        }
        Err(e) => {
          warn!("Failed to refill {}: {}", request.url, e);
          false
        }
      }
    })
  }
}
