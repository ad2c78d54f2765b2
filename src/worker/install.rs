//! Install handler: seed the cache with the application shell.

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{Worker, WorkerState};
use crate::cache::{CacheStorage, CacheStore, Request, ResponseSnapshot};
use crate::net::Fetcher;

impl<S: CacheStorage + 'static, F: Fetcher> Worker<S, F> {
  /// Handle the install event.
  ///
  /// Fetches every core asset and writes them in a single batch. Any
  /// failure (network error, timeout, non-2xx status) fails the whole
  /// install and nothing is written. On success the worker asks to skip
  /// waiting so it can activate right away.
  pub async fn on_install(&self) -> Result<()> {
    self.set_state(WorkerState::Installing);
    info!("Installing {}", self.settings.version);

    match self.populate().await {
      Ok(count) => {
        self.set_state(WorkerState::Installed);
        self.clients.skip_waiting();
        info!("Installed {} with {} core assets", self.settings.version, count);
        Ok(())
      }
      Err(e) => {
        self.set_state(WorkerState::Redundant);
        warn!("Install of {} failed: {}", self.settings.version, e);
        Err(e)
      }
    }
  }

  async fn populate(&self) -> Result<usize> {
    let store = CacheStore::open(Arc::clone(&self.storage), &self.settings.version)?;

    let requests = self
      .settings
      .assets
      .iter()
      .map(|path| self.resolve(path).map(Request::get))
      .collect::<Result<Vec<_>>>()?;

    let fetches = requests
      .into_iter()
      .map(|request| self.fetch_core_asset(request));

    let entries = try_join_all(fetches).await?;
    let count = entries.len();
    store.put_all(entries)?;

    Ok(count)
  }

  async fn fetch_core_asset(&self, request: Request) -> Result<(Request, ResponseSnapshot)> {
    let response = self.fetch_with_timeout(&request).await?;
    if !response.is_success() {
      return Err(eyre!(
        "Core asset {} returned {}",
        request.url,
        response.status()
      ));
    }
    debug!("Fetched core asset {}", request.url);
    Ok((request, response))
  }
}
