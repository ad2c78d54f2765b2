//! Activate handler: single-version cache hygiene and client takeover.

use color_eyre::eyre::eyre;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};

use super::{Worker, WorkerState};
use crate::cache::CacheStorage;
use crate::net::Fetcher;

/// What an activation cleaned up.
#[derive(Debug, Default)]
pub struct ActivationReport {
  /// Stale caches that were deleted
  pub deleted: Vec<String>,
  /// Stale caches that could not be deleted, with the error
  pub failed: Vec<(String, String)>,
}

impl<S: CacheStorage + 'static, F: Fetcher> Worker<S, F> {
  /// Handle the activate event.
  ///
  /// Every cache whose tag differs from this version is deleted. Deletions
  /// run concurrently and independently: a failure is logged and reported,
  /// and none of them blocks the others or the claim of open clients that
  /// follows. A worker whose install failed does nothing.
  pub async fn on_activate(&self) -> ActivationReport {
    if self.state() == WorkerState::Redundant {
      warn!(
        "Not activating {}: install failed, keeping existing caches",
        self.settings.version
      );
      return ActivationReport::default();
    }
    self.set_state(WorkerState::Activating);

    match self.storage.has(&self.settings.version) {
      Ok(true) => {}
      Ok(false) => warn!("Activating {} without an installed cache", self.settings.version),
      Err(e) => warn!("Could not check cache {}: {}", self.settings.version, e),
    }

    let stale: Vec<String> = match self.storage.keys() {
      Ok(names) => names
        .into_iter()
        .filter(|name| *name != self.settings.version)
        .collect(),
      Err(e) => {
        warn!("Could not enumerate caches, skipping cleanup: {}", e);
        Vec::new()
      }
    };

    // Storage calls block, so each deletion runs on the blocking pool
    let tasks = stale.iter().map(|name| {
      let storage = Arc::clone(&self.storage);
      let name = name.clone();
      tokio::task::spawn_blocking(move || storage.delete(&name))
    });
    let results = join_all(tasks).await;

    let mut report = ActivationReport::default();
    for (name, joined) in stale.into_iter().zip(results) {
      let result = joined
        .map_err(|e| eyre!("Deletion task failed: {}", e))
        .and_then(|deleted| deleted);
      match result {
        Ok(_) => {
          info!("Deleted stale cache {}", name);
          report.deleted.push(name);
        }
        Err(e) => {
          warn!("Failed to delete stale cache {}: {}", name, e);
          report.failed.push((name, e.to_string()));
        }
      }
    }

    self.clients.claim();
    self.set_state(WorkerState::Activated);
    info!("Activated {}", self.settings.version);

    report
  }
}
