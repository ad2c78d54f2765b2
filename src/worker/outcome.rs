//! What a fetch event resolves to.

use chrono::{DateTime, Utc};

use super::refill::RefillHandle;
use crate::cache::{CachedResponse, ResponseSnapshot};

/// Result of dispatching a fetch event to the worker.
#[derive(Debug)]
pub enum FetchOutcome {
  /// The worker did not intervene; the host performs its default network handling.
  Passthrough,
  /// The worker produced the response.
  Respond(Served),
}

#[allow(dead_code)]
impl FetchOutcome {
  pub fn is_passthrough(&self) -> bool {
    matches!(self, FetchOutcome::Passthrough)
  }

  pub fn served(&self) -> Option<&Served> {
    match self {
      FetchOutcome::Respond(served) => Some(served),
      FetchOutcome::Passthrough => None,
    }
  }

  pub fn into_served(self) -> Option<Served> {
    match self {
      FetchOutcome::Respond(served) => Some(served),
      FetchOutcome::Passthrough => None,
    }
  }
}

/// A response produced by the worker, with metadata about where it came from.
#[derive(Debug)]
pub struct Served {
  /// The response returned to the caller
  pub response: ResponseSnapshot,
  /// Where the response came from
  pub source: ResponseSource,
  /// When the response was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
  /// Background write of a copy of this response, if one was started
  pub refill: Option<RefillHandle>,
}

impl Served {
  pub fn from_cache(cached: CachedResponse) -> Self {
    Self {
      response: cached.response,
      source: ResponseSource::Cache,
      cached_at: Some(cached.cached_at),
      refill: None,
    }
  }

  pub fn from_network(response: ResponseSnapshot, refill: Option<RefillHandle>) -> Self {
    Self {
      response,
      source: ResponseSource::Network,
      cached_at: None,
      refill,
    }
  }

  pub fn unavailable() -> Self {
    Self {
      response: ResponseSnapshot::unavailable(),
      source: ResponseSource::Unavailable,
      cached_at: None,
      refill: None,
    }
  }
}

/// Indicates where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Stored snapshot from the active cache
  Cache,
  /// Fresh response from the network
  Network,
  /// Not cached and the network failed
  Unavailable,
}

impl std::fmt::Display for ResponseSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let label = match self {
      ResponseSource::Cache => "cache",
      ResponseSource::Network => "network",
      ResponseSource::Unavailable => "unavailable",
    };
    f.write_str(label)
  }
}
