//! Client control: how the worker takes over open pages.

use std::sync::atomic::{AtomicBool, Ordering};

/// Tracks the client control requests made by the worker.
///
/// The host reads these flags to decide when the new version starts
/// handling fetches for already-open clients.
#[derive(Debug, Default)]
pub struct Clients {
  waiting_skipped: AtomicBool,
  claimed: AtomicBool,
}

impl Clients {
  /// Activate as soon as installation finishes instead of waiting for
  /// every client of the previous version to close.
  pub fn skip_waiting(&self) {
    self.waiting_skipped.store(true, Ordering::SeqCst);
  }

  /// Become the controller of all currently open clients.
  pub fn claim(&self) {
    self.claimed.store(true, Ordering::SeqCst);
  }

  pub fn is_waiting_skipped(&self) -> bool {
    self.waiting_skipped.load(Ordering::SeqCst)
  }

  pub fn is_claimed(&self) -> bool {
    self.claimed.load(Ordering::SeqCst)
  }
}
