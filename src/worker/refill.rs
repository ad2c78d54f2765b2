//! Background cache writes that never delay a response.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Handle on a single background cache write.
///
/// Dropping the handle does not cancel the write.
#[derive(Debug)]
pub struct RefillHandle {
  handle: JoinHandle<bool>,
}

impl RefillHandle {
  /// Wait for the write to finish. Returns whether it succeeded.
  pub async fn wait(self) -> bool {
    self.handle.await.unwrap_or(false)
  }
}

#[derive(Default)]
struct TrackerInner {
  pending: AtomicUsize,
  idle: Notify,
}

/// Counts in-flight refills so the host can wait for them before exiting.
#[derive(Clone, Default)]
pub(crate) struct RefillTracker {
  inner: Arc<TrackerInner>,
}

impl RefillTracker {
  /// Spawn a write. The task resolves to whether the write succeeded.
  pub fn spawn<Fut>(&self, task: Fut) -> RefillHandle
  where
    Fut: Future<Output = bool> + Send + 'static,
  {
    self.inner.pending.fetch_add(1, Ordering::SeqCst);
    let guard = PendingGuard(Arc::clone(&self.inner));

    let handle = tokio::spawn(async move {
      let _guard = guard;
      task.await
    });

    RefillHandle { handle }
  }

  pub fn pending(&self) -> usize {
    self.inner.pending.load(Ordering::SeqCst)
  }

  /// Resolve once no refill is in flight.
  pub async fn wait_idle(&self) {
    loop {
      let notified = self.inner.idle.notified();
      tokio::pin!(notified);
      // Register before checking the counter so a wakeup between the two is not lost
      notified.as_mut().enable();

      if self.pending() == 0 {
        return;
      }
      notified.await;
    }
  }
}

/// Decrements the pending count even if the task panics.
struct PendingGuard(Arc<TrackerInner>);

impl Drop for PendingGuard {
  fn drop(&mut self) {
    if self.0.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
      self.0.idle.notify_waiters();
    }
  }
}
