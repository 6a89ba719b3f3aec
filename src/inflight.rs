//! In-flight operation tracking.
//!
//! Every asynchronous chain that references a pipe (execution, output
//! delivery, abort propagation) holds an [`InflightOp`] guard for its whole
//! duration, retries included. Teardown and `sync()` wait on the counter
//! reaching zero, which guarantees no chain is mid-step when the pipeline is
//! dismantled.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Atomic in-flight operation counter with an async idle barrier.
pub(crate) struct InflightTracker {
    count: AtomicUsize,
    idle: Notify,
}

impl InflightTracker {
    pub(crate) fn new() -> Self {
        Self {
            count: AtomicUsize::new(0),
            idle: Notify::new(),
        }
    }

    /// Registers one in-flight operation. The returned guard releases it.
    pub(crate) fn begin(self: &Arc<Self>) -> InflightOp {
        self.count.fetch_add(1, Ordering::AcqRel);
        InflightOp {
            tracker: Arc::clone(self),
        }
    }

    /// Current number of in-flight operations.
    pub(crate) fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Waits until no operations are in flight.
    ///
    /// The notified-before-check ordering closes the race between a final
    /// decrement and this waiter registering.
    pub(crate) async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// RAII guard for one in-flight operation.
pub(crate) struct InflightOp {
    tracker: Arc<InflightTracker>,
}

impl Drop for InflightOp {
    fn drop(&mut self) {
        if self.tracker.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.tracker.idle.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_tracker_counts_guards() {
        let tracker = Arc::new(InflightTracker::new());
        assert_eq!(tracker.count(), 0);

        let a = tracker.begin();
        let b = tracker.begin();
        assert_eq!(tracker.count(), 2);

        drop(a);
        assert_eq!(tracker.count(), 1);
        drop(b);
        assert_eq!(tracker.count(), 0);
    }

    #[tokio::test]
    async fn test_wait_idle_returns_immediately_when_idle() {
        let tracker = Arc::new(InflightTracker::new());
        tracker.wait_idle().await;
    }

    #[tokio::test]
    async fn test_wait_idle_blocks_until_guard_drops() {
        let tracker = Arc::new(InflightTracker::new());
        let op = tracker.begin();

        let waiter = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move {
                tracker.wait_idle().await;
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        drop(op);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter timed out")
            .expect("waiter panicked");
    }
}
