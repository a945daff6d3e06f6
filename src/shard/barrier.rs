//! Readiness barrier over shard boot completions
//!
//! Completions may arrive in any order; only the count matters. The readiness
//! flag flips exactly once, when the count reaches the pool size. There is no
//! boot timeout: a shard that never finishes booting keeps admission closed.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::watch;
use tracing::info;

/// Counts shard boot completions and flips the readiness flag once.
#[derive(Debug)]
pub struct LifecycleBarrier {
    expected: usize,
    completed: AtomicUsize,
    ready: AtomicBool,
    connect_url: String,
    ready_tx: watch::Sender<bool>,
}

impl LifecycleBarrier {
    /// Create a barrier expecting `expected` completions.
    ///
    /// `connect_url` is announced when the barrier opens.
    pub fn new(expected: usize, connect_url: impl Into<String>) -> Self {
        let (ready_tx, _) = watch::channel(false);
        Self {
            expected,
            completed: AtomicUsize::new(0),
            ready: AtomicBool::new(false),
            connect_url: connect_url.into(),
            ready_tx,
        }
    }

    /// Record one boot completion.
    ///
    /// Returns true only for the call that flipped the readiness flag.
    pub fn complete(&self) -> bool {
        let completed = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
        if completed != self.expected {
            return false;
        }

        if self
            .ready
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let plural = if self.expected > 1 { "s" } else { "" };
        info!(
            worlds = self.expected,
            "Finished creating {} world{plural}", self.expected
        );
        info!(url = %self.connect_url, "Connect locally via {}", self.connect_url);

        self.ready_tx.send_replace(true);
        true
    }

    /// Global readiness flag read by the admission gate
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Completions observed so far
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn connect_url(&self) -> &str {
        &self.connect_url
    }

    /// Wait until the readiness flag flips.
    pub async fn wait_ready(&self) {
        let mut rx = self.ready_tx.subscribe();
        // Sender lives in self, so wait_for cannot observe a closed channel
        let _ = rx.wait_for(|ready| *ready).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flips_only_on_last_completion() {
        let barrier = LifecycleBarrier::new(3, "http://localhost:8000");
        assert!(!barrier.complete());
        assert!(!barrier.is_ready());
        assert!(!barrier.complete());
        assert!(!barrier.is_ready());
        assert!(barrier.complete());
        assert!(barrier.is_ready());
    }

    #[test]
    fn extra_completions_do_not_flip_again() {
        let barrier = LifecycleBarrier::new(1, "http://localhost:8000");
        assert!(barrier.complete());
        assert!(!barrier.complete());
        assert!(barrier.is_ready());
        assert_eq!(barrier.completed(), 2);
    }

    #[test]
    fn no_completions_keeps_admission_closed() {
        let barrier = LifecycleBarrier::new(2, "http://localhost:8000");
        barrier.complete();
        assert!(!barrier.is_ready());
    }

    #[test]
    fn wait_ready_resolves_after_flip() {
        let barrier = LifecycleBarrier::new(2, "http://localhost:8000");
        let mut waiter = tokio_test::task::spawn(barrier.wait_ready());

        tokio_test::assert_pending!(waiter.poll());
        barrier.complete();
        tokio_test::assert_pending!(waiter.poll());
        barrier.complete();

        assert!(waiter.is_woken());
        tokio_test::assert_ready!(waiter.poll());
    }
}
