//! Cooperative cancellation for pipeline runs.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
    notify: Notify,
}

/// Shared cancellation flag.
///
/// Clones observe the same flag. Only the first reason is kept.
#[derive(Clone, Default)]
pub struct CancelFlag {
    inner: Arc<Inner>,
}

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; later calls keep the first reason
    pub fn cancel(&self, reason: impl Into<String>) {
        if self
            .inner
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            *self.inner.reason.write() = Some(reason.into());
            self.inner.notify.notify_waiters();
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.inner.reason.read().clone()
    }

    /// Resolves once cancellation has been requested
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for CancelFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelFlag")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_first_reason_wins() {
        let flag = CancelFlag::new();
        assert!(!flag.is_cancelled());
        assert!(flag.reason().is_none());

        flag.cancel("interrupted");
        flag.cancel("second");

        assert!(flag.is_cancelled());
        assert_eq!(flag.reason().as_deref(), Some("interrupted"));
    }

    #[test]
    fn test_clones_share_state() {
        let flag = CancelFlag::new();
        let handle = flag.clone();
        handle.cancel("from handler");
        assert!(flag.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let flag = CancelFlag::new();
        let waiter = {
            let flag = flag.clone();
            tokio::spawn(async move { flag.cancelled().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        flag.cancel("stop");

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_set() {
        let flag = CancelFlag::new();
        flag.cancel("already");
        tokio::time::timeout(Duration::from_millis(100), flag.cancelled())
            .await
            .unwrap();
    }
}
