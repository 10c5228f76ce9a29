use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

/// Cooperative cancellation flag shared between the host signal handler and
/// the task loop. The loop polls [`is_cancelled`] at item boundaries and
/// sleeps through [`sleep`], which wakes early on cancellation.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once cancellation is requested.
    pub async fn cancelled(&self) {
        loop {
            // register before checking so a concurrent cancel() is not missed
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Sleeps for the full duration unless cancelled first.
    /// Returns true when the sleep completed, false on early wake.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.cancelled() => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sleep_completes_without_cancellation() {
        let token = CancellationToken::new();
        assert!(token.sleep(Duration::from_millis(5)).await);
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn sleep_wakes_early_on_cancel() {
        let token = CancellationToken::new();
        let sleeper = token.clone();
        let handle =
            tokio::spawn(async move { sleeper.sleep(Duration::from_secs(3600)).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();
        let completed = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sleep did not wake on cancel")
            .unwrap();
        assert!(!completed);
    }

    #[tokio::test]
    async fn cancelled_resolves_when_already_set() {
        let token = CancellationToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .expect("cancelled() hung on a pre-cancelled token");
    }
}
