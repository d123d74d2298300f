//! Periodic promotion task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::debug;

use deferq_store::{DelayStore, now_ms};

use crate::config::ErrorSink;
use crate::{ExecutionPath, promote::promote};

/// Handle to the spawned auto-check loop.
///
/// Cancellation is a `watch` flag observed immediately before each tick
/// dispatch: once [`cancel`](AutoCheck::cancel) returns, no further tick
/// begins, though a tick already promoting finishes normally.
pub(crate) struct AutoCheck {
    cancel: watch::Sender<bool>,
}

impl AutoCheck {
    /// Spawn the loop on the ambient runtime.
    ///
    /// The first tick fires one full interval after spawn. A tick failure
    /// goes to `sink` and does not stop the loop. Missed ticks are skipped
    /// rather than bursted.
    pub(crate) fn spawn(
        store: Arc<dyn DelayStore>,
        holding: String,
        queue: String,
        path: ExecutionPath,
        every: Duration,
        sink: ErrorSink,
    ) -> Self {
        let (cancel, mut cancelled) = watch::channel(false);

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if *cancelled.borrow() {
                            break;
                        }
                        match promote(store.as_ref(), &holding, &queue, path, now_ms()).await {
                            Ok(0) => {}
                            Ok(moved) => debug!(moved, queue = %queue, "auto-check promoted ready payloads"),
                            Err(e) => sink(e),
                        }
                    }
                    changed = cancelled.changed() => {
                        if changed.is_err() || *cancelled.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!(queue = %queue, "auto-check loop stopped");
        });

        Self { cancel }
    }

    /// Request cancellation. Idempotent.
    pub(crate) fn cancel(&self) {
        let _ = self.cancel.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    use deferq_store::{ConnectionId, MemoryStore, Score, ServerVersion, StoreError};

    fn default_sink() -> ErrorSink {
        crate::SchedulerConfig::default().error_sink
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_promotes_due_payloads() {
        let store = MemoryStore::new();
        store.sorted_insert("hold", 0, "due").await.unwrap();

        let check = AutoCheck::spawn(
            Arc::new(store.handle()),
            "hold".into(),
            "q".into(),
            ExecutionPath::Atomic,
            Duration::from_millis(100),
            default_sink(),
        );

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(store.queue_items("q").await, vec!["due"]);
        check.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_future_ticks_and_is_idempotent() {
        let store = MemoryStore::new();

        let check = AutoCheck::spawn(
            Arc::new(store.handle()),
            "hold".into(),
            "q".into(),
            ExecutionPath::Atomic,
            Duration::from_millis(100),
            default_sink(),
        );

        check.cancel();
        check.cancel();

        store.sorted_insert("hold", 0, "due").await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(store.queue_items("q").await.is_empty());
        assert_eq!(store.sorted_len("hold").await.unwrap(), 1);
    }

    /// Delegates to a `MemoryStore` but fails the first N atomic promotions.
    struct FlakyStore {
        inner: MemoryStore,
        failures_left: AtomicU64,
    }

    #[async_trait::async_trait]
    impl DelayStore for FlakyStore {
        fn connection_id(&self) -> ConnectionId {
            self.inner.connection_id()
        }

        async fn server_version(&self) -> Result<ServerVersion, StoreError> {
            self.inner.server_version().await
        }

        async fn sorted_insert(
            &self,
            key: &str,
            score: Score,
            member: &str,
        ) -> Result<bool, StoreError> {
            self.inner.sorted_insert(key, score, member).await
        }

        async fn sorted_range(
            &self,
            key: &str,
            min: Score,
            max: Score,
        ) -> Result<Vec<String>, StoreError> {
            self.inner.sorted_range(key, min, max).await
        }

        async fn sorted_remove_range(
            &self,
            key: &str,
            min: Score,
            max: Score,
        ) -> Result<u64, StoreError> {
            self.inner.sorted_remove_range(key, min, max).await
        }

        async fn sorted_len(&self, key: &str) -> Result<u64, StoreError> {
            self.inner.sorted_len(key).await
        }

        async fn queue_push(&self, key: &str, members: &[String]) -> Result<u64, StoreError> {
            self.inner.queue_push(key, members).await
        }

        async fn queue_blocking_pop(
            &self,
            key: &str,
            timeout: Duration,
        ) -> Result<Option<String>, StoreError> {
            self.inner.queue_blocking_pop(key, timeout).await
        }

        async fn promote_atomic(
            &self,
            from: &str,
            to: &str,
            max_score: Score,
        ) -> Result<u64, StoreError> {
            let failed = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failed {
                return Err(StoreError::Connection("injected failure".into()));
            }
            self.inner.promote_atomic(from, to, max_score).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_errors_reach_sink_and_loop_survives() {
        let store = MemoryStore::new();
        store.sorted_insert("hold", 0, "due").await.unwrap();

        let seen = Arc::new(AtomicU64::new(0));
        let sink_seen = Arc::clone(&seen);
        let sink: ErrorSink = Arc::new(move |_| {
            sink_seen.fetch_add(1, Ordering::SeqCst);
        });

        let check = AutoCheck::spawn(
            Arc::new(FlakyStore {
                inner: store.handle(),
                failures_left: AtomicU64::new(2),
            }),
            "hold".into(),
            "q".into(),
            ExecutionPath::Atomic,
            Duration::from_millis(100),
            sink,
        );

        tokio::time::sleep(Duration::from_millis(550)).await;

        assert_eq!(seen.load(Ordering::SeqCst), 2);
        // Later ticks kept running and eventually promoted.
        assert_eq!(store.queue_items("q").await, vec!["due"]);
        check.cancel();
    }
}
