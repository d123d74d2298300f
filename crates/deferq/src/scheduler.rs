//! The scheduler.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use deferq_store::{DelayStore, Score, now_ms};

use crate::autocheck::AutoCheck;
use crate::callback::CallbackScheduler;
use crate::promote::promote;
use crate::types::{Enqueued, holding_key};
use crate::{ExecutionPath, SchedulerConfig, SchedulerError};

/// Deferred-delivery scheduler over one backing-store connection.
///
/// Cloning yields another handle to the same instance. The store handed to
/// [`connect`](Scheduler::connect) becomes the scheduling connection: the
/// scheduler and its auto-check loop issue operations on it, so callers
/// must never use it for store-level blocking waits; [`pop`](Scheduler::pop)
/// takes a separate consumer connection for exactly that reason.
///
/// The scheduler holds no payload state of its own; both the holding
/// collection (`<queue>-scheduler`) and the destination queue (`<queue>`)
/// live in the backing store.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn DelayStore>,
    holding: String,
    queue: String,
    path: ExecutionPath,
    autocheck: Option<AutoCheck>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(check) = &self.autocheck {
            check.cancel();
        }
    }
}

impl Scheduler {
    /// Connect over `store`, negotiating the execution path and starting
    /// the auto-check loop when configured.
    ///
    /// The store's version is queried once, here, and the negotiated path
    /// is fixed for this instance's lifetime; connect a new instance to
    /// renegotiate.
    pub async fn connect<S>(
        store: S,
        queue: &str,
        config: SchedulerConfig,
    ) -> Result<Self, SchedulerError>
    where
        S: DelayStore + 'static,
    {
        if queue.is_empty() {
            return Err(SchedulerError::InvalidConfig(
                "queue name must not be empty".into(),
            ));
        }

        let store: Arc<dyn DelayStore> = Arc::new(store);
        let version = store.server_version().await?;
        let path = ExecutionPath::negotiate(version, config.force_fallback);
        info!(queue, %version, ?path, "scheduler connected");

        let holding = holding_key(queue);
        let autocheck = (!config.check_interval.is_zero()).then(|| {
            AutoCheck::spawn(
                Arc::clone(&store),
                holding.clone(),
                queue.to_string(),
                path,
                config.check_interval,
                Arc::clone(&config.error_sink),
            )
        });

        Ok(Self {
            inner: Arc::new(Inner {
                store,
                holding,
                queue: queue.to_string(),
                path,
                autocheck,
            }),
        })
    }

    /// Schedule `payload` for delivery at `execution_time_ms` (epoch
    /// milliseconds).
    ///
    /// Re-enqueueing a pending payload moves it to the new time instead of
    /// duplicating it.
    #[tracing::instrument(skip(self, payload), fields(queue = %self.inner.queue))]
    pub async fn enqueue_at(
        &self,
        execution_time_ms: Score,
        payload: &str,
    ) -> Result<Enqueued, SchedulerError> {
        let created = self
            .inner
            .store
            .sorted_insert(&self.inner.holding, execution_time_ms, payload)
            .await?;
        let outcome = if created {
            Enqueued::Created
        } else {
            Enqueued::Rescheduled
        };
        debug!(?outcome, "enqueued payload");
        Ok(outcome)
    }

    /// Schedule `payload` for delivery `delta` from now.
    pub async fn enqueue_in(
        &self,
        delta: Duration,
        payload: &str,
    ) -> Result<Enqueued, SchedulerError> {
        self.enqueue_at(now_ms() + delta.as_millis() as Score, payload)
            .await
    }

    /// How many payloads are currently waiting in the holding collection.
    pub async fn scheduled_count(&self) -> Result<u64, SchedulerError> {
        Ok(self.inner.store.sorted_len(&self.inner.holding).await?)
    }

    /// Promote every payload scored at or before `max_timestamp`
    /// (defaulting to now) onto the destination queue, in score order.
    /// Returns how many moved; zero ready payloads is not an error.
    ///
    /// Runs the execution path negotiated at connect time; see
    /// [`ExecutionPath::Fallback`] for the fallback path's concurrency
    /// caveat.
    #[tracing::instrument(skip(self), fields(queue = %self.inner.queue))]
    pub async fn check_now(&self, max_timestamp: Option<Score>) -> Result<u64, SchedulerError> {
        let max = max_timestamp.unwrap_or_else(now_ms);
        promote(
            self.inner.store.as_ref(),
            &self.inner.holding,
            &self.inner.queue,
            self.inner.path,
            max,
        )
        .await
    }

    /// Blocking head-pop on the destination queue through `consumer`.
    ///
    /// `consumer` must be a different connection from the scheduling one;
    /// an aliasing handle fails with [`SchedulerError::SharedConnection`]
    /// before any store access. A zero `timeout` waits indefinitely;
    /// expiry with no item yields `Ok(None)`.
    pub async fn pop(
        &self,
        consumer: &(impl DelayStore + ?Sized),
        timeout: Duration,
    ) -> Result<Option<String>, SchedulerError> {
        if consumer.connection_id() == self.inner.store.connection_id() {
            return Err(SchedulerError::SharedConnection);
        }
        Ok(consumer
            .queue_blocking_pop(&self.inner.queue, timeout)
            .await?)
    }

    /// The execution path negotiated at connect time.
    pub fn execution_path(&self) -> ExecutionPath {
        self.inner.path
    }

    /// The destination queue name.
    pub fn queue(&self) -> &str {
        &self.inner.queue
    }

    /// Callback-mode facade over this instance.
    ///
    /// Idempotent: every call returns an equivalent cheap handle.
    pub fn callbacks(&self) -> CallbackScheduler {
        CallbackScheduler::new(self.clone())
    }

    /// Stop the auto-check loop. Idempotent.
    ///
    /// The scheduling connection closes when the last handle (including
    /// the loop's) drops; consumer connections are owned by their callers.
    pub fn shutdown(&self) {
        if let Some(check) = &self.inner.autocheck {
            check.cancel();
        }
    }
}
