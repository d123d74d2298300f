//! Completion-callback facade.

use std::time::Duration;

use deferq_store::{DelayStore, Score};

use crate::{Enqueued, Scheduler, SchedulerError};

/// Callback-mode handle over a [`Scheduler`].
///
/// Every method mirrors the async form on [`Scheduler`] and delivers the
/// identical `Result`, success or error, to its trailing completion
/// callback, dispatched on the ambient tokio runtime. Obtained from
/// [`Scheduler::callbacks`]; cheap to clone and to re-request.
#[derive(Clone)]
pub struct CallbackScheduler {
    inner: Scheduler,
}

impl CallbackScheduler {
    pub(crate) fn new(inner: Scheduler) -> Self {
        Self { inner }
    }

    /// See [`Scheduler::enqueue_at`].
    pub fn enqueue_at<F>(&self, execution_time_ms: Score, payload: &str, done: F)
    where
        F: FnOnce(Result<Enqueued, SchedulerError>) + Send + 'static,
    {
        let scheduler = self.inner.clone();
        let payload = payload.to_string();
        tokio::spawn(async move {
            done(scheduler.enqueue_at(execution_time_ms, &payload).await);
        });
    }

    /// See [`Scheduler::enqueue_in`].
    pub fn enqueue_in<F>(&self, delta: Duration, payload: &str, done: F)
    where
        F: FnOnce(Result<Enqueued, SchedulerError>) + Send + 'static,
    {
        let scheduler = self.inner.clone();
        let payload = payload.to_string();
        tokio::spawn(async move {
            done(scheduler.enqueue_in(delta, &payload).await);
        });
    }

    /// See [`Scheduler::scheduled_count`].
    pub fn scheduled_count<F>(&self, done: F)
    where
        F: FnOnce(Result<u64, SchedulerError>) + Send + 'static,
    {
        let scheduler = self.inner.clone();
        tokio::spawn(async move {
            done(scheduler.scheduled_count().await);
        });
    }

    /// See [`Scheduler::check_now`].
    pub fn check_now<F>(&self, max_timestamp: Option<Score>, done: F)
    where
        F: FnOnce(Result<u64, SchedulerError>) + Send + 'static,
    {
        let scheduler = self.inner.clone();
        tokio::spawn(async move {
            done(scheduler.check_now(max_timestamp).await);
        });
    }

    /// See [`Scheduler::pop`].
    ///
    /// Takes the consumer connection by value since the wait outlives the
    /// call; the aliasing check still runs before any store access.
    pub fn pop<C, F>(&self, consumer: C, timeout: Duration, done: F)
    where
        C: DelayStore + 'static,
        F: FnOnce(Result<Option<String>, SchedulerError>) + Send + 'static,
    {
        let scheduler = self.inner.clone();
        tokio::spawn(async move {
            done(scheduler.pop(&consumer, timeout).await);
        });
    }
}
