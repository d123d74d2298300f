//! Scheduler configuration.

use std::sync::Arc;
use std::time::Duration;

use tracing::error;

use crate::SchedulerError;

/// Receiver for auto-check tick failures.
///
/// No caller awaits a tick, so its errors are delivered here instead of
/// being returned. The default sink logs at `error` level.
pub type ErrorSink = Arc<dyn Fn(SchedulerError) + Send + Sync>;

/// Configuration for a [`Scheduler`](crate::Scheduler).
#[derive(Clone)]
pub struct SchedulerConfig {
    /// How often the auto-check loop promotes ready payloads.
    ///
    /// Zero disables the loop; promotion then only happens through
    /// explicit `check_now` calls.
    pub check_interval: Duration,

    /// Never use the atomic path, whatever the store's version reports.
    pub force_fallback: bool,

    /// Where auto-check tick failures are delivered.
    pub error_sink: ErrorSink,
}

impl SchedulerConfig {
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn with_force_fallback(mut self, force: bool) -> Self {
        self.force_fallback = force;
        self
    }

    pub fn with_error_sink(mut self, sink: ErrorSink) -> Self {
        self.error_sink = sink;
        self
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            force_fallback: false,
            error_sink: Arc::new(|e| error!(error = %e, "auto-check tick failed")),
        }
    }
}

impl std::fmt::Debug for SchedulerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerConfig")
            .field("check_interval", &self.check_interval)
            .field("force_fallback", &self.force_fallback)
            .finish_non_exhaustive()
    }
}
