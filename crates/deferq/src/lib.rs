//! Deferred delivery of opaque payloads onto a work queue.
//!
//! Payloads wait in a time-ordered holding collection inside an external
//! backing store; once their execution time passes they are promoted onto
//! a destination queue, in execution-time order, where blocking consumers
//! pick them up. The scheduler itself is stateless: both collections live
//! in the store, so any number of producers and consumers can share them.
//!
//! ## Features
//!
//! - **Scheduling**: `enqueue_at` / `enqueue_in` upsert payloads by
//!   execution time
//! - **Promotion**: one atomic server-side step on stores that support it,
//!   a documented multi-step fallback on stores that don't
//! - **Auto-check**: a cancellable periodic task that promotes ready
//!   payloads in the background
//! - **Consuming**: blocking `pop` on a dedicated store connection
//! - **Dual-mode calls**: every operation as an `async fn` or, through
//!   [`Scheduler::callbacks`], in completion-callback form

mod autocheck;
mod callback;
mod capability;
mod config;
mod error;
mod promote;
mod scheduler;
mod types;

pub use callback::CallbackScheduler;
pub use capability::{ExecutionPath, MIN_ATOMIC_VERSION};
pub use config::{ErrorSink, SchedulerConfig};
pub use error::SchedulerError;
pub use scheduler::Scheduler;
pub use types::{Enqueued, holding_key};

pub use deferq_store::{
    ConnectionId, DelayStore, MemoryStore, Score, ServerVersion, StoreError, now_ms,
};
