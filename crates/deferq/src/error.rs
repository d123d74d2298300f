//! Error types for the scheduler.

use thiserror::Error;

use deferq_store::StoreError;

/// Errors that can occur in scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Backing-store failure, propagated without retry.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The consumer handle aliases the scheduling connection.
    ///
    /// Rejected before any store access: the scheduling connection is
    /// engaged by the auto-check loop, and a blocking wait issued on it
    /// could stall every scheduling operation indefinitely.
    #[error("consumer handle aliases the scheduling connection")]
    SharedConnection,

    /// Nonsensical construction input.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
