//! Error types shared by store implementations.

use thiserror::Error;

/// Errors that can occur when talking to a backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connectivity or transport failure.
    #[error("store connection error: {0}")]
    Connection(String),

    /// The store replied with something the adapter could not interpret.
    #[error("store protocol error: {0}")]
    Protocol(String),

    /// An optional capability was invoked on a store that lacks it.
    #[error("store does not support {0}")]
    Unsupported(&'static str),
}
