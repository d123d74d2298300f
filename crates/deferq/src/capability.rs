//! Execution-path negotiation.

use deferq_store::ServerVersion;

/// Minimum store version with server-side multi-statement execution.
pub const MIN_ATOMIC_VERSION: ServerVersion = ServerVersion::new(2, 6, 0);

/// How promotions run against the store.
///
/// Decided once per scheduler instance, when the connection first signals
/// readiness, and cached for the instance's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPath {
    /// Select, append, and delete as one indivisible server-side step.
    Atomic,
    /// Query, append, and delete as three separate calls.
    ///
    /// Between the query and the delete a concurrent promotion can observe
    /// and re-promote the same items.
    Fallback,
}

impl ExecutionPath {
    /// Decide the path for a store reporting `version`.
    ///
    /// `force_fallback` wins over any version.
    pub fn negotiate(version: ServerVersion, force_fallback: bool) -> Self {
        if force_fallback || version < MIN_ATOMIC_VERSION {
            ExecutionPath::Fallback
        } else {
            ExecutionPath::Atomic
        }
    }
}
