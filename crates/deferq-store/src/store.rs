//! The backing-store contract.

use std::time::Duration;

use async_trait::async_trait;

use crate::{ConnectionId, Score, ServerVersion, StoreError};

/// Operations the scheduler requires from a backing store.
///
/// An implementor represents one established connection. All methods take
/// `&self`; implementations are expected to be cheaply shareable behind
/// `Arc` and to serialize access to the wire internally.
///
/// The scheduling connection is an exclusive resource: the scheduler and
/// its auto-check loop issue operations on it, so callers must never issue
/// a store-level blocking call (such as [`queue_blocking_pop`]) on the
/// connection they handed to the scheduler.
///
/// [`queue_blocking_pop`]: DelayStore::queue_blocking_pop
#[async_trait]
pub trait DelayStore: Send + Sync {
    /// Identity of the underlying connection.
    ///
    /// Used to detect a consumer handle that aliases the scheduling
    /// connection.
    fn connection_id(&self) -> ConnectionId;

    /// The store's version triple, queryable once the connection is ready.
    async fn server_version(&self) -> Result<ServerVersion, StoreError>;

    /// Upsert `member` into the collection at `key` with `score`.
    ///
    /// Returns `true` if the member was newly created, `false` if an
    /// existing member was rescored.
    async fn sorted_insert(
        &self,
        key: &str,
        score: Score,
        member: &str,
    ) -> Result<bool, StoreError>;

    /// Members with `min <= score <= max`, in ascending score order.
    async fn sorted_range(
        &self,
        key: &str,
        min: Score,
        max: Score,
    ) -> Result<Vec<String>, StoreError>;

    /// Remove members with `min <= score <= max`; returns how many were
    /// removed.
    async fn sorted_remove_range(
        &self,
        key: &str,
        min: Score,
        max: Score,
    ) -> Result<u64, StoreError>;

    /// Cardinality of the collection at `key`.
    async fn sorted_len(&self, key: &str) -> Result<u64, StoreError>;

    /// Append `members` to the queue at `key`, preserving argument order.
    ///
    /// Returns the resulting queue length.
    async fn queue_push(&self, key: &str, members: &[String]) -> Result<u64, StoreError>;

    /// Blocking head-pop on the queue at `key`.
    ///
    /// A zero `timeout` waits indefinitely; expiry with no item yields
    /// `Ok(None)`. This call can park the connection for the full wait, so
    /// it must only be issued on a connection dedicated to consuming.
    async fn queue_blocking_pop(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Result<Option<String>, StoreError>;

    /// Atomically move every member scored `<= max_score` from the
    /// collection at `from` onto the queue at `to`, in ascending score
    /// order, returning the number moved.
    ///
    /// The select, append, and delete must be visible to other clients as
    /// a single step. Stores without server-side multi-statement execution
    /// keep the default implementation, which fails with
    /// [`StoreError::Unsupported`].
    async fn promote_atomic(
        &self,
        from: &str,
        to: &str,
        max_score: Score,
    ) -> Result<u64, StoreError> {
        let _ = (from, to, max_score);
        Err(StoreError::Unsupported("atomic promotion"))
    }
}
