//! In-memory backing store.
//!
//! Implements the full contract, including atomic promotion, against
//! process-local state. The test suites run on it, and it doubles as a
//! lightweight store for single-process deployments.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::ops::Bound;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::{ConnectionId, DelayStore, Score, ServerVersion, StoreError};

/// One scored collection: member uniqueness plus a score-ordered view.
///
/// Ties on score break by member, matching how ordered stores iterate
/// equal-scored members lexicographically.
#[derive(Default)]
struct SortedSet {
    by_member: HashMap<String, Score>,
    by_score: BTreeSet<(Score, String)>,
}

impl SortedSet {
    fn insert(&mut self, score: Score, member: &str) -> bool {
        match self.by_member.insert(member.to_string(), score) {
            Some(old) => {
                self.by_score.remove(&(old, member.to_string()));
                self.by_score.insert((score, member.to_string()));
                false
            }
            None => {
                self.by_score.insert((score, member.to_string()));
                true
            }
        }
    }

    fn range(&self, min: Score, max: Score) -> Vec<String> {
        self.by_score
            .range((Bound::Included((min, String::new())), Bound::Unbounded))
            .take_while(|(score, _)| *score <= max)
            .map(|(_, member)| member.clone())
            .collect()
    }

    fn remove_range(&mut self, min: Score, max: Score) -> u64 {
        let doomed: Vec<(Score, String)> = self
            .by_score
            .range((Bound::Included((min, String::new())), Bound::Unbounded))
            .take_while(|(score, _)| *score <= max)
            .cloned()
            .collect();
        for (score, member) in &doomed {
            self.by_member.remove(member);
            self.by_score.remove(&(*score, member.clone()));
        }
        doomed.len() as u64
    }

    fn len(&self) -> u64 {
        self.by_member.len() as u64
    }
}

#[derive(Default)]
struct State {
    sorted: HashMap<String, SortedSet>,
    queues: HashMap<String, VecDeque<String>>,
}

struct Inner {
    state: Mutex<State>,
    /// Wakes blocked poppers whenever any queue grows.
    pushed: Notify,
    ops: AtomicU64,
    version: ServerVersion,
}

/// A process-local [`DelayStore`].
///
/// [`MemoryStore::new`] creates a fresh store; [`MemoryStore::handle`]
/// opens another connection to the same store, with its own
/// [`ConnectionId`]: the in-memory analogue of a second client
/// connection, suitable for consumers. Cloning, by contrast, shares the
/// connection identity, like cloning a multiplexed client connection.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
    id: ConnectionId,
}

impl MemoryStore {
    /// A fresh store reporting version 3.0.0.
    pub fn new() -> Self {
        Self::with_version(ServerVersion::new(3, 0, 0))
    }

    /// A fresh store reporting the given version.
    ///
    /// The reported version only affects capability negotiation; atomic
    /// promotion itself is always implemented.
    pub fn with_version(version: ServerVersion) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                pushed: Notify::new(),
                ops: AtomicU64::new(0),
                version,
            }),
            id: ConnectionId::new(),
        }
    }

    /// A new connection to the same store.
    pub fn handle(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            id: ConnectionId::new(),
        }
    }

    /// Number of store operations issued so far, across all handles.
    pub fn op_count(&self) -> u64 {
        self.inner.ops.load(Ordering::Relaxed)
    }

    /// Snapshot of the queue at `key`, head first.
    pub async fn queue_items(&self, key: &str) -> Vec<String> {
        let state = self.inner.state.lock().await;
        state
            .queues
            .get(key)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn count_op(&self) {
        self.inner.ops.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DelayStore for MemoryStore {
    fn connection_id(&self) -> ConnectionId {
        self.id
    }

    async fn server_version(&self) -> Result<ServerVersion, StoreError> {
        self.count_op();
        Ok(self.inner.version)
    }

    async fn sorted_insert(
        &self,
        key: &str,
        score: Score,
        member: &str,
    ) -> Result<bool, StoreError> {
        self.count_op();
        let mut state = self.inner.state.lock().await;
        Ok(state.sorted.entry(key.to_string()).or_default().insert(score, member))
    }

    async fn sorted_range(
        &self,
        key: &str,
        min: Score,
        max: Score,
    ) -> Result<Vec<String>, StoreError> {
        self.count_op();
        let state = self.inner.state.lock().await;
        Ok(state
            .sorted
            .get(key)
            .map(|set| set.range(min, max))
            .unwrap_or_default())
    }

    async fn sorted_remove_range(
        &self,
        key: &str,
        min: Score,
        max: Score,
    ) -> Result<u64, StoreError> {
        self.count_op();
        let mut state = self.inner.state.lock().await;
        Ok(state
            .sorted
            .get_mut(key)
            .map(|set| set.remove_range(min, max))
            .unwrap_or(0))
    }

    async fn sorted_len(&self, key: &str) -> Result<u64, StoreError> {
        self.count_op();
        let state = self.inner.state.lock().await;
        Ok(state.sorted.get(key).map(SortedSet::len).unwrap_or(0))
    }

    async fn queue_push(&self, key: &str, members: &[String]) -> Result<u64, StoreError> {
        self.count_op();
        let len = {
            let mut state = self.inner.state.lock().await;
            let queue = state.queues.entry(key.to_string()).or_default();
            queue.extend(members.iter().cloned());
            queue.len() as u64
        };
        if !members.is_empty() {
            self.inner.pushed.notify_waiters();
        }
        Ok(len)
    }

    async fn queue_blocking_pop(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Result<Option<String>, StoreError> {
        self.count_op();
        let deadline = (!timeout.is_zero()).then(|| Instant::now() + timeout);

        loop {
            let notified = self.inner.pushed.notified();
            tokio::pin!(notified);
            // Register before checking the queue so a push between the
            // check and the await is not lost.
            notified.as_mut().enable();

            {
                let mut state = self.inner.state.lock().await;
                if let Some(queue) = state.queues.get_mut(key) {
                    if let Some(head) = queue.pop_front() {
                        return Ok(Some(head));
                    }
                }
            }

            match deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(deadline) => return Ok(None),
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn promote_atomic(
        &self,
        from: &str,
        to: &str,
        max_score: Score,
    ) -> Result<u64, StoreError> {
        self.count_op();
        let moved = {
            let mut state = self.inner.state.lock().await;
            let ready = state
                .sorted
                .get(from)
                .map(|set| set.range(Score::MIN, max_score))
                .unwrap_or_default();
            if ready.is_empty() {
                return Ok(0);
            }
            state
                .queues
                .entry(to.to_string())
                .or_default()
                .extend(ready.iter().cloned());
            if let Some(set) = state.sorted.get_mut(from) {
                set.remove_range(Score::MIN, max_score);
            }
            ready.len() as u64
        };
        self.inner.pushed.notify_waiters();
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_reports_new_vs_rescored() {
        let store = MemoryStore::new();
        assert!(store.sorted_insert("k", 10, "a").await.unwrap());
        assert!(!store.sorted_insert("k", 20, "a").await.unwrap());
        assert_eq!(store.sorted_len("k").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_range_is_score_ordered() {
        let store = MemoryStore::new();
        store.sorted_insert("k", 30, "c").await.unwrap();
        store.sorted_insert("k", 10, "a").await.unwrap();
        store.sorted_insert("k", 20, "b").await.unwrap();

        let all = store.sorted_range("k", Score::MIN, Score::MAX).await.unwrap();
        assert_eq!(all, vec!["a", "b", "c"]);

        let some = store.sorted_range("k", Score::MIN, 20).await.unwrap();
        assert_eq!(some, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_rescore_moves_member_in_order() {
        let store = MemoryStore::new();
        store.sorted_insert("k", 10, "a").await.unwrap();
        store.sorted_insert("k", 20, "b").await.unwrap();
        store.sorted_insert("k", 30, "a").await.unwrap();

        let all = store.sorted_range("k", Score::MIN, Score::MAX).await.unwrap();
        assert_eq!(all, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_remove_range_counts_and_deletes() {
        let store = MemoryStore::new();
        store.sorted_insert("k", 10, "a").await.unwrap();
        store.sorted_insert("k", 20, "b").await.unwrap();
        store.sorted_insert("k", 30, "c").await.unwrap();

        assert_eq!(store.sorted_remove_range("k", Score::MIN, 20).await.unwrap(), 2);
        assert_eq!(store.sorted_len("k").await.unwrap(), 1);
        assert_eq!(
            store.sorted_range("k", Score::MIN, Score::MAX).await.unwrap(),
            vec!["c"]
        );
    }

    #[tokio::test]
    async fn test_queue_push_preserves_order() {
        let store = MemoryStore::new();
        let len = store
            .queue_push("q", &["x".into(), "y".into()])
            .await
            .unwrap();
        assert_eq!(len, 2);
        store.queue_push("q", &["z".into()]).await.unwrap();
        assert_eq!(store.queue_items("q").await, vec!["x", "y", "z"]);
    }

    #[tokio::test]
    async fn test_blocking_pop_returns_head() {
        let store = MemoryStore::new();
        store.queue_push("q", &["x".into(), "y".into()]).await.unwrap();

        let head = store
            .queue_blocking_pop("q", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(head.as_deref(), Some("x"));
        assert_eq!(store.queue_items("q").await, vec!["y"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocking_pop_times_out_empty() {
        let store = MemoryStore::new();
        let result = store
            .queue_blocking_pop("q", Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocking_pop_wakes_on_push() {
        let store = MemoryStore::new();
        let consumer = store.handle();

        let waiter = tokio::spawn(async move {
            consumer.queue_blocking_pop("q", Duration::ZERO).await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        store.queue_push("q", &["late".into()]).await.unwrap();

        let popped = waiter.await.unwrap().unwrap();
        assert_eq!(popped.as_deref(), Some("late"));
    }

    #[tokio::test]
    async fn test_promote_atomic_moves_ready_in_order() {
        let store = MemoryStore::new();
        store.sorted_insert("hold", 10, "a").await.unwrap();
        store.sorted_insert("hold", 5, "b").await.unwrap();
        store.sorted_insert("hold", 99, "later").await.unwrap();

        let moved = store.promote_atomic("hold", "q", 50).await.unwrap();
        assert_eq!(moved, 2);
        assert_eq!(store.queue_items("q").await, vec!["b", "a"]);
        assert_eq!(store.sorted_len("hold").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_promote_atomic_empty_is_zero() {
        let store = MemoryStore::new();
        assert_eq!(store.promote_atomic("hold", "q", 50).await.unwrap(), 0);
        assert!(store.queue_items("q").await.is_empty());
    }

    #[tokio::test]
    async fn test_handles_share_state_not_identity() {
        let store = MemoryStore::new();
        let other = store.handle();
        assert_ne!(store.connection_id(), other.connection_id());

        store.sorted_insert("k", 1, "a").await.unwrap();
        assert_eq!(other.sorted_len("k").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_clones_share_identity() {
        let store = MemoryStore::new();
        assert_eq!(store.connection_id(), store.clone().connection_id());
    }

    #[tokio::test]
    async fn test_op_count_tracks_all_handles() {
        let store = MemoryStore::new();
        let other = store.handle();
        let before = store.op_count();
        other.sorted_len("k").await.unwrap();
        store.sorted_len("k").await.unwrap();
        assert_eq!(store.op_count(), before + 2);
    }

    #[tokio::test]
    async fn test_reported_version_is_configurable() {
        let store = MemoryStore::with_version(ServerVersion::new(2, 5, 9));
        assert_eq!(
            store.server_version().await.unwrap(),
            ServerVersion::new(2, 5, 9)
        );
    }
}
