//! The promotion algorithm.

use tracing::{debug, trace};

use deferq_store::{DelayStore, Score};

use crate::{ExecutionPath, SchedulerError};

/// Move every payload scored `<= max_score` from the holding collection
/// onto the destination queue, in ascending score order. Returns how many
/// moved.
///
/// On [`ExecutionPath::Fallback`] this runs as three separate store calls;
/// between the range query and the range delete a concurrent promotion can
/// observe and re-promote the same payloads. Store errors propagate
/// unretried.
pub(crate) async fn promote(
    store: &dyn DelayStore,
    holding: &str,
    queue: &str,
    path: ExecutionPath,
    max_score: Score,
) -> Result<u64, SchedulerError> {
    match path {
        ExecutionPath::Atomic => {
            let moved = store.promote_atomic(holding, queue, max_score).await?;
            trace!(moved, max_score, "atomic promotion");
            Ok(moved)
        }
        ExecutionPath::Fallback => {
            let ready = store.sorted_range(holding, Score::MIN, max_score).await?;
            if ready.is_empty() {
                return Ok(0);
            }
            store.queue_push(queue, &ready).await?;
            store
                .sorted_remove_range(holding, Score::MIN, max_score)
                .await?;
            debug!(moved = ready.len(), max_score, "fallback promotion");
            Ok(ready.len() as u64)
        }
    }
}
