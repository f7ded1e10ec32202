//! Side-table matching core: slot gating, conflict filtering, compatibility,
//! pair selection and the transactional commit.

pub mod committer;
pub mod compatibility;
pub mod conflict_guard;
pub mod scorer;
pub mod time_window;

pub use committer::{commit_pair, AbortReason, CommitOutcome, CommitState};
pub use compatibility::{compatible, load_profiles, ProfileDirectory};
pub use conflict_guard::{dedupe_by_user, filter_conflicts};
pub use scorer::{load_recent_matches, select_best_pair, RecentMatchIndex, ScoringContext, SelectedPair};
pub use time_window::{format_slot, parse_time_of_day, SlotError, TimeWindow};

use futures::future::try_join_all;
use std::future::Future;

use crate::db::{StoreError, StoreResult};

#[derive(Debug, thiserror::Error)]
pub enum MatchingError {
    #[error(transparent)]
    Slot(#[from] SlotError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Splits `user_ids` into chunks of at most `batch_size`, runs `query` on all
/// chunks concurrently and concatenates the results.
pub(crate) async fn query_in_batches<'a, T, F, Fut>(
    user_ids: &'a [String],
    batch_size: usize,
    query: F,
) -> StoreResult<Vec<T>>
where
    F: Fn(&'a [String]) -> Fut,
    Fut: Future<Output = StoreResult<Vec<T>>>,
{
    if user_ids.is_empty() {
        return Ok(Vec::new());
    }

    let batches = user_ids.chunks(batch_size.max(1)).map(query);
    let results = try_join_all(batches).await?;
    Ok(results.into_iter().flatten().collect())
}
