pub mod connection;
pub mod memory;
pub mod migrations;
pub mod postgres;

pub use connection::{get_db_pool, DatabaseConfig};
pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::constants::MAX_IN_QUERY_VALUES;
use crate::models::{Match, MatchCompletion, QueueEntry, UserProfile};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store refused to serialize this transaction against a concurrent one.
    #[error("transaction conflict: {0}")]
    Conflict(String),

    #[error("set query with {got} values exceeds the store limit of {limit}")]
    TooManyValues { got: usize, limit: usize },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            // serialization_failure, deadlock_detected
            if matches!(db_err.code().as_deref(), Some("40001") | Some("40P01")) {
                return StoreError::Conflict(db_err.message().to_string());
            }
        }
        StoreError::Database(err)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Transactional record store the matching core runs against.
///
/// Set-membership queries (`*_for_users`, `user_profiles`) accept at most
/// [`MatchStore::max_in_values`] ids per call; callers batch and merge.
#[async_trait]
pub trait MatchStore: Send + Sync {
    fn max_in_values(&self) -> usize {
        MAX_IN_QUERY_VALUES
    }

    async fn insert_queue_entry(&self, entry: &QueueEntry) -> StoreResult<()>;

    async fn queue_entry(&self, id: Uuid) -> StoreResult<Option<QueueEntry>>;

    /// Waiting entries for a slot, oldest first.
    async fn waiting_entries(&self, time_slot: &str, limit: i64) -> StoreResult<Vec<QueueEntry>>;

    async fn active_matches_for_users(&self, user_ids: &[String]) -> StoreResult<Vec<Match>>;

    /// Completed or cancelled matches touching `user_ids` made at or after `since`.
    async fn recent_matches_for_users(
        &self,
        user_ids: &[String],
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<Match>>;

    async fn user_profiles(&self, user_ids: &[String]) -> StoreResult<Vec<UserProfile>>;

    async fn active_matches(&self) -> StoreResult<Vec<Match>>;

    async fn active_match_for_user(&self, user_id: &str) -> StoreResult<Option<Match>>;

    /// Completes every listed match in one atomic batch. Matches that are no
    /// longer active are left alone. Returns the number transitioned.
    async fn complete_matches(&self, completions: &[MatchCompletion]) -> StoreResult<u64>;

    /// Opens a serializable transaction. Dropping it without `commit` rolls back.
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>>;
}

#[async_trait]
pub trait StoreTransaction: Send {
    async fn queue_entry(&mut self, id: Uuid) -> StoreResult<Option<QueueEntry>>;

    async fn active_matches_for_users(&mut self, user_ids: &[String]) -> StoreResult<Vec<Match>>;

    async fn insert_match(&mut self, record: &Match) -> StoreResult<()>;

    async fn update_queue_entry(&mut self, entry: &QueueEntry) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

pub(crate) fn check_in_values(user_ids: &[String], limit: usize) -> StoreResult<()> {
    if user_ids.len() > limit {
        return Err(StoreError::TooManyValues {
            got: user_ids.len(),
            limit,
        });
    }
    Ok(())
}
