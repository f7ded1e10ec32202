use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{check_in_values, MatchStore, StoreError, StoreResult, StoreTransaction};
use crate::constants::MAX_IN_QUERY_VALUES;
use crate::models::{Match, MatchCompletion, MatchStatus, QueueEntry, UserProfile};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    queue: BTreeMap<Uuid, QueueEntry>,
    matches: BTreeMap<Uuid, Match>,
    profiles: HashMap<String, UserProfile>,
}

/// In-process store for tests and local runs.
///
/// A transaction holds the state lock for its whole lifetime and works on a
/// staged copy that replaces the live state on commit, so transactions are
/// serial by construction. Clones share the same state.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    max_in_values: usize,
    unavailable: Arc<AtomicBool>,
    recent_match_queries: Arc<AtomicUsize>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            max_in_values: MAX_IN_QUERY_VALUES,
            unavailable: Arc::new(AtomicBool::new(false)),
            recent_match_queries: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_max_in_values(mut self, limit: usize) -> Self {
        self.max_in_values = limit;
        self
    }

    /// While set, every store call fails with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of recent-match lookups served so far.
    pub fn recent_match_queries(&self) -> usize {
        self.recent_match_queries.load(Ordering::SeqCst)
    }

    pub async fn put_profile(&self, profile: UserProfile) {
        let mut state = self.state.lock().await;
        state.profiles.insert(profile.user_id.clone(), profile);
    }

    pub async fn put_match(&self, record: Match) {
        let mut state = self.state.lock().await;
        state.matches.insert(record.id, record);
    }

    pub async fn matches(&self) -> Vec<Match> {
        self.state.lock().await.matches.values().cloned().collect()
    }

    pub async fn queue_entries(&self) -> Vec<QueueEntry> {
        self.state.lock().await.queue.values().cloned().collect()
    }

    fn ensure_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".to_string()));
        }
        Ok(())
    }
}

fn active_for(matches: &BTreeMap<Uuid, Match>, user_ids: &[String]) -> Vec<Match> {
    matches
        .values()
        .filter(|m| m.is_active() && user_ids.iter().any(|id| m.involves(id)))
        .cloned()
        .collect()
}

#[async_trait]
impl MatchStore for MemoryStore {
    fn max_in_values(&self) -> usize {
        self.max_in_values
    }

    async fn insert_queue_entry(&self, entry: &QueueEntry) -> StoreResult<()> {
        self.ensure_available()?;
        let mut state = self.state.lock().await;
        state.queue.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn queue_entry(&self, id: Uuid) -> StoreResult<Option<QueueEntry>> {
        self.ensure_available()?;
        Ok(self.state.lock().await.queue.get(&id).cloned())
    }

    async fn waiting_entries(&self, time_slot: &str, limit: i64) -> StoreResult<Vec<QueueEntry>> {
        self.ensure_available()?;
        let state = self.state.lock().await;
        let mut waiting: Vec<QueueEntry> = state
            .queue
            .values()
            .filter(|e| e.time_slot == time_slot && e.is_waiting())
            .cloned()
            .collect();
        waiting.sort_by_key(|e| e.created_at);
        waiting.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(waiting)
    }

    async fn active_matches_for_users(&self, user_ids: &[String]) -> StoreResult<Vec<Match>> {
        self.ensure_available()?;
        check_in_values(user_ids, self.max_in_values)?;
        Ok(active_for(&self.state.lock().await.matches, user_ids))
    }

    async fn recent_matches_for_users(
        &self,
        user_ids: &[String],
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<Match>> {
        self.ensure_available()?;
        check_in_values(user_ids, self.max_in_values)?;
        self.recent_match_queries.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().await;
        Ok(state
            .matches
            .values()
            .filter(|m| matches!(m.status, MatchStatus::Completed | MatchStatus::Cancelled))
            .filter(|m| m.matched_at >= since)
            .filter(|m| user_ids.iter().any(|id| m.involves(id)))
            .cloned()
            .collect())
    }

    async fn user_profiles(&self, user_ids: &[String]) -> StoreResult<Vec<UserProfile>> {
        self.ensure_available()?;
        check_in_values(user_ids, self.max_in_values)?;
        let state = self.state.lock().await;
        Ok(user_ids
            .iter()
            .filter_map(|id| state.profiles.get(id).cloned())
            .collect())
    }

    async fn active_matches(&self) -> StoreResult<Vec<Match>> {
        self.ensure_available()?;
        let state = self.state.lock().await;
        let mut active: Vec<Match> = state.matches.values().filter(|m| m.is_active()).cloned().collect();
        active.sort_by_key(|m| m.matched_at);
        Ok(active)
    }

    async fn active_match_for_user(&self, user_id: &str) -> StoreResult<Option<Match>> {
        self.ensure_available()?;
        let state = self.state.lock().await;
        Ok(state
            .matches
            .values()
            .filter(|m| m.is_active() && m.involves(user_id))
            .max_by_key(|m| m.matched_at)
            .cloned())
    }

    async fn complete_matches(&self, completions: &[MatchCompletion]) -> StoreResult<u64> {
        self.ensure_available()?;
        let mut state = self.state.lock().await;
        let mut completed = 0;
        for completion in completions {
            if let Some(record) = state.matches.get_mut(&completion.id) {
                if record.is_active() {
                    record.status = MatchStatus::Completed;
                    record.completed_at = Some(completion.completed_at);
                    record.meeting_time = Some(completion.meeting_time);
                    record.closure_time = Some(completion.closure_time);
                    completed += 1;
                }
            }
        }
        Ok(completed)
    }

    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        self.ensure_available()?;
        let guard = Arc::clone(&self.state).lock_owned().await;
        let staged = (*guard).clone();
        Ok(Box::new(MemoryTransaction {
            guard,
            staged,
            unavailable: Arc::clone(&self.unavailable),
        }))
    }
}

pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
    unavailable: Arc<AtomicBool>,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn queue_entry(&mut self, id: Uuid) -> StoreResult<Option<QueueEntry>> {
        Ok(self.staged.queue.get(&id).cloned())
    }

    async fn active_matches_for_users(&mut self, user_ids: &[String]) -> StoreResult<Vec<Match>> {
        Ok(active_for(&self.staged.matches, user_ids))
    }

    async fn insert_match(&mut self, record: &Match) -> StoreResult<()> {
        self.staged.matches.insert(record.id, record.clone());
        Ok(())
    }

    async fn update_queue_entry(&mut self, entry: &QueueEntry) -> StoreResult<()> {
        self.staged.queue.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("commit rejected".to_string()));
        }
        let MemoryTransaction { mut guard, staged, .. } = *self;
        *guard = staged;
        Ok(())
    }
}
