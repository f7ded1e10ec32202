use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::constants::{
    DEFAULT_MATCHING_TIMEOUT_SECS, DEFAULT_MEETUP_LOCATION, MAX_QUEUE_CANDIDATES, RECENT_MATCH_LOOKBACK_HOURS,
};
use crate::db::MatchStore;
use crate::matching::{
    commit_pair, dedupe_by_user, filter_conflicts, load_profiles, load_recent_matches, select_best_pair,
    AbortReason, CommitOutcome, MatchingError, RecentMatchIndex, ScoringContext, TimeWindow,
};
use crate::models::{Match, MatchPreference, QueueEntry};
use crate::utils::clock::Clock;

#[derive(Debug, Clone)]
pub struct MatcherSettings {
    pub meetup_location: String,
    pub timeout: Duration,
    pub max_candidates: i64,
}

impl Default for MatcherSettings {
    fn default() -> Self {
        Self {
            meetup_location: DEFAULT_MEETUP_LOCATION.to_string(),
            timeout: Duration::from_secs(DEFAULT_MATCHING_TIMEOUT_SECS),
            max_candidates: MAX_QUEUE_CANDIDATES,
        }
    }
}

/// Payload of the on-insert trigger for the queue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueJoinEvent {
    pub entry_id: Option<Uuid>,
    pub user_id: Option<String>,
    pub time_slot: Option<String>,
    pub match_preference: Option<MatchPreference>,
}

impl From<&QueueEntry> for QueueJoinEvent {
    fn from(entry: &QueueEntry) -> Self {
        Self {
            entry_id: Some(entry.id),
            user_id: Some(entry.user_id.clone()),
            time_slot: Some(entry.time_slot.clone()),
            match_preference: Some(entry.match_preference),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Malformed(String),
    SkippedTooClose,
    NotEnoughCandidates(usize),
    NoCompatiblePair,
    Committed(Match),
    Aborted(AbortReason),
    Failed(String),
    TimedOut,
}

/// Runs one matching attempt per queue-join event.
pub struct Matcher {
    store: Arc<dyn MatchStore>,
    window: TimeWindow,
    clock: Arc<dyn Clock>,
    rng: Mutex<StdRng>,
    settings: MatcherSettings,
}

impl Matcher {
    pub fn new(
        store: Arc<dyn MatchStore>,
        window: TimeWindow,
        clock: Arc<dyn Clock>,
        settings: MatcherSettings,
    ) -> Self {
        Self {
            store,
            window,
            clock,
            rng: Mutex::new(StdRng::from_os_rng()),
            settings,
        }
    }

    /// Replaces the tie-break random source, e.g. with a seeded generator.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn window(&self) -> &TimeWindow {
        &self.window
    }

    /// On-insert trigger entry point.
    ///
    /// Errors are logged and folded into the outcome, never propagated, so
    /// the trigger source does not retry.
    pub async fn on_queue_join(&self, event: QueueJoinEvent) -> MatchOutcome {
        let (user_id, time_slot) = match (event.user_id.as_deref(), event.time_slot.as_deref()) {
            (Some(user), Some(slot)) if !user.trim().is_empty() && !slot.trim().is_empty() => (user, slot),
            _ => {
                error!("❌ Queue event {:?} is missing userId or timeSlot", event.entry_id);
                return MatchOutcome::Malformed("missing userId or timeSlot".to_string());
            }
        };

        info!("🍽️ Student {} joined queue for {}", user_id, time_slot);

        match timeout(self.settings.timeout, self.process_slot(time_slot)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(MatchingError::Slot(e))) => {
                error!("❌ Bad time slot on queue event for {}: {}", user_id, e);
                MatchOutcome::Malformed(e.to_string())
            }
            Ok(Err(e)) => {
                error!("❌ Error in matching for {}: {}", time_slot, e);
                MatchOutcome::Failed(e.to_string())
            }
            Err(_) => {
                warn!("⌛ Matching for {} exceeded {:?}, abandoning", time_slot, self.settings.timeout);
                MatchOutcome::TimedOut
            }
        }
    }

    /// Tries to commit one match among the waiting entries of `time_slot`.
    pub async fn process_slot(&self, time_slot: &str) -> Result<MatchOutcome, MatchingError> {
        let store = self.store.as_ref();
        let now = self.clock.now();

        if self.window.is_too_close_to_break(time_slot, now)? {
            info!("⏰ Too close to {}. Stopping new matches.", time_slot);
            return Ok(MatchOutcome::SkippedTooClose);
        }

        let waiting = dedupe_by_user(store.waiting_entries(time_slot, self.settings.max_candidates).await?);
        if waiting.len() < 2 {
            info!("⏳ Only {} student waiting for {}", waiting.len(), time_slot);
            return Ok(MatchOutcome::NotEnoughCandidates(waiting.len()));
        }

        let candidates = filter_conflicts(store, waiting).await?;
        if candidates.len() < 2 {
            info!("⏳ Only {} free student waiting for {}", candidates.len(), time_slot);
            return Ok(MatchOutcome::NotEnoughCandidates(candidates.len()));
        }
        info!("👥 Found {} students for {}", candidates.len(), time_slot);

        let user_ids: Vec<String> = candidates.iter().map(|c| c.user_id.clone()).collect();
        let profiles = load_profiles(store, &user_ids).await?;

        let force_match = self.window.is_urgent_matching(time_slot, now)? || candidates.len() == 2;
        let recent = if force_match {
            RecentMatchIndex::default()
        } else {
            let since = now - ChronoDuration::hours(RECENT_MATCH_LOOKBACK_HOURS);
            load_recent_matches(store, &user_ids, since).await?
        };

        let ctx = ScoringContext { now, force_match };
        let selected = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            select_best_pair(&candidates, &profiles, &recent, ctx, &mut *rng)
        };
        let Some(pair) = selected else {
            info!("🤔 No suitable match found for {}", time_slot);
            return Ok(MatchOutcome::NoCompatiblePair);
        };

        let outcome = match commit_pair(store, &pair, now, &self.settings.meetup_location).await? {
            CommitOutcome::Committed(record) => MatchOutcome::Committed(record),
            CommitOutcome::Aborted(reason) => MatchOutcome::Aborted(reason),
        };
        Ok(outcome)
    }
}
