use chrono::{DateTime, Utc};
use sqlx::types::Json;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::scorer::SelectedPair;
use crate::constants::SIDE_TABLE_MATCH_TYPE;
use crate::db::{MatchStore, StoreError, StoreResult, StoreTransaction};
use crate::models::{Match, MatchStatus, QueueEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitState {
    Selected,
    Validating,
    Committed,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    EntryMissing(Uuid),
    EntryNotWaiting { entry_id: Uuid, user_id: String },
    ActiveMatch { user_id: String, match_id: String },
    Conflict(String),
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::EntryMissing(id) => write!(f, "queue entry {id} no longer exists"),
            AbortReason::EntryNotWaiting { entry_id, user_id } => {
                write!(f, "queue entry {entry_id} for {user_id} is no longer waiting")
            }
            AbortReason::ActiveMatch { user_id, match_id } => {
                write!(f, "{user_id} already holds active match {match_id}")
            }
            AbortReason::Conflict(msg) => write!(f, "concurrent commit won: {msg}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    Committed(Match),
    Aborted(AbortReason),
}

struct CommitAttempt {
    state: CommitState,
}

impl CommitAttempt {
    fn new() -> Self {
        Self {
            state: CommitState::Selected,
        }
    }

    fn advance(&mut self, next: CommitState) {
        debug!("Commit attempt {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

/// Builds the match record for a pair; nothing is written.
pub fn build_match(
    first: &QueueEntry,
    second: &QueueEntry,
    now: DateTime<Utc>,
    meetup_location: &str,
) -> Match {
    let preferences: BTreeMap<String, _> = [
        (first.user_id.clone(), first.match_preference),
        (second.user_id.clone(), second.match_preference),
    ]
    .into_iter()
    .collect();

    Match {
        id: Uuid::new_v4(),
        match_id: format!("match_{}_{}_{}", first.user_id, second.user_id, now.timestamp_millis()),
        users: vec![first.user_id.clone(), second.user_id.clone()],
        time_slot: first.time_slot.clone(),
        status: MatchStatus::Active,
        match_type: SIDE_TABLE_MATCH_TYPE.to_string(),
        match_date: now.date_naive(),
        matched_at: now,
        meetup_location: meetup_location.to_string(),
        match_preferences: Json(preferences),
        meeting_time: None,
        closure_time: None,
        completed_at: None,
    }
}

/// Re-validates `pair` and commits it as one atomic transaction.
///
/// Losing a race is not an error: the attempt comes back as
/// [`CommitOutcome::Aborted`] with nothing written.
pub async fn commit_pair(
    store: &dyn MatchStore,
    pair: &SelectedPair,
    now: DateTime<Utc>,
    meetup_location: &str,
) -> StoreResult<CommitOutcome> {
    let mut attempt = CommitAttempt::new();
    attempt.advance(CommitState::Validating);

    let outcome = match validate_and_write(store, pair, now, meetup_location).await {
        Ok(outcome) => outcome,
        Err(StoreError::Conflict(msg)) => CommitOutcome::Aborted(AbortReason::Conflict(msg)),
        Err(e) => return Err(e),
    };

    match &outcome {
        CommitOutcome::Committed(record) => {
            attempt.advance(CommitState::Committed);
            info!(
                "✅ Match created! {} & {} will meet at {} ({})",
                pair.first.user_id, pair.second.user_id, record.time_slot, record.match_id
            );
        }
        CommitOutcome::Aborted(reason) => {
            attempt.advance(CommitState::Aborted);
            warn!(
                "Match {} & {} aborted: {}",
                pair.first.user_id, pair.second.user_id, reason
            );
        }
    }

    Ok(outcome)
}

async fn validate_and_write(
    store: &dyn MatchStore,
    pair: &SelectedPair,
    now: DateTime<Utc>,
    meetup_location: &str,
) -> StoreResult<CommitOutcome> {
    let mut tx = store.begin().await?;

    let mut first = match recheck_entry(tx.as_mut(), &pair.first).await? {
        Ok(entry) => entry,
        Err(reason) => return Ok(CommitOutcome::Aborted(reason)),
    };
    let mut second = match recheck_entry(tx.as_mut(), &pair.second).await? {
        Ok(entry) => entry,
        Err(reason) => return Ok(CommitOutcome::Aborted(reason)),
    };

    let user_ids = vec![first.user_id.clone(), second.user_id.clone()];
    let active = tx.active_matches_for_users(&user_ids).await?;
    if let Some(existing) = active.first() {
        let user_id = user_ids
            .iter()
            .find(|u| existing.involves(u))
            .cloned()
            .unwrap_or_default();
        return Ok(CommitOutcome::Aborted(AbortReason::ActiveMatch {
            user_id,
            match_id: existing.match_id.clone(),
        }));
    }

    info!("🤝 Creating match: {} & {} for {}", first.user_id, second.user_id, first.time_slot);
    let record = build_match(&first, &second, now, meetup_location);
    tx.insert_match(&record).await?;

    let (first_user, second_user) = (first.user_id.clone(), second.user_id.clone());
    first.mark_matched(&second_user, &record.match_id, now);
    second.mark_matched(&first_user, &record.match_id, now);
    tx.update_queue_entry(&first).await?;
    tx.update_queue_entry(&second).await?;

    tx.commit().await?;
    Ok(CommitOutcome::Committed(record))
}

/// Re-reads an entry inside the transaction; `Err` carries the abort reason.
async fn recheck_entry(
    tx: &mut dyn StoreTransaction,
    selected: &QueueEntry,
) -> StoreResult<Result<QueueEntry, AbortReason>> {
    let Some(current) = tx.queue_entry(selected.id).await? else {
        return Ok(Err(AbortReason::EntryMissing(selected.id)));
    };

    if !current.is_waiting() {
        return Ok(Err(AbortReason::EntryNotWaiting {
            entry_id: current.id,
            user_id: current.user_id,
        }));
    }

    Ok(Ok(current))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MatchPreference;
    use chrono::TimeZone;

    #[test]
    fn built_match_snapshots_both_preferences() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 10, 0).unwrap();
        let a = QueueEntry::new("alice", "12:30 PM", MatchPreference::SameGender, now);
        let b = QueueEntry::new("bob", "12:30 PM", MatchPreference::Any, now);

        let record = build_match(&a, &b, now, "Main Canteen");

        assert_eq!(record.users, vec!["alice".to_string(), "bob".to_string()]);
        assert_eq!(record.status, MatchStatus::Active);
        assert_eq!(record.match_type, "side_table");
        assert_eq!(record.match_id, format!("match_alice_bob_{}", now.timestamp_millis()));
        assert_eq!(record.match_date, now.date_naive());
        assert_eq!(record.match_preferences.0.get("alice"), Some(&MatchPreference::SameGender));
        assert_eq!(record.match_preferences.0.get("bob"), Some(&MatchPreference::Any));
        assert!(record.completed_at.is_none());
    }

    #[test]
    fn abort_reasons_read_well_in_logs() {
        let reason = AbortReason::ActiveMatch {
            user_id: "alice".into(),
            match_id: "match_1".into(),
        };
        assert_eq!(reason.to_string(), "alice already holds active match match_1");
    }
}
