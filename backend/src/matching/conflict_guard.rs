use std::collections::HashSet;
use tracing::{debug, info};

use super::query_in_batches;
use crate::db::{MatchStore, StoreResult};
use crate::models::QueueEntry;

/// Keeps the oldest entry per user. Input is expected oldest-first.
pub fn dedupe_by_user(entries: Vec<QueueEntry>) -> Vec<QueueEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|entry| seen.insert(entry.user_id.clone()))
        .collect()
}

/// Drops entries whose user is in `busy`, preserving order.
pub fn remove_busy(entries: Vec<QueueEntry>, busy: &HashSet<String>) -> Vec<QueueEntry> {
    entries
        .into_iter()
        .filter(|entry| !busy.contains(&entry.user_id))
        .collect()
}

/// Users among `user_ids` who currently hold an active match.
pub async fn users_with_active_match(store: &dyn MatchStore, user_ids: &[String]) -> StoreResult<HashSet<String>> {
    let active = query_in_batches(user_ids, store.max_in_values(), |chunk| {
        store.active_matches_for_users(chunk)
    })
    .await?;

    let candidates: HashSet<&str> = user_ids.iter().map(String::as_str).collect();
    Ok(active
        .iter()
        .flat_map(|m| m.users.iter())
        .filter(|u| candidates.contains(u.as_str()))
        .cloned()
        .collect())
}

/// Removes every entrant who already holds an active match.
pub async fn filter_conflicts(store: &dyn MatchStore, entries: Vec<QueueEntry>) -> StoreResult<Vec<QueueEntry>> {
    let user_ids: Vec<String> = entries.iter().map(|e| e.user_id.clone()).collect();
    let busy = users_with_active_match(store, &user_ids).await?;

    if busy.is_empty() {
        debug!("No active-match conflicts among {} candidates", entries.len());
        return Ok(entries);
    }

    info!("🚫 Skipping {} candidates already in an active match", busy.len());
    Ok(remove_busy(entries, &busy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MatchPreference;
    use chrono::{Duration, Utc};

    fn entries(users: &[&str]) -> Vec<QueueEntry> {
        let start = Utc::now();
        users
            .iter()
            .enumerate()
            .map(|(i, u)| QueueEntry::new(*u, "12:30 PM", MatchPreference::Any, start + Duration::seconds(i as i64)))
            .collect()
    }

    fn users(entries: &[QueueEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.user_id.as_str()).collect()
    }

    #[test]
    fn dedupe_keeps_the_oldest_entry() {
        let input = entries(&["a", "b", "a", "c", "b"]);
        let first_a = input[0].id;
        let deduped = dedupe_by_user(input);
        assert_eq!(users(&deduped), vec!["a", "b", "c"]);
        assert_eq!(deduped[0].id, first_a);
    }

    #[test]
    fn remove_busy_preserves_order() {
        let busy: HashSet<String> = ["b".to_string()].into_iter().collect();
        let kept = remove_busy(entries(&["a", "b", "c", "d"]), &busy);
        assert_eq!(users(&kept), vec!["a", "c", "d"]);
    }
}
