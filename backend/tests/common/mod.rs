#![allow(dead_code)]

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use rand::SeedableRng;
use rand::rngs::StdRng;
use sidetable::db::{MatchStore, MemoryStore};
use sidetable::matching::TimeWindow;
use sidetable::models::{Match, MatchPreference, MatchStatus, QueueEntry, QueueStatus};
use sidetable::services::{AutoCloser, Matcher, MatcherSettings};
use sidetable::utils::{Clock, FixedClock};
use sqlx::types::Json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

pub fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, h, m, 0).unwrap()
}

pub struct Harness {
    pub store: MemoryStore,
    pub clock: Arc<FixedClock>,
    pub matcher: Arc<Matcher>,
    pub closer: AutoCloser,
}

pub fn harness_with(store: MemoryStore, now: DateTime<Utc>, seed: u64) -> Harness {
    let clock = Arc::new(FixedClock::new(now));
    let shared: Arc<dyn MatchStore> = Arc::new(store.clone());
    let window = TimeWindow::new(Tz::UTC);
    let matcher = Matcher::new(shared.clone(), window, clock.clone() as Arc<dyn Clock>, MatcherSettings::default())
        .with_rng(StdRng::seed_from_u64(seed));
    let closer = AutoCloser::new(shared, window, clock.clone() as Arc<dyn Clock>);

    Harness {
        store,
        clock,
        matcher: Arc::new(matcher),
        closer,
    }
}

pub fn harness(now: DateTime<Utc>) -> Harness {
    harness_with(MemoryStore::new(), now, 7)
}

pub async fn enqueue(
    store: &MemoryStore,
    user: &str,
    slot: &str,
    pref: MatchPreference,
    created_at: DateTime<Utc>,
) -> QueueEntry {
    let entry = QueueEntry::new(user, slot, pref, created_at);
    store.insert_queue_entry(&entry).await.unwrap();
    entry
}

/// A finished match between `a` and `b`, made `hours_ago` before `now`.
pub fn past_match(a: &str, b: &str, now: DateTime<Utc>, hours_ago: i64) -> Match {
    let matched_at = now - Duration::hours(hours_ago);
    Match {
        id: Uuid::new_v4(),
        match_id: format!("match_{a}_{b}_{}", matched_at.timestamp_millis()),
        users: vec![a.to_string(), b.to_string()],
        time_slot: "12:30 PM".to_string(),
        status: MatchStatus::Completed,
        match_type: "side_table".to_string(),
        match_date: NaiveDate::from_ymd_opt(2026, 10, 18).unwrap(),
        matched_at,
        meetup_location: "Main Canteen".to_string(),
        match_preferences: Json(Default::default()),
        meeting_time: None,
        closure_time: None,
        completed_at: Some(matched_at + Duration::hours(1)),
    }
}

pub fn active_match(a: &str, b: &str, now: DateTime<Utc>) -> Match {
    Match {
        status: MatchStatus::Active,
        completed_at: None,
        ..past_match(a, b, now, 0)
    }
}

pub fn pair_of(record: &Match) -> HashSet<&str> {
    record.users.iter().map(String::as_str).collect()
}

pub fn set_of<'a>(users: &[&'a str]) -> HashSet<&'a str> {
    users.iter().copied().collect()
}

/// Checks the store-wide guarantees: disjoint active matches, two distinct
/// users per match, and queue entries consistent with the matches they name.
pub async fn assert_invariants(store: &MemoryStore) {
    let matches = store.matches().await;
    let entries = store.queue_entries().await;

    let mut active_users = HashSet::new();
    for record in &matches {
        assert_eq!(record.users.len(), 2, "match {} must have two users", record.match_id);
        assert_ne!(record.users[0], record.users[1], "match {} pairs a user with themselves", record.match_id);
        if record.is_active() {
            for user in &record.users {
                assert!(active_users.insert(user.clone()), "{user} holds two active matches");
            }
        }
    }

    let by_match_id: HashMap<&str, &Match> = matches.iter().map(|m| (m.match_id.as_str(), m)).collect();
    let mut per_match: HashMap<&str, usize> = HashMap::new();
    for entry in &entries {
        if entry.status != QueueStatus::Matched {
            continue;
        }
        let match_id = entry.match_id.as_deref().expect("matched entry carries a match id");
        let record = by_match_id.get(match_id).expect("matched entry points at a stored match");
        assert!(record.involves(&entry.user_id));
        assert_eq!(
            entry.matched_with.as_deref(),
            record.partner_of(&entry.user_id),
            "entry {} names the wrong partner",
            entry.id
        );
        *per_match.entry(match_id).or_default() += 1;
    }
    for (match_id, count) in per_match {
        assert_eq!(count, 2, "match {match_id} should own exactly two queue entries");
    }
}
