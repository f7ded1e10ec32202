mod common;

use chrono::Duration;
use common::*;
use sidetable::db::MemoryStore;
use sidetable::models::{MatchPreference, QueueStatus, UserProfile};
use sidetable::services::{MatchOutcome, QueueJoinEvent};

const SLOT: &str = "12:30 PM";

#[tokio::test]
async fn two_compatible_waiters_are_matched() {
    let h = harness(at(12, 0));
    let first = enqueue(&h.store, "alice", SLOT, MatchPreference::Any, at(11, 50)).await;
    let second = enqueue(&h.store, "bob", SLOT, MatchPreference::Any, at(11, 58)).await;

    let outcome = h.matcher.on_queue_join(QueueJoinEvent::from(&second)).await;

    let MatchOutcome::Committed(record) = outcome else {
        panic!("expected a committed match, got {outcome:?}");
    };
    assert_eq!(pair_of(&record), set_of(&["alice", "bob"]));
    assert_eq!(record.time_slot, SLOT);
    assert!(record.is_active());
    assert_eq!(record.meetup_location, "Main Canteen");

    let matches = h.store.matches().await;
    assert_eq!(matches.len(), 1);

    for (entry, partner) in [(&first, "bob"), (&second, "alice")] {
        let stored = h.store.queue_entries().await.into_iter().find(|e| e.id == entry.id).unwrap();
        assert_eq!(stored.status, QueueStatus::Matched);
        assert_eq!(stored.match_id.as_deref(), Some(record.match_id.as_str()));
        assert_eq!(stored.matched_with.as_deref(), Some(partner));
        assert_eq!(stored.matched_at, Some(at(12, 0)));
    }
    assert_invariants(&h.store).await;
}

#[tokio::test]
async fn recent_partners_are_not_rematched_when_others_wait() {
    let h = harness(at(12, 0));
    h.store.put_match(past_match("a", "b", at(12, 0), 20)).await;
    enqueue(&h.store, "a", SLOT, MatchPreference::Any, at(11, 50)).await;
    enqueue(&h.store, "b", SLOT, MatchPreference::Any, at(11, 50)).await;
    let c = enqueue(&h.store, "c", SLOT, MatchPreference::Any, at(11, 50)).await;

    let outcome = h.matcher.on_queue_join(QueueJoinEvent::from(&c)).await;

    let MatchOutcome::Committed(record) = outcome else {
        panic!("expected a committed match, got {outcome:?}");
    };
    assert!(pair_of(&record).contains("c"), "picked {:?}", record.users);
    assert!(h.store.recent_match_queries() > 0);
}

#[tokio::test]
async fn matches_older_than_the_lookback_carry_no_penalty() {
    let h = harness(at(12, 0));
    h.store.put_match(past_match("a", "b", at(12, 0), 30)).await;
    // a and b have waited far longer than c, so they win once unpenalised.
    enqueue(&h.store, "a", SLOT, MatchPreference::Any, at(11, 30)).await;
    enqueue(&h.store, "b", SLOT, MatchPreference::Any, at(11, 30)).await;
    let c = enqueue(&h.store, "c", SLOT, MatchPreference::Any, at(12, 0)).await;

    let MatchOutcome::Committed(record) = h.matcher.on_queue_join(QueueJoinEvent::from(&c)).await else {
        panic!("expected a committed match");
    };
    assert_eq!(pair_of(&record), set_of(&["a", "b"]));
}

#[tokio::test]
async fn unknown_gender_does_not_block_same_gender_request() {
    let h = harness(at(12, 0));
    h.store.put_profile(UserProfile::new("bob", Some("male"))).await;
    enqueue(&h.store, "alex", SLOT, MatchPreference::SameGender, at(11, 50)).await;
    let bob = enqueue(&h.store, "bob", SLOT, MatchPreference::Any, at(11, 55)).await;

    let outcome = h.matcher.on_queue_join(QueueJoinEvent::from(&bob)).await;

    assert!(matches!(outcome, MatchOutcome::Committed(_)), "got {outcome:?}");
}

#[tokio::test]
async fn known_gender_mismatch_leaves_both_waiting() {
    let h = harness(at(12, 0));
    h.store.put_profile(UserProfile::new("alice", Some("female"))).await;
    h.store.put_profile(UserProfile::new("bob", Some("male"))).await;
    enqueue(&h.store, "alice", SLOT, MatchPreference::SameGender, at(11, 50)).await;
    let bob = enqueue(&h.store, "bob", SLOT, MatchPreference::Any, at(11, 55)).await;

    let outcome = h.matcher.on_queue_join(QueueJoinEvent::from(&bob)).await;

    assert_eq!(outcome, MatchOutcome::NoCompatiblePair);
    assert!(h.store.matches().await.is_empty());
    assert!(h.store.queue_entries().await.iter().all(|e| e.is_waiting()));
}

#[tokio::test]
async fn no_matches_are_made_right_before_the_slot() {
    let h = harness(at(12, 27));
    enqueue(&h.store, "alice", SLOT, MatchPreference::Any, at(12, 0)).await;
    let bob = enqueue(&h.store, "bob", SLOT, MatchPreference::Any, at(12, 27)).await;

    let outcome = h.matcher.on_queue_join(QueueJoinEvent::from(&bob)).await;

    assert_eq!(outcome, MatchOutcome::SkippedTooClose);
    assert!(h.store.matches().await.is_empty());
    assert!(h.store.queue_entries().await.iter().all(|e| e.is_waiting()));
}

#[tokio::test]
async fn urgent_matching_ignores_recent_history() {
    let h = harness(at(12, 20));
    h.store.put_match(past_match("a", "b", at(12, 20), 3)).await;
    enqueue(&h.store, "a", SLOT, MatchPreference::Any, at(11, 55)).await;
    enqueue(&h.store, "b", SLOT, MatchPreference::Any, at(11, 55)).await;
    let c = enqueue(&h.store, "c", SLOT, MatchPreference::Any, at(12, 19)).await;

    let outcome = h.matcher.on_queue_join(QueueJoinEvent::from(&c)).await;

    let MatchOutcome::Committed(record) = outcome else {
        panic!("expected a committed match, got {outcome:?}");
    };
    assert_eq!(pair_of(&record), set_of(&["a", "b"]));
    assert_eq!(h.store.recent_match_queries(), 0, "urgent mode must skip the lookup");
}

#[tokio::test]
async fn users_with_an_active_match_are_skipped() {
    let h = harness(at(12, 0));
    h.store.put_match(active_match("dana", "zoe", at(11, 0))).await;
    enqueue(&h.store, "dana", SLOT, MatchPreference::Any, at(11, 50)).await;
    let eve = enqueue(&h.store, "eve", SLOT, MatchPreference::Any, at(11, 55)).await;

    let outcome = h.matcher.on_queue_join(QueueJoinEvent::from(&eve)).await;

    assert_eq!(outcome, MatchOutcome::NotEnoughCandidates(1));
    assert_invariants(&h.store).await;
}

#[tokio::test]
async fn duplicate_entries_never_pair_a_user_with_themselves() {
    let h = harness(at(12, 0));
    enqueue(&h.store, "solo", SLOT, MatchPreference::Any, at(11, 50)).await;
    let again = enqueue(&h.store, "solo", SLOT, MatchPreference::Any, at(11, 55)).await;

    let outcome = h.matcher.on_queue_join(QueueJoinEvent::from(&again)).await;

    assert_eq!(outcome, MatchOutcome::NotEnoughCandidates(1));
}

#[tokio::test]
async fn set_queries_are_batched_to_the_store_limit() {
    let h = harness_with(MemoryStore::new().with_max_in_values(3), at(12, 0), 11);
    h.store.put_match(active_match("u0", "outsider", at(11, 0))).await;
    let mut last = None;
    for i in 0..10 {
        last = Some(enqueue(&h.store, &format!("u{i}"), SLOT, MatchPreference::Any, at(11, 40) + Duration::minutes(i)).await);
    }

    let outcome = h.matcher.on_queue_join(QueueJoinEvent::from(last.as_ref().unwrap())).await;

    let MatchOutcome::Committed(record) = outcome else {
        panic!("expected a committed match, got {outcome:?}");
    };
    assert!(!record.involves("u0"));
    assert_invariants(&h.store).await;
}

#[tokio::test]
async fn only_the_oldest_fifty_are_considered() {
    let h = harness(at(12, 0));
    for i in 0..60 {
        enqueue(&h.store, &format!("u{i:02}"), SLOT, MatchPreference::Any, at(11, 0) + Duration::seconds(i)).await;
    }

    let MatchOutcome::Committed(record) = h.matcher.process_slot(SLOT).await.unwrap() else {
        panic!("expected a committed match");
    };
    for user in &record.users {
        let index: i64 = user.trim_start_matches('u').parse().unwrap();
        assert!(index < 50, "{user} is outside the candidate window");
    }
}

#[tokio::test]
async fn repeated_triggers_drain_the_queue_pairwise() {
    let h = harness(at(12, 0));
    for (i, user) in ["a", "b", "c", "d", "e"].iter().enumerate() {
        enqueue(&h.store, user, SLOT, MatchPreference::Any, at(11, 30) + Duration::minutes(i as i64)).await;
    }

    let mut committed = 0;
    loop {
        match h.matcher.process_slot(SLOT).await.unwrap() {
            MatchOutcome::Committed(_) => committed += 1,
            MatchOutcome::NotEnoughCandidates(left) => {
                assert_eq!(left, 1);
                break;
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    assert_eq!(committed, 2);
    assert_eq!(h.store.queue_entries().await.iter().filter(|e| e.is_waiting()).count(), 1);
    assert_invariants(&h.store).await;
}

#[tokio::test]
async fn other_slots_are_left_alone() {
    let h = harness(at(12, 0));
    enqueue(&h.store, "a", SLOT, MatchPreference::Any, at(11, 50)).await;
    enqueue(&h.store, "b", "1:00 PM", MatchPreference::Any, at(11, 50)).await;

    assert_eq!(h.matcher.process_slot(SLOT).await.unwrap(), MatchOutcome::NotEnoughCandidates(1));
}

#[tokio::test]
async fn malformed_events_are_rejected_without_side_effects() {
    let h = harness(at(12, 0));
    enqueue(&h.store, "a", SLOT, MatchPreference::Any, at(11, 50)).await;
    enqueue(&h.store, "b", SLOT, MatchPreference::Any, at(11, 50)).await;

    let missing_user = QueueJoinEvent {
        time_slot: Some(SLOT.to_string()),
        ..QueueJoinEvent::default()
    };
    let missing_slot = QueueJoinEvent {
        user_id: Some("a".to_string()),
        ..QueueJoinEvent::default()
    };
    let bad_slot = QueueJoinEvent {
        user_id: Some("a".to_string()),
        time_slot: Some("lunchtime".to_string()),
        ..QueueJoinEvent::default()
    };

    for event in [missing_user, missing_slot, bad_slot] {
        let outcome = h.matcher.on_queue_join(event).await;
        assert!(matches!(outcome, MatchOutcome::Malformed(_)), "got {outcome:?}");
    }
    assert!(h.store.matches().await.is_empty());
}

#[tokio::test]
async fn store_failures_are_swallowed() {
    let h = harness(at(12, 0));
    let a = enqueue(&h.store, "a", SLOT, MatchPreference::Any, at(11, 50)).await;
    enqueue(&h.store, "b", SLOT, MatchPreference::Any, at(11, 50)).await;
    h.store.set_unavailable(true);

    let outcome = h.matcher.on_queue_join(QueueJoinEvent::from(&a)).await;

    assert!(matches!(outcome, MatchOutcome::Failed(_)), "got {outcome:?}");
    h.store.set_unavailable(false);
    assert!(h.store.matches().await.is_empty());

    // A later trigger picks the waiters up again.
    let retry = h.matcher.on_queue_join(QueueJoinEvent::from(&a)).await;
    assert!(matches!(retry, MatchOutcome::Committed(_)), "got {retry:?}");
}
