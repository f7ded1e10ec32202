use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::HashSet;
use tracing::{debug, info};

use super::compatibility::ProfileDirectory;
use super::query_in_batches;
use crate::constants::{
    BASE_PAIR_SCORE, MAX_SCORE_JITTER, MAX_WAIT_SCORE, RECENT_MATCH_PENALTY, SAME_GENDER_BONUS,
    WAIT_SCORE_PER_MINUTE,
};
use crate::db::{MatchStore, StoreResult};
use crate::models::{Match, MatchPreference, QueueEntry};

fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Unordered user pairs that shared a finished match inside the lookback window.
#[derive(Debug, Clone, Default)]
pub struct RecentMatchIndex {
    pairs: HashSet<(String, String)>,
}

impl RecentMatchIndex {
    pub fn from_matches<'a>(matches: impl IntoIterator<Item = &'a Match>) -> Self {
        let pairs = matches
            .into_iter()
            .filter_map(|m| match m.users.as_slice() {
                [a, b] => Some(pair_key(a, b)),
                _ => None,
            })
            .collect();
        Self { pairs }
    }

    pub fn contains(&self, a: &str, b: &str) -> bool {
        self.pairs.contains(&pair_key(a, b))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

pub async fn load_recent_matches(
    store: &dyn MatchStore,
    user_ids: &[String],
    since: DateTime<Utc>,
) -> StoreResult<RecentMatchIndex> {
    let recent = query_in_batches(user_ids, store.max_in_values(), |chunk| {
        store.recent_matches_for_users(chunk, since)
    })
    .await?;

    Ok(RecentMatchIndex::from_matches(&recent))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringContext {
    pub now: DateTime<Utc>,
    /// Urgent slot or only two candidates left: the rematch penalty is off.
    pub force_match: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectedPair {
    pub first: QueueEntry,
    pub second: QueueEntry,
    /// `None` when the pair was taken on the two-candidate fast path.
    pub score: Option<f64>,
}

fn is_eligible(a: &QueueEntry, b: &QueueEntry, profiles: &ProfileDirectory) -> bool {
    a.user_id != b.user_id && profiles.is_compatible(a, b)
}

/// Deterministic part of a pair's score; the caller adds jitter.
pub fn base_score(
    a: &QueueEntry,
    b: &QueueEntry,
    profiles: &ProfileDirectory,
    recent: &RecentMatchIndex,
    ctx: ScoringContext,
) -> f64 {
    let mut score = BASE_PAIR_SCORE;

    if !ctx.force_match && recent.contains(&a.user_id, &b.user_id) {
        debug!("Recent match: {} & {}", a.user_id, b.user_id);
        score -= RECENT_MATCH_PENALTY;
    }

    let waited_a = (ctx.now - a.created_at).num_milliseconds() as f64;
    let waited_b = (ctx.now - b.created_at).num_milliseconds() as f64;
    let avg_wait_minutes = (waited_a + waited_b) / 2.0 / 60_000.0;
    score += (avg_wait_minutes * WAIT_SCORE_PER_MINUTE).clamp(0.0, MAX_WAIT_SCORE);

    let both_same_gender = a.match_preference == MatchPreference::SameGender
        && b.match_preference == MatchPreference::SameGender;
    if both_same_gender && profiles.genders_match(a, b) {
        score += SAME_GENDER_BONUS;
    }

    score
}

/// Picks the highest scoring eligible pair among `candidates`.
///
/// With exactly two candidates the pair is returned unscored if eligible.
pub fn select_best_pair<R: Rng>(
    candidates: &[QueueEntry],
    profiles: &ProfileDirectory,
    recent: &RecentMatchIndex,
    ctx: ScoringContext,
    rng: &mut R,
) -> Option<SelectedPair> {
    if let [a, b] = candidates {
        if !is_eligible(a, b, profiles) {
            return None;
        }
        info!("🚀 Only 2 students - matching {} & {} now", a.user_id, b.user_id);
        return Some(SelectedPair {
            first: a.clone(),
            second: b.clone(),
            score: None,
        });
    }

    let mut best: Option<(usize, usize, f64)> = None;
    for i in 0..candidates.len() {
        for j in (i + 1)..candidates.len() {
            let (a, b) = (&candidates[i], &candidates[j]);
            if !is_eligible(a, b, profiles) {
                continue;
            }

            let score = base_score(a, b, profiles, recent, ctx) + rng.random_range(0.0..MAX_SCORE_JITTER);
            if best.is_none_or(|(_, _, top)| score > top) {
                best = Some((i, j, score));
            }
        }
    }

    let (i, j, score) = best?;
    info!(
        "🎯 Best match: {} & {} (score: {:.1})",
        candidates[i].user_id, candidates[j].user_id, score
    );
    Some(SelectedPair {
        first: candidates[i].clone(),
        second: candidates[j].clone(),
        score: Some(score),
    })
}
