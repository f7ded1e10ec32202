use std::collections::HashMap;
use tracing::warn;

use super::query_in_batches;
use crate::db::{MatchStore, StoreResult};
use crate::models::{MatchPreference, QueueEntry};

fn normalize(gender: Option<&str>) -> Option<String> {
    gender
        .map(|g| g.trim().to_lowercase())
        .filter(|g| !g.is_empty())
}

/// Whether two people may be paired.
///
/// Only a `same_gender` preference with two known, differing genders blocks
/// a pair. Unknown genders never block.
pub fn compatible(
    pref_a: MatchPreference,
    gender_a: Option<&str>,
    pref_b: MatchPreference,
    gender_b: Option<&str>,
) -> bool {
    let wants_same = pref_a == MatchPreference::SameGender || pref_b == MatchPreference::SameGender;
    if !wants_same {
        return true;
    }

    match (normalize(gender_a), normalize(gender_b)) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

/// True when both genders are known and equal.
pub fn genders_match(gender_a: Option<&str>, gender_b: Option<&str>) -> bool {
    matches!((normalize(gender_a), normalize(gender_b)), (Some(a), Some(b)) if a == b)
}

/// Genders of the candidates in one matching attempt, keyed by user id.
#[derive(Debug, Clone, Default)]
pub struct ProfileDirectory {
    genders: HashMap<String, Option<String>>,
}

impl ProfileDirectory {
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, Option<S>)>,
        S: Into<String>,
    {
        Self {
            genders: pairs
                .into_iter()
                .map(|(user, gender)| (user.into(), gender.map(Into::into)))
                .collect(),
        }
    }

    pub fn gender_of(&self, user_id: &str) -> Option<&str> {
        self.genders.get(user_id).and_then(|g| g.as_deref())
    }

    pub fn is_compatible(&self, a: &QueueEntry, b: &QueueEntry) -> bool {
        let gender_a = self.gender_of(&a.user_id);
        let gender_b = self.gender_of(&b.user_id);

        let wants_same = a.match_preference == MatchPreference::SameGender
            || b.match_preference == MatchPreference::SameGender;
        if wants_same && (normalize(gender_a).is_none() || normalize(gender_b).is_none()) {
            warn!(
                "Gender unknown for {} or {}, treating same-gender request as compatible",
                a.user_id, b.user_id
            );
        }

        compatible(a.match_preference, gender_a, b.match_preference, gender_b)
    }

    pub fn genders_match(&self, a: &QueueEntry, b: &QueueEntry) -> bool {
        genders_match(self.gender_of(&a.user_id), self.gender_of(&b.user_id))
    }
}

/// Fetches profiles for every distinct user id, batched to the store's set limit.
pub async fn load_profiles(store: &dyn MatchStore, user_ids: &[String]) -> StoreResult<ProfileDirectory> {
    let profiles = query_in_batches(user_ids, store.max_in_values(), |chunk| store.user_profiles(chunk)).await?;

    let mut genders: HashMap<String, Option<String>> =
        user_ids.iter().map(|id| (id.clone(), None)).collect();
    for profile in profiles {
        genders.insert(profile.user_id, profile.gender);
    }

    Ok(ProfileDirectory { genders })
}
