use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::MatchPreference;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "match_status", rename_all = "snake_case")]
pub enum MatchStatus {
    Active,
    Completed,
    /// Written by external tooling only; the matcher never cancels.
    Cancelled,
}

/// A committed two-person pairing for a time slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Match {
    pub id: Uuid,
    pub match_id: String,
    pub users: Vec<String>,
    pub time_slot: String,
    pub status: MatchStatus,
    pub match_type: String,
    pub match_date: NaiveDate,
    pub matched_at: DateTime<Utc>,
    pub meetup_location: String,
    pub match_preferences: Json<BTreeMap<String, MatchPreference>>,
    pub meeting_time: Option<DateTime<Utc>>,
    pub closure_time: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Match {
    pub fn is_active(&self) -> bool {
        self.status == MatchStatus::Active
    }

    pub fn involves(&self, user_id: &str) -> bool {
        self.users.iter().any(|u| u == user_id)
    }

    /// The other participant, if `user_id` is one of the pair.
    pub fn partner_of(&self, user_id: &str) -> Option<&str> {
        if !self.involves(user_id) {
            return None;
        }
        self.users.iter().find(|u| *u != user_id).map(String::as_str)
    }
}

/// Audit data written when the auto-closer completes a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchCompletion {
    pub id: Uuid,
    pub meeting_time: DateTime<Utc>,
    pub closure_time: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}
