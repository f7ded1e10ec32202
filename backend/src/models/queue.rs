use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "match_preference", rename_all = "snake_case")]
pub enum MatchPreference {
    #[default]
    Any,
    SameGender,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "queue_status", rename_all = "snake_case")]
pub enum QueueStatus {
    Waiting,
    Matched,
}

/// One person's pending request to be matched for a time slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct QueueEntry {
    pub id: Uuid,
    pub user_id: String,
    pub time_slot: String,
    pub match_preference: MatchPreference,
    pub status: QueueStatus,
    pub created_at: DateTime<Utc>,
    pub matched_with: Option<String>,
    pub match_id: Option<String>,
    pub matched_at: Option<DateTime<Utc>>,
}

impl QueueEntry {
    pub fn new(
        user_id: impl Into<String>,
        time_slot: impl Into<String>,
        match_preference: MatchPreference,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            time_slot: time_slot.into(),
            match_preference,
            status: QueueStatus::Waiting,
            created_at,
            matched_with: None,
            match_id: None,
            matched_at: None,
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.status == QueueStatus::Waiting
    }

    pub fn mark_matched(&mut self, partner: &str, match_id: &str, matched_at: DateTime<Utc>) {
        self.status = QueueStatus::Matched;
        self.matched_with = Some(partner.to_string());
        self.match_id = Some(match_id.to_string());
        self.matched_at = Some(matched_at);
    }
}
