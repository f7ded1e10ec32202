use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{check_in_values, MatchStore, StoreResult, StoreTransaction};
use crate::models::{Match, MatchCompletion, QueueEntry, UserProfile};

/// PostgreSQL-backed store. Transactions run at SERIALIZABLE isolation, so
/// the final race check in a commit and the writes it guards are atomic with
/// respect to every other commit touching the same rows or predicates.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl MatchStore for PgStore {
    async fn insert_queue_entry(&self, entry: &QueueEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO queue_entries
                (id, user_id, time_slot, match_preference, status, created_at, matched_with, match_id, matched_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.user_id)
        .bind(&entry.time_slot)
        .bind(entry.match_preference)
        .bind(entry.status)
        .bind(entry.created_at)
        .bind(&entry.matched_with)
        .bind(&entry.match_id)
        .bind(entry.matched_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn queue_entry(&self, id: Uuid) -> StoreResult<Option<QueueEntry>> {
        let entry = sqlx::query_as::<_, QueueEntry>(
            r#"
            SELECT id, user_id, time_slot, match_preference, status, created_at, matched_with, match_id, matched_at
            FROM queue_entries
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    async fn waiting_entries(&self, time_slot: &str, limit: i64) -> StoreResult<Vec<QueueEntry>> {
        let entries = sqlx::query_as::<_, QueueEntry>(
            r#"
            SELECT id, user_id, time_slot, match_preference, status, created_at, matched_with, match_id, matched_at
            FROM queue_entries
            WHERE time_slot = $1 AND status = 'waiting'
            ORDER BY created_at ASC
            LIMIT $2
            "#,
        )
        .bind(time_slot)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    async fn active_matches_for_users(&self, user_ids: &[String]) -> StoreResult<Vec<Match>> {
        check_in_values(user_ids, self.max_in_values())?;
        let matches = sqlx::query_as::<_, Match>(
            r#"
            SELECT id, match_id, users, time_slot, status, match_type, match_date, matched_at,
                   meetup_location, match_preferences, meeting_time, closure_time, completed_at
            FROM matches
            WHERE status = 'active' AND users && $1
            "#,
        )
        .bind(user_ids.to_vec())
        .fetch_all(&self.pool)
        .await?;

        Ok(matches)
    }

    async fn recent_matches_for_users(
        &self,
        user_ids: &[String],
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<Match>> {
        check_in_values(user_ids, self.max_in_values())?;
        let matches = sqlx::query_as::<_, Match>(
            r#"
            SELECT id, match_id, users, time_slot, status, match_type, match_date, matched_at,
                   meetup_location, match_preferences, meeting_time, closure_time, completed_at
            FROM matches
            WHERE status IN ('completed', 'cancelled') AND matched_at >= $2 AND users && $1
            "#,
        )
        .bind(user_ids.to_vec())
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(matches)
    }

    async fn user_profiles(&self, user_ids: &[String]) -> StoreResult<Vec<UserProfile>> {
        check_in_values(user_ids, self.max_in_values())?;
        let profiles = sqlx::query_as::<_, UserProfile>(
            "SELECT user_id, gender FROM user_profiles WHERE user_id = ANY($1)",
        )
        .bind(user_ids.to_vec())
        .fetch_all(&self.pool)
        .await?;

        Ok(profiles)
    }

    async fn active_matches(&self) -> StoreResult<Vec<Match>> {
        let matches = sqlx::query_as::<_, Match>(
            r#"
            SELECT id, match_id, users, time_slot, status, match_type, match_date, matched_at,
                   meetup_location, match_preferences, meeting_time, closure_time, completed_at
            FROM matches
            WHERE status = 'active'
            ORDER BY matched_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(matches)
    }

    async fn active_match_for_user(&self, user_id: &str) -> StoreResult<Option<Match>> {
        let found = sqlx::query_as::<_, Match>(
            r#"
            SELECT id, match_id, users, time_slot, status, match_type, match_date, matched_at,
                   meetup_location, match_preferences, meeting_time, closure_time, completed_at
            FROM matches
            WHERE status = 'active' AND $1 = ANY(users)
            ORDER BY matched_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(found)
    }

    async fn complete_matches(&self, completions: &[MatchCompletion]) -> StoreResult<u64> {
        if completions.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut completed = 0;
        for completion in completions {
            let result = sqlx::query(
                r#"
                UPDATE matches
                SET status = 'completed', completed_at = $2, meeting_time = $3, closure_time = $4
                WHERE id = $1 AND status = 'active'
                "#,
            )
            .bind(completion.id)
            .bind(completion.completed_at)
            .bind(completion.meeting_time)
            .bind(completion.closure_time)
            .execute(&mut *tx)
            .await?;
            completed += result.rows_affected();
        }
        tx.commit().await?;

        Ok(completed)
    }

    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        Ok(Box::new(PgStoreTransaction { tx }))
    }
}

pub struct PgStoreTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgStoreTransaction {
    async fn queue_entry(&mut self, id: Uuid) -> StoreResult<Option<QueueEntry>> {
        let entry = sqlx::query_as::<_, QueueEntry>(
            r#"
            SELECT id, user_id, time_slot, match_preference, status, created_at, matched_with, match_id, matched_at
            FROM queue_entries
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(entry)
    }

    async fn active_matches_for_users(&mut self, user_ids: &[String]) -> StoreResult<Vec<Match>> {
        let matches = sqlx::query_as::<_, Match>(
            r#"
            SELECT id, match_id, users, time_slot, status, match_type, match_date, matched_at,
                   meetup_location, match_preferences, meeting_time, closure_time, completed_at
            FROM matches
            WHERE status = 'active' AND users && $1
            "#,
        )
        .bind(user_ids.to_vec())
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(matches)
    }

    async fn insert_match(&mut self, record: &Match) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO matches
                (id, match_id, users, time_slot, status, match_type, match_date, matched_at,
                 meetup_location, match_preferences, meeting_time, closure_time, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(record.id)
        .bind(&record.match_id)
        .bind(&record.users)
        .bind(&record.time_slot)
        .bind(record.status)
        .bind(&record.match_type)
        .bind(record.match_date)
        .bind(record.matched_at)
        .bind(&record.meetup_location)
        .bind(&record.match_preferences)
        .bind(record.meeting_time)
        .bind(record.closure_time)
        .bind(record.completed_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn update_queue_entry(&mut self, entry: &QueueEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE queue_entries
            SET status = $2, matched_with = $3, match_id = $4, matched_at = $5
            WHERE id = $1
            "#,
        )
        .bind(entry.id)
        .bind(entry.status)
        .bind(&entry.matched_with)
        .bind(&entry.match_id)
        .bind(entry.matched_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
