use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::constants::MEETING_DURATION_MINUTES;
use crate::db::{MatchStore, StoreResult};
use crate::matching::{SlotError, TimeWindow};
use crate::models::{Match, MatchCompletion};
use crate::utils::clock::Clock;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub completed: u64,
    pub unresolved: usize,
}

/// Completion for `record` if its meeting window has elapsed at `now`.
///
/// The meeting is the first occurrence of the slot after the match was made.
pub fn due_completion(
    window: &TimeWindow,
    record: &Match,
    now: DateTime<Utc>,
) -> Result<Option<MatchCompletion>, SlotError> {
    let meeting_time = window.next_occurrence(&record.time_slot, record.matched_at)?;
    let closure_time = meeting_time + ChronoDuration::minutes(MEETING_DURATION_MINUTES);

    if now < closure_time {
        return Ok(None);
    }

    Ok(Some(MatchCompletion {
        id: record.id,
        meeting_time,
        closure_time,
        completed_at: now,
    }))
}

/// Periodic sweep that completes matches whose meeting window is over.
pub struct AutoCloser {
    store: Arc<dyn MatchStore>,
    window: TimeWindow,
    clock: Arc<dyn Clock>,
}

impl AutoCloser {
    pub fn new(store: Arc<dyn MatchStore>, window: TimeWindow, clock: Arc<dyn Clock>) -> Self {
        Self { store, window, clock }
    }

    pub async fn sweep(&self) -> StoreResult<SweepReport> {
        self.sweep_at(self.clock.now()).await
    }

    /// One pass over all active matches. A failed batch write is returned
    /// as-is; nothing from the batch is applied.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> StoreResult<SweepReport> {
        let active = self.store.active_matches().await?;
        let mut report = SweepReport {
            scanned: active.len(),
            ..SweepReport::default()
        };

        let mut due = Vec::new();
        for record in &active {
            match due_completion(&self.window, record, now) {
                Ok(Some(completion)) => {
                    debug!(
                        "Match {} met at {} and closes at {}",
                        record.match_id, completion.meeting_time, completion.closure_time
                    );
                    due.push(completion);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Cannot resolve meeting time for match {}: {}", record.match_id, e);
                    report.unresolved += 1;
                }
            }
        }

        if !due.is_empty() {
            report.completed = self.store.complete_matches(&due).await?;
            info!("✅ Auto-closed {} of {} active matches", report.completed, report.scanned);
        }

        Ok(report)
    }

    /// Sweeps forever on `period`. Failed sweeps are retried whole on the next tick.
    pub async fn run(&self, period: Duration) {
        let mut interval = time::interval(period);
        let mut iter_count: usize = 0;

        loop {
            interval.tick().await;
            iter_count += 1;

            match self.sweep().await {
                Ok(report) if report.completed > 0 => {
                    info!("🧹 Sweep {} closed {} matches", iter_count, report.completed);
                }
                Ok(report) => {
                    debug!("📊 Sweep {} found {} active matches, none due", iter_count, report.scanned);
                }
                Err(e) => {
                    error!("❌ Auto-close sweep {} failed, retrying next tick: {}", iter_count, e);
                }
            }
        }
    }
}
