use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AppState;
use crate::{
    constants::is_valid_user_id,
    matching::{format_slot, parse_time_of_day},
    models::{Match, MatchPreference, QueueEntry},
    services::QueueJoinEvent,
};

#[derive(Debug, Deserialize)]
pub struct JoinQueueRequest {
    pub user_id: Option<String>,
    pub time_slot: Option<String>,
    #[serde(default)]
    pub match_preference: MatchPreference,
}

#[derive(Debug, Serialize)]
pub struct QueueError {
    pub error: String,
}

fn reject(status: StatusCode, error: impl Into<String>) -> (StatusCode, Json<QueueError>) {
    (status, Json(QueueError { error: error.into() }))
}

/// Adds the caller to the waiting queue and fires the matching trigger.
pub async fn join_queue(
    State(state): State<AppState>,
    payload: Result<Json<JoinQueueRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<QueueEntry>), (StatusCode, Json<QueueError>)> {
    let Json(req) = payload.map_err(|e| reject(StatusCode::BAD_REQUEST, e.body_text()))?;

    let user_id = req
        .user_id
        .as_deref()
        .map(str::trim)
        .filter(|u| is_valid_user_id(u))
        .ok_or_else(|| reject(StatusCode::BAD_REQUEST, "user_id is required"))?;

    let time_slot = req
        .time_slot
        .as_deref()
        .ok_or_else(|| reject(StatusCode::BAD_REQUEST, "time_slot is required"))?;
    let time_slot = parse_time_of_day(time_slot)
        .map(format_slot)
        .map_err(|e| reject(StatusCode::BAD_REQUEST, e.to_string()))?;

    let entry = QueueEntry::new(user_id, time_slot, req.match_preference, state.matcher.now());
    state.store.insert_queue_entry(&entry).await.map_err(|e| {
        tracing::error!("Failed to insert queue entry for {}: {}", entry.user_id, e);
        reject(StatusCode::INTERNAL_SERVER_ERROR, "Failed to join queue")
    })?;

    let matcher = state.matcher.clone();
    let event = QueueJoinEvent::from(&entry);
    tokio::spawn(async move {
        matcher.on_queue_join(event).await;
    });

    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn get_queue_entry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<QueueEntry>, (StatusCode, Json<QueueError>)> {
    match state.store.queue_entry(id).await {
        Ok(Some(entry)) => Ok(Json(entry)),
        Ok(None) => Err(reject(StatusCode::NOT_FOUND, "Queue entry not found")),
        Err(e) => {
            tracing::error!("Failed to load queue entry {}: {}", id, e);
            Err(reject(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load queue entry"))
        }
    }
}

pub async fn get_active_match(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Match>, (StatusCode, Json<QueueError>)> {
    match state.store.active_match_for_user(&user_id).await {
        Ok(Some(found)) => Ok(Json(found)),
        Ok(None) => Err(reject(StatusCode::NOT_FOUND, "No active match")),
        Err(e) => {
            tracing::error!("Failed to load active match for {}: {}", user_id, e);
            Err(reject(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load match"))
        }
    }
}
