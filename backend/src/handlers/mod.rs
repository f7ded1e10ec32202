pub mod queue;

pub use queue::{get_active_match, get_queue_entry, join_queue};

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::{db::MatchStore, services::Matcher};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MatchStore>,
    pub matcher: Arc<Matcher>,
}

pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/queue", post(join_queue))
        .route("/api/queue/{id}", get(get_queue_entry))
        .route("/api/users/{user_id}/match", get(get_active_match))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
