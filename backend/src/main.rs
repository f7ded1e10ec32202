use axum::Router;
use sidetable::{
    db::{migrations::run_migrations, DatabaseConfig, MatchStore, PgStore},
    get_db_pool,
    handlers::{api_router, AppState},
    matching::TimeWindow,
    services::{AutoCloser, Matcher, MatcherSettings},
    utils::{self, Clock, SystemClock},
    Config,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use axum::http::{HeaderValue, Method};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    utils::init_logging();

    let config = Config::from_env()?;
    let db_config = DatabaseConfig::from_env()?;
    let pool = get_db_pool(&db_config).await?;

    // Run migrations
    run_migrations(&pool).await?;

    let store: Arc<dyn MatchStore> = Arc::new(PgStore::new(pool));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let window = TimeWindow::new(config.slot_timezone);

    let settings = MatcherSettings {
        meetup_location: config.meetup_location.clone(),
        timeout: config.matching_timeout,
        ..MatcherSettings::default()
    };
    let matcher = Arc::new(Matcher::new(store.clone(), window, clock.clone(), settings));

    if config.run_auto_closer {
        let closer = AutoCloser::new(store.clone(), window, clock);
        let period = config.auto_close_interval;
        tokio::spawn(async move { closer.run(period).await });
        tracing::info!("🕐 Auto-closer running every {:?}", period);
    }

    let port = config.port;
    let app = create_router(AppState { store, matcher });

    let listener = tokio::net::TcpListener::bind(&format!("0.0.0.0:{}", port)).await?;
    tracing::info!("Server running on port {} (slots in {})", port, config.slot_timezone);

    axum::serve(listener, app).await?;

    Ok(())
}

fn create_router(state: AppState) -> Router {
    api_router(state)
        .layer(create_cors_layer())
        .layer(TraceLayer::new_for_http())
}

fn create_cors_layer() -> CorsLayer {
    let origins: Vec<HeaderValue> = std::env::var("ALLOWED_ORIGINS")
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(false);

    // No usable ALLOWED_ORIGINS means any origin.
    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(origins)
    }
}
