use anyhow::Result;
use clap::Parser;
use sidetable::{
    db::{get_db_pool, DatabaseConfig, MatchStore, PgStore},
    matching::TimeWindow,
    services::AutoCloser,
    utils::{init_logging, Clock, Config, SystemClock},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "auto_closer", about = "Complete side-table matches whose meeting window has passed")]
struct Args {
    /// Run a single sweep and exit
    #[arg(long)]
    once: bool,

    /// Override the sweep interval in seconds
    #[arg(long)]
    interval_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    info!("🕐 Starting Side-Table Auto-Closer...");

    let config = Config::from_env()?;
    let db_config = DatabaseConfig::from_env()?;
    let pool = get_db_pool(&db_config).await?;

    let store: Arc<dyn MatchStore> = Arc::new(PgStore::new(pool));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let closer = AutoCloser::new(store, TimeWindow::new(config.slot_timezone), clock);

    if args.once {
        // A failed batch exits non-zero so the scheduler reruns the whole sweep.
        let report = closer.sweep().await?;
        info!(
            "✅ Sweep done: {} scanned, {} completed, {} unresolved",
            report.scanned, report.completed, report.unresolved
        );
        return Ok(());
    }

    let period = args
        .interval_secs
        .map(Duration::from_secs)
        .unwrap_or(config.auto_close_interval);
    closer.run(period).await;

    Ok(())
}
