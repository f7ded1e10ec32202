pub mod models;
pub mod db;
pub mod matching;
pub mod services;
pub mod handlers;
pub mod utils;
pub mod constants;

pub use utils::config::Config;
pub use db::connection::get_db_pool;

// Re-export common types
pub use sqlx::PgPool;
pub use anyhow::Result;
pub use uuid::Uuid;
pub use chrono::{DateTime, Utc};
