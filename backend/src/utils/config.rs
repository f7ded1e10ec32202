use anyhow::Result;
use chrono_tz::Tz;
use std::env;
use std::time::Duration;
use crate::constants::{
    AUTO_CLOSE_INTERVAL_SECS, DEFAULT_MATCHING_TIMEOUT_SECS, DEFAULT_MEETUP_LOCATION, DEFAULT_SERVER_PORT,
    DEFAULT_SLOT_TIMEZONE,
};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub slot_timezone: Tz,
    pub meetup_location: String,
    pub matching_timeout: Duration,
    pub auto_close_interval: Duration,
    pub run_auto_closer: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let timezone_name = env::var("SLOT_TIMEZONE").unwrap_or_else(|_| DEFAULT_SLOT_TIMEZONE.to_string());
        let slot_timezone: Tz = timezone_name
            .parse()
            .map_err(|e| anyhow::anyhow!("SLOT_TIMEZONE {:?} is not a valid IANA timezone: {}", timezone_name, e))?;

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            port: env::var("PORT")
                .unwrap_or_else(|_| DEFAULT_SERVER_PORT.to_string())
                .parse()
                .unwrap_or(DEFAULT_SERVER_PORT),
            slot_timezone,
            meetup_location: env::var("MEETUP_LOCATION")
                .unwrap_or_else(|_| DEFAULT_MEETUP_LOCATION.to_string()),
            matching_timeout: Duration::from_secs(
                env::var("MATCHING_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_MATCHING_TIMEOUT_SECS),
            ),
            auto_close_interval: Duration::from_secs(
                env::var("AUTO_CLOSE_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(AUTO_CLOSE_INTERVAL_SECS),
            ),
            run_auto_closer: env::var("RUN_AUTO_CLOSER")
                .map(|v| !matches!(v.trim().to_lowercase().as_str(), "false" | "0" | "no"))
                .unwrap_or(true),
        })
    }
}
