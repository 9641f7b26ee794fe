use crate::core::SchedulerError;
use crate::scheduler::{DEFAULT_HISTORY_CAPACITY, Trigger};
use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://db.sqlite3";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database_url: String,
    pub update_hour: u32,
    pub update_minute: u32,
    /// Replaces the daily hour/minute trigger when set
    pub update_cron: Option<String>,
    pub history_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            update_hour: 0,
            update_minute: 0,
            update_cron: None,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl AppConfig {
    /// Read from the environment, loading `.env` first if present
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Ok(Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            update_hour: parse_env("LIFE_UPDATE_HOUR", defaults.update_hour)?,
            update_minute: parse_env("LIFE_UPDATE_MINUTE", defaults.update_minute)?,
            update_cron: env::var("LIFE_UPDATE_CRON")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            history_capacity: parse_env("RUN_HISTORY_CAPACITY", defaults.history_capacity)?,
        })
    }

    /// Trigger for the lifecycle job
    pub fn trigger(&self) -> std::result::Result<Trigger, SchedulerError> {
        match &self.update_cron {
            Some(expression) => Trigger::cron(expression),
            None => Trigger::daily(self.update_hour, self.update_minute),
        }
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        Err(_) => Ok(default),
    }
}
