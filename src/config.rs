//! Labeler configuration
//!
//! Read from the environment (after `.env` is loaded). Credentials are
//! required; everything else has a default.

use chrono::FixedOffset;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{LabelerError, Result};
use crate::fortune::{offset_hours, AssignmentMode};
use crate::orchestrator::{EngineSettings, SchedulerSettings};

#[derive(Debug, Clone)]
pub struct LabelerConfig {
    /// DID of the labeler account; also the account whose followers are members
    pub labeler_did: String,
    pub labeler_password: String,
    pub db_path: PathBuf,
    pub port: u16,
    pub bsky_service: String,
    pub utc_offset: FixedOffset,
    pub day_poll_interval: Duration,
    pub notification_poll_interval: Duration,
    pub member_pacing: Duration,
    pub page_pacing: Duration,
    pub http_timeout: Duration,
    pub run_on_startup: bool,
    pub startup_delay: Duration,
    pub assignment_mode: AssignmentMode,
}

impl LabelerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| LabelerError::Config(format!("{} must be set", key)))
        };

        let offset_hours_value: i32 = parse_or(&get, "FORTUNE_UTC_OFFSET_HOURS", 9)?;
        let utc_offset = offset_hours(offset_hours_value).ok_or_else(|| {
            LabelerError::Config(format!("FORTUNE_UTC_OFFSET_HOURS out of range: {}", offset_hours_value))
        })?;

        Ok(Self {
            labeler_did: required("LABELER_DID")?,
            labeler_password: required("LABELER_PASSWORD")?,
            db_path: get("DB_PATH").unwrap_or_else(|| "data/labels.db".to_string()).into(),
            port: parse_or(&get, "PORT", 3000)?,
            bsky_service: get("BSKY_SERVICE").unwrap_or_else(|| "https://bsky.social".to_string()),
            utc_offset,
            day_poll_interval: Duration::from_secs(parse_or(&get, "DAY_POLL_SECS", 60)?),
            notification_poll_interval: Duration::from_secs(parse_or(&get, "NOTIFICATION_POLL_SECS", 30)?),
            member_pacing: Duration::from_millis(parse_or(&get, "MEMBER_PACING_MS", 50)?),
            page_pacing: Duration::from_millis(parse_or(&get, "PAGE_PACING_MS", 100)?),
            http_timeout: Duration::from_secs(parse_or(&get, "HTTP_TIMEOUT_SECS", 30)?),
            run_on_startup: parse_or(&get, "RUN_ON_STARTUP", true)?,
            startup_delay: Duration::from_secs(parse_or(&get, "STARTUP_DELAY_SECS", 10)?),
            assignment_mode: parse_or(&get, "ASSIGNMENT_MODE", AssignmentMode::Daily)?,
        })
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            member_pacing: self.member_pacing,
            page_pacing: self.page_pacing,
            offset: self.utc_offset,
        }
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            poll_interval: self.day_poll_interval,
            run_on_startup: self.run_on_startup,
            startup_delay: self.startup_delay,
        }
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| LabelerError::Config(format!("invalid {} '{}': {}", key, raw, e))),
        None => Ok(default),
    }
}
