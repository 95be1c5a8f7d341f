//! Service configuration
//!
//! Studio policy is read with the `config` crate from `STUDIO_*` environment
//! variables layered over defaults; the listener address comes from the
//! environment the same way the database settings do.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use config::{Config, ConfigError, Environment};
use serde::Deserialize;

use crate::calendar;

/// Studio policy knobs
#[derive(Debug, Clone, Deserialize)]
pub struct StudioConfig {
    /// Minimum notice for a client cancellation, in hours
    pub cancellation_window_hours: i64,
    /// Offset of the studio's wall clock from UTC, in minutes
    pub utc_offset_minutes: i32,
    /// Capacity for classes created without an explicit one
    pub default_capacity: i32,
    /// Name for classes created without an explicit one
    pub default_class_name: String,
    /// How many days past classes are kept before purging
    pub retention_days: i64,
    /// How many days before expiry a package holder is warned
    pub expiry_warning_days: i64,
    /// How many days a batch create lays out
    pub batch_days: u32,
}

impl StudioConfig {
    /// Load defaults, then override from `STUDIO_*` variables
    ///
    /// # Environment Variables
    /// - `STUDIO_CANCELLATION_WINDOW_HOURS` (default: 8)
    /// - `STUDIO_UTC_OFFSET_MINUTES` (default: 0)
    /// - `STUDIO_DEFAULT_CAPACITY` (default: 10)
    /// - `STUDIO_DEFAULT_CLASS_NAME` (default: "Studio Class")
    /// - `STUDIO_RETENTION_DAYS` (default: 7)
    /// - `STUDIO_EXPIRY_WARNING_DAYS` (default: 3)
    /// - `STUDIO_BATCH_DAYS` (default: 365)
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("cancellation_window_hours", 8)?
            .set_default("utc_offset_minutes", 0)?
            .set_default("default_capacity", 10)?
            .set_default("default_class_name", "Studio Class")?
            .set_default("retention_days", 7)?
            .set_default("expiry_warning_days", 3)?
            .set_default("batch_days", 365)?
            .add_source(Environment::with_prefix("STUDIO").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    pub fn cancellation_window(&self) -> Duration {
        Duration::hours(self.cancellation_window_hours)
    }

    pub fn utc_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is valid"))
    }

    /// Today's date on the studio's wall clock
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        calendar::studio_today(now, self.utc_offset())
    }
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            cancellation_window_hours: 8,
            utc_offset_minutes: 0,
            default_capacity: 10,
            default_class_name: "Studio Class".to_string(),
            retention_days: 7,
            expiry_warning_days: 3,
            batch_days: 365,
        }
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    /// Create a new ServerConfig from environment variables
    ///
    /// # Environment Variables
    /// - `API_HOST` (default: "0.0.0.0")
    /// - `API_PORT` (default: 3001)
    pub fn from_env() -> Self {
        let host = std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = std::env::var("API_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3001);

        Self { host, port }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
