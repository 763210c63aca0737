//! Configuration management for Nereus
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files. The config file location can be overridden
//! with the `NEREUS_CONFIG` environment variable.

use crate::error::{NereusError, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::Path;

mod defaults;

/// Longest accepted backfill, fetch span or revision lookback
pub const MAX_WINDOW_DAYS: u32 = 3650;

/// Longest accepted presumed session validity (one week)
pub const MAX_SESSION_VALIDITY_MINUTES: u64 = 7 * 24 * 60;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Provider account credentials and meter selection
    pub account: AccountConfig,

    /// Unit price used to derive the cost series
    pub pricing: PricingConfig,

    /// Sync window and schedule
    pub sync: SyncConfig,

    /// Session lifetime and login retry policy
    pub session: SessionConfig,

    /// Retry policy for meter reads
    pub fetch: FetchConfig,

    /// Statistic ids and names published to the sink
    pub statistics: StatisticsConfig,

    /// File locations for the statistics store and sync state
    pub storage: StorageConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Provider timezone; days and fire times are interpreted in it
    pub timezone: String,
}

/// Provider account
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Login e-mail
    pub username: String,

    /// Login password
    pub password: String,

    /// Contract account number shown on the bill
    pub account_number: String,

    /// Smart meter id
    pub meter_id: String,

    /// OAuth client id of the provider web portal
    pub client_id: String,
}

/// Pricing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Cost per litre
    pub liter_cost: f64,

    /// Currency code used as the cost series unit
    pub currency: String,

    /// Lowest accepted cost per litre
    pub min_liter_cost: f64,

    /// Highest accepted cost per litre
    pub max_liter_cost: f64,
}

/// Sync window and schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Days imported on the first run (no cursor yet)
    pub backfill_days: u32,

    /// Longest date range requested in one cycle
    pub max_fetch_span_days: u32,

    /// Already-imported days re-requested each cycle to pick up provider revisions
    pub revision_lookback_days: u32,

    /// Hours of the day (provider timezone) at which a cycle fires
    pub fetch_hours: Vec<u8>,

    /// Minute past the hour; a random minute in 0..=10 is chosen when unset
    pub fetch_minute: Option<u8>,

    /// Run one cycle right after startup
    pub run_on_startup: bool,
}

/// Session lifetime and login retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Presumed validity of a portal session
    pub validity_minutes: u64,

    /// Login attempts before surfacing an authentication error
    pub login_max_attempts: u32,

    /// Fixed delay between login attempts
    pub login_retry_delay_ms: u64,
}

/// Retry policy for meter reads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Attempts per day before a transient failure is surfaced
    pub max_attempts: u32,

    /// Initial backoff, doubled per attempt
    pub retry_delay_ms: u64,

    /// Backoff ceiling
    pub max_retry_delay_ms: u64,

    /// Per-request HTTP timeout
    pub request_timeout_secs: u64,
}

/// Statistic series published to the sink
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    pub consumption_id: String,
    pub consumption_name: String,
    pub cost_id: String,
    pub cost_name: String,
}

/// File locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Statistics store (both series)
    pub statistics_file: String,

    /// Sync cursor and runtime overrides
    pub state_file: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional console-specific level
    pub console_level: Option<String>,

    /// Optional file-specific level
    pub file_level: Option<String>,

    /// Path to log file (its directory receives the daily rolled files)
    pub file: String,

    /// Number of rolled files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from `NEREUS_CONFIG` or the default locations
    pub fn load() -> Result<Self> {
        if let Some(path) = std::env::var_os("NEREUS_CONFIG") {
            return Self::from_file(path);
        }

        let default_paths = [
            "nereus_config.yaml",
            "/data/nereus_config.yaml",
            "/etc/nereus/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parsed provider timezone
    pub fn tz(&self) -> Result<Tz> {
        self.timezone.parse::<Tz>().map_err(|e| {
            NereusError::validation("timezone", format!("Unknown timezone: {}", e))
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.account.username.trim().is_empty() {
            return Err(NereusError::validation(
                "account.username",
                "Username cannot be empty",
            ));
        }
        if self.account.password.is_empty() {
            return Err(NereusError::validation(
                "account.password",
                "Password cannot be empty",
            ));
        }
        if self.account.account_number.trim().is_empty() {
            return Err(NereusError::validation(
                "account.account_number",
                "Account number cannot be empty",
            ));
        }
        if self.account.meter_id.trim().is_empty() {
            return Err(NereusError::validation(
                "account.meter_id",
                "Meter id cannot be empty",
            ));
        }

        self.pricing.validate_liter_cost(self.pricing.liter_cost)?;
        if !(self.pricing.min_liter_cost > 0.0
            && self.pricing.min_liter_cost <= self.pricing.max_liter_cost)
        {
            return Err(NereusError::validation(
                "pricing.min_liter_cost",
                "Must be positive and not above max_liter_cost",
            ));
        }

        for (field, days) in [
            ("sync.backfill_days", self.sync.backfill_days),
            ("sync.max_fetch_span_days", self.sync.max_fetch_span_days),
        ] {
            if days == 0 || days > MAX_WINDOW_DAYS {
                return Err(NereusError::validation(
                    field,
                    format!("Must be between 1 and {}", MAX_WINDOW_DAYS),
                ));
            }
        }
        if self.sync.revision_lookback_days > MAX_WINDOW_DAYS {
            return Err(NereusError::validation(
                "sync.revision_lookback_days",
                format!("Must be at most {}", MAX_WINDOW_DAYS),
            ));
        }
        if self.sync.fetch_hours.is_empty() {
            return Err(NereusError::validation(
                "sync.fetch_hours",
                "At least one hour is required",
            ));
        }
        if let Some(h) = self.sync.fetch_hours.iter().find(|h| **h > 23) {
            return Err(NereusError::validation(
                "sync.fetch_hours",
                format!("Hour {} is outside 0..=23", h),
            ));
        }
        if let Some(m) = self.sync.fetch_minute
            && m > 59
        {
            return Err(NereusError::validation(
                "sync.fetch_minute",
                format!("Minute {} is outside 0..=59", m),
            ));
        }

        if self.session.validity_minutes == 0
            || self.session.validity_minutes > MAX_SESSION_VALIDITY_MINUTES
        {
            return Err(NereusError::validation(
                "session.validity_minutes",
                format!("Must be between 1 and {}", MAX_SESSION_VALIDITY_MINUTES),
            ));
        }
        if self.session.login_max_attempts == 0 {
            return Err(NereusError::validation(
                "session.login_max_attempts",
                "Must be greater than 0",
            ));
        }
        if self.fetch.max_attempts == 0 {
            return Err(NereusError::validation(
                "fetch.max_attempts",
                "Must be greater than 0",
            ));
        }

        if self.statistics.consumption_id.is_empty() || self.statistics.cost_id.is_empty() {
            return Err(NereusError::validation(
                "statistics",
                "Statistic ids cannot be empty",
            ));
        }
        if self.statistics.consumption_id == self.statistics.cost_id {
            return Err(NereusError::validation(
                "statistics.cost_id",
                "Must differ from consumption_id",
            ));
        }

        self.tz()?;
        Ok(())
    }
}

impl PricingConfig {
    /// Check a cost per litre against the configured bounds
    pub fn validate_liter_cost(&self, value: f64) -> Result<()> {
        if !value.is_finite() || value < self.min_liter_cost || value > self.max_liter_cost {
            return Err(NereusError::validation(
                "pricing.liter_cost",
                format!(
                    "Liter cost must be between {} and {}",
                    self.min_liter_cost, self.max_liter_cost
                ),
            ));
        }
        Ok(())
    }
}
