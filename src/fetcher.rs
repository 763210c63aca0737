//! Consumption fetcher
//!
//! Pulls one provider payload per day for a date range and turns it into
//! normalized [`Reading`]s. Transient failures are retried here with
//! exponential backoff; authentication failures are handed straight back to
//! the caller, which owns the session.

use crate::config::{FetchConfig, SyncConfig};
use crate::error::{NereusError, Result};
use crate::logging::get_logger;
use crate::provider::{MeterApi, MeterUsage};
use crate::session::Session;
use crate::statistics::Reading;
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Backoff policy for transient fetch failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.retry_delay_ms),
            max_delay: Duration::from_millis(config.max_retry_delay_ms.max(config.retry_delay_ms)),
        }
    }

    /// Delay after the `attempt`-th failure (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Reads daily consumption from the provider
pub struct ConsumptionFetcher {
    api: Arc<dyn MeterApi>,
    max_span_days: u32,
    retry: RetryPolicy,
    logger: crate::logging::StructuredLogger,
}

impl ConsumptionFetcher {
    pub fn new(api: Arc<dyn MeterApi>, sync: &SyncConfig, fetch: &FetchConfig) -> Self {
        Self {
            api,
            max_span_days: sync.max_fetch_span_days.max(1),
            retry: RetryPolicy::from_config(fetch),
            logger: get_logger("fetcher"),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Fetch readings for `start..=end`, ascending, gaps omitted
    pub async fn fetch(
        &self,
        session: &Session,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Reading>> {
        if start > end {
            return Err(NereusError::validation(
                "range",
                format!("start {} is after end {}", start, end),
            ));
        }
        let span = (end - start).num_days() + 1;
        if span > i64::from(self.max_span_days) {
            return Err(NereusError::validation(
                "range",
                format!(
                    "{} days requested, at most {} allowed",
                    span, self.max_span_days
                ),
            ));
        }

        let mut readings = Vec::with_capacity(span as usize);
        let mut gaps = 0;
        for date in start.iter_days().take_while(|d| *d <= end) {
            let usage = self.read_day(session, date).await?;
            match usage.as_ref().and_then(MeterUsage::daily_volume) {
                Some(volume) => readings.push(Reading::new(date, volume)),
                None => gaps += 1,
            }
        }

        self.logger.info(&format!(
            "Fetched {} readings for {}..={} ({} days without data)",
            readings.len(),
            start,
            end,
            gaps
        ));
        Ok(readings)
    }

    async fn read_day(&self, session: &Session, date: NaiveDate) -> Result<Option<MeterUsage>> {
        let mut attempts = 0;

        loop {
            attempts += 1;
            match self.api.meter_usage(session, date).await {
                Ok(usage) => return Ok(usage),
                Err(e) if e.is_transient() && attempts < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempts);
                    self.logger.warn(&format!(
                        "Read for {} failed (attempt {}/{}): {}; retrying in {:?}",
                        date, attempts, self.retry.max_attempts, e, delay
                    ));
                    sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
