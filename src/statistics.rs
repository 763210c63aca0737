//! Statistic series data model and the sink interface
//!
//! Readings are per-day volumes keyed by the provider's calendar day. Points
//! are what the dashboard consumes: one per day, stamped at the start of that
//! day in the provider timezone, carrying the cumulative running total.

use crate::error::Result;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod store;

pub use store::StatisticsStore;

/// One day of consumption as reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Calendar day in the provider timezone
    pub date: NaiveDate,
    /// Litres used that day
    pub volume: f64,
}

impl Reading {
    pub fn new(date: NaiveDate, volume: f64) -> Self {
        Self { date, volume }
    }
}

/// A point of a cumulative statistic series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatisticPoint {
    /// Start of the day the point covers
    pub start: DateTime<Utc>,
    /// Running total (same as `sum`)
    pub state: f64,
    /// Running total since the first imported day
    pub sum: f64,
}

impl StatisticPoint {
    pub fn cumulative(start: DateTime<Utc>, total: f64) -> Self {
        Self {
            start,
            state: total,
            sum: total,
        }
    }
}

/// Statistic id, e.g. `nereus:water_consumption`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeriesId(String);

impl SeriesId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Description of a series for the downstream consumer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesMetadata {
    pub statistic_id: SeriesId,
    pub name: String,
    pub unit: String,
    pub source: String,
    pub has_sum: bool,
}

impl SeriesMetadata {
    pub fn new(statistic_id: SeriesId, name: &str, unit: &str) -> Self {
        let source = statistic_id
            .as_str()
            .split_once(':')
            .map(|(source, _)| source.to_string())
            .unwrap_or_else(|| "nereus".to_string());
        Self {
            statistic_id,
            name: name.to_string(),
            unit: unit.to_string(),
            source,
            has_sum: true,
        }
    }
}

/// Points to upsert into one series
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesWrite {
    pub metadata: SeriesMetadata,
    pub points: Vec<StatisticPoint>,
}

/// Persistence layer for statistic series.
///
/// Reads return points in ascending `start` order. `write_batch` upserts by
/// `start` and must be atomic across every series in the batch: either all
/// points are stored or none are.
#[async_trait::async_trait]
pub trait StatisticsSink: Send + Sync {
    /// Latest point of the series
    async fn last_point(&self, series: &SeriesId) -> Result<Option<StatisticPoint>>;

    /// Latest point strictly before `start`
    async fn point_before(
        &self,
        series: &SeriesId,
        start: DateTime<Utc>,
    ) -> Result<Option<StatisticPoint>>;

    /// All points at or after `start`
    async fn points_since(
        &self,
        series: &SeriesId,
        start: DateTime<Utc>,
    ) -> Result<Vec<StatisticPoint>>;

    /// Upsert all writes atomically
    async fn write_batch(&self, writes: &[SeriesWrite]) -> Result<()>;
}

/// Start of `date` in `tz`, as UTC
pub fn day_start(tz: Tz, date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(chrono::NaiveTime::MIN);
    match tz.from_local_datetime(&midnight).earliest() {
        Some(local) => local.with_timezone(&Utc),
        // Midnight skipped by a DST jump; the day starts at the jump
        None => tz
            .from_local_datetime(&(midnight + chrono::Duration::hours(1)))
            .earliest()
            .map(|local| local.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&midnight)),
    }
}

/// Calendar day in `tz` that contains `start`
pub fn local_date(tz: Tz, start: DateTime<Utc>) -> NaiveDate {
    start.with_timezone(&tz).date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_start_follows_british_summer_time() {
        let tz: Tz = "Europe/London".parse().unwrap();
        let winter = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        let summer = NaiveDate::from_ymd_opt(2025, 7, 15).unwrap();

        assert_eq!(day_start(tz, winter).to_rfc3339(), "2025-01-15T00:00:00+00:00");
        assert_eq!(day_start(tz, summer).to_rfc3339(), "2025-07-14T23:00:00+00:00");
        assert_eq!(local_date(tz, day_start(tz, summer)), summer);
    }

    #[test]
    fn metadata_source_from_statistic_id() {
        let meta = SeriesMetadata::new(SeriesId::new("water:usage"), "Usage", "L");
        assert_eq!(meta.source, "water");
        assert!(meta.has_sum);

        let meta = SeriesMetadata::new(SeriesId::new("plain"), "Usage", "L");
        assert_eq!(meta.source, "nereus");
    }
}
