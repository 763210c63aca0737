//! Reconciliation engine
//!
//! Merges freshly fetched daily readings into the cumulative consumption and
//! cost series. The provider publishes data with a variable delay of several
//! days and may revise days it already published, so the engine:
//!
//! - plans the fetch window from the sync cursor,
//! - rejects unusable readings individually,
//! - leaves days whose volume did not change untouched,
//! - rewrites a revised day and recomputes every later point from it,
//! - prices new volume at the current unit price without re-pricing history.
//!
//! The merge is synchronous and pure. Callers load the existing points from
//! the sink, pass them in, and persist the returned points as one batch.

use crate::config::SyncConfig;
use crate::error::NereusError;
use crate::statistics::{Reading, StatisticPoint, day_start, local_date};
use chrono::{Days, NaiveDate};
use chrono_tz::Tz;
use std::collections::BTreeMap;

/// Relative tolerance under which two volumes are the same reading
const EPSILON: f64 = 1e-9;

/// Stored volumes are differences of cumulative sums, so the rounding error
/// grows with the total.
fn same_volume(stored: &StoredDay, volume: f64) -> bool {
    (stored.volume - volume).abs() <= EPSILON * stored.sum.abs().max(1.0)
}

/// Inclusive range of days to request from the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl FetchWindow {
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

/// Stored points the merge builds on
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExistingSeries {
    /// Last point before the earliest fetched day
    pub anchor: Option<StatisticPoint>,
    /// Points from the earliest fetched day on, ascending
    pub tail: Vec<StatisticPoint>,
}

/// Everything one merge needs
#[derive(Debug, Clone)]
pub struct ReconcileInput<'a> {
    pub readings: &'a [Reading],
    pub cursor: Option<NaiveDate>,
    pub today: NaiveDate,
    /// Unit price snapshot taken when the cycle started
    pub unit_price: f64,
    pub consumption: ExistingSeries,
    pub cost: ExistingSeries,
}

/// Result of one merge
#[derive(Debug, Default)]
pub struct Reconciliation {
    /// Consumption points to upsert, ascending
    pub consumption: Vec<StatisticPoint>,
    /// Cost points to upsert, ascending
    pub cost: Vec<StatisticPoint>,
    /// Readings dropped as invalid
    pub rejected: Vec<NereusError>,
    /// Cursor once the points are persisted
    pub new_cursor: Option<NaiveDate>,
    /// Most recent accepted reading
    pub latest: Option<Reading>,
    pub new_days: usize,
    pub revised_days: usize,
    pub unchanged_days: usize,
}

impl Reconciliation {
    /// Whether there is anything to write
    pub fn has_changes(&self) -> bool {
        !self.consumption.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct StoredDay {
    volume: f64,
    sum: f64,
    cost: Option<f64>,
    cost_sum: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
struct MergedDay {
    volume: f64,
    cost: f64,
}

/// Merge logic for the consumption and cost series
#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    tz: Tz,
    backfill_days: u32,
    revision_lookback_days: u32,
    max_span_days: u32,
}

impl ReconciliationEngine {
    pub fn new(tz: Tz, sync: &SyncConfig) -> Self {
        Self {
            tz,
            backfill_days: sync.backfill_days,
            revision_lookback_days: sync.revision_lookback_days,
            max_span_days: sync.max_fetch_span_days.max(1),
        }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Oldest day a first run imports
    pub fn backfill_floor(&self, today: NaiveDate) -> NaiveDate {
        today
            .checked_sub_days(Days::new(u64::from(self.backfill_days)))
            .unwrap_or(NaiveDate::MIN)
    }

    /// Days to request this cycle, `None` when the cursor is already at today.
    ///
    /// First run: `[today - backfill_days, today]`. Afterwards:
    /// `[cursor + 1 - revision_lookback_days, today]`. The end is capped so
    /// the window never exceeds the fetch span; a long outage catches up over
    /// several cycles.
    pub fn plan_window(&self, cursor: Option<NaiveDate>, today: NaiveDate) -> Option<FetchWindow> {
        let start = match cursor {
            None => self.backfill_floor(today),
            Some(cursor) => cursor
                .checked_add_days(Days::new(1))?
                .checked_sub_days(Days::new(u64::from(self.revision_lookback_days)))
                .unwrap_or(NaiveDate::MIN),
        };
        if start > today {
            return None;
        }
        let end = start
            .checked_add_days(Days::new(u64::from(self.max_span_days) - 1))
            .map_or(today, |capped| capped.min(today));
        Some(FetchWindow { start, end })
    }

    /// Split readings into accepted (deduplicated by date, last wins) and
    /// rejected ones. On a first run days before the backfill floor are
    /// dropped silently.
    pub fn accept_readings(
        &self,
        readings: &[Reading],
        cursor: Option<NaiveDate>,
        today: NaiveDate,
    ) -> (BTreeMap<NaiveDate, f64>, Vec<NereusError>) {
        let floor = cursor.is_none().then(|| self.backfill_floor(today));
        let mut accepted = BTreeMap::new();
        let mut rejected = Vec::new();

        for reading in readings {
            if !reading.volume.is_finite() {
                rejected.push(NereusError::invalid_reading(
                    reading.date,
                    "volume is not a finite number",
                ));
            } else if reading.volume < 0.0 {
                rejected.push(NereusError::invalid_reading(
                    reading.date,
                    format!("negative volume {}", reading.volume),
                ));
            } else if reading.date > today {
                rejected.push(NereusError::invalid_reading(
                    reading.date,
                    format!("date is after today ({})", today),
                ));
            } else if floor.is_none_or(|floor| reading.date >= floor) {
                accepted.insert(reading.date, reading.volume);
            }
        }

        (accepted, rejected)
    }

    /// Merge readings into the existing series
    pub fn reconcile(&self, input: &ReconcileInput<'_>) -> Reconciliation {
        let (accepted, rejected) = self.accept_readings(input.readings, input.cursor, input.today);

        let mut result = Reconciliation {
            rejected,
            new_cursor: input.cursor,
            ..Reconciliation::default()
        };

        let Some((&latest_date, &latest_volume)) = accepted.iter().next_back() else {
            return result;
        };
        result.latest = Some(Reading::new(latest_date, latest_volume));
        result.new_cursor = Some(input.cursor.map_or(latest_date, |c| c.max(latest_date)));

        let stored = self.stored_days(&input.consumption, &input.cost);
        let mut merged: BTreeMap<NaiveDate, MergedDay> = stored
            .iter()
            .map(|(date, day)| {
                // A day without a cost point carries no cost forward
                (
                    *date,
                    MergedDay {
                        volume: day.volume,
                        cost: day.cost.unwrap_or(0.0),
                    },
                )
            })
            .collect();

        let mut first_changed: Option<NaiveDate> = None;
        for (&date, &volume) in &accepted {
            match stored.get(&date) {
                Some(day) if same_volume(day, volume) => {
                    result.unchanged_days += 1;
                    continue;
                }
                Some(day) => {
                    let unit = match day.cost {
                        Some(cost) if day.volume > EPSILON => cost / day.volume,
                        _ => input.unit_price,
                    };
                    merged.insert(
                        date,
                        MergedDay {
                            volume,
                            cost: volume * unit,
                        },
                    );
                    result.revised_days += 1;
                }
                None => {
                    merged.insert(
                        date,
                        MergedDay {
                            volume,
                            cost: volume * input.unit_price,
                        },
                    );
                    result.new_days += 1;
                }
            }
            if first_changed.is_none() {
                first_changed = Some(date);
            }
        }

        let Some(first_changed) = first_changed else {
            return result;
        };

        // Running totals up to the day before the first change
        let previous = stored.range(..first_changed).next_back().map(|(_, d)| *d);
        let mut sum = previous
            .map(|d| d.sum)
            .or_else(|| input.consumption.anchor.map(|p| p.sum))
            .unwrap_or(0.0);
        let mut cost_sum = previous
            .and_then(|d| d.cost_sum)
            .or_else(|| input.cost.anchor.map(|p| p.sum))
            .unwrap_or(0.0);

        for (&date, day) in merged.range(first_changed..) {
            sum += day.volume;
            cost_sum += day.cost.max(0.0);
            let start = day_start(self.tz, date);
            result
                .consumption
                .push(StatisticPoint::cumulative(start, sum));
            result.cost.push(StatisticPoint::cumulative(start, cost_sum));
        }

        result
    }

    /// Per-day volume and cost recovered from stored cumulative points
    fn stored_days(
        &self,
        consumption: &ExistingSeries,
        cost: &ExistingSeries,
    ) -> BTreeMap<NaiveDate, StoredDay> {
        let mut days = BTreeMap::new();

        let mut previous = consumption.anchor.map_or(0.0, |p| p.sum);
        for point in &consumption.tail {
            days.insert(
                local_date(self.tz, point.start),
                StoredDay {
                    volume: (point.sum - previous).max(0.0),
                    sum: point.sum,
                    cost: None,
                    cost_sum: None,
                },
            );
            previous = point.sum;
        }

        let mut previous = cost.anchor.map_or(0.0, |p| p.sum);
        for point in &cost.tail {
            if let Some(day) = days.get_mut(&local_date(self.tz, point.start)) {
                day.cost = Some((point.sum - previous).max(0.0));
                day.cost_sum = Some(point.sum);
            }
            previous = point.sum;
        }

        days
    }
}
