//! Sync service
//!
//! Runs one sync cycle end to end: plan the window from the cursor, make sure
//! a session exists, fetch, reconcile against the stored series, persist the
//! batch and only then advance the cursor. At most one cycle runs at a time;
//! a trigger that arrives while a cycle is in flight is skipped.
//!
//! The outcome of every cycle is published as a [`SyncStatus`] snapshot on a
//! watch channel.

use crate::config::Config;
use crate::error::{NereusError, Result};
use crate::fetcher::ConsumptionFetcher;
use crate::logging::{LogContext, get_logger_with_context};
use crate::persistence::PersistenceManager;
use crate::pricing::UnitPrice;
use crate::provider::MeterApi;
use crate::reconcile::{ExistingSeries, FetchWindow, ReconcileInput, ReconciliationEngine};
use crate::session::{Authenticator, Credentials, SessionManager};
use crate::statistics::{
    Reading, SeriesId, SeriesMetadata, SeriesWrite, StatisticsSink, day_start,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, watch};

/// Availability of the synced data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    /// No cycle has finished yet
    Unknown,
    /// Last cycle succeeded
    Available,
    /// Last cycle failed; stored statistics are still valid
    Degraded,
    /// Provider rejected the credentials
    Unavailable,
}

/// Snapshot of the sync state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatus {
    pub availability: Availability,
    pub cursor: Option<NaiveDate>,
    /// Litres used on the most recent imported day
    pub latest_volume: Option<f64>,
    pub latest_date: Option<NaiveDate>,
    pub consumption_total: Option<f64>,
    pub cost_total: Option<f64>,
    pub currency: String,
    pub unit_price: f64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub cycles_run: u64,
    pub cycles_failed: u64,
    pub cycles_skipped: u64,
}

/// Numbers from a cycle that imported data
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub window: FetchWindow,
    pub fetched: usize,
    pub new_days: usize,
    pub revised_days: usize,
    pub unchanged_days: usize,
    pub rejected: usize,
    pub points_written: usize,
    pub cursor: Option<NaiveDate>,
    pub latest: Option<Reading>,
}

/// How a cycle ended
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Another cycle was in flight
    Skipped,
    /// Cursor already at today
    UpToDate,
    /// Provider had nothing for the window
    NoData { window: FetchWindow },
    Imported(CycleReport),
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs sync cycles for one account
pub struct SyncService {
    sessions: Mutex<SessionManager>,
    fetcher: ConsumptionFetcher,
    engine: ReconciliationEngine,
    sink: Arc<dyn StatisticsSink>,
    state: Mutex<PersistenceManager>,
    price: Arc<UnitPrice>,
    consumption: SeriesMetadata,
    cost: SeriesMetadata,
    in_flight: AtomicBool,
    status_tx: watch::Sender<SyncStatus>,
    logger: crate::logging::StructuredLogger,
}

impl SyncService {
    pub fn new(
        config: &Config,
        authenticator: Arc<dyn Authenticator>,
        api: Arc<dyn MeterApi>,
        sink: Arc<dyn StatisticsSink>,
        state: PersistenceManager,
        price: Arc<UnitPrice>,
    ) -> Result<Self> {
        let tz = config.tz()?;
        let credentials = Credentials {
            username: config.account.username.clone(),
            password: config.account.password.clone(),
            account_number: config.account.account_number.clone(),
        };
        let consumption = SeriesMetadata::new(
            SeriesId::new(config.statistics.consumption_id.as_str()),
            &config.statistics.consumption_name,
            "L",
        );
        let cost = SeriesMetadata::new(
            SeriesId::new(config.statistics.cost_id.as_str()),
            &config.statistics.cost_name,
            &config.pricing.currency,
        );

        let (status_tx, _rx) = watch::channel(SyncStatus {
            availability: Availability::Unknown,
            cursor: state.cursor(),
            latest_volume: None,
            latest_date: None,
            consumption_total: None,
            cost_total: None,
            currency: price.currency().to_string(),
            unit_price: price.current(),
            last_success: state.state().last_import_at,
            last_error: None,
            cycles_run: 0,
            cycles_failed: 0,
            cycles_skipped: 0,
        });

        let logger = get_logger_with_context(
            LogContext::new("sync")
                .with_account(config.account.account_number.clone())
                .with_meter(config.account.meter_id.clone()),
        );

        Ok(Self {
            sessions: Mutex::new(SessionManager::new(
                authenticator,
                credentials,
                &config.session,
            )),
            fetcher: ConsumptionFetcher::new(api, &config.sync, &config.fetch),
            engine: ReconciliationEngine::new(tz, &config.sync),
            sink,
            state: Mutex::new(state),
            price,
            consumption,
            cost,
            in_flight: AtomicBool::new(false),
            status_tx,
            logger,
        })
    }

    /// Latest status snapshot
    pub fn status(&self) -> SyncStatus {
        self.status_tx.borrow().clone()
    }

    /// Watch status changes
    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    /// Whether a cycle is running right now
    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn consumption_series(&self) -> &SeriesMetadata {
        &self.consumption
    }

    pub fn cost_series(&self) -> &SeriesMetadata {
        &self.cost
    }

    /// Fill the status totals from the stored series
    pub async fn load_status(&self) -> Result<()> {
        let consumption = self.sink.last_point(&self.consumption.statistic_id).await?;
        let cost = self.sink.last_point(&self.cost.statistic_id).await?;
        self.status_tx.send_modify(|status| {
            status.consumption_total = consumption.map(|p| p.sum);
            status.cost_total = cost.map(|p| p.sum);
        });
        Ok(())
    }

    /// Change the unit price and remember it across restarts.
    /// Takes effect from the next cycle. The price is only applied once the
    /// override is saved.
    pub async fn set_unit_price(&self, value: f64) -> Result<()> {
        self.price.check(value)?;
        {
            let mut state = self.state.lock().await;
            let previous = state.unit_price_override();
            state.set_unit_price_override(Some(value));
            if let Err(e) = state.save() {
                state.set_unit_price_override(previous);
                return Err(e);
            }
        }
        self.price.set(value)?;
        self.status_tx
            .send_modify(|status| status.unit_price = value);
        Ok(())
    }

    /// Run a cycle for the current day in the provider timezone
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let today = Utc::now()
            .with_timezone(&self.engine.timezone())
            .date_naive();
        self.run_cycle_for(today).await
    }

    /// Run a cycle treating `today` as the current provider day
    pub async fn run_cycle_for(&self, today: NaiveDate) -> Result<CycleOutcome> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.logger
                .info("Sync cycle already in progress, skipping trigger");
            self.status_tx
                .send_modify(|status| status.cycles_skipped += 1);
            return Ok(CycleOutcome::Skipped);
        }
        let _guard = InFlight(&self.in_flight);

        let result = self.execute(today).await;
        self.record(&result).await;
        result
    }

    async fn execute(&self, today: NaiveDate) -> Result<CycleOutcome> {
        let unit_price = self.price.current();
        let cursor = self.state.lock().await.cursor();

        let Some(window) = self.engine.plan_window(cursor, today) else {
            self.logger.debug(&format!(
                "Cursor at {}, nothing to fetch",
                cursor.map(|c| c.to_string()).unwrap_or_default()
            ));
            return Ok(CycleOutcome::UpToDate);
        };
        self.logger.info(&format!(
            "Starting sync for {}..={} (cursor: {})",
            window.start,
            window.end,
            cursor
                .map(|c| c.to_string())
                .unwrap_or_else(|| "none".to_string())
        ));

        let readings = self.fetch_with_session(window).await?;
        let Some(earliest) = readings.iter().map(|r| r.date).min() else {
            self.logger.info("Provider has no data for the window yet");
            return Ok(CycleOutcome::NoData { window });
        };

        let from = day_start(self.engine.timezone(), earliest);
        let existing_consumption = self.existing(&self.consumption.statistic_id, from).await?;
        let existing_cost = self.existing(&self.cost.statistic_id, from).await?;

        let merge = self.engine.reconcile(&ReconcileInput {
            readings: &readings,
            cursor,
            today,
            unit_price,
            consumption: existing_consumption,
            cost: existing_cost,
        });
        for rejected in &merge.rejected {
            self.logger.warn(&format!("Dropped reading: {}", rejected));
        }

        let points_written = merge.consumption.len() + merge.cost.len();
        if merge.has_changes() {
            let batch = [
                SeriesWrite {
                    metadata: self.consumption.clone(),
                    points: merge.consumption.clone(),
                },
                SeriesWrite {
                    metadata: self.cost.clone(),
                    points: merge.cost.clone(),
                },
            ];
            self.sink.write_batch(&batch).await.map_err(|e| match e {
                NereusError::Persistence { .. } => e,
                other => NereusError::persistence(other.to_string()),
            })?;
        }

        if let Some(new_cursor) = merge.new_cursor {
            let mut state = self.state.lock().await;
            if state.advance_cursor(new_cursor, Utc::now()) {
                state
                    .save()
                    .map_err(|e| NereusError::persistence(format!("Saving cursor: {}", e)))?;
            }
        }

        self.logger.info(&format!(
            "Sync done: {} new, {} revised, {} unchanged, {} rejected, {} points written",
            merge.new_days,
            merge.revised_days,
            merge.unchanged_days,
            merge.rejected.len(),
            points_written
        ));

        Ok(CycleOutcome::Imported(CycleReport {
            window,
            fetched: readings.len(),
            new_days: merge.new_days,
            revised_days: merge.revised_days,
            unchanged_days: merge.unchanged_days,
            rejected: merge.rejected.len(),
            points_written,
            cursor: merge.new_cursor,
            latest: merge.latest,
        }))
    }

    /// Fetch with a valid session; one re-login when the provider rejects it
    async fn fetch_with_session(&self, window: FetchWindow) -> Result<Vec<Reading>> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.ensure_session().await?;

        match self.fetcher.fetch(&session, window.start, window.end).await {
            Err(e) if e.is_authentication() => {
                self.logger
                    .warn(&format!("Fetch rejected ({}), signing in again", e));
                sessions.invalidate();
                let session = sessions.ensure_session().await?;
                let retried = self.fetcher.fetch(&session, window.start, window.end).await;
                if retried.as_ref().is_err_and(NereusError::is_authentication) {
                    sessions.invalidate();
                }
                retried
            }
            other => other,
        }
    }

    async fn existing(&self, series: &SeriesId, from: DateTime<Utc>) -> Result<ExistingSeries> {
        Ok(ExistingSeries {
            anchor: self.sink.point_before(series, from).await?,
            tail: self.sink.points_since(series, from).await?,
        })
    }

    async fn record(&self, result: &Result<CycleOutcome>) {
        let now = Utc::now();
        let cursor = self.state.lock().await.cursor();

        match result {
            Ok(outcome) => {
                let totals = if matches!(outcome, CycleOutcome::Imported(_)) {
                    let consumption = self.sink.last_point(&self.consumption.statistic_id).await;
                    let cost = self.sink.last_point(&self.cost.statistic_id).await;
                    Some((consumption, cost))
                } else {
                    None
                };
                self.status_tx.send_modify(|status| {
                    status.availability = Availability::Available;
                    status.cursor = cursor;
                    status.last_success = Some(now);
                    status.last_error = None;
                    status.cycles_run += 1;
                    status.unit_price = self.price.current();
                    if let CycleOutcome::Imported(report) = outcome
                        && let Some(latest) = report.latest
                    {
                        status.latest_volume = Some(latest.volume);
                        status.latest_date = Some(latest.date);
                    }
                    if let Some((consumption, cost)) = totals {
                        if let Ok(point) = consumption {
                            status.consumption_total = point.map(|p| p.sum);
                        }
                        if let Ok(point) = cost {
                            status.cost_total = point.map(|p| p.sum);
                        }
                    }
                });
            }
            Err(e) => {
                self.logger.error(&format!("Sync cycle failed: {}", e));
                let availability = if e.is_authentication() {
                    Availability::Unavailable
                } else {
                    Availability::Degraded
                };
                self.status_tx.send_modify(|status| {
                    status.availability = availability;
                    status.cursor = cursor;
                    status.last_error = Some(e.to_string());
                    status.cycles_run += 1;
                    status.cycles_failed += 1;
                });
            }
        }
    }
}
