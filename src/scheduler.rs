//! Sync scheduler
//!
//! Fires a sync cycle at fixed wall-clock times in the provider timezone and
//! once at startup, and serves runtime commands. Cycles run on their own task
//! so a trigger that arrives while one is in flight reaches the sync service
//! and is skipped there. A failed cycle is logged and the scheduler waits for
//! the next firing.

use crate::config::Config;
use crate::error::Result;
use crate::logging::get_logger;
use crate::sync::{CycleOutcome, SyncService};
use chrono::{DateTime, Days, Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::sleep;

/// Runtime commands
#[derive(Debug, Clone, PartialEq)]
pub enum SyncCommand {
    /// Run a cycle now
    SyncNow,
    /// Change the unit price for future cycles
    SetUnitPrice(f64),
    /// Stop after in-flight cycles finish
    Shutdown,
}

/// Daily firing times
#[derive(Debug, Clone, PartialEq)]
pub struct FireSchedule {
    tz: Tz,
    hours: Vec<u8>,
    minute: u8,
}

impl FireSchedule {
    pub fn new(tz: Tz, hours: &[u8], minute: u8) -> Self {
        let mut hours: Vec<u8> = hours.iter().copied().filter(|h| *h < 24).collect();
        hours.sort_unstable();
        hours.dedup();
        Self {
            tz,
            hours,
            minute: minute.min(59),
        }
    }

    /// Hours from the config; the minute is configured or picked at random
    /// in `0..=10` so installations do not all hit the portal at once.
    pub fn from_config(config: &Config) -> Result<Self> {
        let minute = config
            .sync
            .fetch_minute
            .unwrap_or_else(|| rand::thread_rng().gen_range(0..=10));
        Ok(Self::new(config.tz()?, &config.sync.fetch_hours, minute))
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    pub fn hours(&self) -> &[u8] {
        &self.hours
    }

    /// First firing strictly after `now`
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let today = now.with_timezone(&self.tz).date_naive();
        (0..=2)
            .filter_map(|offset| today.checked_add_days(Days::new(offset)))
            .flat_map(|date| self.hours.iter().filter_map(move |h| self.fire_at(date, *h)))
            .find(|at| *at > now)
    }

    fn fire_at(&self, date: NaiveDate, hour: u8) -> Option<DateTime<Utc>> {
        let naive = date.and_hms_opt(u32::from(hour), u32::from(self.minute), 0)?;
        self.tz
            .from_local_datetime(&naive)
            .earliest()
            // Inside a DST gap: fire an hour later
            .or_else(|| {
                self.tz
                    .from_local_datetime(&(naive + ChronoDuration::hours(1)))
                    .earliest()
            })
            .map(|local| local.with_timezone(&Utc))
    }
}

/// Drives the sync service
pub struct Scheduler {
    service: Arc<SyncService>,
    schedule: FireSchedule,
    run_on_startup: bool,
    commands_rx: mpsc::UnboundedReceiver<SyncCommand>,
    cycles: JoinSet<()>,
    logger: crate::logging::StructuredLogger,
}

impl Scheduler {
    pub fn new(
        service: Arc<SyncService>,
        schedule: FireSchedule,
        run_on_startup: bool,
        commands_rx: mpsc::UnboundedReceiver<SyncCommand>,
    ) -> Self {
        Self {
            service,
            schedule,
            run_on_startup,
            commands_rx,
            cycles: JoinSet::new(),
            logger: get_logger("scheduler"),
        }
    }

    /// Run until `Shutdown` or until every command sender is gone
    pub async fn run(mut self) -> Result<()> {
        self.logger.info(&format!(
            "Scheduler started: hours {:?} at minute {:02}",
            self.schedule.hours(),
            self.schedule.minute()
        ));

        if self.run_on_startup {
            self.trigger("startup");
        }

        let mut last_fire: Option<DateTime<Utc>> = None;
        loop {
            let now = Utc::now();
            let from = last_fire.map_or(now, |fired| fired.max(now));
            let next = self.schedule.next_after(from);
            let wait = next
                .and_then(|at| (at - now).to_std().ok())
                .unwrap_or(Duration::from_secs(3600));
            if let Some(at) = next {
                self.logger.debug(&format!("Next sync at {}", at));
            }

            tokio::select! {
                _ = sleep(wait) => {
                    if next.is_some() {
                        last_fire = next;
                        self.trigger("schedule");
                    }
                }
                cmd = self.commands_rx.recv() => {
                    match cmd {
                        Some(SyncCommand::SyncNow) => self.trigger("command"),
                        Some(SyncCommand::SetUnitPrice(value)) => {
                            if let Err(e) = self.service.set_unit_price(value).await {
                                self.logger.warn(&format!("Unit price {} rejected: {}", value, e));
                            }
                        }
                        Some(SyncCommand::Shutdown) | None => {
                            self.logger.info("Shutdown requested");
                            break;
                        }
                    }
                }
                Some(joined) = self.cycles.join_next(), if !self.cycles.is_empty() => {
                    if let Err(e) = joined {
                        self.logger.error(&format!("Sync task ended abnormally: {}", e));
                    }
                }
            }
        }

        while self.cycles.join_next().await.is_some() {}
        self.logger.info("Scheduler stopped");
        Ok(())
    }

    fn trigger(&mut self, reason: &'static str) {
        let service = Arc::clone(&self.service);
        let logger = self.logger.clone();
        self.cycles.spawn(async move {
            logger.debug(&format!("Sync triggered by {}", reason));
            match service.run_cycle().await {
                Ok(CycleOutcome::Imported(report)) => logger.info(&format!(
                    "Cycle ({}) imported data up to {}",
                    reason,
                    report
                        .cursor
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "none".to_string())
                )),
                Ok(outcome) => logger.debug(&format!("Cycle ({}) finished: {:?}", reason, outcome)),
                Err(e) => logger.warn(&format!(
                    "Cycle ({}) failed, waiting for next firing: {}",
                    reason, e
                )),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule() -> FireSchedule {
        FireSchedule::new(chrono_tz::Europe::London, &[23, 15, 15], 5)
    }

    #[test]
    fn hours_sorted_and_deduplicated() {
        assert_eq!(schedule().hours(), &[15, 23]);
    }

    #[test]
    fn next_fire_same_day_and_rollover() {
        let s = schedule();
        let morning = Utc.with_ymd_and_hms(2025, 1, 10, 9, 0, 0).unwrap();
        assert_eq!(
            s.next_after(morning),
            Some(Utc.with_ymd_and_hms(2025, 1, 10, 15, 5, 0).unwrap())
        );

        let at_fire = Utc.with_ymd_and_hms(2025, 1, 10, 15, 5, 0).unwrap();
        assert_eq!(
            s.next_after(at_fire),
            Some(Utc.with_ymd_and_hms(2025, 1, 10, 23, 5, 0).unwrap())
        );

        let late = Utc.with_ymd_and_hms(2025, 1, 10, 23, 30, 0).unwrap();
        assert_eq!(
            s.next_after(late),
            Some(Utc.with_ymd_and_hms(2025, 1, 11, 15, 5, 0).unwrap())
        );
    }

    #[test]
    fn next_fire_in_summer_time() {
        let s = schedule();
        let now = Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap();
        // 15:05 BST
        assert_eq!(
            s.next_after(now),
            Some(Utc.with_ymd_and_hms(2025, 7, 1, 14, 5, 0).unwrap())
        );
    }

    #[test]
    fn empty_schedule_never_fires() {
        let s = FireSchedule::new(chrono_tz::UTC, &[], 0);
        assert_eq!(s.next_after(Utc::now()), None);
    }
}
