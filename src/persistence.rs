//! Persistence layer for sync state
//!
//! This module saves and loads the sync cursor and the runtime unit-price
//! override across restarts. The cursor is only ever moved forward, and only
//! by the sync service after the statistics batch has been committed.

use crate::error::Result;
use crate::logging::get_logger;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Persistent state structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistentState {
    /// Last day whose statistics are confirmed persisted
    pub last_imported: Option<NaiveDate>,

    /// When the cursor last moved
    pub last_import_at: Option<DateTime<Utc>>,

    /// Unit price set at runtime; overrides the configured one
    pub unit_price_override: Option<f64>,
}

/// Persistence manager
pub struct PersistenceManager {
    file_path: String,
    state: PersistentState,
    logger: crate::logging::StructuredLogger,
}

impl PersistenceManager {
    /// Create a new persistence manager
    pub fn new(file_path: &str) -> Self {
        let logger = get_logger("persistence");

        Self {
            file_path: file_path.to_string(),
            state: PersistentState::default(),
            logger,
        }
    }

    /// Load state from disk
    pub fn load(&mut self) -> Result<()> {
        let path = Path::new(&self.file_path);

        if !path.exists() {
            self.logger
                .info("No persistent state file found, using defaults");
            return Ok(());
        }

        let contents = std::fs::read_to_string(path)?;
        self.state = serde_json::from_str(&contents)?;
        self.logger.info(&format!(
            "Loaded persistent state from disk (cursor: {})",
            self.state
                .last_imported
                .map(|d| d.to_string())
                .unwrap_or_else(|| "none".to_string())
        ));

        Ok(())
    }

    /// Save state to disk
    pub fn save(&self) -> Result<()> {
        let contents = serde_json::to_string_pretty(&self.state)?;
        let path = Path::new(&self.file_path);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, path)?;
        self.logger.debug("Saved persistent state to disk");

        Ok(())
    }

    /// Current state
    pub fn state(&self) -> &PersistentState {
        &self.state
    }

    /// Sync cursor
    pub fn cursor(&self) -> Option<NaiveDate> {
        self.state.last_imported
    }

    /// Move the cursor to `date` if that is later than the current one.
    /// Returns whether it moved.
    pub fn advance_cursor(&mut self, date: NaiveDate, at: DateTime<Utc>) -> bool {
        if self.state.last_imported.is_some_and(|current| current >= date) {
            return false;
        }
        self.state.last_imported = Some(date);
        self.state.last_import_at = Some(at);
        true
    }

    /// Runtime unit price override
    pub fn unit_price_override(&self) -> Option<f64> {
        self.state.unit_price_override
    }

    /// Set the runtime unit price override
    pub fn set_unit_price_override(&mut self, price: Option<f64>) {
        self.state.unit_price_override = price;
    }
}
