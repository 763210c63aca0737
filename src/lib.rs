//! # Nereus - Smart water meter statistics sync
//!
//! Nereus keeps a local, cumulative statistics store in step with the daily
//! water consumption published by a utility's smart meter portal. The portal
//! releases data with a delay of several days and revises days it already
//! released, so the interesting part is the sync engine: a time-bounded
//! session, bounded backfill on first run, reconciliation of late and revised
//! readings against already published cumulative totals, and a schedule that
//! never duplicates or corrupts what was imported before.
//!
//! ## Architecture
//!
//! - `config`: YAML configuration with defaults and validation
//! - `logging`: Structured logging and tracing
//! - `session`: Credentials and the authenticated portal session
//! - `provider`: Portal client (sign-in exchange and meter reads)
//! - `fetcher`: Daily readings for a date range, with retry
//! - `reconcile`: Merge of readings into the consumption and cost series
//! - `statistics`: Series data model, sink interface and file store
//! - `persistence`: Sync cursor and runtime overrides
//! - `pricing`: Runtime-adjustable unit price
//! - `sync`: One sync cycle end to end, and its status
//! - `scheduler`: Timed and on-demand cycles

pub mod config;
pub mod error;
pub mod fetcher;
pub mod logging;
pub mod persistence;
pub mod pricing;
pub mod provider;
pub mod reconcile;
pub mod scheduler;
pub mod session;
pub mod statistics;
pub mod sync;


// Re-export commonly used types
pub use config::Config;
pub use error::{NereusError, Result};
pub use scheduler::{Scheduler, SyncCommand};
pub use sync::{SyncService, SyncStatus};
