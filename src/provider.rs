//! Water provider integration
//!
//! The engine talks to the provider through two seams: [`Authenticator`]
//! (in `session`) for the sign-in exchange and [`MeterApi`] for reading one
//! day of smart meter consumption. The reqwest implementation of both lives
//! behind the `http` feature.
//!
//! [`Authenticator`]: crate::session::Authenticator

#[cfg(feature = "http")]
mod auth;
#[cfg(feature = "http")]
pub mod client;
pub mod types;

#[cfg(feature = "http")]
pub use client::ThamesWaterClient;
pub use types::{Line, MeterUsage, parse_usage_response};

use crate::error::Result;
use crate::session::Session;
use chrono::NaiveDate;

/// Meter consumption read endpoint
#[async_trait::async_trait]
pub trait MeterApi: Send + Sync {
    /// Read the usage payload for one calendar day.
    ///
    /// `Ok(None)` means the provider answered but the body was not a usage
    /// payload; the day is treated as having no data.
    async fn meter_usage(&self, session: &Session, date: NaiveDate) -> Result<Option<MeterUsage>>;
}
