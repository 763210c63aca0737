//! Error types and handling for Nereus
//!
//! This module defines the error types used throughout the application.
//! The sync engine distinguishes four failure classes with different
//! recovery rules: authentication, transient fetch, invalid reading and
//! persistence. Everything else is ambient (configuration, I/O, ...).

use chrono::NaiveDate;
use thiserror::Error;

/// Result type alias for Nereus operations
pub type Result<T> = std::result::Result<T, NereusError>;

/// Main error type for Nereus
#[derive(Debug, Error)]
pub enum NereusError {
    /// Credentials or session rejected by the provider
    #[error("Authentication error: {message}")]
    Authentication { message: String },

    /// Network or server-side failure that may succeed on retry
    #[error("Transient fetch error: {message}")]
    TransientFetch { message: String },

    /// A single malformed data point; the rest of the batch is kept
    #[error("Invalid reading for {date}: {message}")]
    InvalidReading { date: NaiveDate, message: String },

    /// Statistics batch write failed; nothing was committed
    #[error("Persistence failure: {message}")]
    Persistence { message: String },

    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl NereusError {
    /// Create a new authentication error
    pub fn authentication<S: Into<String>>(message: S) -> Self {
        NereusError::Authentication {
            message: message.into(),
        }
    }

    /// Create a new transient fetch error
    pub fn transient_fetch<S: Into<String>>(message: S) -> Self {
        NereusError::TransientFetch {
            message: message.into(),
        }
    }

    /// Create a new invalid reading error
    pub fn invalid_reading<S: Into<String>>(date: NaiveDate, message: S) -> Self {
        NereusError::InvalidReading {
            date,
            message: message.into(),
        }
    }

    /// Create a new persistence error
    pub fn persistence<S: Into<String>>(message: S) -> Self {
        NereusError::Persistence {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        NereusError::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        NereusError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        NereusError::Io {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        NereusError::Generic {
            message: message.into(),
        }
    }

    /// Whether the error means the session must be discarded
    pub fn is_authentication(&self) -> bool {
        matches!(self, NereusError::Authentication { .. })
    }

    /// Whether retrying the same request later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, NereusError::TransientFetch { .. })
    }
}

impl From<std::io::Error> for NereusError {
    fn from(err: std::io::Error) -> Self {
        NereusError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for NereusError {
    fn from(err: serde_yaml::Error) -> Self {
        NereusError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for NereusError {
    fn from(err: serde_json::Error) -> Self {
        NereusError::Serialization {
            message: err.to_string(),
        }
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for NereusError {
    fn from(err: reqwest::Error) -> Self {
        match err.status().map(|s| s.as_u16()) {
            Some(401) | Some(403) => NereusError::authentication(err.to_string()),
            _ => NereusError::transient_fetch(err.to_string()),
        }
    }
}

impl From<chrono::ParseError> for NereusError {
    fn from(err: chrono::ParseError) -> Self {
        NereusError::validation("datetime", err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = NereusError::config("test config error");
        assert!(matches!(err, NereusError::Config { .. }));

        let err = NereusError::authentication("rejected");
        assert!(err.is_authentication());
        assert!(!err.is_transient());

        let err = NereusError::transient_fetch("503");
        assert!(err.is_transient());

        let err = NereusError::validation("field", "test validation error");
        assert!(matches!(err, NereusError::Validation { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = NereusError::config("test error");
        assert_eq!(format!("{}", err), "Configuration error: test error");

        let date = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
        let err = NereusError::invalid_reading(date, "negative volume");
        assert_eq!(
            format!("{}", err),
            "Invalid reading for 2025-03-04: negative volume"
        );
    }
}
