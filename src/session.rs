//! Provider session management for Nereus
//!
//! This module owns the credentials and the single authenticated portal
//! session. The session is time-bounded: once it is older than its validity
//! window, or after the provider rejected it, the next `ensure_session` logs
//! in again. Sessions live in memory only.

use crate::config::SessionConfig;
use crate::error::{NereusError, Result};
use crate::logging::get_logger;
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::Arc;
use tokio::time::sleep;

/// Account credentials
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub account_number: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("account_number", &self.account_number)
            .finish()
    }
}

/// Authenticated portal session
#[derive(Clone, PartialEq)]
pub struct Session {
    cookie: String,
    issued_at: DateTime<Utc>,
    validity: Duration,
}

impl Session {
    pub fn new(cookie: String, issued_at: DateTime<Utc>, validity: Duration) -> Self {
        Self {
            cookie,
            issued_at,
            validity,
        }
    }

    /// `Cookie` header value for portal requests
    pub fn cookie(&self) -> &str {
        &self.cookie
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Whether the session is presumed expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now - self.issued_at >= self.validity
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("cookie", &format!("<{} bytes>", self.cookie.len()))
            .field("issued_at", &self.issued_at)
            .field("validity", &self.validity)
            .finish()
    }
}

/// Login exchange against the provider
#[async_trait::async_trait]
pub trait Authenticator: Send + Sync {
    /// Sign in and return the session cookie material
    async fn login(&self, credentials: &Credentials) -> Result<String>;
}

/// Session manager for the provider portal
pub struct SessionManager {
    authenticator: Arc<dyn Authenticator>,
    credentials: Credentials,
    session: Option<Session>,
    validity: Duration,
    max_attempts: u32,
    retry_delay: std::time::Duration,
    logins: u64,
    logger: crate::logging::StructuredLogger,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        credentials: Credentials,
        config: &SessionConfig,
    ) -> Self {
        let logger = get_logger("session");
        Self {
            authenticator,
            credentials,
            session: None,
            validity: i64::try_from(config.validity_minutes)
                .ok()
                .and_then(Duration::try_minutes)
                .unwrap_or(Duration::MAX),
            max_attempts: config.login_max_attempts.max(1),
            retry_delay: std::time::Duration::from_millis(config.login_retry_delay_ms),
            logins: 0,
            logger,
        }
    }

    /// Return a usable session, logging in when needed
    pub async fn ensure_session(&mut self) -> Result<Session> {
        self.ensure_session_at(Utc::now()).await
    }

    /// `ensure_session` against an explicit clock
    pub async fn ensure_session_at(&mut self, now: DateTime<Utc>) -> Result<Session> {
        if let Some(session) = &self.session {
            if !session.is_expired_at(now) {
                return Ok(session.clone());
            }
            self.logger.debug(&format!(
                "Session issued at {} expired, signing in again",
                session.issued_at
            ));
            self.session = None;
        }

        let cookie = self.login_with_retry().await?;
        let session = Session::new(cookie, now, self.validity);
        self.session = Some(session.clone());
        self.logins += 1;
        self.logger.info("Signed in to provider portal");
        Ok(session)
    }

    /// Drop the session after the provider rejected it
    pub fn invalidate(&mut self) {
        if self.session.take().is_some() {
            self.logger.warn("Session rejected by provider, discarding it");
        }
    }

    /// Whether a session is currently held
    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Successful sign-ins since start
    pub fn login_count(&self) -> u64 {
        self.logins
    }

    async fn login_with_retry(&self) -> Result<String> {
        let mut attempts = 0;

        loop {
            attempts += 1;
            let err = match self.authenticator.login(&self.credentials).await {
                Ok(cookie) if !cookie.trim().is_empty() => return Ok(cookie),
                Ok(_) => NereusError::authentication("Login returned no session material"),
                Err(e) => e,
            };

            if attempts >= self.max_attempts {
                self.logger.error(&format!(
                    "Login failed after {} attempts: {}",
                    attempts, err
                ));
                return Err(if err.is_authentication() {
                    err
                } else {
                    NereusError::authentication(format!(
                        "Login failed after {} attempts: {}",
                        attempts, err
                    ))
                });
            }

            self.logger
                .warn(&format!("Login attempt {} failed: {}", attempts, err));
            sleep(self.retry_delay).await;
        }
    }
}
