use super::MeterApi;
use super::auth::{Pkce, cookie_value, extract_between, fragment_param};
use super::types::{MeterUsage, parse_usage_response};
use crate::config::{AccountConfig, FetchConfig};
use crate::error::{NereusError, Result};
use crate::logging::{LogContext, get_logger_with_context};
use crate::session::{Authenticator, Credentials, Session};
use chrono::{Datelike, NaiveDate};
use reqwest::Url;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{CONTENT_TYPE, COOKIE, REFERER, USER_AGENT};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const LOGIN_BASE: &str =
    "https://login.thameswater.co.uk/identity.thameswater.co.uk/b2c_1_tw_website_signin";
const POLICY: &str = "B2C_1_tw_website_signin";
const REDIRECT_URI: &str = "https://www.thameswater.co.uk/login";
const PORTAL: &str = "https://myaccount.thameswater.co.uk";
const SIGNIN_PATH: &str = "/twservice/Account/SignIn?useremail=";
const USAGE_PATH: &str = "/ajax/waterMeter/getSmartWaterMeterConsumptions";
const BROWSER_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    refresh_token: Option<String>,
}

/// Thames Water portal client
pub struct ThamesWaterClient {
    client_id: String,
    account_number: String,
    meter_id: String,
    timeout: Duration,
    http: reqwest::Client,
    logger: crate::logging::StructuredLogger,
}

impl ThamesWaterClient {
    pub fn new(account: &AccountConfig, fetch: &FetchConfig) -> Result<Self> {
        let timeout = Duration::from_secs(fetch.request_timeout_secs.max(1));
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(BROWSER_UA)
            .build()?;
        let logger = get_logger_with_context(
            LogContext::new("provider")
                .with_account(account.account_number.clone())
                .with_meter(account.meter_id.clone()),
        );

        Ok(Self {
            client_id: account.client_id.clone(),
            account_number: account.account_number.clone(),
            meter_id: account.meter_id.clone(),
            timeout,
            http,
            logger,
        })
    }

    fn portal_url(path: &str) -> Result<Url> {
        Url::parse(&format!("{}{}", PORTAL, path))
            .map_err(|e| NereusError::generic(format!("Invalid portal URL: {}", e)))
    }

    fn status_error(step: &str, status: reqwest::StatusCode) -> NereusError {
        if status.is_server_error() {
            NereusError::transient_fetch(format!("{} failed: HTTP {}", step, status))
        } else {
            NereusError::authentication(format!("{} failed: HTTP {}", step, status))
        }
    }

    /// Run the full sign-in exchange on a fresh cookie jar and return the
    /// portal cookies.
    async fn sign_in(&self, credentials: &Credentials) -> Result<String> {
        let jar = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(BROWSER_UA)
            .cookie_provider(jar.clone())
            .build()?;
        let pkce = Pkce::generate();

        // Authorize: sets the transaction and CSRF cookies
        let authorize_url = format!("{}/oauth2/v2.0/authorize", LOGIN_BASE);
        let nonce = uuid::Uuid::new_v4().to_string();
        let state = uuid::Uuid::new_v4().to_string();
        let resp = http
            .get(&authorize_url)
            .query(&[
                ("client_id", self.client_id.as_str()),
                ("scope", "openid profile offline_access"),
                ("response_type", "code"),
                ("redirect_uri", REDIRECT_URI),
                ("response_mode", "fragment"),
                ("code_challenge", pkce.challenge.as_str()),
                ("code_challenge_method", "S256"),
                ("nonce", nonce.as_str()),
                ("state", state.as_str()),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::status_error("authorize", resp.status()));
        }

        let login_url = Url::parse(LOGIN_BASE)
            .map_err(|e| NereusError::generic(format!("Invalid login URL: {}", e)))?;
        let login_cookies = jar
            .cookies(&login_url)
            .and_then(|v| v.to_str().ok().map(str::to_string))
            .unwrap_or_default();
        let (Some(trans), Some(csrf)) = (
            cookie_value(&login_cookies, "x-ms-cpim-trans"),
            cookie_value(&login_cookies, "x-ms-cpim-csrf"),
        ) else {
            return Err(NereusError::authentication(
                "Sign-in page did not issue transaction cookies",
            ));
        };
        let tx = format!("StateProperties={}", trans);

        // Credentials
        let resp = http
            .post(format!(
                "https://login.thameswater.co.uk/identity.thameswater.co.uk/{}/SelfAsserted",
                POLICY
            ))
            .query(&[("tx", tx.as_str()), ("p", POLICY)])
            .header("x-csrf-token", &csrf)
            .form(&[
                ("request_type", "RESPONSE"),
                ("email", credentials.username.as_str()),
                ("password", credentials.password.as_str()),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::status_error("credential submission", resp.status()));
        }
        let body = resp.text().await?;
        if body.contains("\"status\":\"400\"") {
            return Err(NereusError::authentication("Credentials rejected by provider"));
        }

        // Confirmation redirects to the website with the code in the fragment
        let resp = http
            .get(format!(
                "https://login.thameswater.co.uk/identity.thameswater.co.uk/{}/api/CombinedSigninAndSignup/confirmed",
                POLICY
            ))
            .query(&[
                ("rememberMe", "false"),
                ("tx", tx.as_str()),
                ("csrf_token", csrf.as_str()),
                ("p", POLICY),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::status_error("sign-in confirmation", resp.status()));
        }
        let code = resp
            .url()
            .fragment()
            .and_then(|f| fragment_param(f, "code"))
            .ok_or_else(|| NereusError::authentication("Sign-in confirmation returned no code"))?;

        // Token exchange and refresh
        let token_url = format!("{}/oauth2/v2.0/token", LOGIN_BASE);
        let tokens: TokenResponse = http
            .post(&token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", REDIRECT_URI),
                ("scope", "openid offline_access profile"),
                ("grant_type", "authorization_code"),
                ("client_info", "1"),
                ("code_verifier", pkce.verifier.as_str()),
                ("code", code.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let refresh_token = tokens
            .refresh_token
            .ok_or_else(|| NereusError::authentication("Token response had no refresh token"))?;
        http.post(&token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("scope", "openid profile offline_access"),
                ("grant_type", "refresh_token"),
                ("client_info", "1"),
                ("refresh_token", refresh_token.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;

        // Portal hand-off
        let signin_url = format!("{}{}", PORTAL, SIGNIN_PATH);
        for path in [
            "/mydashboard".to_string(),
            format!(
                "/mydashboard/my-meters-usage?contractAccountNumber={}",
                self.account_number
            ),
        ] {
            http.get(format!("{}{}", PORTAL, path))
                .header(REFERER, &signin_url)
                .send()
                .await?;
        }

        let resp = http
            .get(&signin_url)
            .header(REFERER, &signin_url)
            .send()
            .await?;
        let handoff_url = resp.url().clone();
        let page = resp.text().await?;
        let portal_state = extract_between(handoff_url.as_str(), "&state=", "&nonce=")
            .map(|s| s.replace("%3d", "="))
            .ok_or_else(|| NereusError::authentication("Portal hand-off had no state"))?;
        let id_token = extract_between(&page, "id='id_token' value='", "'/>")
            .map(str::to_string)
            .ok_or_else(|| NereusError::authentication("Portal hand-off had no id token"))?;
        http.get(handoff_url)
            .header(REFERER, &signin_url)
            .send()
            .await?;

        let resp = http
            .post(format!("{}/login", PORTAL))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(&[("state", portal_state.as_str()), ("id_token", id_token.as_str())])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::status_error("portal login", resp.status()));
        }

        let portal = Self::portal_url("/")?;
        jar.add_cookie_str("b2cAuthenticated=true", &portal);
        jar.cookies(&portal)
            .and_then(|v| v.to_str().ok().map(str::to_string))
            .filter(|c| !c.is_empty())
            .ok_or_else(|| NereusError::authentication("Portal issued no session cookies"))
    }
}

#[async_trait::async_trait]
impl Authenticator for ThamesWaterClient {
    async fn login(&self, credentials: &Credentials) -> Result<String> {
        self.logger.debug("Starting provider sign-in");
        self.sign_in(credentials).await
    }
}

#[async_trait::async_trait]
impl MeterApi for ThamesWaterClient {
    async fn meter_usage(&self, session: &Session, date: NaiveDate) -> Result<Option<MeterUsage>> {
        let url = Self::portal_url(USAGE_PATH)?;
        let day = format!("{:02}", date.day());
        let month = format!("{:02}", date.month());
        let year = date.year().to_string();

        let resp = self
            .http
            .get(url)
            .query(&[
                ("meter", self.meter_id.as_str()),
                ("startDate", day.as_str()),
                ("startMonth", month.as_str()),
                ("startYear", year.as_str()),
                ("endDate", day.as_str()),
                ("endMonth", month.as_str()),
                ("endYear", year.as_str()),
                ("granularity", "H"),
                ("premiseId", ""),
                ("isForC4C", "false"),
            ])
            .header(USER_AGENT, BROWSER_UA)
            .header(REFERER, format!("{}/mydashboard/my-meters-usage", PORTAL))
            .header("X-Requested-With", "XMLHttpRequest")
            .header(COOKIE, session.cookie())
            .send()
            .await?;

        let status = resp.status().as_u16();
        let body = resp.text().await?;
        let usage = parse_usage_response(status, &body)?;
        if usage.is_none() {
            self.logger.warn(&format!(
                "Undecodable usage payload for {} ({} bytes), treating as no data",
                date,
                body.len()
            ));
        }
        Ok(usage)
    }
}
