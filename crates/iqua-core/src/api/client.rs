//! API client for the myIQua cloud service.
//!
//! `IquaClient` logs in with account credentials, keeps the bearer token in a
//! `Session`, and fetches the device detail payload. A 401 from the data
//! endpoint clears the token and triggers exactly one re-login and retry.

use std::time::Duration;

use chrono::Utc;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::auth::{Credentials, Session};
use crate::models::DeviceSnapshot;

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Production API root
pub const DEFAULT_BASE_URL: &str = "https://api.myiquaapp.com/v1";

const LOGIN_PATH: &str = "/auth/login";

/// Default per-request timeout in seconds, used for both login and fetch.
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// TCP + TLS handshake limit for clients built by `build_http_client`.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Fetch attempts per `get_device_data` call; the second one only follows a 401.
const MAX_FETCH_ATTEMPTS: u32 = 2;

const USER_AGENT: &str = concat!("iqua-water-poller/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
}

/// Build a connection pool suitable for sharing with `IquaClient`.
/// The caller owns the result; the client only borrows it through clones.
pub fn build_http_client() -> Result<Client, ApiError> {
    let client = Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .build()?;
    Ok(client)
}

/// Per-request timeouts applied on top of the shared client's settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub login: Duration,
    pub fetch: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            login: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            fetch: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Result of a single fetch attempt
#[derive(Debug)]
enum FetchOutcome {
    Fresh(DeviceSnapshot),
    /// 401 from the data endpoint, carrying the response body
    TokenRejected(String),
    Failed(ApiError),
}

/// Authenticated client for one device.
///
/// `get_device_data` takes `&mut self`: token state belongs to a single
/// in-flight call. Share it between tasks behind a `tokio::sync::Mutex`.
pub struct IquaClient {
    client: Client,
    base_url: String,
    credentials: Credentials,
    session: Session,
    timeouts: Timeouts,
}

impl IquaClient {
    /// Create a client on top of a caller-supplied connection pool.
    pub fn new(client: Client, credentials: Credentials) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            credentials,
            session: Session::new(),
            timeouts: Timeouts::default(),
        }
    }

    /// Point the client at another API root (staging, or a mock server in tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn login_url(&self) -> String {
        format!("{}{}", self.base_url, LOGIN_PATH)
    }

    fn data_url(&self) -> String {
        format!(
            "{}/devices/{}/detail-or-summary",
            self.base_url,
            self.credentials.device_id()
        )
    }

    /// Fetch the current device payload, logging in first if no token is held.
    ///
    /// Performs at most two fetches and two logins. Only a 401 from the data
    /// endpoint on the first attempt leads to a retry.
    pub async fn get_device_data(&mut self) -> Result<DeviceSnapshot, ApiError> {
        let mut attempt = 1;

        loop {
            let token = match self.session.token().map(str::to_owned) {
                Some(token) => token,
                None => self.login().await?,
            };

            match self.fetch(&token).await {
                FetchOutcome::Fresh(snapshot) => return Ok(snapshot),
                FetchOutcome::TokenRejected(_) if attempt < MAX_FETCH_ATTEMPTS => {
                    let token_age_secs = self
                        .session
                        .acquired_at()
                        .map(|at| (Utc::now() - at).num_seconds());
                    warn!(attempt, ?token_age_secs, "Token expired, re-authenticating");
                    self.session.clear();
                    attempt += 1;
                }
                FetchOutcome::TokenRejected(body) => {
                    warn!(attempt, "Fresh token rejected, giving up");
                    self.session.clear();
                    return Err(ApiError::from_status(StatusCode::UNAUTHORIZED, &body));
                }
                FetchOutcome::Failed(e) => return Err(e),
            }
        }
    }

    /// POST the credentials and store the returned token
    async fn login(&mut self) -> Result<String, ApiError> {
        let url = self.login_url();
        debug!(url = %url, email = self.credentials.email(), "Logging in");

        let body = LoginRequest {
            email: self.credentials.email(),
            password: self.credentials.password(),
        };

        let response = self
            .client
            .post(&url)
            .timeout(self.timeouts.login)
            .header(header::USER_AGENT, USER_AGENT)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            warn!(status = %status, "Login rejected");
            return Err(ApiError::from_login_status(status, &text));
        }

        let auth: LoginResponse = serde_json::from_str(&text)
            .map_err(|e| ApiError::PayloadShape(format!("invalid login response: {}", e)))?;

        self.session.update(auth.access_token.clone());
        info!(
            token = %self.session.token_hint().unwrap_or_default(),
            "Logged in, token acquired"
        );

        Ok(auth.access_token)
    }

    async fn fetch(&self, token: &str) -> FetchOutcome {
        match self.try_fetch(token).await {
            Ok(outcome) => outcome,
            Err(e) => FetchOutcome::Failed(e),
        }
    }

    async fn try_fetch(&self, token: &str) -> Result<FetchOutcome, ApiError> {
        let url = self.data_url();

        let response = self
            .client
            .get(&url)
            .timeout(self.timeouts.fetch)
            .bearer_auth(token)
            .header(header::USER_AGENT, USER_AGENT)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        debug!(status = %status, bytes = text.len(), "Device data response received");

        if status == StatusCode::UNAUTHORIZED {
            return Ok(FetchOutcome::TokenRejected(text));
        }
        if !status.is_success() {
            warn!(status = %status, "Device data request failed");
            return Err(ApiError::from_status(status, &text));
        }

        let payload = serde_json::from_str(&text)
            .map_err(|e| ApiError::PayloadShape(format!("device data is not JSON: {}", e)))?;

        Ok(FetchOutcome::Fresh(DeviceSnapshot::new(payload)))
    }
}
