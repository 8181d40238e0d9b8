//! Configuration loading and validation.
//!
//! Configuration is a TOML file with `[auth]`, `[device]`, `[polling]` and an
//! optional `[api]` section:
//!
//! ```toml
//! [auth]
//! user = "me@example.com"
//! password = "secret"
//!
//! [device]
//! id = "123456"
//!
//! [polling]
//! min_minutes = 10
//! max_minutes = 20
//! ```
//!
//! `IQUA_USER`, `IQUA_PASSWORD` and `IQUA_DEVICE_ID` override the file.
//! Validation happens before any client is built, so a bad config never
//! reaches the network.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::api::{IquaClient, Timeouts, DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS};
use crate::auth::Credentials;
use crate::poller::PollInterval;

/// Application name used for the config directory path
const APP_NAME: &str = "iqua-poller";

/// Config file name
pub const CONFIG_FILE: &str = "config.toml";

pub const DEFAULT_MIN_MINUTES: u64 = 10;
pub const DEFAULT_MAX_MINUTES: u64 = 20;

/// Longest accepted poll interval (one week)
pub const MAX_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

pub const ENV_USER: &str = "IQUA_USER";
pub const ENV_PASSWORD: &str = "IQUA_PASSWORD";
pub const ENV_DEVICE_ID: &str = "IQUA_DEVICE_ID";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Missing config: {0}")]
    Missing(&'static str),

    #[error("polling.max_minutes ({max}) must be greater than or equal to polling.min_minutes ({min})")]
    InvalidInterval { min: u64, max: u64 },

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },

    #[error("Could not find config directory")]
    NoConfigDir,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthSection {
    pub user: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceSection {
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PollingSection {
    pub min_minutes: Option<u64>,
    pub max_minutes: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiSection {
    pub base_url: Option<String>,
    pub login_timeout_secs: Option<u64>,
    pub fetch_timeout_secs: Option<u64>,
}

/// Configuration as read from disk, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub device: DeviceSection,
    #[serde(default)]
    pub polling: PollingSection,
    #[serde(default)]
    pub api: ApiSection,
}

impl Config {
    /// Load from `path`. A missing file yields an empty config so that
    /// environment variables alone can supply the required keys.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using empty config");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Pick the config file: an explicit path wins, then `./config.toml`,
    /// then the per-user config directory.
    pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }
        let local = PathBuf::from(CONFIG_FILE);
        if local.exists() {
            return Ok(local);
        }
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Override credentials from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Override credentials using `lookup` in place of the process environment
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(user) = lookup(ENV_USER) {
            self.auth.user = Some(user);
        }
        if let Some(password) = lookup(ENV_PASSWORD) {
            self.auth.password = Some(password);
        }
        if let Some(id) = lookup(ENV_DEVICE_ID) {
            self.device.id = Some(id);
        }
    }

    /// Check required keys and ranges, producing ready-to-use settings.
    pub fn validate(&self) -> Result<Settings, ConfigError> {
        let user = required(&self.auth.user, "auth.user")?;
        let password = required(&self.auth.password, "auth.password")?;
        let device_id = required(&self.device.id, "device.id")?;
        if let Some(c) = device_id.chars().find(|c| !is_id_char(*c)) {
            return Err(ConfigError::InvalidValue {
                key: "device.id",
                reason: format!("unexpected character {:?}", c),
            });
        }

        let min = self.polling.min_minutes.unwrap_or(DEFAULT_MIN_MINUTES);
        let max = self.polling.max_minutes.unwrap_or(DEFAULT_MAX_MINUTES);
        if min > max {
            return Err(ConfigError::InvalidInterval { min, max });
        }
        if max == 0 {
            return Err(ConfigError::InvalidValue {
                key: "polling.max_minutes",
                reason: "must be at least 1".to_string(),
            });
        }
        if max > MAX_INTERVAL_MINUTES {
            return Err(ConfigError::InvalidValue {
                key: "polling.max_minutes",
                reason: format!("must be at most {}", MAX_INTERVAL_MINUTES),
            });
        }

        let base_url = match self.api.base_url.as_deref().map(str::trim) {
            None | Some("") => DEFAULT_BASE_URL.to_string(),
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
                url.to_string()
            }
            Some(url) => {
                return Err(ConfigError::InvalidValue {
                    key: "api.base_url",
                    reason: format!("{} is not an http(s) URL", url),
                })
            }
        };

        let timeouts = Timeouts {
            login: timeout(self.api.login_timeout_secs, "api.login_timeout_secs")?,
            fetch: timeout(self.api.fetch_timeout_secs, "api.fetch_timeout_secs")?,
        };

        Ok(Settings {
            credentials: Credentials::new(user, password, device_id),
            min_interval: Duration::from_secs(min * 60),
            max_interval: Duration::from_secs(max * 60),
            base_url,
            timeouts,
        })
    }
}

fn required(value: &Option<String>, key: &'static str) -> Result<String, ConfigError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ConfigError::Missing(key)),
    }
}

/// Device ids are interpolated into the request path as a single segment
fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

fn timeout(secs: Option<u64>, key: &'static str) -> Result<Duration, ConfigError> {
    match secs.unwrap_or(DEFAULT_TIMEOUT_SECS) {
        0 => Err(ConfigError::InvalidValue {
            key,
            reason: "must be at least 1 second".to_string(),
        }),
        secs => Ok(Duration::from_secs(secs)),
    }
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub credentials: Credentials,
    pub min_interval: Duration,
    pub max_interval: Duration,
    pub base_url: String,
    pub timeouts: Timeouts,
}

impl Settings {
    /// Build a client for the configured device on top of `http`
    pub fn client(&self, http: Client) -> IquaClient {
        IquaClient::new(http, self.credentials.clone())
            .with_base_url(self.base_url.clone())
            .with_timeouts(self.timeouts)
    }

    /// Jittered between min and max, or fixed at the minimum
    pub fn poll_interval(&self, fixed: bool) -> PollInterval {
        if fixed {
            PollInterval::Fixed(self.min_interval)
        } else {
            PollInterval::Jittered {
                min: self.min_interval,
                max: self.max_interval,
            }
        }
    }
}
