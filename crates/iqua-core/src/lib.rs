//! Core library for iqua-poller.
//!
//! Retrieves water-softener telemetry from the myIQua cloud API:
//!
//! - [`api`]: `IquaClient`, login + device fetch with one re-auth retry on 401
//! - [`auth`]: credentials and the in-memory token session
//! - [`poller`]: push (background loop) and pull (on-demand) polling
//! - [`models`]: device snapshot and water-usage extraction
//! - [`config`]: TOML/env configuration and validation
//!
//! ```ignore
//! use iqua_core::api::{build_http_client, IquaClient};
//! use iqua_core::auth::Credentials;
//! use iqua_core::models::WaterUsage;
//!
//! let http = build_http_client()?;
//! let mut client = IquaClient::new(http, Credentials::new("me@example.com", "pw", "123"));
//! let snapshot = client.get_device_data().await?;
//! println!("{}", WaterUsage::from_snapshot(&snapshot)?);
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod poller;

pub use api::{ApiError, IquaClient};
pub use auth::Credentials;
pub use config::{Config, ConfigError, Settings};
pub use models::{DeviceSnapshot, UsageSensor, WaterUsage};
pub use poller::{PollInterval, Poller, PollerStatus, RefreshError};
