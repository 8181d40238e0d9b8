//! REST API client module for the myIQua cloud service.
//!
//! This module provides the `IquaClient` for fetching water-softener
//! telemetry. The API uses bearer token authentication obtained from
//! the `/auth/login` endpoint.

pub mod client;
pub mod error;

pub use client::{build_http_client, IquaClient, Timeouts, DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS};
pub use error::ApiError;
