//! Data models for myIQua device payloads.
//!
//! - `DeviceSnapshot`: one fetched detail-or-summary payload
//! - `WaterUsage`, `UsageSensor`: field extraction for display and reporting

pub mod snapshot;
pub mod usage;

pub use snapshot::DeviceSnapshot;
pub use usage::{UsageSensor, WaterUsage};
