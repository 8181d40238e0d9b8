//! Polling driver for the authenticated client.
//!
//! - `Poller`: push mode (`start`/`stop` background loop) and pull mode (`refresh`)
//! - `PollInterval`: fixed or jittered delay between polls
//! - `RefreshError`: pull-mode failure classification

pub mod driver;
pub mod schedule;

pub use driver::{Poller, PollerStatus, RefreshError};
pub use schedule::PollInterval;
