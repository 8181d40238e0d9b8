//! Authentication state for the myIQua API.
//!
//! This module provides:
//! - `Credentials`: the immutable email/password/device triple
//! - `Session`: the in-memory bearer token holder
//!
//! Tokens live only as long as the process. Nothing is written to disk.

pub mod credentials;
pub mod session;

pub use credentials::Credentials;
pub use session::Session;
