//! Ambient infrastructure shared by every client.
//!
//! - [`config`] - Configuration parsing and validation
//! - [`error`] - Error taxonomy
//! - [`telemetry`] - Tracing setup

pub mod config;
pub mod error;
pub mod telemetry;
