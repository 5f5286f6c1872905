//! Utility functions shared by the CLI.
//!
//! - [`app_data`] - Application data directory and `AppConfig`
//! - [`progress`] - Progress bars (no-op without the `progress` feature)

pub mod app_data;
pub mod progress;

pub use app_data::*;
