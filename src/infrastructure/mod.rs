//! Infrastructure layer module
//!
//! Adapters for the domain ports plus the ambient plumbing:
//! - GitHub events client (`EventSource`)
//! - Zulip messages client and console deliverer (`Deliverer`)
//! - Watermark stores (`WatermarkStore`)
//! - Configuration loading and validation
//! - Logging, including forwarding of log records to Zulip
//! - Retry policy shared by polling and delivery

pub mod config;
pub mod console;
pub mod github;
pub mod logging;
pub mod retry;
pub mod state;
pub mod zulip;
