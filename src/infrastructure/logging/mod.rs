//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - Console output (JSON or pretty)
//! - Optional rolling JSON log file
//! - Forwarding of this process's own records to Zulip
//! - Secret scrubbing of forwarded records

pub mod log_sink;
pub mod logger;
pub mod secret_scrubbing;

pub use log_sink::{LogForwarder, LogSinkLayer, LOG_SINK_SPAN};
pub use logger::LoggerImpl;
pub use secret_scrubbing::SecretScrubber;
