//! Mercourier - GitHub to Zulip relay
//!
//! Mercourier polls the public event feed of a set of GitHub repositories and
//! posts every push, issue, pull request and comment to a Zulip stream, one
//! topic per branch, issue or pull request. Its own log records travel the
//! same way to `log/{LEVEL}` topics.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): events, watches, configuration and port traits
//! - **Service Layer** (`services`): classification, routing, formatting,
//!   polling and delivery
//! - **Infrastructure Layer** (`infrastructure`): GitHub and Zulip clients,
//!   watermark stores, config loading, logging
//! - **Application Layer** (`application`): startup and the relay loop
//! - **CLI Layer** (`cli`): command-line interface

pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::{Relay, RelayReport, StartupError};
pub use domain::models::{Config, DeliveryTask, RawEvent, RepoWatch, RoutableEvent};
pub use domain::ports::{Deliverer, EventHandoff, EventSource, WatermarkStore};
pub use infrastructure::config::{ConfigError, ConfigLoader};
