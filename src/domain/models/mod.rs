//! Domain models

pub mod config;
pub mod event;
pub mod routable;
pub mod watch;

pub use config::{
    Config, FirstRunPolicy, GitHubConfig, LogFormat, LoggingConfig, RepositoryConfig,
    RepositoryEntry, RetryConfig, RotationPolicy, StateConfig, ZulipConfig,
};
pub use event::{Actor, EventId, EventType, RawEvent, RepoRef};
pub use routable::{DeliveryTask, EventOrigin, RoutableEvent};
pub use watch::{RepoWatch, WatermarkState};
