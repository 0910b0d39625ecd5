//! Application layer: wiring and the relay loop.

pub mod relay;
pub mod shutdown;
pub mod startup;

pub use relay::{Relay, RelayReport, WatchTarget};
pub use startup::StartupError;
