//! Domain layer for Mercourier
//!
//! This module contains the core data model and the port traits that the
//! infrastructure adapters implement.

pub mod errors;
pub mod models;
pub mod ports;

// Re-export error types for convenient access
pub use errors::{DeliveryError, SourceError, StateError};
