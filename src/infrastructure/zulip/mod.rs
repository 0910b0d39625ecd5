//! Zulip message adapter

pub mod client;

pub use client::ZulipClient;
