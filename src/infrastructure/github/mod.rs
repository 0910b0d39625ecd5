//! GitHub repository events adapter

pub mod client;

pub use client::GitHubClient;
