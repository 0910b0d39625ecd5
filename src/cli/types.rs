//! CLI type definitions
//!
//! This module contains the clap structure that defines the command line.

use std::path::PathBuf;

use clap::Parser;

use crate::infrastructure::config::DEFAULT_CONFIG_PATH;

/// Command line of the relay
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "mercourier")]
#[command(about = "Relay GitHub repository activity into Zulip topics", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(default_value = DEFAULT_CONFIG_PATH)]
    pub config_path: PathBuf,

    /// Print messages to the console instead of sending them to Zulip
    #[arg(long)]
    pub zulip_off: bool,

    /// Override logging.level from the configuration file
    #[arg(long, value_name = "LEVEL", value_parser = ["trace", "debug", "info", "warn", "error"])]
    pub log_level: Option<String>,
}

impl Cli {
    /// False when messages go to the console instead of Zulip.
    pub const fn zulip_enabled(&self) -> bool {
        !self.zulip_off
    }
}
