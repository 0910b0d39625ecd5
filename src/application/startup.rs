//! Process startup: configuration, logging, adapters, relay.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use console::style;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::relay::{Relay, RelayReport, WatchTarget};
use crate::cli::Cli;
use crate::domain::errors::{DeliveryError, SourceError};
use crate::domain::models::Config;
use crate::domain::ports::{Deliverer, WatermarkStore};
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::console::ConsoleDeliverer;
use crate::infrastructure::github::GitHubClient;
use crate::infrastructure::logging::log_sink::DEFAULT_CAPACITY;
use crate::infrastructure::logging::logger::parse_log_level;
use crate::infrastructure::logging::{LogSinkLayer, LoggerImpl};
use crate::infrastructure::retry::RetryPolicy;
use crate::infrastructure::state::{JsonFileWatermarkStore, MemoryWatermarkStore};
use crate::infrastructure::zulip::ZulipClient;
use crate::services::delivery::DeliveryEngine;
use crate::services::pipeline::Pipeline;
use crate::services::poller::RepositoryPoller;

/// Fatal errors before or while starting the relay.
#[derive(Error, Debug)]
pub enum StartupError {
    /// Configuration missing or invalid
    #[error("Invalid configuration: {0:#}")]
    Config(anyhow::Error),

    /// GitHub or Zulip rejected the configured credentials
    #[error("Credentials rejected by {service}: {message}")]
    Credentials {
        /// Which service rejected them
        service: &'static str,
        /// Reason given by the service
        message: String,
    },

    /// Any other startup failure
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StartupError {
    /// Process exit code for this error.
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::Credentials { .. } => 3,
            Self::Other(_) => 1,
        }
    }
}

/// Load and validate the configuration named by `cli`.
pub fn load_config(cli: &Cli) -> Result<Config, StartupError> {
    let mut config = ConfigLoader::load(&cli.config_path).map_err(StartupError::Config)?;
    if let Some(level) = &cli.log_level {
        config.logging.level.clone_from(level);
    }
    ConfigLoader::validate(&config, cli.zulip_enabled())
        .map_err(|e| StartupError::Config(e.into()))?;
    Ok(config)
}

/// Run the relay until `shutdown` fires.
pub async fn run(cli: Cli, shutdown: CancellationToken) -> Result<RelayReport, StartupError> {
    let config = load_config(&cli)?;

    // In console mode every record already reaches the terminal.
    let (sink, forwarder) = if cli.zulip_enabled() {
        let threshold = parse_log_level(&config.logging.forward_level).map_err(StartupError::Config)?;
        let (layer, forwarder) = LogSinkLayer::channel(threshold, DEFAULT_CAPACITY);
        (Some(layer), Some(forwarder))
    } else {
        (None, None)
    };
    let _logger = LoggerImpl::init(&config.logging, sink)?;

    info!(
        config = %cli.config_path.display(),
        repositories = config.github.repositories.len(),
        zulip = cli.zulip_enabled(),
        "Starting mercourier"
    );

    let deliverer: Arc<dyn Deliverer> = if cli.zulip_enabled() {
        let client = ZulipClient::new(&config.zulip)?;
        check_zulip(&client).await?;
        Arc::new(client)
    } else {
        Arc::new(ConsoleDeliverer::new(config.zulip.stream.clone()))
    };

    let github = GitHubClient::new(&config.github)?;
    check_github(&github).await?;

    let engine = Arc::new(DeliveryEngine::new(
        deliverer,
        RetryPolicy::from_config(&config.zulip.retry),
    ));
    let poller = RepositoryPoller::new(
        Arc::new(github),
        RetryPolicy::from_config(&config.github.retry),
        config.github.first_run,
    );
    let store: Arc<dyn WatermarkStore> = match &config.state.path {
        Some(path) => {
            info!(path = %path.display(), "Persisting watermarks to file");
            Arc::new(JsonFileWatermarkStore::new(path))
        }
        None => Arc::new(MemoryWatermarkStore::new()),
    };

    let forward_cancel = CancellationToken::new();
    let forwarding = forwarder.map(|forwarder| {
        let dropped = forwarder.dropped_counter();
        let handle = forwarder.spawn(Arc::clone(&engine), forward_cancel.clone());
        (handle, dropped)
    });

    let relay = Relay::new(
        Arc::new(poller),
        Arc::new(Pipeline::new(Arc::clone(&engine))),
        store,
        config.shutdown_timeout(),
    );
    let watches = relay
        .restore_watches(&WatchTarget::from_config(&config.github))
        .await
        .map_err(|e| StartupError::Other(e.into()))?;

    let report = relay.run(watches, shutdown).await;

    if let Some((handle, dropped)) = forwarding {
        forward_cancel.cancel();
        match tokio::time::timeout(config.shutdown_timeout(), handle).await {
            Ok(Ok(forwarded)) => info!(forwarded, "Log forwarder drained"),
            Ok(Err(join_error)) => warn!(%join_error, "Log forwarder crashed"),
            Err(_) => warn!("Log forwarder did not drain before the shutdown timeout"),
        }
        let dropped = dropped.load(Ordering::Relaxed);
        if dropped > 0 {
            eprintln!(
                "{} {dropped} log record(s) were not forwarded to Zulip (queue full)",
                style("warning:").yellow().bold()
            );
        }
    }

    Ok(report)
}

async fn check_zulip(client: &ZulipClient) -> Result<(), StartupError> {
    match client.verify_credentials().await {
        Ok(()) => Ok(()),
        Err(DeliveryError::Unauthorized(message)) => Err(StartupError::Credentials {
            service: "Zulip",
            message,
        }),
        Err(error) => {
            warn!(%error, "Could not verify Zulip credentials, continuing");
            Ok(())
        }
    }
}

async fn check_github(client: &GitHubClient) -> Result<(), StartupError> {
    match client.verify_credentials().await {
        Ok(rate) => {
            info!(remaining = ?rate.remaining, "GitHub credentials accepted");
            Ok(())
        }
        Err(SourceError::BadCredentials(message)) => Err(StartupError::Credentials {
            service: "GitHub",
            message,
        }),
        Err(error) => {
            warn!(%error, "Could not verify GitHub credentials, continuing");
            Ok(())
        }
    }
}
