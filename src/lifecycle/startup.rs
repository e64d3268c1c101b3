//! Startup orchestration.
//!
//! # Responsibilities
//! - Layer configuration: file, then command-line flags, then validation
//! - Bind the listener
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal and the process exits nonzero
//! - Listeners bind last (traffic only when ready)

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::args::Args;
use crate::config::loader::{read_config, ConfigError};
use crate::config::validation::validate_config;
use crate::config::ProxyConfig;

/// Errors that stop the proxy from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid upstream url: {0}")]
    Upstream(#[from] url::ParseError),
    #[error("failed to build asset client: {0}")]
    AssetClient(#[from] reqwest::Error),
    #[error("failed to initialize logging: {0}")]
    Logging(#[from] tracing_subscriber::util::TryInitError),
    #[error("invalid metrics address {0}")]
    MetricsAddress(String),
    #[error("failed to start metrics endpoint: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// Build the effective configuration from an optional file and the flags.
pub fn resolve_config(args: Args) -> Result<ProxyConfig, StartupError> {
    let mut config = match args.config.as_deref() {
        Some(path) => read_config(path)?,
        None => ProxyConfig::default(),
    };
    args.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Bind the listen address.
pub async fn bind(config: &ProxyConfig) -> Result<TcpListener, StartupError> {
    let address = config.bind_address();
    TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind { address, source })
}
