//! Optimizing Reverse Proxy
//!
//! Sits in front of an origin web server and rewrites its responses on the
//! way out: same-origin stylesheets and scripts are inlined into HTML
//! pages, bodies are minified by content type, and the result is gzipped
//! for clients that accept it.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────────────────┐
//!                  │                     OPTIMIZING PROXY                          │
//!                  │                                                               │
//!  Client Request  │  ┌──────────┐   ┌───────────┐   ┌──────────┐   ┌──────────┐  │
//!  ────────────────┼─▶│ access   │──▶│compression│──▶│  minify  │──▶│forwarder │──┼──▶ Origin
//!                  │  │   log    │   │           │   │          │   │          │  │
//!  Client Response │  │          │   │           │   │          │   │ ┌──────┐ │  │
//!  ◀───────────────┼──│          │◀──│           │◀──│          │◀──│ │inter-│ │◀─┼─── Origin
//!                  │  └──────────┘   └───────────┘   └──────────┘   │ │ceptor│ │  │
//!                  │                                                │ └──┬───┘ │  │
//!                  │                                                └────┼─────┘  │
//!                  │                                                     ▼        │
//!                  │                                          bundler ──▶ asset   │
//!                  │                                                      fetches │
//!                  │  ┌─────────────────────────────────────────────────────────┐ │
//!                  │  │  config · observability · lifecycle (startup/shutdown)  │ │
//!                  │  └─────────────────────────────────────────────────────────┘ │
//!                  └──────────────────────────────────────────────────────────────┘
//! ```

use clap::Parser;

use optimizing_proxy::config::args::Args;
use optimizing_proxy::lifecycle::{signals, startup, Shutdown, StartupError};
use optimizing_proxy::observability::{logging, metrics};
use optimizing_proxy::HttpServer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = startup::resolve_config(args)?;

    logging::init_tracing(&config.observability.log_level).map_err(StartupError::from)?;

    tracing::info!("optimizing-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        upstream = %config.upstream,
        listen = %config.listen,
        minify = %config.minify,
        combine = config.combine,
        compress = config.compress,
        log = config.log,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::MetricsAddress(config.observability.metrics_address.clone()))?;
        metrics::init_metrics(addr).map_err(StartupError::from)?;
    }

    let listener = startup::bind(&config).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(address = %local_addr, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config)?;
    let receiver = shutdown.subscribe();
    signals::spawn_signal_listener(shutdown);

    server.run(listener, receiver).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
