//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the forwarder, interceptor and minifier from the config
//! - Create the Axum router: one fallback handler, no routing
//! - Wire up the response pipeline
//! - Serve until the shutdown signal, draining in-flight requests

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::config::ProxyConfig;
use crate::http::forwarder::Forwarder;
use crate::http::pipeline;
use crate::http::upstream::Upstream;
use crate::lifecycle::startup::StartupError;
use crate::minify::{Minifier, MinifierRegistry};
use crate::observability::metrics;
use crate::rewrite::{HttpAssetSource, ResponseInterceptor};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub forwarder: Arc<Forwarder>,
}

/// HTTP server for the optimizing proxy.
pub struct HttpServer {
    router: Router,
    config: Arc<ProxyConfig>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, StartupError> {
        let config = Arc::new(config);
        let upstream = Upstream::parse(&config.upstream)?;
        let connect_timeout = Duration::from_secs(config.timeouts.connect_secs);
        let max_buffered_bytes = config.limits.max_buffered_bytes;

        let assets = HttpAssetSource::new(
            upstream.clone(),
            connect_timeout,
            Duration::from_secs(config.timeouts.asset_secs),
            max_buffered_bytes,
        )?;
        let interceptor = ResponseInterceptor::new(config.clone(), assets);
        let forwarder = Forwarder::new(
            upstream,
            interceptor,
            connect_timeout,
            Duration::from_secs(config.timeouts.upstream_secs),
            max_buffered_bytes,
        )?;

        let minifier = Minifier::new(
            MinifierRegistry::from_categories(&config.minify),
            max_buffered_bytes,
        );

        let state = AppState {
            forwarder: Arc::new(forwarder),
        };
        let router = Self::build_router(config.clone(), state, Arc::new(minifier));

        Ok(Self { router, config })
    }

    /// Build the Axum router with the response pipeline.
    fn build_router(config: Arc<ProxyConfig>, state: AppState, minifier: Arc<Minifier>) -> Router {
        let handler = Router::new().fallback(proxy_handler).with_state(state);
        pipeline::compose(handler, config, minifier)
    }

    /// The router, for driving the server without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream,
            combine = self.config.combine,
            compress = self.config.compress,
            minify = %self.config.minify,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

/// Every request, whatever its method or path, goes to the upstream.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let client_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    match state.forwarder.forward(request, client_addr).await {
        Ok(response) => response,
        Err(e) => {
            metrics::record_upstream_error(e.kind());
            tracing::error!(method = %method, path = %path, error = %e, "Upstream request failed");
            e.into_response()
        }
    }
}
