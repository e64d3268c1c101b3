//! The fixed middleware chain around the forwarder.
//!
//! # Data Flow
//! ```text
//! request ─▶ set request id ─▶ trace span ─▶ propagate request id
//!         ─▶ access log ─▶ compression ─▶ minify ─▶ forwarder + interceptor
//!
//! response flows back the other way:
//!   forwarder + interceptor ─▶ minify ─▶ compression ─▶ access log ─▶ client
//! ```
//!
//! # Design Decisions
//! - The order is fixed; it is not configurable
//! - Compression wraps minified bytes, never the reverse
//! - The access log sees the final status and byte count
//! - No aggregate timeout wraps the chain

use std::sync::Arc;

use axum::{body::Body, http::Request, middleware, Router};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::compression::compression_middleware;
use crate::config::ProxyConfig;
use crate::minify::{minify_middleware, Minifier};
use crate::observability::access_log_middleware;

/// Wrap `handler` (the forwarding router) in the response pipeline.
///
/// Layers added later run first on the request and last on the response.
pub fn compose(handler: Router, config: Arc<ProxyConfig>, minifier: Arc<Minifier>) -> Router {
    handler
        .layer(middleware::from_fn_with_state(minifier, minify_middleware))
        .layer(middleware::from_fn_with_state(config.clone(), compression_middleware))
        .layer(middleware::from_fn_with_state(config, access_log_middleware))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-");
            tracing::info_span!(
                "request",
                request_id = %request_id,
                method = %request.method(),
                uri = %request.uri(),
            )
        }))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}
