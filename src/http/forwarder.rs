//! Relays requests to the upstream and hands responses to the interceptor.
//!
//! # Responsibilities
//! - Rewrite the request URI onto the upstream, keeping the inbound Host
//! - Strip hop-by-hop headers in both directions
//! - Add X-Forwarded-For, X-Forwarded-Host, X-Forwarded-Proto
//! - Buffer the response body within the configured limit and run the
//!   interceptor on it
//!
//! # Design Decisions
//! - No retries and no fallback origin
//! - Connection failure is a 502, a missing response head within
//!   `timeouts.upstream_secs` a 504
//! - Bodies over the buffering limit stream through with headers cleaned

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Body,
    http::{
        header, uri::InvalidUri, HeaderMap, HeaderValue, Method, Request, StatusCode, Version,
    },
    response::{IntoResponse, Response},
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;

use crate::http::body::{self, Buffered};
use crate::http::headers::{self, X_FORWARDED_FOR, X_FORWARDED_HOST, X_FORWARDED_PROTO};
use crate::http::upstream::Upstream;
use crate::observability::metrics;
use crate::rewrite::interceptor::{self, Outcome, ResponseInterceptor};
use crate::rewrite::InboundOrigin;

/// Why a request could not be relayed.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("invalid upstream uri: {0}")]
    InvalidUri(#[from] InvalidUri),
    #[error("failed to build upstream request: {0}")]
    Request(#[from] axum::http::Error),
    #[error("upstream unreachable: {0}")]
    Unreachable(#[source] hyper_util::client::legacy::Error),
    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),
    #[error("failed to read upstream body: {0}")]
    Body(#[source] axum::Error),
}

impl ForwardError {
    pub fn status(&self) -> StatusCode {
        match self {
            ForwardError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    /// Metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardError::InvalidUri(_) | ForwardError::Request(_) => "request",
            ForwardError::Unreachable(_) => "unreachable",
            ForwardError::Timeout(_) => "timeout",
            ForwardError::Body(_) => "body",
        }
    }
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response {
        let message = match self.status() {
            StatusCode::GATEWAY_TIMEOUT => "Upstream timed out",
            _ => "Upstream request failed",
        };
        (self.status(), message).into_response()
    }
}

/// Forwards every request to the single upstream.
pub struct Forwarder {
    client: Client<HttpConnector, Body>,
    upstream: Upstream,
    interceptor: ResponseInterceptor,
    upstream_timeout: Duration,
    max_buffered_bytes: usize,
    /// Used when the request names no usable host.
    default_origin: InboundOrigin,
}

impl Forwarder {
    pub fn new(
        upstream: Upstream,
        interceptor: ResponseInterceptor,
        connect_timeout: Duration,
        upstream_timeout: Duration,
        max_buffered_bytes: usize,
    ) -> Result<Self, url::ParseError> {
        let base = upstream.base();
        let authority = match (base.host_str(), base.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(url::ParseError::EmptyHost),
        };
        let default_origin = InboundOrigin::new(base.scheme(), &authority)?;

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            client,
            upstream,
            interceptor,
            upstream_timeout,
            max_buffered_bytes,
            default_origin,
        })
    }

    /// Relay `request` and return the intercepted response.
    pub async fn forward(
        &self,
        request: Request<Body>,
        client_addr: Option<SocketAddr>,
    ) -> Result<Response, ForwardError> {
        let origin = self.inbound_origin(request.headers(), request.uri());
        let method = request.method().clone();
        let (mut parts, body) = request.into_parts();

        let uri = self.upstream.uri_for(&parts.uri)?;
        headers::strip_hop_by_hop(&mut parts.headers);
        add_forwarded_headers(&mut parts.headers, client_addr, &origin);
        if !parts.headers.contains_key(header::HOST) {
            if let Ok(host) = HeaderValue::from_str(origin.host()) {
                parts.headers.insert(header::HOST, host);
            }
        }

        let mut upstream_request = Request::builder()
            .method(parts.method)
            .uri(uri.clone())
            .version(Version::HTTP_11)
            .body(body)?;
        *upstream_request.headers_mut() = parts.headers;

        tracing::debug!(method = %method, upstream = %uri, "Forwarding request");

        let response = match tokio::time::timeout(
            self.upstream_timeout,
            self.client.request(upstream_request),
        )
        .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(ForwardError::Unreachable(e)),
            Err(_) => return Err(ForwardError::Timeout(self.upstream_timeout)),
        };

        let (mut parts, body) = response.into_parts();
        headers::strip_hop_by_hop(&mut parts.headers);

        if method == Method::HEAD || !carries_body(parts.status) {
            return Ok(interceptor::pass_through(Response::from_parts(parts, Body::new(body))));
        }

        let declared = body::declared_length(&parts.headers);
        let bytes = match body::buffer(body, self.max_buffered_bytes, declared)
            .await
            .map_err(ForwardError::Body)?
        {
            Buffered::Complete(bytes) => bytes,
            Buffered::Overflow(stream) => {
                tracing::debug!(upstream = %uri, "Body exceeds buffering limit, streaming through");
                return Ok(interceptor::pass_through(Response::from_parts(parts, stream)));
            }
        };

        let intercepted = self
            .interceptor
            .intercept(Response::from_parts(parts, bytes), &origin)
            .await;

        match &intercepted.outcome {
            Outcome::Rewritten {
                stylesheets,
                scripts,
            } => {
                tracing::debug!(upstream = %uri, stylesheets, scripts, "Inlined page assets");
                metrics::record_rewrite_outcome(intercepted.outcome.label(), "rewritten");
            }
            Outcome::PassThrough { at } => {
                tracing::trace!(upstream = %uri, stage = %at, "Response passed through");
                metrics::record_rewrite_outcome(intercepted.outcome.label(), at.as_str());
            }
            Outcome::FailOpen { at, error } => {
                tracing::warn!(
                    upstream = %uri,
                    stage = %at,
                    error = %error,
                    "Rewrite failed, forwarding original body"
                );
                metrics::record_rewrite_outcome(intercepted.outcome.label(), at.as_str());
            }
        }

        Ok(intercepted.response.map(Body::from))
    }

    /// Scheme and host the client addressed.
    fn inbound_origin(&self, headers: &HeaderMap, uri: &axum::http::Uri) -> InboundOrigin {
        let scheme = headers
            .get(X_FORWARDED_PROTO)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(',').next().unwrap_or("").trim().to_ascii_lowercase())
            .filter(|v| v == "http" || v == "https")
            .unwrap_or_else(|| "http".to_string());

        let host = headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| uri.authority().map(|a| a.to_string()));

        host.and_then(|host| InboundOrigin::new(&scheme, &host).ok())
            .unwrap_or_else(|| self.default_origin.clone())
    }
}

/// Statuses whose responses never carry a body.
fn carries_body(status: StatusCode) -> bool {
    !(status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}

fn add_forwarded_headers(headers: &mut HeaderMap, client: Option<SocketAddr>, origin: &InboundOrigin) {
    if let Some(addr) = client {
        let ip = addr.ip().to_string();
        let value = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(prior) => format!("{}, {}", prior, ip),
            None => ip,
        };
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }
    if !headers.contains_key(X_FORWARDED_HOST) {
        if let Ok(value) = HeaderValue::from_str(origin.host()) {
            headers.insert(X_FORWARDED_HOST, value);
        }
    }
    if !headers.contains_key(X_FORWARDED_PROTO) {
        if let Ok(value) = HeaderValue::from_str(origin.scheme()) {
            headers.insert(X_FORWARDED_PROTO, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_for_is_appended() {
        let origin = InboundOrigin::new("https", "example.com").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("203.0.113.9"));

        add_forwarded_headers(&mut headers, Some("192.0.2.1:4000".parse().unwrap()), &origin);

        assert_eq!(headers[X_FORWARDED_FOR], "203.0.113.9, 192.0.2.1");
        assert_eq!(headers[X_FORWARDED_HOST], "example.com");
        assert_eq!(headers[X_FORWARDED_PROTO], "https");
    }

    #[test]
    fn bodiless_statuses() {
        assert!(!carries_body(StatusCode::NO_CONTENT));
        assert!(!carries_body(StatusCode::NOT_MODIFIED));
        assert!(!carries_body(StatusCode::CONTINUE));
        assert!(carries_body(StatusCode::NOT_FOUND));
    }

    #[test]
    fn timeout_maps_to_gateway_timeout() {
        let err = ForwardError::Timeout(Duration::from_secs(1));
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(err.kind(), "timeout");
    }
}
