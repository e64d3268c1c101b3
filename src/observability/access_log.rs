//! Access logging, the outermost stage of the response pipeline.
//!
//! Sees the final status and byte count, after minification and
//! compression. Lines use the combined log format:
//!
//! ```text
//! 127.0.0.1 - - [19/Oct/2026:10:00:00 +0000] "GET /index.html HTTP/1.1" 200 5120 "-" "curl/8.5.0"
//! ```

use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::{Body, HttpBody},
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Local, TimeZone};

use super::metrics;
use crate::config::ProxyConfig;

/// Request-side fields captured before the request is handed on.
#[derive(Debug, Clone)]
pub struct RequestLine {
    pub client: Option<SocketAddr>,
    pub method: String,
    pub target: String,
    pub version: &'static str,
    pub referer: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestLine {
    pub fn from_request<B>(request: &Request<B>) -> Self {
        let header_value = |name: header::HeaderName| {
            request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Self {
            client: request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0),
            method: request.method().to_string(),
            target: request
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| "/".to_string()),
            version: version_str(request.version()),
            referer: header_value(header::REFERER),
            user_agent: header_value(header::USER_AGENT),
        }
    }
}

fn version_str(version: axum::http::Version) -> &'static str {
    match version {
        axum::http::Version::HTTP_09 => "HTTP/0.9",
        axum::http::Version::HTTP_10 => "HTTP/1.0",
        axum::http::Version::HTTP_2 => "HTTP/2.0",
        axum::http::Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}

/// Format one combined-log-format line.
pub fn combined_line<Tz: TimeZone>(
    line: &RequestLine,
    status: u16,
    bytes: Option<u64>,
    at: &DateTime<Tz>,
) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!(
        "{} - - [{}] \"{} {} {}\" {} {} \"{}\" \"{}\"",
        line.client
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "-".to_string()),
        at.format("%d/%b/%Y:%H:%M:%S %z"),
        line.method,
        line.target,
        line.version,
        status,
        bytes.map_or_else(|| "-".to_string(), |b| b.to_string()),
        line.referer.as_deref().unwrap_or("-"),
        line.user_agent.as_deref().unwrap_or("-"),
    )
}

/// Size of the final body, when known up front.
fn response_bytes(headers: &HeaderMap, body: &Body) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .or_else(|| body.size_hint().exact())
}

/// Record metrics for every request and, when enabled, print its access line.
pub async fn access_log_middleware(
    State(config): State<Arc<ProxyConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let line = RequestLine::from_request(&request);

    let response = next.run(request).await;

    let status = response.status().as_u16();
    metrics::record_request(&line.method, status, start);

    if config.log {
        let bytes = response_bytes(response.headers(), response.body());
        let entry = combined_line(&line, status, bytes, &Local::now());
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{}", entry) {
            tracing::warn!(error = %e, "Failed to write access log");
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    fn request_line() -> RequestLine {
        RequestLine {
            client: Some("192.0.2.7:51000".parse().unwrap()),
            method: "GET".to_string(),
            target: "/blog?page=2".to_string(),
            version: "HTTP/1.1",
            referer: Some("http://example.com/".to_string()),
            user_agent: Some("curl/8.5.0".to_string()),
        }
    }

    #[test]
    fn formats_combined_line() {
        let at = FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 10, 19, 9, 5, 3)
            .unwrap();
        assert_eq!(
            combined_line(&request_line(), 200, Some(512), &at),
            r#"192.0.2.7 - - [19/Oct/2026:09:05:03 +0200] "GET /blog?page=2 HTTP/1.1" 200 512 "http://example.com/" "curl/8.5.0""#
        );
    }

    #[test]
    fn unknown_fields_are_dashes() {
        let line = RequestLine {
            client: None,
            referer: None,
            user_agent: None,
            ..request_line()
        };
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            combined_line(&line, 502, None, &at),
            r#"- - - [02/Jan/2026:03:04:05 +0000] "GET /blog?page=2 HTTP/1.1" 502 - "-" "-""#
        );
    }

    #[test]
    fn request_line_from_request() {
        let request = Request::builder()
            .method("POST")
            .uri("http://example.com/form?x=1")
            .header(header::USER_AGENT, "test")
            .body(())
            .unwrap();
        let line = RequestLine::from_request(&request);
        assert_eq!(line.method, "POST");
        assert_eq!(line.target, "/form?x=1");
        assert_eq!(line.user_agent.as_deref(), Some("test"));
        assert!(line.client.is_none());
    }
}
