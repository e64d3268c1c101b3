//! Response compression stage.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::ProxyConfig;
use crate::http::body::{self, Buffered};
use crate::http::headers::{
    accepts_gzip, append_vary, is_encoded, mime_essence, set_content_length,
};
use crate::observability::metrics;

/// Gzip the final body when enabled and the client accepts it.
pub async fn compression_middleware(
    State(config): State<Arc<ProxyConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !config.compress {
        return next.run(request).await;
    }

    let accepts = accepts_gzip(request.headers());
    let head_request = request.method() == Method::HEAD;
    let response = next.run(request).await;

    let status = response.status();
    if head_request
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
        || is_encoded(response.headers())
        || !compressible(mime_essence(response.headers()).as_deref())
    {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    append_vary(&mut parts.headers, "accept-encoding");
    if !accepts {
        return Response::from_parts(parts, body);
    }

    let declared = body::declared_length(&parts.headers);
    let bytes = match body::buffer(body, config.limits.max_buffered_bytes, declared).await {
        Ok(Buffered::Complete(bytes)) => bytes,
        Ok(Buffered::Overflow(stream)) => return Response::from_parts(parts, stream),
        Err(e) => {
            tracing::error!(error = %e, "Failed to read response body for compression");
            return (StatusCode::BAD_GATEWAY, "Upstream body failed").into_response();
        }
    };

    if bytes.is_empty() {
        return Response::from_parts(parts, Body::from(bytes));
    }

    match crate::compression::gzip(&bytes) {
        Ok(compressed) => {
            tracing::trace!(before = bytes.len(), after = compressed.len(), "Compressed response");
            metrics::record_compression(bytes.len(), compressed.len());
            parts
                .headers
                .insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            parts.headers.remove(header::ACCEPT_RANGES);
            set_content_length(&mut parts.headers, compressed.len());
            Response::from_parts(parts, Body::from(compressed))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Gzip failed, sending uncompressed body");
            Response::from_parts(parts, Body::from(bytes))
        }
    }
}

/// Formats that are already compressed gain nothing from gzip.
fn compressible(essence: Option<&str>) -> bool {
    let Some(essence) = essence else {
        return true;
    };
    if essence == "image/svg+xml" {
        return true;
    }
    !(essence.starts_with("image/")
        || essence.starts_with("video/")
        || essence.starts_with("audio/")
        || matches!(
            essence,
            "font/woff" | "font/woff2" | "application/zip" | "application/gzip" | "application/x-gzip"
        ))
}
