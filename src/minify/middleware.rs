//! Minification stage of the response pipeline.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::Minifier;
use crate::http::body::{self, Buffered};
use crate::http::headers::{is_encoded, mime_essence, set_content_length};
use crate::observability::metrics;

/// Minify the response body according to its Content-Type.
pub async fn minify_middleware(
    State(minifier): State<Arc<Minifier>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let head_request = request.method() == Method::HEAD;
    let response = next.run(request).await;

    if minifier.registry().is_empty() || head_request || is_encoded(response.headers()) {
        return response;
    }
    let Some(essence) = mime_essence(response.headers()) else {
        return response;
    };
    if minifier.registry().lookup(&essence).is_none() {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let declared = body::declared_length(&parts.headers);
    let bytes = match body::buffer(body, minifier.max_buffered_bytes(), declared).await {
        Ok(Buffered::Complete(bytes)) => bytes,
        Ok(Buffered::Overflow(stream)) => return Response::from_parts(parts, stream),
        Err(e) => {
            tracing::error!(error = %e, "Failed to read response body for minification");
            return (StatusCode::BAD_GATEWAY, "Upstream body failed").into_response();
        }
    };

    match minifier.dispatch(&essence, &bytes) {
        Ok(Some(minified)) => {
            tracing::trace!(
                content_type = %essence,
                before = bytes.len(),
                after = minified.len(),
                "Minified response"
            );
            metrics::record_minify(&essence, "ok");
            set_content_length(&mut parts.headers, minified.len());
            Response::from_parts(parts, Body::from(minified))
        }
        Ok(None) => Response::from_parts(parts, Body::from(bytes)),
        Err(e) => {
            metrics::record_minify(&essence, "error");
            tracing::warn!(content_type = %essence, error = %e, "Minification failed, forwarding original body");
            set_content_length(&mut parts.headers, bytes.len());
            Response::from_parts(parts, Body::from(bytes))
        }
    }
}
