//! Header manipulation.
//!
//! # Responsibilities
//! - Add X-Forwarded-For, X-Forwarded-Proto, X-Forwarded-Host
//! - Strip hop-by-hop headers
//! - Strip headers that identify the origin's software
//! - Keep Content-Length consistent with rewritten bodies
//!
//! # Design Decisions
//! - Content-Length is always the byte length of the final body
//! - Encoding checks are case-insensitive and tolerate surrounding whitespace

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};

/// Headers that only apply to a single connection.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub const X_POWERED_BY: HeaderName = HeaderName::from_static("x-powered-by");

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

/// Remove headers advertising the origin's server software.
pub fn strip_identifying(headers: &mut HeaderMap) {
    headers.remove(header::SERVER);
    headers.remove(X_POWERED_BY);
}

/// Set Content-Length to the byte length of the body.
pub fn set_content_length(headers: &mut HeaderMap, len: usize) {
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
}

/// Whether the body is gzip-encoded.
pub fn is_gzip(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_ENCODING)
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            let value = value.trim();
            value.eq_ignore_ascii_case("gzip") || value.eq_ignore_ascii_case("x-gzip")
        })
        .unwrap_or(false)
}

/// Whether any content coding other than identity has been applied.
pub fn is_encoded(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_ENCODING)
        .and_then(|value| value.to_str().ok())
        .map(|value| !value.trim().is_empty() && !value.trim().eq_ignore_ascii_case("identity"))
        .unwrap_or(false)
}

/// Whether the client's `Accept-Encoding` admits gzip.
pub fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|coding| {
            let mut parts = coding.split(';');
            let name = parts.next().unwrap_or("").trim();
            if !(name.eq_ignore_ascii_case("gzip") || name == "*") {
                return false;
            }
            // `gzip;q=0` explicitly refuses the coding.
            parts
                .filter_map(|param| param.trim().strip_prefix("q="))
                .all(|q| q.trim().parse::<f32>().map(|q| q > 0.0).unwrap_or(false))
        })
}

/// Add `value` to the `Vary` header unless already listed.
pub fn append_vary(headers: &mut HeaderMap, value: &'static str) {
    let listed = headers
        .get_all(header::VARY)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|v| v.trim().eq_ignore_ascii_case(value) || v.trim() == "*");
    if !listed {
        headers.append(header::VARY, HeaderValue::from_static(value));
    }
}

/// The MIME essence (type/subtype, lower-cased, no parameters) of the
/// response's Content-Type.
pub fn mime_essence(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
    match value.parse::<mime::Mime>() {
        Ok(mime) => Some(mime.essence_str().to_ascii_lowercase()),
        Err(_) => {
            let essence = value.split(';').next()?.trim();
            (!essence.is_empty()).then(|| essence.to_ascii_lowercase())
        }
    }
}
