//! The response hook between the forwarder and the rest of the pipeline.
//!
//! # Data Flow
//! ```text
//! Received ──gunzip──▶ Decoded ──sniff──▶ Sniffed ──parse──▶ Parsed ──bundle──▶ Rewritten ──▶ Finalized
//!     │                    │                 │                  │
//!     └── decode failure   └── not HTML      └── parse failure  └── nothing fetched
//!         (fail open)          (pass through)    (fail open)        (pass through)
//! ```
//!
//! # Design Decisions
//! - Every failure forwards the best bytes available; only an unreachable
//!   upstream produces an error response, and that is the forwarder's call
//! - `Server` and `X-Powered-By` are stripped from every response
//! - Content-Length always matches the byte length of the body sent on
//! - The sniffed type decides whether a body is HTML; the declared
//!   `Content-Type` is only filled in when the origin sent none

use std::fmt;
use std::sync::Arc;

use axum::http::{header, HeaderValue, Response};
use bytes::Bytes;
use lol_html::errors::RewritingError;
use thiserror::Error;

use super::bundler::AssetBundler;
use super::resolver::{AssetSource, HttpAssetSource, InboundOrigin};
use super::sniff;
use crate::compression;
use crate::config::ProxyConfig;
use crate::http::headers::{is_encoded, is_gzip, set_content_length, strip_identifying};

/// Body states, in the order a response moves through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Decoded,
    Sniffed,
    Parsed,
    Rewritten,
    Finalized,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Decoded => "decoded",
            Stage::Sniffed => "sniffed",
            Stage::Parsed => "parsed",
            Stage::Rewritten => "rewritten",
            Stage::Finalized => "finalized",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rewrite-stage failure. Never reaches the client.
#[derive(Debug, Error)]
pub enum InterceptError {
    #[error("gzip decode failed: {0}")]
    Decode(#[source] std::io::Error),
    #[error("html rewrite failed: {0}")]
    Parse(#[from] RewritingError),
}

/// How a response left the interceptor.
#[derive(Debug)]
pub enum Outcome {
    /// Assets were inlined.
    Rewritten { stylesheets: usize, scripts: usize },
    /// The body was left alone after reaching `at`.
    PassThrough { at: Stage },
    /// A stage failed after `at`; the body of that stage was forwarded.
    FailOpen { at: Stage, error: InterceptError },
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Rewritten { .. } => "rewritten",
            Outcome::PassThrough { .. } => "pass_through",
            Outcome::FailOpen { .. } => "fail_open",
        }
    }
}

/// A replacement response plus how it was produced.
#[derive(Debug)]
pub struct Intercepted {
    pub response: Response<Bytes>,
    pub outcome: Outcome,
}

/// Rewrites origin responses on their way to the client.
pub struct ResponseInterceptor<S = HttpAssetSource> {
    config: Arc<ProxyConfig>,
    bundler: AssetBundler<S>,
}

impl<S: AssetSource> ResponseInterceptor<S> {
    pub fn new(config: Arc<ProxyConfig>, source: S) -> Self {
        Self {
            config,
            bundler: AssetBundler::new(source),
        }
    }

    /// Run a fully buffered response through the state machine.
    pub async fn intercept(&self, response: Response<Bytes>, origin: &InboundOrigin) -> Intercepted {
        let (mut parts, body) = response.into_parts();
        strip_identifying(&mut parts.headers);

        // Received → Decoded
        let body = if is_gzip(&parts.headers) {
            match compression::gunzip(&body, self.config.limits.max_buffered_bytes) {
                Ok(decoded) => {
                    parts.headers.remove(header::CONTENT_ENCODING);
                    Bytes::from(decoded)
                }
                Err(e) => {
                    return finalize(
                        parts,
                        body,
                        Outcome::FailOpen {
                            at: Stage::Received,
                            error: InterceptError::Decode(e),
                        },
                    );
                }
            }
        } else if is_encoded(&parts.headers) {
            // Only gzip is decoded; other codings are relayed as is.
            return finalize(parts, body, Outcome::PassThrough { at: Stage::Received });
        } else {
            body
        };

        // Decoded → Sniffed
        let sniffed = sniff::sniff(&body);
        if !parts.headers.contains_key(header::CONTENT_TYPE) {
            parts
                .headers
                .insert(header::CONTENT_TYPE, HeaderValue::from_static(sniffed));
        }
        if !sniff::is_html(sniffed) || !self.config.combine {
            return finalize(parts, body, Outcome::PassThrough { at: Stage::Sniffed });
        }

        // Sniffed → Parsed → Rewritten
        match self.bundler.bundle(&body, origin).await {
            Ok(bundled) if bundled.is_unchanged() => {
                finalize(parts, body, Outcome::PassThrough { at: Stage::Parsed })
            }
            Ok(bundled) => finalize(
                parts,
                bundled.body,
                Outcome::Rewritten {
                    stylesheets: bundled.stylesheets,
                    scripts: bundled.scripts,
                },
            ),
            Err(e) => finalize(
                parts,
                body,
                Outcome::FailOpen {
                    at: Stage::Sniffed,
                    error: e.into(),
                },
            ),
        }
    }
}

/// Header-only treatment for responses whose body is not buffered.
pub fn pass_through<B>(response: Response<B>) -> Response<B> {
    let (mut parts, body) = response.into_parts();
    strip_identifying(&mut parts.headers);
    Response::from_parts(parts, body)
}

fn finalize(mut parts: axum::http::response::Parts, body: Bytes, outcome: Outcome) -> Intercepted {
    set_content_length(&mut parts.headers, body.len());
    Intercepted {
        response: Response::from_parts(parts, body),
        outcome,
    }
}
