//! Asset URL resolution and fetching.
//!
//! # Responsibilities
//! - Normalize `href`/`src` values into absolute URLs against the inbound Host
//! - Decide whether an asset is same-origin with the inbound request
//! - Fetch asset bodies, one request per asset
//!
//! # Design Decisions
//! - References starting with `//`, `http://` or `https://` are already
//!   absolute; everything else is treated as root-relative
//! - Scheme-relative references take the inbound request's scheme
//! - Same-origin assets are fetched from the upstream directly, with the
//!   inbound Host header, instead of looping back through the public host
//! - No retry, no caching: a failed fetch only skips that asset

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use url::Url;

use crate::compression;
use crate::http::headers::is_gzip;
use crate::http::upstream::Upstream;

/// Scheme and Host of the request a page is being served for.
#[derive(Debug, Clone)]
pub struct InboundOrigin {
    scheme: String,
    host: String,
    base: Url,
}

impl InboundOrigin {
    /// Build the origin from the inbound scheme and `Host` header value.
    pub fn new(scheme: &str, host: &str) -> Result<Self, url::ParseError> {
        let scheme = scheme.to_ascii_lowercase();
        let base = Url::parse(&format!("{}://{}/", scheme, host))?;
        Ok(Self {
            scheme,
            host: host.to_string(),
            base,
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Whether `url` points at the same host (and port) as this origin.
    pub fn is_same_origin(&self, url: &Url) -> bool {
        url.host_str() == self.base.host_str() && url.port() == self.base.port()
    }
}

/// Normalize an asset reference into an absolute URL string.
pub fn normalize(reference: &str, origin: &InboundOrigin) -> String {
    let reference = reference.trim();
    if reference.starts_with("//") {
        format!("{}:{}", origin.scheme(), reference)
    } else if has_http_scheme(reference) {
        reference.to_string()
    } else {
        format!(
            "{}://{}/{}",
            origin.scheme(),
            origin.host(),
            reference.trim_start_matches('/')
        )
    }
}

/// Normalize and parse an asset reference.
pub fn resolve(reference: &str, origin: &InboundOrigin) -> Result<Url, url::ParseError> {
    Url::parse(&normalize(reference, origin))
}

fn has_http_scheme(reference: &str) -> bool {
    let lower = reference.get(..8).unwrap_or(reference).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Why an asset could not be fetched.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("asset exceeds {0} bytes")]
    TooLarge(usize),
    #[error("invalid gzip body: {0}")]
    Decode(#[source] std::io::Error),
}

/// Source of asset bodies for the bundler.
pub trait AssetSource: Send + Sync {
    /// Fetch the asset at `url` on behalf of a request for `origin`.
    fn fetch(
        &self,
        url: &Url,
        origin: &InboundOrigin,
    ) -> impl Future<Output = Result<Bytes, FetchError>> + Send;
}

/// Fetches same-origin assets from the upstream over HTTP.
#[derive(Debug, Clone)]
pub struct HttpAssetSource {
    client: reqwest::Client,
    upstream: Upstream,
    max_bytes: usize,
}

impl HttpAssetSource {
    pub fn new(
        upstream: Upstream,
        connect_timeout: Duration,
        timeout: Duration,
        max_bytes: usize,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()?;
        Ok(Self {
            client,
            upstream,
            max_bytes,
        })
    }
}

impl AssetSource for HttpAssetSource {
    async fn fetch(&self, url: &Url, origin: &InboundOrigin) -> Result<Bytes, FetchError> {
        let target = self.upstream.url_for(url.path(), url.query());

        tracing::debug!(asset = %url, target = %target, "Fetching asset");

        let response = self
            .client
            .get(target)
            .header(reqwest::header::HOST, origin.host())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        if response
            .content_length()
            .is_some_and(|len| len > self.max_bytes as u64)
        {
            return Err(FetchError::TooLarge(self.max_bytes));
        }

        let gzipped = is_gzip(response.headers());
        let body = response.bytes().await?;
        if body.len() > self.max_bytes {
            return Err(FetchError::TooLarge(self.max_bytes));
        }
        if gzipped {
            let decoded = compression::gunzip(&body, self.max_bytes).map_err(FetchError::Decode)?;
            return Ok(Bytes::from(decoded));
        }
        Ok(body)
    }
}
