//! The single upstream origin every request is relayed to.

use axum::http::Uri;
use url::Url;

/// Parsed upstream base URL.
///
/// A path on the base URL (e.g. `http://origin/app`) prefixes every
/// forwarded path.
#[derive(Debug, Clone)]
pub struct Upstream {
    base: Url,
}

impl Upstream {
    pub fn parse(base: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            base: Url::parse(base)?,
        })
    }

    /// The base URL as configured.
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Absolute upstream URL for an inbound path and query.
    pub fn url_for(&self, path: &str, query: Option<&str>) -> Url {
        let prefix = self.base.path().trim_end_matches('/');
        let path = if path.starts_with('/') {
            format!("{}{}", prefix, path)
        } else {
            format!("{}/{}", prefix, path)
        };

        let mut url = self.base.clone();
        url.set_path(&path);
        url.set_query(query);
        url.set_fragment(None);
        url
    }

    /// Upstream URI for an inbound request URI.
    pub fn uri_for(&self, inbound: &Uri) -> Result<Uri, axum::http::uri::InvalidUri> {
        self.url_for(inbound.path(), inbound.query())
            .as_str()
            .parse()
    }
}
