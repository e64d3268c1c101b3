//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Origin base URL every request is forwarded to.
    pub upstream: String,

    /// Bind address (e.g., ":80" or "127.0.0.1:8080").
    pub listen: String,

    /// Content categories to minify.
    pub minify: MinifyCategories,

    /// Inline same-origin stylesheets and scripts into HTML pages.
    pub combine: bool,

    /// Gzip the final response body.
    pub compress: bool,

    /// Write one access log line per request to stdout.
    pub log: bool,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Buffering limits.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            upstream: "http://localhost:8080".to_string(),
            listen: ":80".to_string(),
            minify: MinifyCategories::all(),
            combine: true,
            compress: true,
            log: true,
            timeouts: TimeoutConfig::default(),
            limits: LimitsConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl ProxyConfig {
    /// Listen address in a form `TcpListener::bind` accepts.
    ///
    /// `:8080` means every interface, as it does for Go-style servers.
    pub fn bind_address(&self) -> String {
        if self.listen.starts_with(':') {
            format!("0.0.0.0{}", self.listen)
        } else {
            self.listen.clone()
        }
    }
}

/// Timeout configuration for outbound requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Time allowed for the upstream to answer with a response head.
    pub upstream_secs: u64,

    /// Per-asset fetch timeout while bundling.
    pub asset_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            upstream_secs: 30,
            asset_secs: 10,
        }
    }
}

/// Limits on how much of a body the rewrite stages hold in memory.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Bodies larger than this are streamed through untouched.
    pub max_buffered_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_buffered_bytes: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// A family of content the minifier knows how to shrink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MinifyCategory {
    Css,
    Html,
    Js,
    Json,
    Xml,
    Svg,
}

impl MinifyCategory {
    pub const ALL: [MinifyCategory; 6] = [
        MinifyCategory::Css,
        MinifyCategory::Html,
        MinifyCategory::Js,
        MinifyCategory::Json,
        MinifyCategory::Xml,
        MinifyCategory::Svg,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MinifyCategory::Css => "css",
            MinifyCategory::Html => "html",
            MinifyCategory::Js => "js",
            MinifyCategory::Json => "json",
            MinifyCategory::Xml => "xml",
            MinifyCategory::Svg => "svg",
        }
    }
}

impl fmt::Display for MinifyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MinifyCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "css" => Ok(MinifyCategory::Css),
            "html" => Ok(MinifyCategory::Html),
            "js" => Ok(MinifyCategory::Js),
            "json" => Ok(MinifyCategory::Json),
            "xml" => Ok(MinifyCategory::Xml),
            "svg" => Ok(MinifyCategory::Svg),
            other => Err(format!("unknown minify category `{}`", other)),
        }
    }
}

/// The set of enabled minify categories.
///
/// Accepts a boolean (`true` = all, `false` = none), a comma-separated
/// string (`"css,js"`) or a list (`["css", "js"]`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "RawMinify", into = "RawMinify")]
pub struct MinifyCategories(BTreeSet<MinifyCategory>);

impl MinifyCategories {
    pub fn all() -> Self {
        Self(MinifyCategory::ALL.into_iter().collect())
    }

    pub fn none() -> Self {
        Self(BTreeSet::new())
    }

    pub fn contains(&self, category: MinifyCategory) -> bool {
        self.0.contains(&category)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = MinifyCategory> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<MinifyCategory> for MinifyCategories {
    fn from_iter<I: IntoIterator<Item = MinifyCategory>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl FromStr for MinifyCategories {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "true" => return Ok(Self::all()),
            "false" | "" => return Ok(Self::none()),
            _ => {}
        }
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(MinifyCategory::from_str)
            .collect()
    }
}

impl fmt::Display for MinifyCategories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|c| c.as_str()).collect();
        f.write_str(&names.join(","))
    }
}

#[derive(Deserialize, Serialize)]
#[serde(untagged)]
enum RawMinify {
    Flag(bool),
    Csv(String),
    List(Vec<MinifyCategory>),
}

impl TryFrom<RawMinify> for MinifyCategories {
    type Error = String;

    fn try_from(raw: RawMinify) -> Result<Self, Self::Error> {
        match raw {
            RawMinify::Flag(true) => Ok(Self::all()),
            RawMinify::Flag(false) => Ok(Self::none()),
            RawMinify::Csv(s) => s.parse(),
            RawMinify::List(list) => Ok(list.into_iter().collect()),
        }
    }
}

impl From<MinifyCategories> for RawMinify {
    fn from(categories: MinifyCategories) -> Self {
        RawMinify::List(categories.0.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ProxyConfig::default();
        assert_eq!(config.upstream, "http://localhost:8080");
        assert_eq!(config.listen, ":80");
        assert_eq!(config.minify, MinifyCategories::all());
        assert!(config.combine && config.compress && config.log);
    }

    #[test]
    fn bare_port_binds_all_interfaces() {
        let mut config = ProxyConfig::default();
        assert_eq!(config.bind_address(), "0.0.0.0:80");
        config.listen = "127.0.0.1:3000".into();
        assert_eq!(config.bind_address(), "127.0.0.1:3000");
    }

    #[test]
    fn minify_accepts_bool_csv_and_list() {
        let config: ProxyConfig = toml::from_str("minify = false").unwrap();
        assert!(config.minify.is_empty());

        let config: ProxyConfig = toml::from_str("minify = true").unwrap();
        assert_eq!(config.minify, MinifyCategories::all());

        let config: ProxyConfig = toml::from_str(r#"minify = "css, js""#).unwrap();
        assert!(config.minify.contains(MinifyCategory::Css));
        assert!(config.minify.contains(MinifyCategory::Js));
        assert!(!config.minify.contains(MinifyCategory::Html));

        let config: ProxyConfig = toml::from_str(r#"minify = ["svg"]"#).unwrap();
        assert_eq!(config.minify.iter().collect::<Vec<_>>(), vec![MinifyCategory::Svg]);
    }

    #[test]
    fn unknown_minify_category_is_rejected() {
        assert!("css,wasm".parse::<MinifyCategories>().is_err());
        assert!(toml::from_str::<ProxyConfig>(r#"minify = "php""#).is_err());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config: ProxyConfig = toml::from_str(
            r#"
            upstream = "http://origin:9000"
            compress = false

            [timeouts]
            asset_secs = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.upstream, "http://origin:9000");
        assert!(!config.compress);
        assert!(config.combine);
        assert_eq!(config.timeouts.asset_secs, 3);
        assert_eq!(config.timeouts.upstream_secs, 30);
    }
}
