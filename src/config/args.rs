//! Command-line overrides layered on top of the config file.

use std::path::PathBuf;

use clap::Parser;

use crate::config::schema::{MinifyCategories, ProxyConfig};

#[derive(Debug, Parser)]
#[command(name = "optimizing-proxy")]
#[command(about = "Reverse proxy that bundles, minifies and compresses pages on the fly", long_about = None)]
pub struct Args {
    /// Optional TOML config file; flags below override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// The upstream origin to forward every request to
    #[arg(long)]
    pub upstream: Option<String>,

    /// The address to listen on (e.g. ":80")
    #[arg(long, visible_alias = "http")]
    pub listen: Option<String>,

    /// Types to minify: comma-separated among css,html,js,json,xml,svg, or true/false
    #[arg(long)]
    pub minify: Option<MinifyCategories>,

    /// Inline same-origin assets into HTML pages
    #[arg(long)]
    pub combine: Option<bool>,

    /// Gzip the output
    #[arg(long, visible_alias = "gzip")]
    pub compress: Option<bool>,

    /// Write an access log to stdout
    #[arg(long)]
    pub log: Option<bool>,
}

impl Args {
    /// Apply every flag that was given to `config`.
    pub fn apply(self, config: &mut ProxyConfig) {
        if let Some(upstream) = self.upstream {
            config.upstream = upstream;
        }
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(minify) = self.minify {
            config.minify = minify;
        }
        if let Some(combine) = self.combine {
            config.combine = combine;
        }
        if let Some(compress) = self.compress {
            config.compress = compress;
        }
        if let Some(log) = self.log {
            config.log = log;
        }
    }
}
