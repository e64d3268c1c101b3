//! Optimizing Reverse Proxy Library

pub mod compression;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod minify;
pub mod observability;
pub mod rewrite;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
