//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, single fallback handler)
//!     → pipeline.rs (request id, trace, access log, compression, minify)
//!     → forwarder.rs (relay to upstream.rs, buffer with body.rs)
//!     → rewrite::interceptor (decode, sniff, bundle)
//!     → headers.rs helpers keep hop-by-hop and length headers right
//!     → Send to client
//! ```

pub mod body;
pub mod forwarder;
pub mod headers;
pub mod pipeline;
pub mod server;
pub mod upstream;

pub use forwarder::{ForwardError, Forwarder};
pub use server::HttpServer;
