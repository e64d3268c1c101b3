//! Minifier dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Finalized response (from the interceptor)
//!     → middleware.rs (skip encoded/HEAD/oversized bodies, buffer)
//!     → registry.rs (Content-Type essence → engine, exact before suffix)
//!     → engines.rs (css, html, js, json, xml)
//!     → compression stage
//! ```
//!
//! # Design Decisions
//! - The registry is built once from the enabled categories and never changes
//! - A minify failure forwards the original body
//! - No match means pass-through

pub mod engines;
pub mod middleware;
pub mod registry;

pub use engines::{Engine, HtmlOptions, MinifyError};
pub use middleware::minify_middleware;
pub use registry::{MimePattern, MinifierRegistry};

/// Registry plus the buffering limit the middleware works within.
#[derive(Debug, Clone)]
pub struct Minifier {
    registry: MinifierRegistry,
    max_buffered_bytes: usize,
}

impl Minifier {
    pub fn new(registry: MinifierRegistry, max_buffered_bytes: usize) -> Self {
        Self {
            registry,
            max_buffered_bytes,
        }
    }

    pub fn registry(&self) -> &MinifierRegistry {
        &self.registry
    }

    pub fn max_buffered_bytes(&self) -> usize {
        self.max_buffered_bytes
    }

    /// Minify `body` of MIME type `essence`.
    ///
    /// `Ok(None)` when no engine is registered for the type.
    pub fn dispatch(&self, essence: &str, body: &[u8]) -> Result<Option<Vec<u8>>, MinifyError> {
        match self.registry.lookup(essence) {
            Some(engine) => engine.minify(body).map(Some),
            None => Ok(None),
        }
    }
}
