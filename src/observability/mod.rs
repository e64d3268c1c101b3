//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events, stderr)
//!     → metrics.rs (counters, histograms)
//!
//! The outermost pipeline stage produces:
//!     → access_log.rs (combined log format, stdout)
//!
//! Consumers:
//!     → Log aggregation (stderr / stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID (`x-request-id`) is attached by tower_http and shows up in
//!   the trace span of every event
//! - Metrics are cheap (atomic increments) and no-ops until a recorder
//!   is installed

pub mod access_log;
pub mod logging;
pub mod metrics;

pub use access_log::access_log_middleware;
