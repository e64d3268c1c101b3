//! Response rewriting subsystem.
//!
//! # Data Flow
//! ```text
//! Buffered origin response
//!     → interceptor.rs (decode, sniff, hand HTML to the bundler, finalize headers)
//!     → sniff.rs (classify the leading bytes)
//!     → bundler.rs (find, fetch and inline stylesheets and scripts)
//!         → resolver.rs (normalize URLs, same-origin check, fetch)
//!         → css.rs (re-anchor url()/@import references)
//! ```
//!
//! # Design Decisions
//! - All per-response state is local to the request's task
//! - Rewrite failures never reach the client as errors

pub mod bundler;
pub mod css;
pub mod interceptor;
pub mod resolver;
pub mod sniff;

pub use bundler::{AssetBundler, AssetKind, AssetReference, BundleBuffer};
pub use interceptor::{Intercepted, InterceptError, Outcome, ResponseInterceptor, Stage};
pub use resolver::{AssetSource, FetchError, HttpAssetSource, InboundOrigin};
