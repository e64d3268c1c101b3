//! Gzip codec and the response compression stage.
//!
//! # Data Flow
//! ```text
//! origin body ──gzip?──▶ gunzip (interceptor, bounded)
//!                             ...rewrite, minify...
//! final body ──client accepts gzip?──▶ gzip (best) ──▶ access log ──▶ client
//! ```
//!
//! # Design Decisions
//! - Compression runs after minification and is the last body mutation
//! - A body that already carries a Content-Encoding is never re-encoded,
//!   so a client sees at most one gzip layer
//! - Negotiated against the client's Accept-Encoding
//! - Decompression is bounded to defend against gzip bombs

pub mod middleware;

use std::io::{self, Read, Write};

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

pub use middleware::compression_middleware;

/// Gzip `data` at the highest compression level.
pub fn gzip(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::best());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Decompress a gzip body, refusing to inflate past `limit` bytes.
///
/// Concatenated members are decoded back to back, as RFC 1952 allows.
pub fn gunzip(data: &[u8], limit: usize) -> io::Result<Vec<u8>> {
    let mut decoded = Vec::new();
    MultiGzDecoder::new(data)
        .take(limit as u64 + 1)
        .read_to_end(&mut decoded)?;
    if decoded.len() > limit {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("decompressed body exceeds {} bytes", limit),
        ));
    }
    Ok(decoded)
}
