//! Bounded body buffering.
//!
//! Rewrite stages need whole bodies, but a proxy must not hold an arbitrarily
//! large download in memory. Bodies are collected up to a limit; anything
//! bigger is handed back as a stream that replays the bytes already read.

use axum::body::{Body, HttpBody};
use bytes::{Bytes, BytesMut};
use futures_util::{stream, StreamExt};
use http_body_util::BodyExt;

/// Result of trying to buffer a body.
pub enum Buffered {
    /// The whole body, within the limit.
    Complete(Bytes),
    /// The body exceeded the limit; this stream yields it unchanged.
    Overflow(Body),
}

/// Collect `body` if it fits in `limit` bytes.
///
/// `declared_len` (a Content-Length, when known) lets an oversized body skip
/// buffering entirely.
pub async fn buffer<B>(body: B, limit: usize, declared_len: Option<u64>) -> Result<Buffered, axum::Error>
where
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<axum::BoxError>,
{
    let mut body = Body::new(body);
    if declared_len.is_some_and(|len| len > limit as u64) {
        return Ok(Buffered::Overflow(body));
    }

    let mut collected = BytesMut::new();
    while let Some(frame) = body.frame().await {
        let frame = frame?;
        let Ok(data) = frame.into_data() else {
            // Trailers are not forwarded by the rewrite path.
            continue;
        };
        collected.extend_from_slice(&data);
        if collected.len() > limit {
            let head = collected.freeze();
            let replay = stream::once(async move { Ok::<Bytes, axum::Error>(head) })
                .chain(body.into_data_stream());
            return Ok(Buffered::Overflow(Body::from_stream(replay)));
        }
    }

    Ok(Buffered::Complete(collected.freeze()))
}

/// Content-Length header value, if present and well-formed.
pub fn declared_length(headers: &axum::http::HeaderMap) -> Option<u64> {
    headers
        .get(axum::http::header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn small_body_is_collected() {
        match buffer(Body::from("hello"), 16, None).await.unwrap() {
            Buffered::Complete(bytes) => assert_eq!(&bytes[..], b"hello"),
            Buffered::Overflow(_) => panic!("expected complete body"),
        }
    }

    #[tokio::test]
    async fn oversized_body_replays_every_byte() {
        let chunks = vec![Ok::<_, std::io::Error>("abcd"), Ok("efgh"), Ok("ijkl")];
        let body = Body::from_stream(stream::iter(chunks));
        let Buffered::Overflow(body) = buffer(body, 6, None).await.unwrap() else {
            panic!("expected overflow");
        };
        let bytes = body.collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"abcdefghijkl");
    }

    #[tokio::test]
    async fn declared_length_short_circuits() {
        let Buffered::Overflow(body) = buffer(Body::from("abc"), 2, Some(3)).await.unwrap() else {
            panic!("expected overflow");
        };
        let bytes = body.collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"abc");
    }
}
