//! Content-type sniffing.
//!
//! Classifies a body from its leading bytes, following the WHATWG MIME
//! sniffing rules browsers use. The declared `Content-Type` is ignored:
//! origins routinely mislabel responses.

/// Number of leading bytes the sniffer looks at.
pub const SNIFF_LEN: usize = 512;

pub const TEXT_HTML: &str = "text/html; charset=utf-8";
const TEXT_XML: &str = "text/xml; charset=utf-8";
const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const OCTET_STREAM: &str = "application/octet-stream";

/// Markup prefixes that identify HTML. Matched case-insensitively after
/// leading whitespace and must be followed by a space or `>`.
const HTML_SIGNATURES: &[&[u8]] = &[
    b"<!DOCTYPE HTML",
    b"<HTML",
    b"<HEAD",
    b"<SCRIPT",
    b"<IFRAME",
    b"<H1",
    b"<DIV",
    b"<FONT",
    b"<TABLE",
    b"<A",
    b"<STYLE",
    b"<TITLE",
    b"<B",
    b"<BODY",
    b"<BR",
    b"<P",
    b"<!--",
];

/// Exact byte prefixes with a known type.
const MAGIC: &[(&[u8], &str)] = &[
    (b"%PDF-", "application/pdf"),
    (b"%!PS-Adobe-", "application/postscript"),
    (b"\xFE\xFF", "text/plain; charset=utf-16be"),
    (b"\xFF\xFE", "text/plain; charset=utf-16le"),
    (b"\xEF\xBB\xBF", TEXT_PLAIN),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"\x89PNG\x0D\x0A\x1A\x0A", "image/png"),
    (b"\xFF\xD8\xFF", "image/jpeg"),
    (b"BM", "image/bmp"),
    (b"\x00\x00\x01\x00", "image/x-icon"),
    (b"\x00\x00\x02\x00", "image/x-icon"),
    (b"OggS\x00", "application/ogg"),
    (b"ID3", "audio/mpeg"),
    (b"wOFF", "font/woff"),
    (b"wOF2", "font/woff2"),
    (b"\x1F\x8B\x08", "application/x-gzip"),
    (b"PK\x03\x04", "application/zip"),
    (b"Rar!\x1A\x07\x00", "application/x-rar-compressed"),
    (b"\x00asm", "application/wasm"),
];

/// Classify `body` by its first [`SNIFF_LEN`] bytes.
///
/// Always returns a concrete MIME type; unknown text is `text/plain`,
/// unknown binary is `application/octet-stream`.
pub fn sniff(body: &[u8]) -> &'static str {
    let sample = &body[..body.len().min(SNIFF_LEN)];

    let trimmed = skip_whitespace(sample);
    if HTML_SIGNATURES
        .iter()
        .any(|signature| matches_html_signature(trimmed, signature))
    {
        return TEXT_HTML;
    }
    if starts_with_ignore_case(trimmed, b"<?xml") {
        return TEXT_XML;
    }

    if let Some(&(_, mime)) = MAGIC.iter().find(|(magic, _)| sample.starts_with(magic)) {
        return mime;
    }
    if sample.len() >= 14 && &sample[..4] == b"RIFF" && &sample[8..14] == b"WEBPVP" {
        return "image/webp";
    }

    if sample.iter().any(|&b| is_binary(b)) {
        OCTET_STREAM
    } else {
        TEXT_PLAIN
    }
}

/// Whether a MIME type (with or without parameters) denotes HTML.
pub fn is_html(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("text/html")
}

fn skip_whitespace(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|b| !matches!(b, b'\t' | b'\n' | b'\x0C' | b'\r' | b' '))
        .unwrap_or(data.len());
    &data[start..]
}

fn matches_html_signature(data: &[u8], signature: &[u8]) -> bool {
    if !starts_with_ignore_case(data, signature) {
        return false;
    }
    // A bare prefix like `<B` must end the tag name, so `<BUTTON` or a
    // truncated sample does not count.
    matches!(data.get(signature.len()), Some(b' ' | b'>'))
}

fn starts_with_ignore_case(data: &[u8], prefix: &[u8]) -> bool {
    data.len() >= prefix.len() && data[..prefix.len()].eq_ignore_ascii_case(prefix)
}

fn is_binary(byte: u8) -> bool {
    matches!(byte, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_html_documents() {
        assert_eq!(sniff(b"<!DOCTYPE html>\n<html></html>"), TEXT_HTML);
        assert_eq!(sniff(b"  \r\n<html lang=\"en\">"), TEXT_HTML);
        assert_eq!(sniff(b"<p>fragment</p>"), TEXT_HTML);
        assert_eq!(sniff(b"<!-- comment -->"), TEXT_HTML);
    }

    #[test]
    fn html_signature_needs_tag_terminator() {
        assert_eq!(sniff(b"<button>click</button>"), TEXT_PLAIN);
        assert_eq!(sniff(b"<html"), TEXT_PLAIN);
    }

    #[test]
    fn declared_type_plays_no_part() {
        // JSON body that an origin might label text/html.
        assert_eq!(sniff(br#"{"a": 1}"#), TEXT_PLAIN);
    }

    #[test]
    fn detects_xml_and_binary_formats() {
        assert_eq!(sniff(b"<?xml version=\"1.0\"?><svg/>"), TEXT_XML);
        assert_eq!(sniff(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR"), "image/png");
        assert_eq!(sniff(b"GIF89a...."), "image/gif");
        assert_eq!(sniff(b"RIFF\0\0\0\0WEBPVP8 "), "image/webp");
        assert_eq!(sniff(b"\x1f\x8b\x08\0\0\0"), "application/x-gzip");
        assert_eq!(sniff(&[0u8, 1, 2, 3, 200]), OCTET_STREAM);
    }

    #[test]
    fn only_leading_sample_is_inspected() {
        let mut body = vec![b'a'; SNIFF_LEN];
        body.push(0x00);
        assert_eq!(sniff(&body), TEXT_PLAIN);
    }

    #[test]
    fn is_html_ignores_parameters_and_case() {
        assert!(is_html("Text/HTML; charset=ISO-8859-1"));
        assert!(!is_html("text/plain"));
    }
}
