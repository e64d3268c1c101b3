//! `url(...)` and `@import` reference rewriting for inlined stylesheets.
//!
//! A stylesheet moved from `/css/site.css` into a `<style>` element of
//! `/blog/post` would resolve its relative references against the page
//! instead of the stylesheet. Every relative reference is therefore
//! rewritten to a scheme-relative URL anchored at the stylesheet's own host
//! and directory.
//!
//! # Design Decisions
//! - One linear pass enumerates references by byte span; replacements are
//!   applied per span, so two references with identical text are handled
//!   independently and nothing outside a reference is ever touched
//! - Comments are skipped; fragment-only (`#id`), `data:` and absolute or
//!   scheme-relative targets are left alone
//! - The output of a rewrite only contains scheme-relative targets, so a
//!   second pass is a no-op

use std::ops::Range;

use url::{Position, Url};

/// Which construct a reference came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CssReferenceKind {
    /// `url(...)`
    Url,
    /// `@import(...)` or `@import "..."`
    Import,
}

/// A reference target found in a stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssReference {
    pub kind: CssReferenceKind,
    /// Byte span of the target literal, including quotes when quoted.
    pub span: Range<usize>,
    /// Quote character wrapping the target, if any.
    pub quote: Option<char>,
    /// The target with quotes removed.
    pub target: String,
}

/// Enumerate every `url(...)` / `@import` target in document order.
pub fn references(css: &str) -> Vec<CssReference> {
    let bytes = css.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let rest = &bytes[i..];
        if rest.starts_with(b"/*") {
            i = find(bytes, i + 2, b"*/").map_or(bytes.len(), |end| end + 2);
        } else if rest[0] == b'"' || rest[0] == b'\'' {
            i = string_end(bytes, i);
        } else if starts_with_ignore_case(rest, b"url(") && !preceded_by_ident(bytes, i) {
            match function_argument(css, i + 4, CssReferenceKind::Url) {
                Some((reference, next)) => {
                    found.extend(reference);
                    i = next;
                }
                None => i += 4,
            }
        } else if starts_with_ignore_case(rest, b"@import") {
            let j = skip_whitespace(bytes, i + 7);
            match bytes.get(j) {
                Some(b'(') => match function_argument(css, j + 1, CssReferenceKind::Import) {
                    Some((reference, next)) => {
                        found.extend(reference);
                        i = next;
                    }
                    None => i = j + 1,
                },
                Some(&quote @ (b'"' | b'\'')) => {
                    let end = string_end(bytes, j);
                    if let Some(reference) = quoted(css, j..end, quote, CssReferenceKind::Import) {
                        found.push(reference);
                    }
                    i = end;
                }
                // `@import url(...)` is picked up on the next iteration.
                _ => i = j,
            }
        } else {
            i += 1;
        }
    }

    found
}

/// Rewrite every relative reference in `css` against `base`, the URL the
/// stylesheet was fetched from.
pub fn rewrite_references(css: &str, base: &Url) -> String {
    let mut output = String::with_capacity(css.len());
    let mut copied = 0;

    for reference in references(css) {
        let Some(rewritten) = rewrite_target(&reference.target, base) else {
            continue;
        };
        if rewritten == reference.target {
            continue;
        }
        output.push_str(&css[copied..reference.span.start]);
        match reference.quote {
            Some(q) => {
                output.push(q);
                output.push_str(&rewritten);
                output.push(q);
            }
            None => output.push_str(&rewritten),
        }
        copied = reference.span.end;
    }

    output.push_str(&css[copied..]);
    output
}

/// The scheme-relative form of `target`, or `None` when it must stay as is.
fn rewrite_target(target: &str, base: &Url) -> Option<String> {
    if target.is_empty()
        || target.starts_with('#')
        || target.starts_with("//")
        || has_scheme(target)
    {
        return None;
    }
    let resolved = base.join(target).ok()?;
    resolved.host_str()?;
    Some(format!("//{}", &resolved[Position::BeforeUsername..]))
}

/// `scheme:` prefix per RFC 3986 (covers `http:`, `https:`, `data:`, ...).
fn has_scheme(target: &str) -> bool {
    let Some(colon) = target.find(':') else {
        return false;
    };
    let scheme = &target[..colon];
    let mut chars = scheme.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Parse the argument of `url(` / `@import(` starting at `start` (just past
/// the parenthesis). Returns the reference, if any, and where scanning
/// resumes.
fn function_argument(
    css: &str,
    start: usize,
    kind: CssReferenceKind,
) -> Option<(Option<CssReference>, usize)> {
    let bytes = css.as_bytes();
    let begin = skip_whitespace(bytes, start);

    match bytes.get(begin) {
        Some(&quote @ (b'"' | b'\'')) => {
            let end = string_end(bytes, begin);
            let close = skip_whitespace(bytes, end);
            if bytes.get(close) != Some(&b')') {
                return None;
            }
            Some((quoted(css, begin..end, quote, kind), close + 1))
        }
        Some(_) => {
            let close = find(bytes, begin, b")")?;
            let mut end = close;
            while end > begin && bytes[end - 1].is_ascii_whitespace() {
                end -= 1;
            }
            let reference = CssReference {
                kind,
                span: begin..end,
                quote: None,
                target: css[begin..end].to_string(),
            };
            Some((Some(reference), close + 1))
        }
        None => None,
    }
}

fn quoted(css: &str, span: Range<usize>, quote: u8, kind: CssReferenceKind) -> Option<CssReference> {
    // An unterminated string has no closing quote to strip.
    if span.end - span.start < 2 || css.as_bytes()[span.end - 1] != quote {
        return None;
    }
    Some(CssReference {
        kind,
        target: css[span.start + 1..span.end - 1].trim().to_string(),
        span,
        quote: Some(char::from(quote)),
    })
}

/// Index just past the string literal opening at `start`.
fn string_end(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return i,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn preceded_by_ident(bytes: &[u8], at: usize) -> bool {
    at > 0 && matches!(bytes[at - 1], b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'\\')
}

fn skip_whitespace(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

fn find(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    bytes
        .get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|offset| from + offset)
}

fn starts_with_ignore_case(data: &[u8], prefix: &[u8]) -> bool {
    data.len() >= prefix.len() && data[..prefix.len()].eq_ignore_ascii_case(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://cdn.example.com/css/site.css").unwrap()
    }

    #[test]
    fn relative_url_anchors_at_stylesheet_directory() {
        let css = "body { background: url(images/bg.png); }";
        assert_eq!(
            rewrite_references(css, &base()),
            "body { background: url(//cdn.example.com/css/images/bg.png); }"
        );
    }

    #[test]
    fn rewrite_is_idempotent() {
        let css = r#"a{background:url("../img/a.png")} @import 'print.css'; b{x:url(/root.png)}"#;
        let once = rewrite_references(css, &base());
        let twice = rewrite_references(&once, &base());
        assert_eq!(once, twice);
        assert!(once.contains(r#"url("//cdn.example.com/img/a.png")"#));
        assert!(once.contains("@import '//cdn.example.com/css/print.css'"));
        assert!(once.contains("url(//cdn.example.com/root.png)"));
    }

    #[test]
    fn absolute_data_and_fragment_targets_untouched() {
        let css = concat!(
            "a{b:url(http://other/x.png)}",
            "c{d:url(//other/y.png)}",
            "e{f:url(data:image/png;base64,AAAA)}",
            "g{filter:url(#blur)}",
            "h{i:url()}",
        );
        assert_eq!(rewrite_references(css, &base()), css);
    }

    #[test]
    fn identical_literals_rewritten_independently() {
        // The second occurrence is inside a comment and must survive verbatim.
        let css = "a{b:url(x.png)} /* url(x.png) */ c{d:url( 'x.png' )}";
        assert_eq!(
            rewrite_references(css, &base()),
            "a{b:url(//cdn.example.com/css/x.png)} /* url(x.png) */ c{d:url( '//cdn.example.com/css/x.png' )}"
        );
    }

    #[test]
    fn import_function_form_is_recognized() {
        let refs = references("@import(theme.css); @import url(\"grid.css\");");
        let kinds: Vec<_> = refs.iter().map(|r| (r.kind, r.target.as_str())).collect();
        assert_eq!(
            kinds,
            vec![
                (CssReferenceKind::Import, "theme.css"),
                (CssReferenceKind::Url, "grid.css"),
            ]
        );
    }

    #[test]
    fn spans_point_at_literal() {
        let css = "x{y:url( 'a.png' )}";
        let refs = references(css);
        assert_eq!(refs.len(), 1);
        assert_eq!(&css[refs[0].span.clone()], "'a.png'");
        assert_eq!(refs[0].quote, Some('\''));
    }

    #[test]
    fn function_names_ending_in_url_are_ignored() {
        assert!(references("a{b:myurl(x.png)}").is_empty());
    }

    #[test]
    fn strings_outside_references_are_skipped() {
        let css = r#"a::before{content:"url(fake.png)"}"#;
        assert!(references(css).is_empty());
        assert_eq!(rewrite_references(css, &base()), css);
    }
}
