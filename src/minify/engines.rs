//! Minification engines, one per content grammar.

use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleSheet};
use oxc::allocator::Allocator;
use oxc::codegen::{Codegen, CodegenOptions};
use oxc::parser::Parser;
use oxc::span::SourceType;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use thiserror::Error;

/// Why a body could not be minified. The body is then forwarded as is.
#[derive(Debug, Error)]
pub enum MinifyError {
    #[error("body is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("css: {0}")]
    Css(String),
    #[error("javascript: {0}")]
    Js(String),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("xml: {0}")]
    Xml(String),
}

/// Options for the HTML engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HtmlOptions {
    /// Minify `<style>` contents and `style` attributes.
    pub minify_css: bool,
    /// Minify `<script>` contents.
    pub minify_js: bool,
}

/// A minification engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Css,
    Html(HtmlOptions),
    Js,
    Json,
    Xml,
}

impl Engine {
    pub fn name(&self) -> &'static str {
        match self {
            Engine::Css => "css",
            Engine::Html(_) => "html",
            Engine::Js => "js",
            Engine::Json => "json",
            Engine::Xml => "xml",
        }
    }

    pub fn minify(&self, input: &[u8]) -> Result<Vec<u8>, MinifyError> {
        match self {
            Engine::Css => css(input),
            Engine::Html(options) => Ok(html(input, *options)),
            Engine::Js => js(input),
            Engine::Json => json(input),
            Engine::Xml => xml(input),
        }
    }
}

fn css(input: &[u8]) -> Result<Vec<u8>, MinifyError> {
    let source = std::str::from_utf8(input)?;
    let stylesheet = StyleSheet::parse(source, ParserOptions::default())
        .map_err(|e| MinifyError::Css(e.to_string()))?;
    let printer_options = PrinterOptions {
        minify: true,
        ..Default::default()
    };
    let result = stylesheet
        .to_css(printer_options)
        .map_err(|e| MinifyError::Css(e.to_string()))?;
    Ok(result.code.into_bytes())
}

fn html(input: &[u8], options: HtmlOptions) -> Vec<u8> {
    // Closing tags and the html/head openers stay, so the output is still
    // well-formed for anything parsing it after us. The minifier cannot tell
    // IE conditional comments from plain ones, so a page using them keeps
    // all of its comments.
    let cfg = minify_html::Cfg {
        keep_closing_tags: true,
        keep_html_and_head_opening_tags: true,
        keep_comments: has_conditional_comment(input),
        minify_css: options.minify_css,
        minify_js: options.minify_js,
        ..minify_html::Cfg::default()
    };
    minify_html::minify(input, &cfg)
}

fn has_conditional_comment(input: &[u8]) -> bool {
    input
        .windows(7)
        .any(|window| window.eq_ignore_ascii_case(b"<!--[if"))
}

fn js(input: &[u8]) -> Result<Vec<u8>, MinifyError> {
    let source = std::str::from_utf8(input)?;
    let mut first_error = None;

    // Classic scripts first (`cjs` is oxc's script goal, top-level `return`
    // stays an error), then modules (`import`/`export` at top level).
    for source_type in [SourceType::cjs(), SourceType::mjs()] {
        let allocator = Allocator::default();
        let parsed = Parser::new(&allocator, source, source_type).parse();
        if parsed.panicked || !parsed.errors.is_empty() {
            first_error.get_or_insert_with(|| {
                parsed
                    .errors
                    .first()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "parser panicked".to_string())
            });
            continue;
        }
        let code = Codegen::new()
            .with_options(CodegenOptions::minify())
            .build(&parsed.program)
            .code;
        return Ok(code.into_bytes());
    }

    Err(MinifyError::Js(
        first_error.unwrap_or_else(|| "unparseable script".to_string()),
    ))
}

fn json(input: &[u8]) -> Result<Vec<u8>, MinifyError> {
    // preserve_order and arbitrary_precision keep key order and number text.
    let value: serde_json::Value = serde_json::from_slice(input)?;
    Ok(serde_json::to_vec(&value)?)
}

fn xml(input: &[u8]) -> Result<Vec<u8>, MinifyError> {
    let mut reader = Reader::from_reader(input);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(input.len()));
    let mut buf = Vec::new();
    // Whitespace is held back until the next event shows whether it sits
    // between two tags (indentation) or next to character data.
    let mut pending = Vec::new();
    let mut after_markup = true;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Eof) => break,
            Ok(Event::Comment(_)) => {}
            Ok(Event::Text(text)) if text.iter().all(u8::is_ascii_whitespace) => {
                pending.extend_from_slice(&text);
            }
            Ok(event) => {
                let markup = is_markup(&event);
                if !pending.is_empty() {
                    if !(after_markup && markup) {
                        writer.get_mut().extend_from_slice(&pending);
                    }
                    pending.clear();
                }
                after_markup = markup;
                writer
                    .write_event(event)
                    .map_err(|e| MinifyError::Xml(e.to_string()))?;
            }
            Err(e) => return Err(MinifyError::Xml(e.to_string())),
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

/// Tags and declarations, as opposed to character data and references.
fn is_markup(event: &Event<'_>) -> bool {
    matches!(
        event,
        Event::Start(_)
            | Event::End(_)
            | Event::Empty(_)
            | Event::Decl(_)
            | Event::PI(_)
            | Event::DocType(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(bytes: Vec<u8>) -> String {
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn css_drops_whitespace() {
        let out = Engine::Css
            .minify(b"body {\n  color: red;\n  margin: 0px;\n}\n")
            .unwrap();
        assert_eq!(text(out), "body{color:red;margin:0}");
    }

    #[test]
    fn css_rejects_non_utf8() {
        assert!(matches!(
            Engine::Css.minify(&[0xff, 0xfe, b'{']),
            Err(MinifyError::Utf8(_))
        ));
    }

    #[test]
    fn html_keeps_closing_tags() {
        let out = Engine::Html(HtmlOptions::default())
            .minify(b"<html>\n  <head>\n    <title> Hi </title>\n  </head>\n  <body>\n    <p>One</p>\n  </body>\n</html>\n")
            .unwrap();
        let out = text(out);
        assert!(out.contains("</p>"));
        assert!(out.contains("<head>"));
        assert!(!out.contains("\n  "));
    }

    #[test]
    fn js_is_reprinted_compactly() {
        let out = text(
            Engine::Js
                .minify(b"function add(a, b) {\n    // sum\n    return a + b;\n}\n")
                .unwrap(),
        );
        assert!(out.len() < 40);
        assert!(out.contains("return a+b"));
        assert!(!out.contains("// sum"));
    }

    #[test]
    fn html_keeps_conditional_comments() {
        let page = b"<html><head><!--[if lt IE 9]><script src=\"shiv.js\"></script><![endif]--></head><body><!-- note --><p>x</p></body></html>";
        let out = text(Engine::Html(HtmlOptions::default()).minify(page).unwrap());
        assert!(out.contains("<!--[if lt IE 9]>"));
        assert!(out.contains("<![endif]-->"));
    }

    #[test]
    fn html_drops_plain_comments() {
        let out = text(
            Engine::Html(HtmlOptions::default())
                .minify(b"<html><head></head><body><!-- note --><p>x</p></body></html>")
                .unwrap(),
        );
        assert!(!out.contains("note"));
    }

    #[test]
    fn js_rejects_top_level_return() {
        assert!(matches!(
            Engine::Js.minify(b"var a = 1;\nreturn a;\n"),
            Err(MinifyError::Js(_))
        ));
    }

    #[test]
    fn js_accepts_modules() {
        let out = text(Engine::Js.minify(b"import x from './x.js';\nexport default x;\n").unwrap());
        assert!(out.contains("import x from"));
    }

    #[test]
    fn js_syntax_error_is_reported() {
        assert!(matches!(
            Engine::Js.minify(b"function ( {"),
            Err(MinifyError::Js(_))
        ));
    }

    #[test]
    fn json_keeps_key_order_and_numbers() {
        let out = Engine::Json
            .minify(b"{\n  \"b\": 1.50,\n  \"a\": [1, 2]\n}")
            .unwrap();
        assert_eq!(text(out), r#"{"b":1.50,"a":[1,2]}"#);
    }

    #[test]
    fn xml_drops_comments_and_indentation() {
        let out = Engine::Xml
            .minify(b"<?xml version=\"1.0\"?>\n<svg>\n  <!-- icon -->\n  <g>\n    <path d=\"M0 0\"/>\n  </g>\n</svg>\n")
            .unwrap();
        assert_eq!(
            text(out),
            "<?xml version=\"1.0\"?><svg><g><path d=\"M0 0\"/></g></svg>"
        );
    }

    #[test]
    fn xml_keeps_whitespace_between_references() {
        let out = Engine::Xml.minify(b"<t>&lt; &gt;</t>").unwrap();
        assert_eq!(text(out), "<t>&lt; &gt;</t>");
    }

    #[test]
    fn xml_keeps_whitespace_next_to_text() {
        let out = Engine::Xml
            .minify(b"<svg>\n  <text>a <tspan>b</tspan> &amp; c</text>\n</svg>")
            .unwrap();
        assert_eq!(text(out), "<svg><text>a <tspan>b</tspan> &amp; c</text></svg>");
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(matches!(
            Engine::Xml.minify(b"<a><b></a>"),
            Err(MinifyError::Xml(_))
        ));
    }
}
