//! Stylesheet and script bundling.
//!
//! # Data Flow
//! ```text
//! HTML bytes
//!     → scan pass (eligible <link>/<script>, resolved against inbound Host)
//!     → sequential fetches, same-origin only, document order
//!     → BundleBuffer (css), BundleBuffer (js)
//!     → rewrite pass (drop fetched elements, emit one <style>, one <script>)
//! ```
//!
//! # Design Decisions
//! - Two streaming passes over the document. The rewriter is not `Send`,
//!   so nothing of it lives across a fetch
//! - Elements are matched between passes by their ordinal among eligible
//!   elements of the same kind
//! - A failed fetch only skips that asset; its element stays in place
//! - `<style>` goes before `</head>`, or replaces the first removed link
//!   when the document never closes a head
//! - `<script>` goes before `</body>`, or at document end

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use bytes::Bytes;
use lol_html::errors::RewritingError;
use lol_html::html_content::{ContentType, Element, EndTag};
use lol_html::{element, end, HtmlRewriter, Settings};
use url::Url;

use super::css;
use super::resolver::{self, AssetSource, InboundOrigin};
use crate::observability::metrics;

/// What an asset element pulls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Stylesheet,
    Script,
}

impl AssetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AssetKind::Stylesheet => "stylesheet",
            AssetKind::Script => "script",
        }
    }
}

/// One eligible `<link>` or `<script>` element.
#[derive(Debug, Clone)]
pub struct AssetReference {
    pub kind: AssetKind,
    /// `href` / `src` as written in the document.
    pub original: String,
    pub resolved: Url,
    /// Set once the asset has been fetched.
    pub body: Option<Bytes>,
    /// Ordinal among eligible elements of the same kind.
    pub position: usize,
}

/// Fetched bodies of one kind, in document order.
#[derive(Debug)]
pub struct BundleBuffer {
    kind: AssetKind,
    text: String,
    count: usize,
}

impl BundleBuffer {
    pub fn new(kind: AssetKind) -> Self {
        Self {
            kind,
            text: String::new(),
            count: 0,
        }
    }

    pub fn push(&mut self, chunk: &str) {
        match self.kind {
            AssetKind::Stylesheet => {
                if self.count > 0 {
                    self.text.push('\n');
                }
                self.text.push_str(chunk);
            }
            AssetKind::Script => {
                // Guards against a script that ends without a semicolon.
                self.text.push_str(chunk);
                self.text.push_str("\n;\n");
            }
        }
        self.count += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn len(&self) -> usize {
        self.count
    }

    /// The single element carrying the whole bundle.
    pub fn to_markup(&self) -> String {
        match self.kind {
            AssetKind::Stylesheet => format!("<style>{}</style>", escape_closing(&self.text, "style")),
            AssetKind::Script => format!("<script>{}</script>", escape_closing(&self.text, "script")),
        }
    }
}

/// What the scan pass found.
#[derive(Debug, Default)]
pub struct DocumentScan {
    pub references: Vec<AssetReference>,
    /// The document closes a `<head>` element.
    pub head_closed: bool,
    /// The document closes a `<body>` element.
    pub body_closed: bool,
}

/// Result of bundling one document.
#[derive(Debug)]
pub struct Bundled {
    pub body: Bytes,
    pub stylesheets: usize,
    pub scripts: usize,
}

impl Bundled {
    pub fn is_unchanged(&self) -> bool {
        self.stylesheets == 0 && self.scripts == 0
    }
}

/// Inlines same-origin stylesheets and scripts into a page.
#[derive(Debug, Clone)]
pub struct AssetBundler<S> {
    source: S,
}

impl<S: AssetSource> AssetBundler<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Bundle the assets of `html`, served for `origin`.
    ///
    /// Returns the input bytes unchanged when no asset was fetched.
    pub async fn bundle(
        &self,
        html: &Bytes,
        origin: &InboundOrigin,
    ) -> Result<Bundled, RewritingError> {
        let mut scan = scan(html, origin)?;

        for reference in scan.references.iter_mut() {
            if !origin.is_same_origin(&reference.resolved) {
                tracing::trace!(url = %reference.resolved, "Skipping cross-origin asset");
                continue;
            }
            match self.source.fetch(&reference.resolved, origin).await {
                Ok(body) => {
                    metrics::record_asset_fetch(reference.kind.as_str(), "ok");
                    reference.body = Some(body);
                }
                Err(e) => {
                    metrics::record_asset_fetch(reference.kind.as_str(), "error");
                    tracing::warn!(
                        url = %reference.resolved,
                        kind = reference.kind.as_str(),
                        error = %e,
                        "Asset fetch failed, leaving element in place"
                    );
                }
            }
        }

        let mut styles = BundleBuffer::new(AssetKind::Stylesheet);
        let mut scripts = BundleBuffer::new(AssetKind::Script);
        let mut removed_styles = HashSet::new();
        let mut removed_scripts = HashSet::new();

        for reference in &scan.references {
            let Some(body) = &reference.body else {
                continue;
            };
            let text = String::from_utf8_lossy(body);
            match reference.kind {
                AssetKind::Stylesheet => {
                    styles.push(&css::rewrite_references(&text, &reference.resolved));
                    removed_styles.insert(reference.position);
                }
                AssetKind::Script => {
                    scripts.push(&text);
                    removed_scripts.insert(reference.position);
                }
            }
        }

        if styles.is_empty() && scripts.is_empty() {
            return Ok(Bundled {
                body: html.clone(),
                stylesheets: 0,
                scripts: 0,
            });
        }

        let plan = RewritePlan {
            removed_styles,
            removed_scripts,
            style: (!styles.is_empty()).then(|| styles.to_markup()),
            script: (!scripts.is_empty()).then(|| scripts.to_markup()),
            head_closed: scan.head_closed,
            body_closed: scan.body_closed,
        };
        let body = rewrite(html, &plan)?;

        Ok(Bundled {
            body: Bytes::from(body),
            stylesheets: styles.len(),
            scripts: scripts.len(),
        })
    }
}

/// The `href` of a `<link rel="stylesheet">`, if eligible.
fn stylesheet_href(el: &Element) -> Option<String> {
    let rel = el.get_attribute("rel")?;
    if !rel.trim().eq_ignore_ascii_case("stylesheet") {
        return None;
    }
    el.get_attribute("href").filter(|href| !href.trim().is_empty())
}

/// The `src` of a `<script>`, if eligible.
fn script_src(el: &Element) -> Option<String> {
    el.get_attribute("src").filter(|src| !src.trim().is_empty())
}

fn next_position(counter: &Cell<usize>) -> usize {
    let position = counter.get();
    counter.set(position + 1);
    position
}

/// Find every eligible element and whether head and body get closed.
fn scan(html: &[u8], origin: &InboundOrigin) -> Result<DocumentScan, RewritingError> {
    let references = RefCell::new(Vec::new());
    let styles_seen = Cell::new(0);
    let scripts_seen = Cell::new(0);
    let head_closed = Rc::new(Cell::new(false));
    let body_closed = Rc::new(Cell::new(false));

    let record = |kind: AssetKind, original: String, position: usize| {
        match resolver::resolve(&original, origin) {
            Ok(resolved) => references.borrow_mut().push(AssetReference {
                kind,
                original,
                resolved,
                body: None,
                position,
            }),
            Err(e) => {
                tracing::debug!(reference = %original, error = %e, "Unresolvable asset reference");
            }
        }
    };

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![
                element!("link[href]", |el| {
                    if let Some(href) = stylesheet_href(el) {
                        record(AssetKind::Stylesheet, href, next_position(&styles_seen));
                    }
                    Ok(())
                }),
                element!("script[src]", |el| {
                    if let Some(src) = script_src(el) {
                        record(AssetKind::Script, src, next_position(&scripts_seen));
                    }
                    Ok(())
                }),
                element!("head", |el| {
                    watch_close(el, &head_closed);
                    Ok(())
                }),
                element!("body", |el| {
                    watch_close(el, &body_closed);
                    Ok(())
                }),
            ],
            ..Settings::default()
        },
        |_: &[u8]| {},
    );
    rewriter.write(html)?;
    rewriter.end()?;

    Ok(DocumentScan {
        references: references.into_inner(),
        head_closed: head_closed.get(),
        body_closed: body_closed.get(),
    })
}

fn watch_close(el: &mut Element, closed: &Rc<Cell<bool>>) {
    if let Some(handlers) = el.end_tag_handlers() {
        let closed = Rc::clone(closed);
        handlers.push(Box::new(move |_end: &mut EndTag| {
            closed.set(true);
            Ok(())
        }));
    }
}

struct RewritePlan {
    removed_styles: HashSet<usize>,
    removed_scripts: HashSet<usize>,
    style: Option<String>,
    script: Option<String>,
    head_closed: bool,
    body_closed: bool,
}

/// Insert `markup` right before the element's end tag, once per document.
fn insert_before_close(el: &mut Element, markup: &str, placed: &Cell<bool>) {
    if placed.get() {
        return;
    }
    if let Some(handlers) = el.end_tag_handlers() {
        let markup = markup.to_string();
        handlers.push(Box::new(move |end: &mut EndTag| {
            end.before(&markup, ContentType::Html);
            Ok(())
        }));
        placed.set(true);
    }
}

fn rewrite(html: &[u8], plan: &RewritePlan) -> Result<Vec<u8>, RewritingError> {
    let styles_seen = Cell::new(0);
    let scripts_seen = Cell::new(0);
    let style_placed = Cell::new(false);
    let script_placed = Cell::new(false);
    let mut output = Vec::with_capacity(html.len());

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![
                element!("link[href]", |el| {
                    if stylesheet_href(el).is_none() {
                        return Ok(());
                    }
                    let position = next_position(&styles_seen);
                    if !plan.removed_styles.contains(&position) {
                        return Ok(());
                    }
                    match &plan.style {
                        Some(style) if !plan.head_closed && !style_placed.get() => {
                            el.replace(style, ContentType::Html);
                            style_placed.set(true);
                        }
                        _ => el.remove(),
                    }
                    Ok(())
                }),
                element!("script[src]", |el| {
                    if script_src(el).is_none() {
                        return Ok(());
                    }
                    if plan.removed_scripts.contains(&next_position(&scripts_seen)) {
                        el.remove();
                    }
                    Ok(())
                }),
                element!("head", |el| {
                    if let (true, Some(style)) = (plan.head_closed, &plan.style) {
                        insert_before_close(el, style, &style_placed);
                    }
                    Ok(())
                }),
                element!("body", |el| {
                    if let (true, Some(script)) = (plan.body_closed, &plan.script) {
                        insert_before_close(el, script, &script_placed);
                    }
                    Ok(())
                }),
            ],
            document_content_handlers: vec![end!(|end| {
                if let (false, Some(script)) = (plan.body_closed, &plan.script) {
                    end.append(script, ContentType::Html);
                }
                Ok(())
            })],
            ..Settings::default()
        },
        |chunk: &[u8]| output.extend_from_slice(chunk),
    );
    rewriter.write(html)?;
    rewriter.end()?;

    Ok(output)
}

/// Escape `</tag` (any case) so inlined text cannot close its container.
fn escape_closing(text: &str, tag: &str) -> String {
    let needle = format!("</{}", tag);
    let lower = text.to_ascii_lowercase();
    let mut escaped = String::with_capacity(text.len());
    let mut copied = 0;

    for (start, _) in lower.match_indices(&needle) {
        escaped.push_str(&text[copied..start]);
        escaped.push_str("<\\/");
        escaped.push_str(&text[start + 2..start + needle.len()]);
        copied = start + needle.len();
    }

    escaped.push_str(&text[copied..]);
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::resolver::FetchError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MapSource {
        assets: HashMap<String, &'static str>,
        requested: Mutex<Vec<String>>,
    }

    impl MapSource {
        fn with(mut self, url: &str, body: &'static str) -> Self {
            self.assets.insert(url.to_string(), body);
            self
        }

        fn requested(&self) -> Vec<String> {
            self.requested.lock().unwrap().clone()
        }
    }

    impl AssetSource for MapSource {
        async fn fetch(&self, url: &Url, _origin: &InboundOrigin) -> Result<Bytes, FetchError> {
            self.requested.lock().unwrap().push(url.to_string());
            self.assets
                .get(url.as_str())
                .map(|body| Bytes::from_static(body.as_bytes()))
                .ok_or(FetchError::Status(404))
        }
    }

    fn origin() -> InboundOrigin {
        InboundOrigin::new("http", "example.com").unwrap()
    }

    async fn run(source: &MapSource, html: &'static str) -> (String, Bundled) {
        let bundler = AssetBundler::new(source);
        let bundled = bundler
            .bundle(&Bytes::from_static(html.as_bytes()), &origin())
            .await
            .unwrap();
        (String::from_utf8(bundled.body.to_vec()).unwrap(), bundled)
    }

    impl AssetSource for &MapSource {
        async fn fetch(&self, url: &Url, origin: &InboundOrigin) -> Result<Bytes, FetchError> {
            (**self).fetch(url, origin).await
        }
    }

    #[tokio::test]
    async fn inlines_same_origin_assets() {
        let source = MapSource::default()
            .with("http://example.com/site.css", "body{color:red}")
            .with("http://example.com/app.js", "run();");
        let (html, bundled) = run(
            &source,
            r#"<html><head><title>t</title><link rel="stylesheet" href="/site.css"></head><body><p>hi</p><script src="/app.js"></script></body></html>"#,
        )
        .await;

        assert_eq!(
            html,
            "<html><head><title>t</title><style>body{color:red}</style></head><body><p>hi</p><script>run();\n;\n</script></body></html>"
        );
        assert_eq!(bundled.stylesheets, 1);
        assert_eq!(bundled.scripts, 1);
    }

    #[tokio::test]
    async fn cross_origin_assets_are_not_fetched() {
        let source = MapSource::default();
        let page = r#"<html><head><link rel="stylesheet" href="https://cdn.other.net/x.css"></head><body><script src="//cdn.other.net/x.js"></script></body></html>"#;
        let (html, bundled) = run(&source, page).await;

        assert_eq!(html, page);
        assert!(bundled.is_unchanged());
        assert!(source.requested().is_empty());
    }

    #[tokio::test]
    async fn failed_fetch_leaves_element_in_place() {
        let source = MapSource::default().with("http://example.com/ok.css", "a{}");
        let (html, _) = run(
            &source,
            r#"<html><head><link rel="stylesheet" href="/missing.css"><link rel="stylesheet" href="/ok.css"></head><body></body></html>"#,
        )
        .await;

        assert_eq!(
            html,
            r#"<html><head><link rel="stylesheet" href="/missing.css"><style>a{}</style></head><body></body></html>"#
        );
        assert_eq!(source.requested().len(), 2);
    }

    #[tokio::test]
    async fn stylesheets_keep_document_order_and_rewrite_urls() {
        let source = MapSource::default()
            .with("http://example.com/css/a.css", "a{background:url(img/a.png)}")
            .with("http://example.com/b.css", "b{}");
        let (html, bundled) = run(
            &source,
            r#"<html><head><link rel="stylesheet" href="css/a.css"><link rel="stylesheet" href="/b.css"></head><body></body></html>"#,
        )
        .await;

        assert!(html.contains("<style>a{background:url(//example.com/css/img/a.png)}\nb{}</style></head>"));
        assert_eq!(bundled.stylesheets, 2);
    }

    #[tokio::test]
    async fn only_stylesheet_links_are_eligible() {
        let source = MapSource::default().with("http://example.com/s.css", "s{}");
        let (html, _) = run(
            &source,
            r#"<html><head><link rel="preload" href="/p.css"><link rel="StyleSheet" href="/s.css"><link rel="stylesheet" href=""></head><body></body></html>"#,
        )
        .await;

        assert_eq!(source.requested(), vec!["http://example.com/s.css".to_string()]);
        assert!(html.contains(r#"<link rel="preload" href="/p.css">"#));
        assert!(html.contains(r#"<link rel="stylesheet" href="">"#));
        assert!(html.contains("<style>s{}</style>"));
    }

    #[tokio::test]
    async fn fallbacks_without_head_and_body() {
        let source = MapSource::default()
            .with("http://example.com/s.css", "s{}")
            .with("http://example.com/a.js", "a()");
        let (html, _) = run(
            &source,
            r#"<link rel="stylesheet" href="/s.css"><p>x</p><script src="/a.js"></script>"#,
        )
        .await;

        assert_eq!(html, "<style>s{}</style><p>x</p><script>a()\n;\n</script>");
    }

    #[tokio::test]
    async fn second_run_changes_nothing() {
        let source = MapSource::default().with("http://example.com/a.js", "a()");
        let (first, _) = run(
            &source,
            r#"<html><body><script src="/a.js"></script></body></html>"#,
        )
        .await;

        let bundler = AssetBundler::new(&source);
        let second = bundler
            .bundle(&Bytes::from(first.clone()), &origin())
            .await
            .unwrap();
        assert!(second.is_unchanged());
        assert_eq!(second.body, Bytes::from(first));
    }

    #[tokio::test]
    async fn inlined_text_cannot_close_its_container() {
        let source =
            MapSource::default().with("http://example.com/a.js", "document.write('</SCRIPT>')");
        let (html, _) = run(
            &source,
            r#"<html><body><script src="/a.js"></script></body></html>"#,
        )
        .await;

        assert!(html.contains(r"document.write('<\/SCRIPT>')"));
    }

    #[test]
    fn bundle_buffer_separators() {
        let mut css = BundleBuffer::new(AssetKind::Stylesheet);
        css.push("a{}");
        css.push("b{}");
        assert_eq!(css.to_markup(), "<style>a{}\nb{}</style>");

        let mut js = BundleBuffer::new(AssetKind::Script);
        js.push("a()");
        js.push("b()");
        assert_eq!(js.to_markup(), "<script>a()\n;\nb()\n;\n</script>");
    }
}
