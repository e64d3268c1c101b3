//! MIME pattern → engine registry.

use crate::config::{MinifyCategories, MinifyCategory};

use super::engines::{Engine, HtmlOptions};

/// What a registry entry matches against a MIME essence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MimePattern {
    /// The whole essence, e.g. `text/css`.
    Exact(String),
    /// A subtype equal to `x` or ending in `+x`, e.g. `application/ld+json`.
    Suffix(String),
}

impl MimePattern {
    pub fn exact(essence: &str) -> Self {
        MimePattern::Exact(essence.to_ascii_lowercase())
    }

    pub fn suffix(suffix: &str) -> Self {
        MimePattern::Suffix(suffix.to_ascii_lowercase())
    }

    pub fn matches(&self, essence: &str) -> bool {
        match self {
            MimePattern::Exact(exact) => essence == exact,
            MimePattern::Suffix(suffix) => {
                let Some((_, subtype)) = essence.split_once('/') else {
                    return false;
                };
                subtype == suffix
                    || subtype
                        .strip_suffix(suffix.as_str())
                        .is_some_and(|rest| rest.ends_with('+'))
            }
        }
    }
}

/// Read-only mapping from MIME pattern to minification engine.
///
/// Built once at startup and shared by every request.
#[derive(Debug, Clone, Default)]
pub struct MinifierRegistry {
    entries: Vec<(MimePattern, Engine)>,
}

impl MinifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry for the enabled categories.
    pub fn from_categories(categories: &MinifyCategories) -> Self {
        let mut registry = Self::new();
        for category in categories.iter() {
            match category {
                MinifyCategory::Css => registry.register(MimePattern::exact("text/css"), Engine::Css),
                MinifyCategory::Html => registry.register(
                    MimePattern::exact("text/html"),
                    Engine::Html(HtmlOptions {
                        minify_css: categories.contains(MinifyCategory::Css),
                        minify_js: categories.contains(MinifyCategory::Js),
                    }),
                ),
                MinifyCategory::Js => {
                    registry.register(MimePattern::exact("text/javascript"), Engine::Js);
                    registry.register(MimePattern::exact("application/javascript"), Engine::Js);
                }
                MinifyCategory::Json => registry.register(MimePattern::suffix("json"), Engine::Json),
                MinifyCategory::Xml => registry.register(MimePattern::suffix("xml"), Engine::Xml),
                MinifyCategory::Svg => {
                    registry.register(MimePattern::exact("image/svg+xml"), Engine::Xml)
                }
            }
        }
        registry
    }

    pub fn register(&mut self, pattern: MimePattern, engine: Engine) {
        self.entries.push((pattern, engine));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The engine for `essence`. Exact patterns win over suffix patterns.
    pub fn lookup(&self, essence: &str) -> Option<Engine> {
        let exact = self
            .entries
            .iter()
            .find(|(pattern, _)| matches!(pattern, MimePattern::Exact(_)) && pattern.matches(essence));
        exact
            .or_else(|| self.entries.iter().find(|(pattern, _)| pattern.matches(essence)))
            .map(|(_, engine)| *engine)
    }
}
