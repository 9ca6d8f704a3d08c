//! Page set composition and rendering.
//!
//! The page set is the configured static pages followed by one block per
//! collection. A collection is expanded by asking a [`ContentSource`] for the
//! items under its tag; each item becomes a page whose filename comes from
//! the collection pattern (default `[tag]/[slug].html`).
//!
//! ```text
//! pages:        views/index.html         → index.html
//! collections:  blog, 001-first-post.md  → blog/first-post.html
//!               blog, 002-second-post.md → blog/second-post.html
//! ```
//!
//! Rendering goes through a [`PageRenderer`]. The default
//! [`PlaceholderRenderer`] substitutes `{{ key.path }}` (escaped) and
//! `{{{ key.path }}}` (raw) from the page context and the build globals.
//! Pages with `inject` set then get a `<link>` per extracted stylesheet
//! before `</head>` and a `<script>` per bundle before `</body>`.

use crate::config::{BuildSettings, Environment};
use crate::naming::{self, NamingError};
use maud::{Markup, html};
use pulldown_cmark::{Parser, html as md_html};
use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\{\s*([\w$.-]+)\s*\}\}\}|\{\{\s*([\w$.-]+)\s*\}\}").expect("valid regex")
});

#[derive(Error, Debug)]
pub enum ContentError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures of the content and rendering collaborators, tagged with what
/// was being produced.
#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("collection '{tag}': {source}")]
    Collection {
        tag: String,
        #[source]
        source: ContentError,
    },
    #[error("collection '{tag}': {source}")]
    Naming {
        tag: String,
        #[source]
        source: NamingError,
    },
    #[error("page {page}: template '{template}' was not found among the source templates")]
    MissingTemplate { page: String, template: String },
    #[error("page {page}: {reason}")]
    Render { page: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "tag")]
pub enum PageOrigin {
    Static,
    Collection(String),
}

/// One output page: a template, its data, and where it goes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    /// Template path relative to the source root.
    pub template: String,
    pub context: Value,
    /// Output path relative to the output directory.
    pub filename: String,
    pub inject: bool,
    pub origin: PageOrigin,
}

/// An item returned by a content source.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentItem {
    pub slug: String,
    pub data: Value,
}

pub type ContentItems<'a> = Box<dyn Iterator<Item = Result<ContentItem, ContentError>> + 'a>;

/// Lists the items of a collection.
///
/// The returned sequence is consumed once, in order; the composer never
/// re-enumerates or re-sorts it.
pub trait ContentSource: Sync {
    fn list(&self, tag: &str) -> Result<ContentItems<'_>, ContentError>;
}

/// Reads `<content root>/<tag>/*.md`, sorted by filename.
///
/// - slug: file stem with any `NNN-` ordering prefix removed
/// - `title`: first `# ` heading, or the slug with dashes as spaces
/// - `html`: the rendered markdown
pub struct MarkdownContentSource {
    root: PathBuf,
}

impl MarkdownContentSource {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }
}

impl ContentSource for MarkdownContentSource {
    fn list(&self, tag: &str) -> Result<ContentItems<'_>, ContentError> {
        let dir = self.root.join(tag);
        // A collection with no content directory is empty.
        if !dir.is_dir() {
            return Ok(Box::new(std::iter::empty()));
        }
        let io_err = |source| ContentError::Io {
            path: dir.clone(),
            source,
        };
        let mut files: Vec<PathBuf> = fs::read_dir(&dir)
            .map_err(io_err)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.is_file()
                    && p.extension()
                        .is_some_and(|e| e.eq_ignore_ascii_case("md"))
            })
            .collect();
        files.sort();
        Ok(Box::new(files.into_iter().map(|path| read_markdown(&path))))
    }
}

fn read_markdown(path: &Path) -> Result<ContentItem, ContentError> {
    let body = fs::read_to_string(path).map_err(|source| ContentError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let slug = strip_number_prefix(&stem).to_string();
    let title = body
        .lines()
        .find(|line| line.starts_with("# "))
        .map(|line| line.trim_start_matches("# ").trim().to_string())
        .unwrap_or_else(|| slug.replace('-', " "));

    let mut rendered = String::new();
    md_html::push_html(&mut rendered, Parser::new(&body));

    Ok(ContentItem {
        data: json!({ "slug": slug, "title": title, "html": rendered }),
        slug,
    })
}

/// `001-first-post` → `first-post`; names without a numeric prefix are kept.
fn strip_number_prefix(name: &str) -> &str {
    match name.split_once('-') {
        Some((num, rest)) if !num.is_empty() && num.bytes().all(|b| b.is_ascii_digit()) => rest,
        _ => name,
    }
}

/// Build the page list: static pages first, then each collection in
/// declaration order.
pub fn compose(
    settings: &BuildSettings,
    content: &dyn ContentSource,
) -> Result<Vec<Page>, CollaboratorError> {
    let mut pages: Vec<Page> = settings
        .config
        .pages
        .iter()
        .map(|p| Page {
            template: p.template.clone(),
            context: json!({}),
            filename: p.filename.clone(),
            inject: p.inject,
            origin: PageOrigin::Static,
        })
        .collect();

    for collection in &settings.config.collections {
        let tag = collection.tag.as_str();
        let wrap = |source| CollaboratorError::Collection {
            tag: tag.to_string(),
            source,
        };
        for item in content.list(tag).map_err(wrap)? {
            let item = item.map_err(wrap)?;
            let filename = naming::page_filename(&collection.filename, tag, &item.slug)
                .map_err(|source| CollaboratorError::Naming {
                    tag: tag.to_string(),
                    source,
                })?;
            pages.push(Page {
                template: collection.template.clone(),
                context: item.data,
                filename,
                inject: collection.inject,
                origin: PageOrigin::Collection(tag.to_string()),
            });
        }
    }
    Ok(pages)
}

// =============================================================================
// Rendering
// =============================================================================

/// Build-wide values visible to every page.
#[derive(Debug, Clone, Default)]
pub struct RenderGlobals {
    pub environment: Environment,
    pub public_path: String,
    /// Bundle URLs in injection order (vendor first).
    pub scripts: Vec<String>,
    /// Extracted stylesheet URLs.
    pub stylesheets: Vec<String>,
}

/// Turns a template and a page context into HTML.
pub trait PageRenderer: Sync {
    fn render(
        &self,
        template: &str,
        page: &Page,
        globals: &RenderGlobals,
    ) -> Result<String, CollaboratorError>;
}

/// `{{ key.path }}` / `{{{ key.path }}}` substitution.
///
/// Keys are looked up in the page context, then in the globals
/// (`environment`, `public_path`). Missing keys render as nothing.
///
/// Templates are treated as HTML. A `.pug` template is registered by the
/// template rule like any other, but rendering Pug needs a [`PageRenderer`]
/// that compiles it.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderRenderer;

impl PageRenderer for PlaceholderRenderer {
    fn render(
        &self,
        template: &str,
        page: &Page,
        globals: &RenderGlobals,
    ) -> Result<String, CollaboratorError> {
        let global_values = json!({
            "environment": globals.environment.as_str(),
            "public_path": globals.public_path,
        });
        let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
            let (key, raw) = match (caps.get(1), caps.get(2)) {
                (Some(raw_key), _) => (raw_key.as_str(), true),
                (None, Some(key)) => (key.as_str(), false),
                (None, None) => return String::new(),
            };
            let value = lookup(&page.context, key)
                .or_else(|| lookup(&global_values, key))
                .map(display_value)
                .unwrap_or_default();
            if raw {
                value
            } else {
                html! { (value) }.into_string()
            }
        });
        Ok(rendered.into_owned())
    }
}

fn lookup<'v>(root: &'v Value, key: &str) -> Option<&'v Value> {
    key.split('.').try_fold(root, |value, segment| value.get(segment))
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Stylesheet links for `<head>`.
fn head_tags(globals: &RenderGlobals) -> Markup {
    html! {
        @for href in &globals.stylesheets {
            link rel="stylesheet" href=(href);
        }
    }
}

/// Script tags for the end of `<body>`.
fn body_tags(globals: &RenderGlobals) -> Markup {
    html! {
        @for src in &globals.scripts {
            script src=(src) {}
        }
    }
}

/// Link every bundle and extracted stylesheet into `html`.
///
/// Tags go right before `</head>` and `</body>`; a document missing either
/// gets them prepended or appended instead.
pub fn inject_assets(html: &str, globals: &RenderGlobals) -> String {
    let head = head_tags(globals).into_string();
    let body = body_tags(globals).into_string();
    let mut out = html.to_string();

    if !head.is_empty() {
        match find_ignore_case(&out, "</head>") {
            Some(pos) => out.insert_str(pos, &head),
            None => out.insert_str(0, &head),
        }
    }
    if !body.is_empty() {
        match rfind_ignore_case(&out, "</body>") {
            Some(pos) => out.insert_str(pos, &body),
            None => out.push_str(&body),
        }
    }
    out
}

fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack.to_ascii_lowercase().find(needle)
}

fn rfind_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack.to_ascii_lowercase().rfind(needle)
}

/// Render one page against the registered templates.
pub fn render_page(
    page: &Page,
    templates: &BTreeMap<String, String>,
    renderer: &dyn PageRenderer,
    globals: &RenderGlobals,
) -> Result<String, CollaboratorError> {
    let template =
        templates
            .get(&page.template)
            .ok_or_else(|| CollaboratorError::MissingTemplate {
                page: page.filename.clone(),
                template: page.template.clone(),
            })?;
    let html = renderer.render(template, page, globals)?;
    Ok(if page.inject {
        inject_assets(&html, globals)
    } else {
        html
    })
}
