//! Stage kinds and environment-conditional stage selection.
//!
//! A stage consumes one [`Payload`] and produces another. Most stages accept
//! only [`Payload::Source`] (raw or intermediate bytes); the terminal stages
//! turn it into a disposition: a script module, an extracted stylesheet, a
//! page template, an inline `data:` URI, or a file at a templated path.
//!
//! ```text
//! scss:   Source ─compile-sass→ Source ─postcss→ Source ─css-loader→ Source ─style-extract→ Stylesheet
//! images: Source ─optimize-image→ Source ─url-loader→ Inline | File
//! ```

use super::references::{self, ReferenceMap};
use super::toolchain::{ToolError, Toolchain};
use crate::alias::AliasError;
use crate::config::{BuildSettings, Environment};
use crate::naming::{self, NamingError, PathParts};
use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use std::path::Path;
use thiserror::Error;

/// Options of the size-limit inlining stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlLoaderOptions {
    /// Assets strictly smaller than this many bytes are inlined.
    pub limit: u64,
    /// Naming pattern for emitted assets.
    pub name: String,
}

/// One transformation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    /// Syntax-check a script module.
    ParseScript,
    /// Compile SCSS to CSS.
    CompileSass,
    /// Normalize a stylesheet.
    PostCss,
    /// Resolve `url(...)` references, then optionally minify.
    CssLoader { minimize: bool },
    /// Wrap CSS in a script module that appends a `<style>` element.
    StyleInject,
    /// Contribute CSS to the entry's extracted stylesheet.
    StyleExtract,
    /// Register the file as a page template.
    TemplateLoader,
    /// Recompress an image without quality loss.
    OptimizeImage,
    /// Inline below the size limit, emit at the templated path otherwise.
    UrlLoader(UrlLoaderOptions),
}

impl Stage {
    pub fn id(&self) -> &'static str {
        match self {
            Stage::ParseScript => "parse-js",
            Stage::CompileSass => "compile-sass",
            Stage::PostCss => "postcss",
            Stage::CssLoader { .. } => "css-loader",
            Stage::StyleInject => "style-inject",
            Stage::StyleExtract => "style-extract",
            Stage::TemplateLoader => "template-loader",
            Stage::OptimizeImage => "optimize-image",
            Stage::UrlLoader(_) => "url-loader",
        }
    }

    /// Apply this stage to `input`.
    pub fn apply(&self, input: Payload, ctx: &StageContext<'_>) -> Result<Payload, StageFailure> {
        let bytes = match input {
            Payload::Source(bytes) => bytes,
            other => {
                return Err(StageFailure::UnexpectedInput {
                    expected: "source",
                    found: other.kind(),
                });
            }
        };

        match self {
            Stage::ParseScript => {
                let source = into_text(bytes)?;
                ctx.toolchain.check_script(&source)?;
                Ok(Payload::Module(source))
            }
            Stage::CompileSass => {
                let source = into_text(bytes)?;
                let mut load_paths = Vec::with_capacity(2);
                if let Some(dir) = ctx.asset.path.parent() {
                    load_paths.push(dir.to_path_buf());
                }
                load_paths.push(ctx.settings.aliases.resolve("source")?.to_path_buf());
                let css = ctx.toolchain.compile_sass(&source, &load_paths)?;
                Ok(Payload::Source(css.into_bytes()))
            }
            Stage::PostCss => {
                let source = into_text(bytes)?;
                Ok(Payload::Source(
                    ctx.toolchain.normalize_css(&source)?.into_bytes(),
                ))
            }
            Stage::CssLoader { minimize } => {
                let source = into_text(bytes)?;
                let base_dir = ctx.asset.path.parent().unwrap_or(Path::new(""));
                let rewritten = references::rewrite_css_urls(
                    &source,
                    base_dir,
                    &ctx.settings.aliases,
                    ctx.references,
                );
                let css = if *minimize {
                    ctx.toolchain.minify_css(&rewritten)?
                } else {
                    rewritten
                };
                Ok(Payload::Source(css.into_bytes()))
            }
            Stage::StyleInject => {
                let css = into_text(bytes)?;
                Ok(Payload::Module(style_inject_module(ctx.asset.label, &css)?))
            }
            Stage::StyleExtract => Ok(Payload::Stylesheet(into_text(bytes)?)),
            Stage::TemplateLoader => Ok(Payload::Template(into_text(bytes)?)),
            Stage::OptimizeImage => {
                let ext = extension_of(ctx.asset.path);
                Ok(Payload::Source(ctx.toolchain.optimize_image(&ext, &bytes)?))
            }
            Stage::UrlLoader(opts) => {
                if (bytes.len() as u64) < opts.limit {
                    let ext = extension_of(ctx.asset.path);
                    return Ok(Payload::Inline(data_uri(&ext, &bytes)));
                }
                let parts = PathParts::from_relative(ctx.asset.label, ctx.asset.group, &bytes);
                let path = naming::template(&opts.name, &parts)?;
                Ok(Payload::File { path, bytes })
            }
        }
    }
}

/// A chain position: either a fixed stage or a per-environment choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageSpec {
    Always(Stage),
    /// `None` drops the position for that environment.
    ByEnvironment {
        development: Option<Stage>,
        production: Option<Stage>,
    },
}

impl StageSpec {
    /// The stage used in `environment`, if any.
    pub fn select(&self, environment: Environment) -> Option<&Stage> {
        match self {
            StageSpec::Always(stage) => Some(stage),
            StageSpec::ByEnvironment {
                development,
                production,
            } => match environment {
                Environment::Development => development.as_ref(),
                Environment::Production => production.as_ref(),
            },
        }
    }

    /// Every stage this position can select.
    pub fn variants(&self) -> impl Iterator<Item = &Stage> {
        let pair = match self {
            StageSpec::Always(stage) => [Some(stage), None],
            StageSpec::ByEnvironment {
                development,
                production,
            } => [development.as_ref(), production.as_ref()],
        };
        pair.into_iter().flatten()
    }
}

/// Data flowing between stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Bytes awaiting further processing (or a verbatim copy).
    Source(Vec<u8>),
    /// Script module code destined for a bundle.
    Module(String),
    /// CSS destined for the entry's extracted stylesheet.
    Stylesheet(String),
    /// Page template source.
    Template(String),
    /// Self-contained `data:` URI; nothing is emitted.
    Inline(String),
    /// Bytes emitted at an output-relative path.
    File { path: String, bytes: Vec<u8> },
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Source(_) => "source",
            Payload::Module(_) => "module",
            Payload::Stylesheet(_) => "stylesheet",
            Payload::Template(_) => "template",
            Payload::Inline(_) => "inline",
            Payload::File { .. } => "file",
        }
    }
}

/// The asset a chain is running over.
#[derive(Debug, Clone, Copy)]
pub struct AssetRef<'a> {
    /// Absolute, normalized location.
    pub path: &'a Path,
    /// Source-relative path (`/`-separated); feeds `[path]`, `[name]`, `[ext]`.
    pub label: &'a str,
    /// Output group of the matched rule.
    pub group: &'a str,
}

/// Everything a stage may read. Nothing in it is mutable.
#[derive(Clone, Copy)]
pub struct StageContext<'a> {
    pub settings: &'a BuildSettings,
    pub toolchain: &'a dyn Toolchain,
    pub references: &'a ReferenceMap,
    pub asset: AssetRef<'a>,
}

#[derive(Error, Debug)]
pub enum StageFailure {
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error(transparent)]
    Naming(#[from] NamingError),
    #[error(transparent)]
    Alias(#[from] AliasError),
    #[error("expected {expected} input, got {found}")]
    UnexpectedInput {
        expected: &'static str,
        found: &'static str,
    },
    #[error("content is not valid UTF-8")]
    NotUtf8,
    #[error("encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

fn into_text(bytes: Vec<u8>) -> Result<String, StageFailure> {
    String::from_utf8(bytes).map_err(|_| StageFailure::NotUtf8)
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Script module that installs `css` as a `<style>` element when it runs.
pub fn style_inject_module(label: &str, css: &str) -> Result<String, StageFailure> {
    let css_literal = serde_json::to_string(css)?;
    let label_literal = serde_json::to_string(label)?;
    Ok(format!(
        "(function () {{\n  var style = document.createElement(\"style\");\n  style.setAttribute(\"data-source\", {label_literal});\n  style.textContent = {css_literal};\n  document.head.appendChild(style);\n}})();\n"
    ))
}

/// MIME type for inlined assets, by lowercase extension.
pub fn mime_type(ext: &str) -> &'static str {
    match ext {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "eot" => "application/vnd.ms-fontobject",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}

/// Base64 `data:` URI for `bytes`.
pub fn data_uri(ext: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime_type(ext),
        BASE64_STANDARD.encode(bytes)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_always() {
        let spec = StageSpec::Always(Stage::ParseScript);
        assert_eq!(spec.select(Environment::Development), Some(&Stage::ParseScript));
        assert_eq!(spec.select(Environment::Production), Some(&Stage::ParseScript));
    }

    #[test]
    fn select_by_environment() {
        let spec = StageSpec::ByEnvironment {
            development: Some(Stage::StyleInject),
            production: Some(Stage::StyleExtract),
        };
        assert_eq!(spec.select(Environment::Development), Some(&Stage::StyleInject));
        assert_eq!(spec.select(Environment::Production), Some(&Stage::StyleExtract));
    }

    #[test]
    fn select_can_drop_a_position() {
        let spec = StageSpec::ByEnvironment {
            development: None,
            production: Some(Stage::OptimizeImage),
        };
        assert_eq!(spec.select(Environment::Development), None);
        assert_eq!(spec.variants().count(), 1);
    }

    #[test]
    fn data_uri_encodes_with_mime() {
        assert_eq!(data_uri("png", b"abc"), "data:image/png;base64,YWJj");
        assert!(data_uri("woff2", b"x").starts_with("data:font/woff2;base64,"));
        assert!(data_uri("bin", b"x").starts_with("data:application/octet-stream"));
    }

    #[test]
    fn style_inject_module_escapes_css() {
        let module = style_inject_module("styles/main.css", "a::after { content: \"\\\"\"; }").unwrap();
        assert!(module.contains("document.createElement(\"style\")"));
        assert!(module.contains("\"styles/main.css\""));
        // The CSS is embedded as a JSON string literal
        assert!(module.contains("content: \\\""));
    }

    #[test]
    fn stage_ids_are_stable() {
        assert_eq!(Stage::CssLoader { minimize: true }.id(), "css-loader");
        assert_eq!(
            Stage::UrlLoader(UrlLoaderOptions {
                limit: 1,
                name: "[name]".into()
            })
            .id(),
            "url-loader"
        );
    }
}
