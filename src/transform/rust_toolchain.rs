//! Production toolchain.
//!
//! | Operation | Implementation |
//! |---|---|
//! | **Script syntax check** | oxc parser |
//! | **Script minification** | oxc minifier + mangler + codegen |
//! | **SCSS compilation** | `sass` executable (Dart Sass), via stdin/stdout |
//! | **Stylesheet normalize / minify** | lightningcss |
//! | **Image optimization** | PNG re-encoded at best compression (`image`), SVG markup stripped (`regex`) |
//!
//! Image optimization is lossless. JPEG and GIF pass through unchanged: the
//! `image` crate can only re-encode them lossily.
//!
//! Everything except SCSS compilation is linked into the binary.

use super::toolchain::{ToolError, Toolchain};
use image::ImageFormat;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleSheet};
use oxc::allocator::Allocator;
use oxc::codegen::{Codegen, CodegenOptions, CommentOptions};
use oxc::mangler::MangleOptions;
use oxc::minifier::{CompressOptions, Minifier, MinifierOptions};
use oxc::parser::Parser;
use oxc::span::SourceType;
use regex::Regex;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::LazyLock;

/// Comments, the XML declaration, doctype and `<metadata>` blocks.
static SVG_NOISE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<!--.*?-->|<\?xml.*?\?>|<!DOCTYPE[^>\[]*(?:\[.*?\])?\s*>|<metadata\b.*?</metadata>")
        .expect("valid regex")
});

static SVG_INTER_TAG_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r">\s+<").expect("valid regex"));

/// Toolchain backed by oxc, lightningcss, `image` and the `sass` CLI.
#[derive(Debug, Clone)]
pub struct RustToolchain {
    sass_program: PathBuf,
}

impl Default for RustToolchain {
    fn default() -> Self {
        Self {
            sass_program: PathBuf::from("sass"),
        }
    }
}

impl RustToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific `sass` executable.
    pub fn with_sass(program: impl Into<PathBuf>) -> Self {
        Self {
            sass_program: program.into(),
        }
    }
}

impl Toolchain for RustToolchain {
    fn check_script(&self, source: &str) -> Result<(), ToolError> {
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, source, SourceType::mjs()).parse();
        match ret.errors.first() {
            Some(err) => Err(ToolError::Failed(err.to_string())),
            None => Ok(()),
        }
    }

    fn minify_script(&self, source: &str, drop_console: bool) -> Result<String, ToolError> {
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, source, SourceType::cjs()).parse();
        if let Some(err) = ret.errors.first() {
            return Err(ToolError::Failed(err.to_string()));
        }
        let mut program = ret.program;
        let options = MinifierOptions {
            mangle: Some(MangleOptions::default()),
            compress: Some(CompressOptions {
                drop_console,
                ..CompressOptions::smallest()
            }),
        };
        let ret = Minifier::new(options).minify(&allocator, &mut program);
        let code = Codegen::new()
            .with_options(CodegenOptions {
                minify: true,
                comments: CommentOptions::disabled(),
                ..CodegenOptions::default()
            })
            .with_scoping(ret.scoping)
            .build(&program)
            .code;
        Ok(code)
    }

    fn compile_sass(&self, source: &str, load_paths: &[PathBuf]) -> Result<String, ToolError> {
        let mut cmd = Command::new(&self.sass_program);
        cmd.arg("--stdin").arg("--no-source-map");
        for path in load_paths {
            cmd.arg(format!("--load-path={}", path.display()));
        }
        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => ToolError::Unavailable {
                    tool: "sass",
                    reason: format!("'{}' not found on PATH", self.sass_program.display()),
                },
                _ => ToolError::Io(e),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(source.as_bytes())?;
        }
        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(ToolError::Failed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        String::from_utf8(output.stdout)
            .map_err(|_| ToolError::Failed("sass produced non-UTF-8 output".to_string()))
    }

    fn normalize_css(&self, source: &str) -> Result<String, ToolError> {
        print_css(source, false)
    }

    fn minify_css(&self, source: &str) -> Result<String, ToolError> {
        print_css(source, true)
    }

    fn optimize_image(&self, ext: &str, bytes: &[u8]) -> Result<Vec<u8>, ToolError> {
        match ext {
            "png" => optimize_png(bytes),
            "svg" => Ok(optimize_svg(bytes)),
            _ => Ok(bytes.to_vec()),
        }
    }
}

fn optimize_png(bytes: &[u8]) -> Result<Vec<u8>, ToolError> {
    let img = image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .map_err(|e| ToolError::Failed(format!("cannot decode PNG: {e}")))?;
    let mut out = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut out, CompressionType::Best, FilterType::Adaptive);
    img.write_with_encoder(encoder)
        .map_err(|e| ToolError::Failed(format!("cannot encode PNG: {e}")))?;
    // Never grow a file.
    if out.len() < bytes.len() {
        Ok(out)
    } else {
        Ok(bytes.to_vec())
    }
}

/// Strip markup that does not render. Whitespace between tags is kept when
/// the document has `<text>`, where it can be significant.
fn optimize_svg(bytes: &[u8]) -> Vec<u8> {
    let Ok(source) = std::str::from_utf8(bytes) else {
        return bytes.to_vec();
    };
    let stripped = SVG_NOISE.replace_all(source, "");
    let out = if stripped.contains("<text") {
        stripped.trim().to_string()
    } else {
        SVG_INTER_TAG_SPACE.replace_all(&stripped, "><").trim().to_string()
    };
    if out.len() < bytes.len() {
        out.into_bytes()
    } else {
        bytes.to_vec()
    }
}

fn print_css(source: &str, minify: bool) -> Result<String, ToolError> {
    let stylesheet = StyleSheet::parse(source, ParserOptions::default())
        .map_err(|e| ToolError::Failed(e.to_string()))?;
    let result = stylesheet
        .to_css(PrinterOptions {
            minify,
            ..PrinterOptions::default()
        })
        .map_err(|e| ToolError::Failed(e.to_string()))?;
    Ok(result.code)
}
