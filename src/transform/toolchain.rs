//! The external tool seam.
//!
//! Minification, stylesheet compilation and image optimization are
//! collaborators, not part of the pipeline. The [`Toolchain`] trait is the
//! only way stages reach them, so the rest of the codebase is tool-agnostic
//! and tests can substitute a recording mock.
//!
//! The production implementation is
//! [`RustToolchain`](super::rust_toolchain::RustToolchain).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{tool} is not available: {reason}")]
    Unavailable { tool: &'static str, reason: String },
    #[error("{0}")]
    Failed(String),
}

/// External tools used by transform stages and bundle finishing.
///
/// Implementations must be stateless with respect to the build: the same
/// input always yields the same output.
pub trait Toolchain: Sync {
    /// Fail when `source` is not syntactically valid script code.
    fn check_script(&self, source: &str) -> Result<(), ToolError>;

    /// Minify script code.
    fn minify_script(&self, source: &str, drop_console: bool) -> Result<String, ToolError>;

    /// Compile SCSS to CSS, resolving `@import`s against `load_paths`.
    fn compile_sass(&self, source: &str, load_paths: &[PathBuf]) -> Result<String, ToolError>;

    /// Parse and re-print a stylesheet in canonical form.
    fn normalize_css(&self, source: &str) -> Result<String, ToolError>;

    /// Minify a stylesheet.
    fn minify_css(&self, source: &str) -> Result<String, ToolError>;

    /// Losslessly recompress an image. `ext` is the lowercase extension.
    fn optimize_image(&self, ext: &str, bytes: &[u8]) -> Result<Vec<u8>, ToolError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mock toolchain that records operations and returns inputs unchanged.
    ///
    /// Minifiers prefix their output with `/*min*/` so tests can see that
    /// they ran. Any operation whose input contains `fail_marker` fails.
    /// Uses Mutex (not RefCell) so it is Sync and works with rayon's par_iter.
    #[derive(Default)]
    pub struct MockToolchain {
        pub operations: Mutex<Vec<RecordedOp>>,
        pub fail_marker: Option<String>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        CheckScript,
        MinifyScript { drop_console: bool },
        CompileSass { load_paths: Vec<PathBuf> },
        NormalizeCss,
        MinifyCss,
        OptimizeImage { ext: String, size: usize },
    }

    impl MockToolchain {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_on(marker: &str) -> Self {
            Self {
                fail_marker: Some(marker.to_string()),
                ..Self::default()
            }
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }

        fn record(&self, op: RecordedOp, input: &[u8]) -> Result<(), ToolError> {
            self.operations.lock().unwrap().push(op);
            match &self.fail_marker {
                Some(marker)
                    if input
                        .windows(marker.len())
                        .any(|w| w == marker.as_bytes()) =>
                {
                    Err(ToolError::Failed(format!("mock failure on '{marker}'")))
                }
                _ => Ok(()),
            }
        }
    }

    impl Toolchain for MockToolchain {
        fn check_script(&self, source: &str) -> Result<(), ToolError> {
            self.record(RecordedOp::CheckScript, source.as_bytes())
        }

        fn minify_script(&self, source: &str, drop_console: bool) -> Result<String, ToolError> {
            self.record(RecordedOp::MinifyScript { drop_console }, source.as_bytes())?;
            Ok(format!("/*min*/{source}"))
        }

        fn compile_sass(&self, source: &str, load_paths: &[PathBuf]) -> Result<String, ToolError> {
            self.record(
                RecordedOp::CompileSass {
                    load_paths: load_paths.to_vec(),
                },
                source.as_bytes(),
            )?;
            Ok(source.to_string())
        }

        fn normalize_css(&self, source: &str) -> Result<String, ToolError> {
            self.record(RecordedOp::NormalizeCss, source.as_bytes())?;
            Ok(source.to_string())
        }

        fn minify_css(&self, source: &str) -> Result<String, ToolError> {
            self.record(RecordedOp::MinifyCss, source.as_bytes())?;
            Ok(format!("/*min*/{source}"))
        }

        fn optimize_image(&self, ext: &str, bytes: &[u8]) -> Result<Vec<u8>, ToolError> {
            self.record(
                RecordedOp::OptimizeImage {
                    ext: ext.to_string(),
                    size: bytes.len(),
                },
                bytes,
            )?;
            Ok(bytes.to_vec())
        }
    }

    #[test]
    fn mock_records_operations_in_order() {
        let tools = MockToolchain::new();
        tools.check_script("let a = 1;").unwrap();
        tools.minify_css("a{}").unwrap();
        assert_eq!(
            tools.get_operations(),
            vec![RecordedOp::CheckScript, RecordedOp::MinifyCss]
        );
    }

    #[test]
    fn mock_marks_minified_output() {
        let tools = MockToolchain::new();
        assert_eq!(tools.minify_script("x()", true).unwrap(), "/*min*/x()");
    }

    #[test]
    fn mock_fails_on_marker() {
        let tools = MockToolchain::failing_on("@@broken");
        assert!(tools.check_script("fine();").is_ok());
        let err = tools.check_script("@@broken").unwrap_err();
        assert!(err.to_string().contains("@@broken"));
    }
}
