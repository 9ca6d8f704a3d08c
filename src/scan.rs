//! Source tree discovery.
//!
//! First stage of the build: walk the source root and list every input
//! file, then pair each one with the rule that will handle it.
//!
//! ```text
//! src/
//! ├── app.js                  # script   → reached from the entry
//! ├── styles/main.scss        # style    → reached from the entry
//! ├── views/index.html        # template → page template registry
//! ├── content/blog/…          # skipped  → read by the content source
//! ├── assets/images/logo.png  # image    → inlined or emitted
//! └── robots.txt              # no match → copied as-is
//! ```
//!
//! Skipped during the walk: dotfiles and dot-directories, the content
//! directory, and the vendor and output directories when they sit inside
//! the source root. Entries are sorted by file name at every level, so the
//! listing order is stable across runs and platforms.

use crate::config::{BuildSettings, slash_path};
use crate::rules::{Concern, RuleSet};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Source directory not found: {0}")]
    MissingSource(PathBuf),
}

/// A discovered input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    /// Path relative to the source root, `/`-separated.
    pub rel_path: String,
    /// Absolute, normalized path.
    #[serde(skip)]
    pub abs_path: PathBuf,
}

/// A discovered file and the rule that matched it.
#[derive(Debug, Clone, Serialize)]
pub struct ClassifiedFile {
    #[serde(flatten)]
    pub source: SourceFile,
    /// Index into the rule set; `None` means pass-through.
    #[serde(skip)]
    pub rule_index: Option<usize>,
    pub rule: Option<String>,
    pub concern: Option<Concern>,
}

impl ClassifiedFile {
    pub fn is_pass_through(&self) -> bool {
        self.rule_index.is_none()
    }
}

/// List every input file under the source root.
pub fn discover(settings: &BuildSettings) -> Result<Vec<SourceFile>, ScanError> {
    let root = &settings.source_root;
    if !root.is_dir() {
        return Err(ScanError::MissingSource(root.clone()));
    }
    let skipped = [
        settings.content_root(),
        settings.vendor_root.clone(),
        settings.output_dir.clone(),
    ];

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            !is_hidden(entry.file_name()) && !skipped.iter().any(|dir| entry.path() == dir)
        });

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let abs_path = entry.path().to_path_buf();
        let rel_path = abs_path
            .strip_prefix(root)
            .map(slash_path)
            .unwrap_or_else(|_| abs_path.display().to_string());
        files.push(SourceFile { rel_path, abs_path });
    }
    Ok(files)
}

/// Pair each file with the first rule accepting it.
pub fn classify(files: Vec<SourceFile>, rules: &RuleSet) -> Vec<ClassifiedFile> {
    files
        .into_iter()
        .map(|source| {
            let rule_index = rules.match_index(&source.rel_path);
            let rule = rule_index.map(|i| &rules.rules()[i]);
            ClassifiedFile {
                rule: rule.map(|r| r.name.clone()),
                concern: rule.map(|r| r.concern),
                rule_index,
                source,
            }
        })
        .collect()
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|n| n.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BuildConfig, Environment};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn settings_for(tmp: &TempDir, config: BuildConfig) -> BuildSettings {
        BuildSettings::new(tmp.path(), config, Environment::Development, None).unwrap()
    }

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, rel).unwrap();
    }

    fn rel_paths(files: &[SourceFile]) -> Vec<&str> {
        files.iter().map(|f| f.rel_path.as_str()).collect()
    }

    #[test]
    fn discover_lists_files_sorted() {
        let tmp = TempDir::new().unwrap();
        for rel in ["src/b.js", "src/a.js", "src/styles/main.css", "src/assets/images/logo.png"] {
            touch(tmp.path(), rel);
        }
        let files = discover(&settings_for(&tmp, BuildConfig::default())).unwrap();
        assert_eq!(
            rel_paths(&files),
            vec!["a.js", "assets/images/logo.png", "b.js", "styles/main.css"]
        );
        assert!(files[0].abs_path.is_absolute());
    }

    #[test]
    fn discover_skips_hidden_and_content() {
        let tmp = TempDir::new().unwrap();
        for rel in [
            "src/app.js",
            "src/.DS_Store",
            "src/.cache/x.js",
            "src/content/blog/001-first.md",
        ] {
            touch(tmp.path(), rel);
        }
        let files = discover(&settings_for(&tmp, BuildConfig::default())).unwrap();
        assert_eq!(rel_paths(&files), vec!["app.js"]);
    }

    #[test]
    fn discover_skips_nested_vendor_and_output() {
        let tmp = TempDir::new().unwrap();
        let config = BuildConfig {
            source: ".".to_string(),
            output: "dist".to_string(),
            ..BuildConfig::default()
        };
        for rel in ["app.js", "node_modules/jquery/index.js", "dist/old.js"] {
            touch(tmp.path(), rel);
        }
        let files = discover(&settings_for(&tmp, config)).unwrap();
        assert_eq!(rel_paths(&files), vec!["app.js"]);
    }

    #[test]
    fn missing_source_root_is_error() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            discover(&settings_for(&tmp, BuildConfig::default())),
            Err(ScanError::MissingSource(_))
        ));
    }

    #[test]
    fn classify_marks_pass_through() {
        let tmp = TempDir::new().unwrap();
        for rel in ["src/app.js", "src/robots.txt", "src/views/index.pug"] {
            touch(tmp.path(), rel);
        }
        let settings = settings_for(&tmp, BuildConfig::default());
        let rules = RuleSet::from_config(&settings.config).unwrap();
        let classified = classify(discover(&settings).unwrap(), &rules);

        let by_path = |p: &str| classified.iter().find(|c| c.source.rel_path == p).unwrap();
        assert_eq!(by_path("app.js").rule.as_deref(), Some("scripts"));
        assert_eq!(by_path("views/index.pug").concern, Some(Concern::Template));
        assert!(by_path("robots.txt").is_pass_through());
    }
}
