//! Output assembly and atomic publishing.
//!
//! Every produced file is registered in an [`OutputSet`] together with the
//! input it came from. Registering a second file at a taken path is a
//! collision and names both origins.
//!
//! Publishing writes the complete set into a staging directory next to the
//! output directory, then swaps it in with two renames. A failed build never
//! touches the previous output.

use crate::alias;
use crate::config::slash_path;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmitError {
    #[error("output collision at {path}: produced by both {first} and {second}")]
    Collision {
        path: String,
        first: String,
        second: String,
    },
    #[error("{origin} would be written outside the output directory: {path}")]
    OutsideOutput { path: String, origin: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One file of the output tree.
#[derive(Debug, Clone, Serialize)]
pub struct Emission {
    /// Path relative to the output directory.
    pub path: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    /// What produced it (source path, bundle, page, copy).
    pub origin: String,
}

/// The full output tree, keyed by output-relative path.
#[derive(Debug, Clone, Default)]
pub struct OutputSet {
    files: BTreeMap<String, Emission>,
}

impl OutputSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: String, bytes: Vec<u8>, origin: String) -> Result<(), EmitError> {
        if !is_contained(&path) {
            return Err(EmitError::OutsideOutput { path, origin });
        }
        let path = slash_path(&alias::normalize(Path::new(&path)));
        if let Some(existing) = self.files.get(&path) {
            return Err(EmitError::Collision {
                path,
                first: existing.origin.clone(),
                second: origin,
            });
        }
        self.files.insert(
            path.clone(),
            Emission {
                path,
                bytes,
                origin,
            },
        );
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<&Emission> {
        self.files.get(path)
    }

    /// Emissions in path order.
    pub fn iter(&self) -> impl Iterator<Item = &Emission> {
        self.files.values()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Relative, and never climbs above its root.
fn is_contained(path: &str) -> bool {
    let mut depth = 0usize;
    for component in Path::new(path).components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return false,
            },
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    depth > 0
}

/// Write `outputs` and replace `output_dir` with the result.
pub fn publish(outputs: &OutputSet, output_dir: &Path) -> Result<(), EmitError> {
    let parent = output_dir
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(parent)?;

    let staging = tempfile::Builder::new()
        .prefix(".sitepack-staging-")
        .tempdir_in(parent)?;
    write_tree(outputs, staging.path())?;

    // The previous output is parked here and removed when `previous` drops.
    let previous = tempfile::Builder::new()
        .prefix(".sitepack-previous-")
        .tempdir_in(parent)?;
    let parked: Option<PathBuf> = if output_dir.exists() {
        let target = previous.path().join("output");
        fs::rename(output_dir, &target)?;
        Some(target)
    } else {
        None
    };

    let staged = staging.keep();
    if let Err(e) = fs::rename(&staged, output_dir) {
        if let Some(parked) = &parked {
            fs::rename(parked, output_dir)?;
        }
        // Best effort; the original error is what matters.
        let _ = fs::remove_dir_all(&staged);
        return Err(e.into());
    }
    Ok(())
}

fn write_tree(outputs: &OutputSet, root: &Path) -> Result<(), EmitError> {
    for emission in outputs.iter() {
        let path = root.join(&emission.path);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, &emission.bytes)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn set(files: &[(&str, &str)]) -> OutputSet {
        let mut out = OutputSet::new();
        for (path, content) in files {
            out.insert(path.to_string(), content.as_bytes().to_vec(), format!("src/{path}"))
                .unwrap();
        }
        out
    }

    #[test]
    fn collision_names_both_origins() {
        let mut out = OutputSet::new();
        out.insert("assets/fonts/icons.woff".into(), vec![1], "src/a/icons.woff".into())
            .unwrap();
        let err = out
            .insert("assets/fonts/icons.woff".into(), vec![2], "src/b/icons.woff".into())
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("src/a/icons.woff"));
        assert!(msg.contains("src/b/icons.woff"));
        // First writer is kept
        assert_eq!(out.get("assets/fonts/icons.woff").unwrap().bytes, vec![1]);
    }

    #[test]
    fn escaping_paths_rejected() {
        let mut out = OutputSet::new();
        for path in ["../outside.txt", "/etc/passwd", "a/../../b", ""] {
            assert!(
                matches!(
                    out.insert(path.into(), vec![], "x".into()),
                    Err(EmitError::OutsideOutput { .. })
                ),
                "{path}"
            );
        }
        assert!(out.insert("a/../b.txt".into(), vec![], "x".into()).is_ok());
        // Normalized before the collision check
        assert!(matches!(
            out.insert("./b.txt".into(), vec![], "y".into()),
            Err(EmitError::Collision { path, .. }) if path == "b.txt"
        ));
    }

    #[test]
    fn iteration_is_path_ordered() {
        let out = set(&[("z.txt", "z"), ("a/b.txt", "b"), ("index.html", "i")]);
        let paths: Vec<&str> = out.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["a/b.txt", "index.html", "z.txt"]);
    }

    #[test]
    fn publish_creates_output() {
        let tmp = TempDir::new().unwrap();
        let dist = tmp.path().join("dist");
        publish(&set(&[("index.html", "<html>"), ("assets/js/app.bundle.js", "x")]), &dist).unwrap();
        assert_eq!(fs::read_to_string(dist.join("index.html")).unwrap(), "<html>");
        assert!(dist.join("assets/js/app.bundle.js").is_file());
    }

    #[test]
    fn publish_replaces_previous_output_entirely() {
        let tmp = TempDir::new().unwrap();
        let dist = tmp.path().join("dist");
        fs::create_dir_all(&dist).unwrap();
        fs::write(dist.join("stale.js"), "old").unwrap();

        publish(&set(&[("fresh.js", "new")]), &dist).unwrap();
        assert!(!dist.join("stale.js").exists());
        assert_eq!(fs::read_to_string(dist.join("fresh.js")).unwrap(), "new");

        // No staging or parking directories are left behind
        let leftovers: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".sitepack-"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
