//! Symbolic path aliases.
//!
//! An alias maps a short name (`source`, `images`, `fonts`) to an absolute
//! location. Aliases are registered once from configuration when the build
//! settings are created and never change afterwards.
//!
//! References in scripts and stylesheets may start with an alias segment:
//!
//! ```text
//! import logo from "images/logo.png";      → <root>/src/assets/images/logo.png
//! background: url(~fonts/icons.woff2);     → <root>/src/assets/fonts/icons.woff2
//! ```

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Aliases every configuration must define.
pub const REQUIRED_ALIASES: [&str; 3] = ["source", "images", "fonts"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AliasError {
    #[error("unknown alias '{0}'")]
    Unknown(String),
}

/// Registered aliases, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    entries: BTreeMap<String, PathBuf>,
}

impl AliasTable {
    /// Register every configured alias, resolving targets against `root`.
    pub fn from_config(root: &Path, aliases: &BTreeMap<String, String>) -> Self {
        let entries = aliases
            .iter()
            .map(|(name, target)| (name.clone(), normalize(&root.join(target))))
            .collect();
        Self { entries }
    }

    /// Absolute path registered under `name`.
    pub fn resolve(&self, name: &str) -> Result<&Path, AliasError> {
        self.entries
            .get(name)
            .map(PathBuf::as_path)
            .ok_or_else(|| AliasError::Unknown(name.to_string()))
    }

    /// Expand an aliased reference such as `images/logo.png` or
    /// `~fonts/icons.woff2`.
    ///
    /// Returns `None` when the first segment is not a registered alias.
    pub fn expand(&self, specifier: &str) -> Option<PathBuf> {
        let spec = specifier.strip_prefix('~').unwrap_or(specifier);
        let (head, rest) = match spec.split_once('/') {
            Some((head, rest)) => (head, rest),
            None => (spec, ""),
        };
        let base = self.entries.get(head)?;
        Some(if rest.is_empty() {
            base.clone()
        } else {
            normalize(&base.join(rest))
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// Lexically normalize a path: drop `.` segments and fold `..` into the
/// preceding segment. Does not touch the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
