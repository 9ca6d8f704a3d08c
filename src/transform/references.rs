//! Cross-file reference resolution.
//!
//! Standalone assets (images, fonts, media, pass-through files) are built
//! before any stylesheet, and each records where it ended up: a public URL
//! for emitted files, or the `data:` URI itself when inlined. Stylesheets
//! then have their `url(...)` references rewritten from that map.

use crate::alias::{self, AliasTable};
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static CSS_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"url\(\s*(?:"([^"]*)"|'([^']*)'|([^)'"\s]+))\s*\)"#).expect("valid regex")
});

/// Final reference for each standalone asset, keyed by absolute source path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceMap {
    entries: BTreeMap<PathBuf, String>,
}

impl ReferenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: PathBuf, reference: String) {
        self.entries.insert(source, reference);
    }

    pub fn get(&self, source: &Path) -> Option<&str> {
        self.entries.get(source).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolve a reference written in a file located in `base_dir`.
///
/// Aliased (`images/x.png`, `~fonts/x.woff`) and relative references resolve
/// to absolute paths. External URLs, data URIs, fragments and root-absolute
/// URLs return `None`. A trailing `?query` or `#fragment` is dropped.
pub fn resolve_reference(specifier: &str, base_dir: &Path, aliases: &AliasTable) -> Option<PathBuf> {
    let spec = specifier
        .split(['?', '#'])
        .next()
        .unwrap_or(specifier)
        .trim();
    if spec.is_empty()
        || spec.starts_with("data:")
        || spec.starts_with("//")
        || spec.starts_with('/')
        || spec.contains("://")
    {
        return None;
    }
    if let Some(expanded) = aliases.expand(spec) {
        return Some(expanded);
    }
    if let Some(rest) = spec.strip_prefix('~') {
        return Some(alias::normalize(&base_dir.join(rest)));
    }
    Some(alias::normalize(&base_dir.join(spec)))
}

/// Rewrite every resolvable `url(...)` in `css` to its final reference.
/// Unresolvable references are left untouched.
///
/// A `?query` or `#fragment` on the original reference is carried over to
/// emitted URLs (the `?#iefix` font idiom relies on it) and dropped for
/// inlined `data:` URIs.
pub fn rewrite_css_urls(
    css: &str,
    base_dir: &Path,
    aliases: &AliasTable,
    references: &ReferenceMap,
) -> String {
    CSS_URL
        .replace_all(css, |caps: &Captures<'_>| {
            let target = caps
                .get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map_or("", |m| m.as_str());
            let suffix = target.find(['?', '#']).map_or("", |at| &target[at..]);
            resolve_reference(target, base_dir, aliases)
                .and_then(|path| references.get(&path))
                .map(|reference| {
                    if reference.starts_with("data:") {
                        format!("url(\"{reference}\")")
                    } else {
                        format!("url(\"{reference}{suffix}\")")
                    }
                })
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aliases() -> AliasTable {
        let map = [
            ("source", "src"),
            ("images", "src/assets/images"),
            ("fonts", "src/assets/fonts"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        AliasTable::from_config(Path::new("/p"), &map)
    }

    fn refs() -> ReferenceMap {
        let mut map = ReferenceMap::new();
        map.insert(
            PathBuf::from("/p/src/assets/images/photo.jpg"),
            "/assets/images/photo.jpg".to_string(),
        );
        map.insert(
            PathBuf::from("/p/src/assets/images/logo.png"),
            "data:image/png;base64,AAAA".to_string(),
        );
        map.insert(
            PathBuf::from("/p/src/assets/fonts/icons.woff2"),
            "/assets/fonts/icons.woff2".to_string(),
        );
        map
    }

    #[test]
    fn resolve_relative_reference() {
        let base = Path::new("/p/src/styles");
        assert_eq!(
            resolve_reference("../assets/images/photo.jpg", base, &aliases()),
            Some(PathBuf::from("/p/src/assets/images/photo.jpg"))
        );
    }

    #[test]
    fn resolve_aliased_reference_with_query() {
        assert_eq!(
            resolve_reference("~fonts/icons.woff2?v=4.7", Path::new("/elsewhere"), &aliases()),
            Some(PathBuf::from("/p/src/assets/fonts/icons.woff2"))
        );
    }

    #[test]
    fn external_references_are_skipped() {
        let base = Path::new("/p/src");
        for spec in [
            "https://example.com/a.png",
            "//cdn.example.com/a.png",
            "data:image/png;base64,AAAA",
            "/absolute.png",
            "#filter",
        ] {
            assert_eq!(resolve_reference(spec, base, &aliases()), None, "{spec}");
        }
    }

    #[test]
    fn rewrite_emitted_and_inlined_urls() {
        let css = ".a { background: url('../assets/images/photo.jpg'); }\n\
                   .b { background: url(~images/logo.png); }\n\
                   @font-face { src: url(\"~fonts/icons.woff2?#iefix\") format('woff2'); }";
        let out = rewrite_css_urls(css, Path::new("/p/src/styles"), &aliases(), &refs());
        assert!(out.contains("url(\"/assets/images/photo.jpg\")"));
        assert!(out.contains("url(\"data:image/png;base64,AAAA\")"));
        assert!(out.contains("url(\"/assets/fonts/icons.woff2?#iefix\")"));
    }

    #[test]
    fn url_suffix_survives_rewrite() {
        let css = "@font-face { src: url(../assets/fonts/icons.woff2?v=4.7#iefix); }\n\
                   .b { background: url('~images/logo.png?v=2'); }";
        let out = rewrite_css_urls(css, Path::new("/p/src/styles"), &aliases(), &refs());
        assert!(out.contains("url(\"/assets/fonts/icons.woff2?v=4.7#iefix\")"), "{out}");
        assert!(out.contains("url(\"data:image/png;base64,AAAA\")"), "{out}");
        assert!(!out.contains("AAAA?v=2"));
    }

    #[test]
    fn unknown_urls_are_left_alone() {
        let css = ".a { background: url(missing.png); } .b { background: url(https://x.y/z.png); }";
        let out = rewrite_css_urls(css, Path::new("/p/src"), &aliases(), &refs());
        assert_eq!(out, css);
    }
}
