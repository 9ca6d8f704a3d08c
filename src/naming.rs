//! Output path templating.
//!
//! Every emitted file's destination comes from a pattern string with
//! bracketed placeholders:
//!
//! | Placeholder | Value | `assets/images/photo.jpg` |
//! |---|---|---|
//! | `[path]` | source-relative directory with trailing `/` (empty at the root) | `assets/images/` |
//! | `[name]` | file stem | `photo` |
//! | `[ext]` | extension without the dot | `jpg` |
//! | `[group]` | logical output group of the matching rule | `images` |
//! | `[hash]` | first 8 hex digits of the content's SHA-256 | `9f86d081` |
//!
//! Page filenames use `[tag]` and `[slug]` instead.
//!
//! Patterns that contain `[path][name].[ext]` are injective over distinct
//! source files. Patterns that drop `[path]` (e.g. `assets/fonts/[name].[ext]`)
//! are not: two inputs landing on the same output path are caught when the
//! output set is assembled and reported as a collision.

use sha2::{Digest, Sha256};
use std::borrow::Cow;
use thiserror::Error;

/// Placeholders accepted in asset naming patterns.
pub const ASSET_PLACEHOLDERS: &[&str] = &["path", "name", "ext", "group", "hash"];

/// Placeholders accepted in collection page filename patterns.
pub const PAGE_PLACEHOLDERS: &[&str] = &["tag", "slug"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NamingError {
    #[error("unknown placeholder '[{placeholder}]' in pattern '{pattern}'")]
    UnknownPlaceholder {
        pattern: String,
        placeholder: String,
    },
    #[error("unterminated placeholder in pattern '{0}'")]
    Unterminated(String),
    #[error("pattern '{0}' produced an empty path")]
    Empty(String),
}

/// The pieces of a source path that asset patterns can reference.
#[derive(Debug, Clone, Copy)]
pub struct PathParts<'a> {
    pub dir: &'a str,
    pub name: &'a str,
    pub ext: &'a str,
    pub group: &'a str,
    pub content: &'a [u8],
}

impl<'a> PathParts<'a> {
    /// Split a `/`-separated source-relative path.
    pub fn from_relative(rel_path: &'a str, group: &'a str, content: &'a [u8]) -> Self {
        let (dir, file) = match rel_path.rfind('/') {
            Some(pos) => (&rel_path[..=pos], &rel_path[pos + 1..]),
            None => ("", rel_path),
        };
        let (name, ext) = match file.rfind('.') {
            Some(0) | None => (file, ""),
            Some(pos) => (&file[..pos], &file[pos + 1..]),
        };
        Self {
            dir,
            name,
            ext,
            group,
            content,
        }
    }
}

/// Compute the output path for an asset.
pub fn template(pattern: &str, parts: &PathParts<'_>) -> Result<String, NamingError> {
    render(pattern, |placeholder| match placeholder {
        "path" => Some(Cow::Borrowed(parts.dir)),
        "name" => Some(Cow::Borrowed(parts.name)),
        "ext" => Some(Cow::Borrowed(parts.ext)),
        "group" => Some(Cow::Borrowed(parts.group)),
        "hash" => Some(Cow::Owned(content_hash(parts.content))),
        _ => None,
    })
}

/// Compute the output filename for a collection page.
pub fn page_filename(pattern: &str, tag: &str, slug: &str) -> Result<String, NamingError> {
    render(pattern, |placeholder| match placeholder {
        "tag" => Some(Cow::Borrowed(tag)),
        "slug" => Some(Cow::Borrowed(slug)),
        _ => None,
    })
}

/// Compute a bundle filename; `[name]` is the bundle name.
pub fn bundle_filename(pattern: &str, name: &str) -> Result<String, NamingError> {
    render(pattern, |placeholder| {
        (placeholder == "name").then_some(Cow::Borrowed(name))
    })
}

/// Check that a pattern only uses placeholders from `allowed`.
pub fn validate_pattern(pattern: &str, allowed: &[&str]) -> Result<(), NamingError> {
    render(pattern, |placeholder| {
        allowed
            .contains(&placeholder)
            .then_some(Cow::Borrowed("x"))
    })
    .map(|_| ())
}

/// Substitute `[placeholder]` occurrences using `lookup`.
pub fn render<'v>(
    pattern: &str,
    lookup: impl Fn(&str) -> Option<Cow<'v, str>>,
) -> Result<String, NamingError> {
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;
    while let Some(open) = rest.find('[') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after
            .find(']')
            .ok_or_else(|| NamingError::Unterminated(pattern.to_string()))?;
        let placeholder = &after[..close];
        let value = lookup(placeholder).ok_or_else(|| NamingError::UnknownPlaceholder {
            pattern: pattern.to_string(),
            placeholder: placeholder.to_string(),
        })?;
        out.push_str(&value);
        rest = &after[close + 1..];
    }
    out.push_str(rest);

    let trimmed = out.trim_start_matches('/');
    if trimmed.is_empty() {
        return Err(NamingError::Empty(pattern.to_string()));
    }
    Ok(trimmed.to_string())
}

/// First 8 hex digits of the SHA-256 of `content`.
pub fn content_hash(content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    let mut hex = format!("{:x}", digest);
    hex.truncate(8);
    hex
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn parts<'a>(rel: &'a str, group: &'a str) -> PathParts<'a> {
        PathParts::from_relative(rel, group, b"")
    }

    #[test]
    fn splits_relative_path() {
        let p = parts("assets/images/photo.jpg", "images");
        assert_eq!(p.dir, "assets/images/");
        assert_eq!(p.name, "photo");
        assert_eq!(p.ext, "jpg");
    }

    #[test]
    fn root_level_file_has_empty_dir() {
        let p = parts("favicon.ico", "images");
        assert_eq!(p.dir, "");
        assert_eq!(p.name, "favicon");
        assert_eq!(p.ext, "ico");
    }

    #[test]
    fn multi_dot_name_keeps_inner_dots() {
        let p = parts("vendor/jquery.min.js", "js");
        assert_eq!(p.name, "jquery.min");
        assert_eq!(p.ext, "js");
    }

    #[test]
    fn dotfile_has_no_extension() {
        let p = parts(".htaccess", "files");
        assert_eq!(p.name, ".htaccess");
        assert_eq!(p.ext, "");
    }

    #[test]
    fn path_name_ext_pattern_preserves_structure() {
        let out = template(
            "[path][name].[ext]",
            &parts("assets/images/photo.jpg", "images"),
        )
        .unwrap();
        assert_eq!(out, "assets/images/photo.jpg");
    }

    #[test]
    fn fixed_directory_pattern() {
        let out = template(
            "assets/fonts/[name].[ext]",
            &parts("assets/fonts/roboto/regular.woff2", "fonts"),
        )
        .unwrap();
        assert_eq!(out, "assets/fonts/regular.woff2");
    }

    #[test]
    fn group_placeholder() {
        let out = template("assets/[group]/[name].[ext]", &parts("intro.mp4", "videos")).unwrap();
        assert_eq!(out, "assets/videos/intro.mp4");
    }

    #[test]
    fn hash_placeholder_depends_on_content() {
        let a = PathParts::from_relative("a.png", "images", b"one");
        let b = PathParts::from_relative("a.png", "images", b"two");
        let out_a = template("[name].[hash].[ext]", &a).unwrap();
        let out_b = template("[name].[hash].[ext]", &b).unwrap();
        assert_ne!(out_a, out_b);
        assert_eq!(out_a.len(), "a.12345678.png".len());
    }

    #[test]
    fn unknown_placeholder_is_error() {
        let err = template("[dir]/[name]", &parts("x.png", "images")).unwrap_err();
        assert_eq!(
            err,
            NamingError::UnknownPlaceholder {
                pattern: "[dir]/[name]".to_string(),
                placeholder: "dir".to_string(),
            }
        );
    }

    #[test]
    fn unterminated_placeholder_is_error() {
        assert!(matches!(
            template("[name", &parts("x.png", "images")),
            Err(NamingError::Unterminated(_))
        ));
    }

    #[test]
    fn page_filename_from_slug() {
        assert_eq!(
            page_filename("[tag]/[slug].html", "blog", "first-post").unwrap(),
            "blog/first-post.html"
        );
    }

    #[test]
    fn bundle_filename_from_name() {
        assert_eq!(
            bundle_filename("assets/js/[name].bundle.js", "app").unwrap(),
            "assets/js/app.bundle.js"
        );
    }

    #[test]
    fn validate_pattern_rejects_foreign_placeholder() {
        assert!(validate_pattern("[tag]/[slug].html", PAGE_PLACEHOLDERS).is_ok());
        assert!(validate_pattern("[tag]/[name].html", PAGE_PLACEHOLDERS).is_err());
    }

    #[test]
    fn leading_slash_is_stripped() {
        assert_eq!(
            bundle_filename("/assets/[name].js", "app").unwrap(),
            "assets/app.js"
        );
    }

    fn segment() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_-]{0,6}"
    }

    proptest! {
        #[test]
        fn path_name_ext_is_injective(
            dir_a in proptest::collection::vec(segment(), 0..3),
            dir_b in proptest::collection::vec(segment(), 0..3),
            name_a in segment(),
            name_b in segment(),
            ext_a in "[a-z]{1,4}",
            ext_b in "[a-z]{1,4}",
        ) {
            let rel_a = dir_a.iter().chain([&format!("{name_a}.{ext_a}")]).cloned().collect::<Vec<_>>().join("/");
            let rel_b = dir_b.iter().chain([&format!("{name_b}.{ext_b}")]).cloned().collect::<Vec<_>>().join("/");
            let out_a = template("[path][name].[ext]", &parts(&rel_a, "images")).unwrap();
            let out_b = template("[path][name].[ext]", &parts(&rel_b, "images")).unwrap();
            prop_assert_eq!(rel_a == rel_b, out_a == out_b);
        }
    }
}
