//! Shared test utilities for the sitepack test suite.
//!
//! Builds a small but complete project in a temp directory: one entry
//! importing a vendor package, a stylesheet, an image below the inline
//! threshold and a local module; templates for a static page and a blog
//! collection; files for the default copy list.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = setup_project();
//! let settings = project_settings(&tmp, Environment::Production);
//! // ... run a stage against `settings` ...
//! let files = read_tree(&tmp.path().join("dist"));
//! assert!(files.contains_key("index.html"));
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::config::{BuildConfig, BuildSettings, Environment, slash_path};

// =========================================================================
// Fixture setup
// =========================================================================

pub const APP_JS: &str = r#"import $ from 'jquery';
import './styles/main.scss';
import logo from 'images/logo.png';
import { format } from './lib/format';

$(function () {
  document.querySelector('.logo').src = logo;
  console.log(format('ready'));
});
"#;

pub const FORMAT_JS: &str = "export function format(message) {\n  return '[app] ' + message;\n}\n";

pub const MAIN_SCSS: &str = ".hero {\n  background: url(~images/photo.jpg);\n}\n";

pub const JQUERY_JS: &str =
    "(function (global) {\n  global.jQuery = global.$ = function (ready) { ready(); };\n})(window);\n";

pub const INDEX_HTML: &str = "<!DOCTYPE html>\n<html>\n<head><title>{{ environment }}</title></head>\n<body><h1>Home</h1></body>\n</html>\n";

pub const POST_HTML: &str =
    "<html>\n<head><title>{{ title }}</title></head>\n<body><article>{{{ html }}}</article></body>\n</html>\n";

pub const MANIFEST_JSON: &str = "{\"name\": \"fixture\"}\n";

/// Write a complete fixture project to a fresh temp directory.
///
/// ```text
/// manifest.json, browserconfig.xml
/// node_modules/jquery/{package.json, dist/jquery.js}
/// src/
///   app.js, lib/format.js, styles/main.scss
///   assets/images/{logo.png (2000 B), photo.jpg (4000 B), favicons/*}
///   views/index.html, views/blog/post.html
///   content/blog/{001-first-post.md, 002-second-post.md}
///   robots.txt, data/feed.json
/// ```
pub fn setup_project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();

    write_file(root, "manifest.json", MANIFEST_JSON.as_bytes());
    write_file(root, "browserconfig.xml", b"<browserconfig/>\n");
    write_file(
        root,
        "node_modules/jquery/package.json",
        br#"{"name": "jquery", "main": "dist/jquery.js"}"#,
    );
    write_file(root, "node_modules/jquery/dist/jquery.js", JQUERY_JS.as_bytes());

    write_file(root, "src/app.js", APP_JS.as_bytes());
    write_file(root, "src/lib/format.js", FORMAT_JS.as_bytes());
    write_file(root, "src/styles/main.scss", MAIN_SCSS.as_bytes());
    write_file(root, "src/assets/images/logo.png", &patterned(2000, 7));
    write_file(root, "src/assets/images/photo.jpg", &patterned(4000, 13));
    for icon in [
        "android-chrome-192x192.png",
        "android-chrome-256x256.png",
        "mstile-150x150.png",
    ] {
        write_file(root, &format!("src/assets/images/favicons/{icon}"), &patterned(64, 3));
    }

    write_file(root, "src/views/index.html", INDEX_HTML.as_bytes());
    write_file(root, "src/views/blog/post.html", POST_HTML.as_bytes());
    write_file(
        root,
        "src/content/blog/001-first-post.md",
        b"# First Post\n\nHello there.\n",
    );
    write_file(
        root,
        "src/content/blog/002-second-post.md",
        b"# Second Post\n\nNow with **markdown**.\n",
    );

    write_file(root, "src/robots.txt", b"User-agent: *\nDisallow:\n");
    write_file(root, "src/data/feed.json", b"{\"items\": []}\n");
    tmp
}

/// Stock config with the fixture's HTML templates.
pub fn project_config() -> BuildConfig {
    let mut config = BuildConfig::default();
    config.pages[0].template = "views/index.html".to_string();
    config.collections[0].template = "views/blog/post.html".to_string();
    config
}

pub fn project_settings(tmp: &TempDir, environment: Environment) -> BuildSettings {
    BuildSettings::new(tmp.path(), project_config(), environment, None).unwrap()
}

/// Write `bytes` at `root/rel`, creating parent directories.
pub fn write_file(root: &Path, rel: &str, bytes: &[u8]) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, bytes).unwrap();
}

/// Deterministic non-text bytes.
pub fn patterned(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(seed)).collect()
}

// =========================================================================
// Output inspection
// =========================================================================

/// Every file under `dir`, keyed by `/`-separated relative path.
pub fn read_tree(dir: &Path) -> BTreeMap<String, Vec<u8>> {
    WalkDir::new(dir)
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = slash_path(e.path().strip_prefix(dir).unwrap());
            (rel, fs::read(e.path()).unwrap())
        })
        .collect()
}
