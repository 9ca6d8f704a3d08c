//! Build configuration.
//!
//! Handles loading, validating, and merging `sitepack.toml` files, and turns
//! the merged result into the immutable [`BuildSettings`] that every pipeline
//! component receives by reference.
//!
//! ## Config File Location
//!
//! Configuration lives in the project root, next to the source tree:
//!
//! ```text
//! project/
//! ├── sitepack.toml              # Project config (overrides stock defaults)
//! ├── sitepack.production.toml   # Environment overlay (overrides project config)
//! ├── manifest.json              # Copied verbatim into the output
//! ├── browserconfig.xml
//! ├── node_modules/              # Third-party modules (vendor bundle)
//! └── src/
//!     ├── app.js                 # Default entry point
//!     ├── views/                 # Page templates
//!     ├── content/blog/          # Collection content (markdown)
//!     └── assets/
//!         ├── images/
//!         └── fonts/
//! ```
//!
//! Layers are merged in order: stock defaults, `sitepack.toml`, then
//! `sitepack.<environment>.toml`. Each layer only needs the keys it wants to
//! override. Arrays (entries, pages, copies) replace the lower layer wholesale.
//!
//! ## Configuration Options
//!
//! ```toml
//! source = "src"              # Source root (alias `source` should point here)
//! output = "dist"             # Output directory
//! vendor_dir = "node_modules" # Third-party module root
//! content_dir = "content"     # Collection content, relative to the source root
//! public_path = "/"           # URL prefix for every emitted reference
//!
//! [aliases]
//! source = "src"
//! images = "src/assets/images"
//! fonts = "src/assets/fonts"
//!
//! [[entries]]
//! name = "app"
//! path = "app.js"
//!
//! [bundles]
//! script = "assets/js/[name].bundle.js"
//! vendor = "assets/js/vendor.bundle.js"
//! stylesheet = "assets/css/[name].bundle.css"
//!
//! [rules.images]
//! limit = 3000
//! name = "[path][name].[ext]"
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::alias::{self, AliasTable, REQUIRED_ALIASES};
use crate::naming;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the project configuration file.
pub const CONFIG_FILENAME: &str = "sitepack.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// The build environment. The single axis that conditions stage selection.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Project configuration loaded from `sitepack.toml`.
///
/// All fields have defaults matching the conventional project layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Source root, relative to the project root.
    pub source: String,
    /// Output directory, relative to the project root.
    pub output: String,
    /// Third-party module root, relative to the project root.
    pub vendor_dir: String,
    /// Collection content directory, relative to the source root.
    pub content_dir: String,
    /// URL prefix prepended to every emitted reference.
    pub public_path: String,
    /// Symbolic alias name → path relative to the project root.
    pub aliases: BTreeMap<String, String>,
    /// Script entry points. Each entry produces one application bundle.
    pub entries: Vec<EntryConfig>,
    /// Bundle output naming.
    pub bundles: BundleConfig,
    /// Per-rule options (inlining thresholds, naming patterns).
    pub rules: RulesConfig,
    /// Identifier → module that provides it.
    pub provide: BTreeMap<String, String>,
    /// Files copied verbatim (paths relative to the source root).
    pub copy: Vec<CopyConfig>,
    /// Fixed pages.
    pub pages: Vec<PageConfig>,
    /// Page collections expanded from the content source.
    pub collections: Vec<CollectionConfig>,
    /// Production minification settings.
    pub minify: MinifyConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl Default for BuildConfig {
    fn default() -> Self {
        let aliases = [
            ("source", "src"),
            ("images", "src/assets/images"),
            ("fonts", "src/assets/fonts"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let provide = [
            ("$", "jquery"),
            ("jQuery", "jquery"),
            ("window.$", "jquery"),
            ("window.jQuery", "jquery"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let copy = [
            ("../manifest.json", "manifest.json"),
            ("../browserconfig.xml", "browserconfig.xml"),
            (
                "assets/images/favicons/android-chrome-192x192.png",
                "assets/images/android-chrome-192x192.png",
            ),
            (
                "assets/images/favicons/android-chrome-256x256.png",
                "assets/images/android-chrome-256x256.png",
            ),
            (
                "assets/images/favicons/mstile-150x150.png",
                "assets/images/mstile-150x150.png",
            ),
        ]
        .into_iter()
        .map(|(from, to)| CopyConfig {
            from: from.to_string(),
            to: to.to_string(),
        })
        .collect();

        Self {
            source: "src".to_string(),
            output: "dist".to_string(),
            vendor_dir: "node_modules".to_string(),
            content_dir: "content".to_string(),
            public_path: "/".to_string(),
            aliases,
            entries: vec![EntryConfig {
                name: "app".to_string(),
                path: "app.js".to_string(),
            }],
            bundles: BundleConfig::default(),
            rules: RulesConfig::default(),
            provide,
            copy,
            pages: vec![PageConfig {
                template: "views/index.html".to_string(),
                filename: "index.html".to_string(),
                inject: true,
            }],
            collections: vec![CollectionConfig {
                tag: "blog".to_string(),
                template: "views/blog/post.html".to_string(),
                filename: "[tag]/[slug].html".to_string(),
                inject: true,
            }],
            minify: MinifyConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl BuildConfig {
    /// Validate values and naming patterns.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for name in REQUIRED_ALIASES {
            if !self.aliases.contains_key(name) {
                return Err(ConfigError::Validation(format!(
                    "aliases.{name} must be defined"
                )));
            }
        }
        if self.entries.is_empty() {
            return Err(ConfigError::Validation(
                "at least one entry must be configured".into(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for entry in &self.entries {
            if !seen.insert(entry.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate entry name '{}'",
                    entry.name
                )));
            }
        }
        for (key, pattern, allowed) in [
            ("bundles.script", &self.bundles.script, &["name"][..]),
            ("bundles.vendor", &self.bundles.vendor, &["name"][..]),
            ("bundles.stylesheet", &self.bundles.stylesheet, &["name"][..]),
        ] {
            check_pattern(key, pattern, allowed)?;
        }
        for (key, rule) in [
            ("rules.images", &self.rules.images),
            ("rules.fonts", &self.rules.fonts),
            ("rules.videos", &self.rules.videos),
        ] {
            check_pattern(key, &rule.name, naming::ASSET_PLACEHOLDERS)?;
        }
        for collection in &self.collections {
            check_pattern(
                "collections.filename",
                &collection.filename,
                naming::PAGE_PLACEHOLDERS,
            )?;
        }
        Ok(())
    }
}

fn check_pattern(key: &str, pattern: &str, allowed: &[&str]) -> Result<(), ConfigError> {
    naming::validate_pattern(pattern, allowed)
        .map_err(|e| ConfigError::Validation(format!("{key}: {e}")))
}

/// A script entry point.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntryConfig {
    /// Bundle name (`[name]` in the bundle patterns).
    pub name: String,
    /// Entry module, relative to the source root.
    pub path: String,
}

/// Output naming for bundles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BundleConfig {
    /// Application bundle pattern; `[name]` is the entry name.
    pub script: String,
    /// Third-party bundle pattern; `[name]` is `vendor`.
    pub vendor: String,
    /// Extracted stylesheet pattern (production); `[name]` is the entry name.
    pub stylesheet: String,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            script: "assets/js/[name].bundle.js".to_string(),
            vendor: "assets/js/vendor.bundle.js".to_string(),
            stylesheet: "assets/css/[name].bundle.css".to_string(),
        }
    }
}

/// Options for the default rule set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RulesConfig {
    /// Minify stylesheets in the css-loader stage.
    pub css_minimize: bool,
    pub images: InlineRule,
    pub fonts: InlineRule,
    pub videos: InlineRule,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            css_minimize: true,
            images: InlineRule {
                limit: 3000,
                name: "[path][name].[ext]".to_string(),
            },
            fonts: InlineRule {
                limit: 5000,
                name: "assets/fonts/[name].[ext]".to_string(),
            },
            videos: InlineRule {
                limit: 10000,
                name: "assets/videos/[name].[ext]".to_string(),
            },
        }
    }
}

/// Size-limit inlining options.
///
/// Assets smaller than `limit` bytes become `data:` URIs; the rest are
/// emitted at the path produced by the `name` pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InlineRule {
    pub limit: u64,
    pub name: String,
}

/// A file copied verbatim into the output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CopyConfig {
    /// Source file, relative to the source root.
    pub from: String,
    /// Destination, relative to the output directory.
    pub to: String,
}

/// A fixed page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PageConfig {
    /// Template path relative to the source root.
    pub template: String,
    /// Output filename relative to the output directory.
    pub filename: String,
    /// Link bundles and stylesheets into the page.
    #[serde(default = "default_inject")]
    pub inject: bool,
}

/// A page collection expanded from the content source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectionConfig {
    /// Collection tag passed to the content source (e.g. `blog`).
    pub tag: String,
    /// Template shared by every page in the collection.
    pub template: String,
    /// Output filename pattern; `[tag]` and `[slug]` are substituted.
    #[serde(default = "default_collection_filename")]
    pub filename: String,
    #[serde(default = "default_inject")]
    pub inject: bool,
}

fn default_inject() -> bool {
    true
}

fn default_collection_filename() -> String {
    "[tag]/[slug].html".to_string()
}

/// Production minification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MinifyConfig {
    /// Drop `console.*` calls from minified bundles.
    pub drop_console: bool,
}

impl Default for MinifyConfig {
    fn default() -> Self {
        Self { drop_console: true }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel transform workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading and merging
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(BuildConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// Tables merge key by key; any other overlay value replaces the base value.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a TOML file as a raw value. `Ok(None)` when the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge overlays in order onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlays: impl IntoIterator<Item = toml::Value>,
) -> Result<BuildConfig, ConfigError> {
    let merged = overlays.into_iter().fold(base, merge_toml);
    let config: BuildConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the layered config for a project root and environment.
pub fn load_config(root: &Path, environment: Environment) -> Result<BuildConfig, ConfigError> {
    let project = load_raw_config(&root.join(CONFIG_FILENAME))?;
    let env_overlay =
        load_raw_config(&root.join(format!("sitepack.{}.toml", environment.as_str())))?;
    resolve_config(
        stock_defaults_value(),
        project.into_iter().chain(env_overlay),
    )
}

/// Normalize an asset-path prefix: empty stays empty, anything else ends in `/`.
pub fn normalize_public_path(prefix: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{prefix}/")
    }
}

// =============================================================================
// Build settings
// =============================================================================

/// Immutable build-wide settings, constructed once per invocation.
#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub environment: Environment,
    /// Normalized URL prefix (see [`normalize_public_path`]).
    pub public_path: String,
    pub project_root: PathBuf,
    pub source_root: PathBuf,
    pub output_dir: PathBuf,
    pub vendor_root: PathBuf,
    pub aliases: AliasTable,
    pub config: BuildConfig,
}

impl BuildSettings {
    /// Build settings from an already-resolved config.
    ///
    /// `public_path` overrides `config.public_path` when given.
    pub fn new(
        project_root: &Path,
        config: BuildConfig,
        environment: Environment,
        public_path: Option<&str>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let root = alias::normalize(&std::path::absolute(project_root)?);
        let public_path =
            normalize_public_path(public_path.unwrap_or(config.public_path.as_str()));
        let source_root = alias::normalize(&root.join(&config.source));
        let output_dir = alias::normalize(&root.join(&config.output));
        let vendor_root = alias::normalize(&root.join(&config.vendor_dir));
        // Publishing replaces the output directory wholesale.
        for (key, dir) in [
            ("the project root", &root),
            ("source", &source_root),
            ("vendor_dir", &vendor_root),
        ] {
            if dir.starts_with(&output_dir) {
                return Err(ConfigError::Validation(format!(
                    "output '{}' must not be or contain {key}",
                    config.output
                )));
            }
        }
        if output_dir.starts_with(&source_root) {
            return Err(ConfigError::Validation(format!(
                "output '{}' must not be inside source '{}'",
                config.output, config.source
            )));
        }
        Ok(Self {
            environment,
            public_path,
            source_root,
            output_dir,
            vendor_root,
            aliases: AliasTable::from_config(&root, &config.aliases),
            project_root: root,
            config,
        })
    }

    /// Load the layered config from `project_root` and build settings.
    pub fn load(
        project_root: &Path,
        environment: Environment,
        public_path: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let config = load_config(project_root, environment)?;
        Self::new(project_root, config, environment, public_path)
    }

    /// Collection content root.
    pub fn content_root(&self) -> PathBuf {
        self.source_root.join(&self.config.content_dir)
    }

    /// Path of `path` relative to the source root, with `/` separators.
    pub fn source_relative(&self, path: &Path) -> Option<String> {
        path.strip_prefix(&self.source_root).ok().map(slash_path)
    }

    /// Human-readable label for any input: source-relative when possible,
    /// project-relative otherwise.
    pub fn display_path(&self, path: &Path) -> String {
        if let Some(rel) = self.source_relative(path) {
            return rel;
        }
        path.strip_prefix(&self.project_root)
            .map(slash_path)
            .unwrap_or_else(|_| path.display().to_string())
    }

    /// Public URL for an output-relative path.
    pub fn public_url(&self, output_path: &str) -> String {
        format!("{}{}", self.public_path, output_path)
    }
}

/// Join path components with `/`, regardless of platform.
pub fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Returns a fully-commented stock `sitepack.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# sitepack configuration
# ======================
# All settings are optional. Values shown below are the defaults.
#
# Layers: stock defaults -> sitepack.toml -> sitepack.<environment>.toml
# Each layer only needs the keys it wants to override.
# Unknown keys will cause an error.

# Source root, output directory and third-party module root,
# all relative to the project root.
source = "src"
output = "dist"
vendor_dir = "node_modules"

# Collection content directory, relative to the source root.
content_dir = "content"

# URL prefix for every emitted reference. Overridden by --public-path
# or the ASSET_PATH environment variable.
public_path = "/"

# ---------------------------------------------------------------------------
# Aliases (relative to the project root). source, images and fonts are
# required. Use them in imports ("images/logo.png") and stylesheets
# (url(~images/logo.png)).
# ---------------------------------------------------------------------------
[aliases]
source = "src"
images = "src/assets/images"
fonts = "src/assets/fonts"

# ---------------------------------------------------------------------------
# Identifiers that implicitly import a module when a script mentions them.
# ---------------------------------------------------------------------------
[provide]
"$" = "jquery"
jQuery = "jquery"
"window.$" = "jquery"
"window.jQuery" = "jquery"

# ---------------------------------------------------------------------------
# Bundles. [name] is the entry name (or "vendor").
# ---------------------------------------------------------------------------
[bundles]
script = "assets/js/[name].bundle.js"
vendor = "assets/js/vendor.bundle.js"
stylesheet = "assets/css/[name].bundle.css"

# ---------------------------------------------------------------------------
# Rules. Files below `limit` bytes are inlined as data: URIs, the rest are
# emitted at `name`. Placeholders: [path] [name] [ext] [group] [hash]
# ---------------------------------------------------------------------------
[rules]
css_minimize = true

[rules.images]
limit = 3000
name = "[path][name].[ext]"

[rules.fonts]
limit = 5000
name = "assets/fonts/[name].[ext]"

[rules.videos]
limit = 10000
name = "assets/videos/[name].[ext]"

# ---------------------------------------------------------------------------
# Production minification
# ---------------------------------------------------------------------------
[minify]
drop_console = true

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel transform workers.
# Omit to auto-detect (= number of CPU cores).
# max_processes = 4

# ---------------------------------------------------------------------------
# Entry points (one application bundle each)
# ---------------------------------------------------------------------------
[[entries]]
name = "app"
path = "app.js"

# ---------------------------------------------------------------------------
# Verbatim copies. `from` is relative to the source root.
# ---------------------------------------------------------------------------
[[copy]]
from = "../manifest.json"
to = "manifest.json"

[[copy]]
from = "../browserconfig.xml"
to = "browserconfig.xml"

[[copy]]
from = "assets/images/favicons/android-chrome-192x192.png"
to = "assets/images/android-chrome-192x192.png"

[[copy]]
from = "assets/images/favicons/android-chrome-256x256.png"
to = "assets/images/android-chrome-256x256.png"

[[copy]]
from = "assets/images/favicons/mstile-150x150.png"
to = "assets/images/mstile-150x150.png"

# ---------------------------------------------------------------------------
# Pages
# ---------------------------------------------------------------------------
[[pages]]
template = "views/index.html"
filename = "index.html"
inject = true

# One page per item the content source returns for `tag`.
[[collections]]
tag = "blog"
template = "views/blog/post.html"
filename = "[tag]/[slug].html"
inject = true
"##
}
