//! Rule matching: which transform chain handles which file.
//!
//! A [`RuleSet`] is an explicit, ordered list of [`MatchRule`]s. Matching a
//! path evaluates the rules in declaration order and returns the first whose
//! [`Predicate`] accepts it. A path no rule accepts is a *no-match* and is
//! copied to the output unchanged.
//!
//! The default rule set, in declaration order:
//!
//! | Rule | Concern | Extensions | Chain |
//! |---|---|---|---|
//! | `scripts` | script | `js` (not under the vendor dir) | parse-js |
//! | `css` | style | `css` | css-loader → style-inject / style-extract |
//! | `scss` | style | `scss` | compile-sass → postcss → css-loader → style-inject / style-extract |
//! | `templates` | template | `pug`, `html` | template-loader |
//! | `images` | image | `png` `jpg` `jpeg` `gif` `svg` `ico` | (optimize-image) → url-loader |
//! | `fonts` | font | `woff` `woff2` `eot` `ttf` `otf` | url-loader |
//! | `videos` | media | `mp4` | url-loader |
//!
//! Style output is environment-conditional: development injects styles at
//! runtime, production extracts them into a stylesheet.

use crate::config::BuildConfig;
use crate::naming::{self, NamingError};
use crate::transform::{Stage, StageSpec, UrlLoaderOptions};
use serde::Serialize;
use std::path::{Component, Path};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("rule '{rule}' can never match: every extension is claimed by earlier rule '{by}'")]
    Shadowed { rule: String, by: String },
    #[error("rule '{rule}' has an invalid naming pattern: {source}")]
    Pattern {
        rule: String,
        #[source]
        source: NamingError,
    },
}

/// What kind of input a rule handles. Rule overlap is only checked within
/// one concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Concern {
    Script,
    Style,
    Template,
    Image,
    Font,
    Media,
}

impl Concern {
    /// Logical output group, available as `[group]` in naming patterns.
    pub fn group(self) -> &'static str {
        match self {
            Concern::Script => "js",
            Concern::Style => "css",
            Concern::Template => "views",
            Concern::Image => "images",
            Concern::Font => "fonts",
            Concern::Media => "videos",
        }
    }
}

/// Extension test, optionally combined with directory exclusions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    extensions: Vec<String>,
    exclude_dirs: Vec<String>,
}

impl Predicate {
    pub fn extensions(extensions: &[&str]) -> Self {
        Self {
            extensions: extensions.iter().map(|e| e.to_ascii_lowercase()).collect(),
            exclude_dirs: Vec::new(),
        }
    }

    /// Reject paths that have a directory component named `dir`.
    pub fn excluding(mut self, dir: &str) -> Self {
        self.exclude_dirs.push(dir.to_string());
        self
    }

    /// Whether this predicate accepts `path`. A trailing `?query` is ignored
    /// and extensions compare case-insensitively.
    pub fn matches(&self, path: &str) -> bool {
        let path = path.split_once('?').map_or(path, |(p, _)| p);
        let path = Path::new(path);
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        if !self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)) {
            return false;
        }
        !path.components().any(|c| match c {
            Component::Normal(name) => self
                .exclude_dirs
                .iter()
                .any(|d| name.to_str() == Some(d.as_str())),
            _ => false,
        })
    }

    /// True when every path this predicate could accept is also accepted by
    /// `self`.
    fn covers(&self, other: &Predicate) -> bool {
        self.exclude_dirs.is_empty()
            && other
                .extensions
                .iter()
                .all(|e| self.extensions.contains(e))
    }
}

/// A predicate paired with the chain of stages it routes files to.
#[derive(Debug, Clone)]
pub struct MatchRule {
    pub name: String,
    pub concern: Concern,
    pub predicate: Predicate,
    pub chain: Vec<StageSpec>,
}

impl MatchRule {
    pub fn new(name: &str, concern: Concern, predicate: Predicate, chain: Vec<StageSpec>) -> Self {
        Self {
            name: name.to_string(),
            concern,
            predicate,
            chain,
        }
    }
}

/// Ordered rule list with first-match dispatch.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<MatchRule>,
}

impl RuleSet {
    /// Build a rule set, rejecting rules that an earlier rule of the same
    /// concern fully shadows and naming patterns with unknown placeholders.
    pub fn new(rules: Vec<MatchRule>) -> Result<Self, RuleError> {
        for (i, rule) in rules.iter().enumerate() {
            if let Some(earlier) = rules[..i]
                .iter()
                .find(|r| r.concern == rule.concern && r.predicate.covers(&rule.predicate))
            {
                return Err(RuleError::Shadowed {
                    rule: rule.name.clone(),
                    by: earlier.name.clone(),
                });
            }
            for stage in rule.chain.iter().flat_map(StageSpec::variants) {
                if let Stage::UrlLoader(opts) = stage {
                    naming::validate_pattern(&opts.name, naming::ASSET_PLACEHOLDERS).map_err(
                        |source| RuleError::Pattern {
                            rule: rule.name.clone(),
                            source,
                        },
                    )?;
                }
            }
        }
        Ok(Self { rules })
    }

    /// The default rule set, parameterized by the configured thresholds.
    pub fn from_config(config: &BuildConfig) -> Result<Self, RuleError> {
        let css_loader = || StageSpec::Always(Stage::CssLoader {
            minimize: config.rules.css_minimize,
        });
        let style_output = || StageSpec::ByEnvironment {
            development: Some(Stage::StyleInject),
            production: Some(Stage::StyleExtract),
        };
        let url_loader = |rule: &crate::config::InlineRule| {
            StageSpec::Always(Stage::UrlLoader(UrlLoaderOptions {
                limit: rule.limit,
                name: rule.name.clone(),
            }))
        };

        Self::new(vec![
            MatchRule::new(
                "scripts",
                Concern::Script,
                Predicate::extensions(&["js"]).excluding(&config.vendor_dir),
                vec![StageSpec::Always(Stage::ParseScript)],
            ),
            MatchRule::new(
                "css",
                Concern::Style,
                Predicate::extensions(&["css"]),
                vec![css_loader(), style_output()],
            ),
            MatchRule::new(
                "scss",
                Concern::Style,
                Predicate::extensions(&["scss"]),
                vec![
                    StageSpec::Always(Stage::CompileSass),
                    StageSpec::Always(Stage::PostCss),
                    css_loader(),
                    style_output(),
                ],
            ),
            MatchRule::new(
                "templates",
                Concern::Template,
                Predicate::extensions(&["pug", "html"]),
                vec![StageSpec::Always(Stage::TemplateLoader)],
            ),
            MatchRule::new(
                "images",
                Concern::Image,
                Predicate::extensions(&["png", "jpg", "jpeg", "gif", "svg", "ico"]),
                vec![
                    StageSpec::ByEnvironment {
                        development: None,
                        production: Some(Stage::OptimizeImage),
                    },
                    url_loader(&config.rules.images),
                ],
            ),
            MatchRule::new(
                "fonts",
                Concern::Font,
                Predicate::extensions(&["woff", "woff2", "eot", "ttf", "otf"]),
                vec![url_loader(&config.rules.fonts)],
            ),
            MatchRule::new(
                "videos",
                Concern::Media,
                Predicate::extensions(&["mp4"]),
                vec![url_loader(&config.rules.videos)],
            ),
        ])
    }

    /// Index of the first rule accepting `path`, or `None` for a no-match.
    pub fn match_index(&self, path: &str) -> Option<usize> {
        self.rules.iter().position(|r| r.predicate.matches(path))
    }

    /// First rule accepting `path`, or `None` for a no-match.
    pub fn match_path(&self, path: &str) -> Option<&MatchRule> {
        self.match_index(path).map(|i| &self.rules[i])
    }

    pub fn rules(&self) -> &[MatchRule] {
        &self.rules
    }
}
