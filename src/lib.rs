//! # sitepack
//!
//! A rule-driven build pipeline for static sites. A project is a source
//! directory of scripts, stylesheets, templates, images, fonts and media plus
//! a vendor directory of third-party packages; a build turns it into a
//! deployable output directory.
//!
//! # Architecture
//!
//! ```text
//! 1. Scan       src/        →  classified files      (rule match per file)
//! 2. Graph      entries     →  module graph          (imports, url(), provided globals)
//! 3. Transform  each input  →  payload               (stage chain per rule)
//! 4. Bundle     payloads    →  app + vendor bundles, extracted stylesheets
//! 5. Pages      templates   →  HTML with bundles injected
//! 6. Publish    output set  →  dist/                 (collision check, atomic swap)
//! ```
//!
//! Every step is a function over immutable build settings; there is no
//! hidden global state. The same inputs in the same environment produce a
//! byte-identical output directory.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | Layered `sitepack.toml` loading, validation, and the immutable [`config::BuildSettings`] |
//! | [`alias`] | Alias table for `images/…`, `~fonts/…` style references, lexical path normalization |
//! | [`rules`] | The ordered match-rule table: predicate, concern and stage chain per rule |
//! | [`naming`] | `[path][name].[ext]`, `[hash]`, `[tag]`/`[slug]` output naming patterns |
//! | [`scan`] | Walks the source root and classifies every file |
//! | [`graph`] | Module resolution and the per-entry dependency order |
//! | [`transform`] | Stage chains and the [`transform::Toolchain`] seam for minifiers and compilers |
//! | [`bundle`] | App/vendor partitioning, linking and extracted stylesheets |
//! | [`pages`] | Page composition from static entries and content collections, rendering and injection |
//! | [`emit`] | Output set with collision detection, atomic publishing |
//! | [`pipeline`] | Orchestrates one build and reports progress events |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Environment Is Resolved Once
//!
//! Rules that behave differently in development and production declare both
//! variants. The variant is selected when a chain is built, so stages never
//! look at the environment and a chain is a plain list of steps.
//!
//! ## Two Passes Over Inputs
//!
//! Stylesheets and scripts embed the final URL (or `data:` URI) of every
//! asset they reference. Standalone assets are therefore processed first
//! into a [`transform::ReferenceMap`], and code is transformed against it.
//! Each pass runs in parallel with `rayon` and collects results in input
//! order.
//!
//! ## Nothing Is Written Until Everything Succeeded
//!
//! All output is assembled in memory. Collisions, transform failures and
//! cancellation abort before the output directory is touched; a successful
//! build replaces it in one rename.
//!
//! ## External Tools Behind a Trait
//!
//! Script checking and minification (oxc), CSS normalization and
//! minification (lightningcss), image recompression (`image`) and Sass
//! compilation sit behind [`transform::Toolchain`]. Tests use a recording
//! mock; pipeline logic never depends on a real compiler.

pub mod alias;
pub mod bundle;
pub mod config;
pub mod emit;
pub mod graph;
pub mod naming;
pub mod output;
pub mod pages;
pub mod pipeline;
pub mod rules;
pub mod scan;
pub mod transform;

#[cfg(test)]
pub(crate) mod test_helpers;
