//! CLI output formatting for the build pipeline.
//!
//! Output is organized by what was produced, not by where it came from:
//! every line leads with the output (bundle, page, asset) and shows the
//! source as indented context.
//!
//! # Output Format
//!
//! ## Check
//!
//! ```text
//! Entries
//! 001 app
//!     node_modules/jquery/dist/jquery.js (vendor)
//!     styles/main.scss (style)
//!     assets/images/logo.png (asset)
//!     app.js
//!
//! Files
//! 001 app.js [scripts]
//! 002 robots.txt (pass-through)
//!
//! Unreferenced
//!     legacy/unused.js
//! ```
//!
//! ## Build progress
//!
//! ```text
//! assets/images/logo.png: inlined (2700 bytes)
//! assets/images/photo.jpg → assets/images/photo.jpg
//! app.js [parse-js]
//! Bundle assets/js/app.bundle.js (3 modules)
//! Page blog/first-post.html ← views/blog/post.html
//! ```
//!
//! ## Build summary
//!
//! ```text
//! Bundles
//! 001 app → assets/js/app.bundle.js (3 modules)
//! 002 vendor → assets/js/vendor.bundle.js (1 modules)
//!
//! Built 14 files (4 inlined, 3 pages)
//! ```
//!
//! # Architecture
//!
//! Each view has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure.

use crate::bundle::BundleKind;
use crate::config::BuildSettings;
use crate::graph::ModuleKind;
use crate::pages::{Page, PageOrigin};
use crate::pipeline::{BuildEvent, BuildReport, Disposition, Plan};

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(count: usize, one: &str, many: &str) -> String {
    if count == 1 {
        format!("{count} {one}")
    } else {
        format!("{count} {many}")
    }
}

// ============================================================================
// Check output
// ============================================================================

/// Format the scan and graph of a project without building it.
pub fn format_plan(plan: &Plan, settings: &BuildSettings) -> Vec<String> {
    let mut lines = vec!["Entries".to_string()];
    for (i, entry) in plan.graph.entries.iter().enumerate() {
        lines.push(format!("{} {}", format_index(i + 1), entry.name));
        for path in &entry.order {
            let label = settings.display_path(path);
            let kind = plan.graph.get(path).map(|m| m.kind);
            let line = match kind {
                Some(ModuleKind::Style) => format!("{label} (style)"),
                Some(ModuleKind::Asset) => format!("{label} (asset)"),
                _ if path.starts_with(&settings.vendor_root) => format!("{label} (vendor)"),
                _ => label,
            };
            lines.push(format!("{}{}", indent(1), line));
        }
    }

    lines.push(String::new());
    lines.push("Files".to_string());
    for (i, file) in plan.files.iter().enumerate() {
        let detail = match &file.rule {
            Some(rule) => format!("[{rule}]"),
            None => "(pass-through)".to_string(),
        };
        lines.push(format!(
            "{} {} {}",
            format_index(i + 1),
            file.source.rel_path,
            detail
        ));
    }

    if !plan.unreferenced.is_empty() {
        lines.push(String::new());
        lines.push("Unreferenced".to_string());
        for rel in &plan.unreferenced {
            lines.push(format!("{}{}", indent(1), rel));
        }
    }
    lines
}

pub fn print_plan(plan: &Plan, settings: &BuildSettings) {
    for line in format_plan(plan, settings) {
        println!("{}", line);
    }
}

// ============================================================================
// Build progress
// ============================================================================

/// Format a single build progress event as display lines.
pub fn format_build_event(event: &BuildEvent) -> Vec<String> {
    match event {
        BuildEvent::Scanned {
            files,
            modules,
            unreferenced,
        } => {
            let mut line = format!(
                "Found {}, {} reachable from entries",
                plural(*files, "file", "files"),
                plural(*modules, "module", "modules")
            );
            if *unreferenced > 0 {
                line.push_str(&format!(" ({unreferenced} unreferenced)"));
            }
            vec![line]
        }
        BuildEvent::AssetProcessed {
            source,
            rule: _,
            disposition,
        } => vec![match disposition {
            Disposition::Inlined { bytes } => format!("{source}: inlined ({bytes} bytes)"),
            Disposition::Emitted { path } => format!("{source} → {path}"),
            Disposition::Template => format!("{source}: template"),
            Disposition::PassThrough { path } => format!("{source} → {path} (as-is)"),
        }],
        BuildEvent::ModuleTransformed {
            source,
            rule: None,
            ..
        } => vec![format!("{source} (vendor)")],
        BuildEvent::ModuleTransformed { source, stages, .. } => {
            vec![format!("{source} [{}]", stages.join(" → "))]
        }
        BuildEvent::BundleWritten { filename, modules } => vec![format!(
            "Bundle {filename} ({})",
            plural(*modules, "module", "modules")
        )],
        BuildEvent::Copied { from, to } => vec![format!("Copy {from} → {to}")],
        BuildEvent::PageRendered { filename, template } => {
            vec![format!("Page {filename} ← {template}")]
        }
        BuildEvent::Published { output, files } => vec![format!(
            "Published {} to {}",
            plural(*files, "file", "files"),
            output.display()
        )],
    }
}

// ============================================================================
// Build summary
// ============================================================================

/// Format the summary of a finished build.
pub fn format_build_report(report: &BuildReport) -> Vec<String> {
    let mut lines = vec!["Bundles".to_string()];
    for (i, bundle) in report.bundles.iter().enumerate() {
        let kind = match bundle.kind {
            BundleKind::App => "",
            BundleKind::Vendor => " vendor",
        };
        lines.push(format!(
            "{} {} → {} ({}){}",
            format_index(i + 1),
            bundle.name,
            bundle.filename,
            plural(bundle.modules.len(), "module", "modules"),
            kind
        ));
    }

    if !report.stylesheets.is_empty() {
        lines.push(String::new());
        lines.push("Stylesheets".to_string());
        for (i, sheet) in report.stylesheets.iter().enumerate() {
            lines.push(format!(
                "{} {} → {}",
                format_index(i + 1),
                sheet.name,
                sheet.filename
            ));
        }
    }

    if !report.unreferenced.is_empty() {
        lines.push(String::new());
        lines.push("Unreferenced (not built)".to_string());
        for rel in &report.unreferenced {
            lines.push(format!("{}{}", indent(1), rel));
        }
    }

    lines.push(String::new());
    lines.push(format!(
        "Built {} ({} inlined, {})",
        plural(report.outputs.len(), "file", "files"),
        report.inlined.len(),
        plural(report.pages.len(), "page", "pages")
    ));
    lines
}

pub fn print_build_report(report: &BuildReport) {
    for line in format_build_report(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Pages
// ============================================================================

/// Format the composed page list.
pub fn format_pages(pages: &[Page]) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, page) in pages.iter().enumerate() {
        lines.push(format!("{} {}", format_index(i + 1), page.filename));
        lines.push(format!("{}Template: {}", indent(1), page.template));
        if let PageOrigin::Collection(tag) = &page.origin {
            lines.push(format!("{}Collection: {}", indent(1), tag));
        }
        if !page.inject {
            lines.push(format!("{}No asset injection", indent(1)));
        }
    }
    lines
}

pub fn print_pages(pages: &[Page]) {
    for line in format_pages(pages) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================
