//! The build pipeline.
//!
//! ```text
//! scan ─→ classify ─→ graph ─┬─→ standalone assets (parallel) ─→ reference map, templates
//!                            └─→ scripts + styles   (parallel) ─→ bundles
//!                                copies, pages ─→ output set ─→ collision check ─→ publish
//! ```
//!
//! Standalone assets (images, fonts, media, templates, unmatched files) are
//! processed first because stylesheets and scripts embed their final URLs.
//! Parallel results are collected in input order, so the output set and the
//! report do not depend on scheduling.
//!
//! Nothing is written until every step has succeeded; the output directory
//! is then replaced in one step (see [`emit::publish`]).

use crate::bundle::{self, Bundle, BundleError, ExtractedStylesheet};
use crate::config::{BuildSettings, Environment};
use crate::emit::{self, EmitError, OutputSet};
use crate::graph::{self, GraphError, ModuleGraph};
use crate::naming::{self, NamingError, PathParts};
use crate::pages::{self, CollaboratorError, ContentSource, Page, PageRenderer, RenderGlobals};
use crate::rules::{Concern, RuleError, RuleSet};
use crate::scan::{self, ClassifiedFile, ScanError};
use crate::transform::{
    AssetRef, Chain, Payload, ReferenceMap, StageContext, StageFailure, Toolchain, TransformError,
};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use thiserror::Error;

/// Naming pattern for chain output that is still raw bytes.
const RAW_OUTPUT_PATTERN: &str = "[path][name].[ext]";

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Rule error: {0}")]
    Rules(#[from] RuleError),
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),
    #[error("Module graph error: {0}")]
    Graph(#[from] GraphError),
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),
    #[error("Bundle error: {0}")]
    Bundle(#[from] BundleError),
    #[error("Naming error: {0}")]
    Naming(#[from] NamingError),
    #[error("{0}")]
    Collaborator(#[from] CollaboratorError),
    #[error("Output error: {0}")]
    Emit(#[from] EmitError),
    #[error("copy source '{from}' not found at {}", path.display())]
    MissingCopySource { from: String, path: PathBuf },
    #[error("IO error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Build cancelled")]
    Cancelled,
}

/// External collaborators of a build.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub toolchain: &'a dyn Toolchain,
    pub content: &'a dyn ContentSource,
    pub renderer: &'a dyn PageRenderer,
}

/// What happened to a standalone input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Inlined { bytes: usize },
    Emitted { path: String },
    Template,
    PassThrough { path: String },
}

/// Progress reported while building.
#[derive(Debug, Clone)]
pub enum BuildEvent {
    Scanned {
        files: usize,
        modules: usize,
        unreferenced: usize,
    },
    AssetProcessed {
        source: String,
        rule: Option<String>,
        disposition: Disposition,
    },
    ModuleTransformed {
        source: String,
        rule: Option<String>,
        stages: Vec<&'static str>,
    },
    BundleWritten {
        filename: String,
        modules: usize,
    },
    Copied {
        from: String,
        to: String,
    },
    PageRendered {
        filename: String,
        template: String,
    },
    Published {
        output: PathBuf,
        files: usize,
    },
}

/// Scan and graph, without transforming anything.
#[derive(Debug)]
pub struct Plan {
    pub files: Vec<ClassifiedFile>,
    pub graph: ModuleGraph,
    /// Scripts and stylesheets no entry reaches, source-relative.
    pub unreferenced: Vec<String>,
}

/// One line of the output listing.
#[derive(Debug, Clone, Serialize)]
pub struct OutputEntry {
    pub path: String,
    pub origin: String,
    pub size: usize,
}

/// Summary of a finished build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub environment: Environment,
    pub output_dir: PathBuf,
    /// Every published file, in path order.
    pub outputs: Vec<OutputEntry>,
    /// Sources embedded as `data:` URIs.
    pub inlined: Vec<String>,
    pub bundles: Vec<Bundle>,
    pub stylesheets: Vec<ExtractedStylesheet>,
    pub pages: Vec<String>,
    pub unreferenced: Vec<String>,
}

/// Discover inputs, match them against the rules, and build the module graph.
pub fn plan(settings: &BuildSettings, rules: &RuleSet) -> Result<Plan, BuildError> {
    let files = scan::classify(scan::discover(settings)?, rules);
    let graph = graph::build(settings, rules)?;
    let unreferenced = files
        .iter()
        .filter(|f| matches!(f.concern, Some(Concern::Script | Concern::Style)))
        .filter(|f| !graph.contains(&f.source.abs_path))
        .map(|f| f.source.rel_path.clone())
        .collect();
    Ok(Plan {
        files,
        graph,
        unreferenced,
    })
}

/// An input processed on its own rather than as part of a bundle.
struct StandaloneInput {
    abs_path: PathBuf,
    label: String,
    rule_index: Option<usize>,
}

enum Outcome {
    Reference(Payload),
    PassThrough(Vec<u8>),
}

/// Run a complete build and publish it to the output directory.
pub fn build(
    settings: &BuildSettings,
    collaborators: Collaborators<'_>,
    events: Option<Sender<BuildEvent>>,
    cancel: &AtomicBool,
) -> Result<BuildReport, BuildError> {
    let emit_event = |event: BuildEvent| {
        if let Some(tx) = &events {
            tx.send(event).ok();
        }
    };
    let check_cancel = || {
        if cancel.load(Ordering::Relaxed) {
            Err(BuildError::Cancelled)
        } else {
            Ok(())
        }
    };

    let rules = RuleSet::from_config(&settings.config)?;
    let plan = plan(settings, &rules)?;
    emit_event(BuildEvent::Scanned {
        files: plan.files.len(),
        modules: plan.graph.modules.len(),
        unreferenced: plan.unreferenced.len(),
    });

    // Standalone inputs: everything scanned except code, plus assets the
    // graph reached outside the source root.
    let mut inputs: Vec<StandaloneInput> = plan
        .files
        .iter()
        .filter(|f| !matches!(f.concern, Some(Concern::Script | Concern::Style)))
        .map(|f| StandaloneInput {
            abs_path: f.source.abs_path.clone(),
            label: f.source.rel_path.clone(),
            rule_index: f.rule_index,
        })
        .collect();
    let scanned: BTreeSet<&Path> = plan.files.iter().map(|f| f.source.abs_path.as_path()).collect();
    for asset in plan.graph.assets() {
        if !scanned.contains(asset.path.as_path()) {
            let label = settings.display_path(&asset.path);
            inputs.push(StandaloneInput {
                rule_index: rules.match_index(&label),
                abs_path: asset.path.clone(),
                label,
            });
        }
    }

    let no_references = ReferenceMap::new();
    let outcomes: Vec<Outcome> = inputs
        .par_iter()
        .map(|input| {
            check_cancel()?;
            process_standalone(settings, &rules, collaborators.toolchain, &no_references, input)
        })
        .collect::<Result<_, _>>()?;

    let mut outputs = OutputSet::new();
    let mut references = ReferenceMap::new();
    let mut templates = BTreeMap::new();
    let mut inlined = Vec::new();
    for (input, outcome) in inputs.iter().zip(outcomes) {
        let rule = input.rule_index.map(|i| rules.rules()[i].name.clone());
        let disposition = match outcome {
            Outcome::PassThrough(bytes) => {
                outputs.insert(input.label.clone(), bytes, input.label.clone())?;
                references.insert(input.abs_path.clone(), settings.public_url(&input.label));
                Disposition::PassThrough {
                    path: input.label.clone(),
                }
            }
            Outcome::Reference(Payload::Inline(uri)) => {
                let bytes = uri.len();
                references.insert(input.abs_path.clone(), uri);
                inlined.push(input.label.clone());
                Disposition::Inlined { bytes }
            }
            Outcome::Reference(Payload::File { path, bytes }) => {
                references.insert(input.abs_path.clone(), settings.public_url(&path));
                outputs.insert(path.clone(), bytes, input.label.clone())?;
                Disposition::Emitted { path }
            }
            Outcome::Reference(Payload::Template(text)) => {
                templates.insert(input.label.clone(), text);
                Disposition::Template
            }
            Outcome::Reference(other) => {
                return Err(unexpected_output(input, other.kind()).into());
            }
        };
        emit_event(BuildEvent::AssetProcessed {
            source: input.label.clone(),
            rule,
            disposition,
        });
    }

    // Scripts and stylesheets, now that asset URLs are known.
    let code_modules: Vec<&graph::Module> = plan.graph.code_modules().collect();
    let transformed: Vec<(PathBuf, Payload, Option<Chain>)> = code_modules
        .par_iter()
        .map(|module| {
            check_cancel()?;
            transform_module(settings, &rules, collaborators.toolchain, &references, &module.path)
        })
        .collect::<Result<_, _>>()?;
    let mut payloads = BTreeMap::new();
    for (path, payload, chain) in transformed {
        emit_event(BuildEvent::ModuleTransformed {
            source: settings.display_path(&path),
            rule: chain.as_ref().map(|c| c.rule.clone()),
            stages: chain.map(|c| c.ids()).unwrap_or_default(),
        });
        payloads.insert(path, payload);
    }

    check_cancel()?;
    let bundles = bundle::assemble(
        settings,
        &plan.graph,
        &payloads,
        &references,
        collaborators.toolchain,
    )?;
    for b in &bundles.bundles {
        outputs.insert(b.filename.clone(), b.code.clone().into_bytes(), format!("bundle '{}'", b.name))?;
        emit_event(BuildEvent::BundleWritten {
            filename: b.filename.clone(),
            modules: b.modules.len(),
        });
    }
    for s in &bundles.stylesheets {
        outputs.insert(s.filename.clone(), s.code.clone().into_bytes(), format!("stylesheet '{}'", s.name))?;
        emit_event(BuildEvent::BundleWritten {
            filename: s.filename.clone(),
            modules: s.modules.len(),
        });
    }

    for copy in &settings.config.copy {
        let path = crate::alias::normalize(&settings.source_root.join(&copy.from));
        if !path.is_file() {
            return Err(BuildError::MissingCopySource {
                from: copy.from.clone(),
                path,
            });
        }
        let bytes = read_bytes(&path)?;
        outputs.insert(copy.to.clone(), bytes, format!("copy of {}", settings.display_path(&path)))?;
        emit_event(BuildEvent::Copied {
            from: settings.display_path(&path),
            to: copy.to.clone(),
        });
    }

    check_cancel()?;
    let page_list = pages::compose(settings, collaborators.content)?;
    let globals = render_globals(settings, &bundles);
    let rendered: Vec<String> = page_list
        .par_iter()
        .map(|page| pages::render_page(page, &templates, collaborators.renderer, &globals))
        .collect::<Result<_, _>>()?;
    for (page, html) in page_list.iter().zip(rendered) {
        outputs.insert(page.filename.clone(), html.into_bytes(), page_origin(page))?;
        emit_event(BuildEvent::PageRendered {
            filename: page.filename.clone(),
            template: page.template.clone(),
        });
    }

    check_cancel()?;
    emit::publish(&outputs, &settings.output_dir)?;
    emit_event(BuildEvent::Published {
        output: settings.output_dir.clone(),
        files: outputs.len(),
    });

    Ok(BuildReport {
        environment: settings.environment,
        output_dir: settings.output_dir.clone(),
        outputs: outputs
            .iter()
            .map(|e| OutputEntry {
                path: e.path.clone(),
                origin: e.origin.clone(),
                size: e.bytes.len(),
            })
            .collect(),
        inlined,
        bundles: bundles.bundles,
        stylesheets: bundles.stylesheets,
        pages: page_list.into_iter().map(|p| p.filename).collect(),
        unreferenced: plan.unreferenced,
    })
}

fn process_standalone(
    settings: &BuildSettings,
    rules: &RuleSet,
    toolchain: &dyn Toolchain,
    references: &ReferenceMap,
    input: &StandaloneInput,
) -> Result<Outcome, BuildError> {
    let bytes = read_bytes(&input.abs_path)?;
    let Some(index) = input.rule_index else {
        return Ok(Outcome::PassThrough(bytes));
    };
    let chain = Chain::build(&rules.rules()[index], settings.environment);
    let ctx = StageContext {
        settings,
        toolchain,
        references,
        asset: AssetRef {
            path: &input.abs_path,
            label: &input.label,
            group: chain.concern.group(),
        },
    };
    match chain.run(bytes, &ctx)? {
        Payload::Source(bytes) => {
            let parts = PathParts::from_relative(&input.label, chain.concern.group(), &bytes);
            let path = naming::template(RAW_OUTPUT_PATTERN, &parts)?;
            Ok(Outcome::Reference(Payload::File { path, bytes }))
        }
        payload => Ok(Outcome::Reference(payload)),
    }
}

fn transform_module(
    settings: &BuildSettings,
    rules: &RuleSet,
    toolchain: &dyn Toolchain,
    references: &ReferenceMap,
    path: &Path,
) -> Result<(PathBuf, Payload, Option<Chain>), BuildError> {
    let bytes = read_bytes(path)?;
    let label = settings.display_path(path);
    let Some(rule) = rules.match_path(&label) else {
        // Third-party scripts go into the bundle as they are.
        return Ok((path.to_path_buf(), Payload::Source(bytes), None));
    };
    let chain = Chain::build(rule, settings.environment);
    let ctx = StageContext {
        settings,
        toolchain,
        references,
        asset: AssetRef {
            path,
            label: &label,
            group: chain.concern.group(),
        },
    };
    let payload = chain.run(bytes, &ctx)?;
    Ok((path.to_path_buf(), payload, Some(chain)))
}

fn unexpected_output(input: &StandaloneInput, found: &'static str) -> TransformError {
    TransformError {
        stage: "dispatch",
        path: input.abs_path.clone(),
        cause: StageFailure::UnexpectedInput {
            expected: "asset output",
            found,
        },
    }
}

fn render_globals(settings: &BuildSettings, bundles: &bundle::BundleSet) -> RenderGlobals {
    let vendor = bundles.vendor().map(|b| settings.public_url(&b.filename));
    let apps = bundles
        .bundles
        .iter()
        .filter(|b| b.kind == bundle::BundleKind::App)
        .map(|b| settings.public_url(&b.filename));
    RenderGlobals {
        environment: settings.environment,
        public_path: settings.public_path.clone(),
        scripts: vendor.into_iter().chain(apps).collect(),
        stylesheets: bundles
            .stylesheets
            .iter()
            .map(|s| settings.public_url(&s.filename))
            .collect(),
    }
}

fn page_origin(page: &Page) -> String {
    match &page.origin {
        pages::PageOrigin::Static => format!("page from {}", page.template),
        pages::PageOrigin::Collection(tag) => format!("'{tag}' page from {}", page.template),
    }
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, BuildError> {
    fs::read(path).map_err(|source| BuildError::Io {
        path: path.to_path_buf(),
        source,
    })
}
