//! Bundle partitioning and assembly.
//!
//! Every script module reached from an entry lands in exactly one bundle:
//!
//! | Module location | Bundle | Default filename |
//! |---|---|---|
//! | under the vendor root | `vendor` (shared by all entries) | `assets/js/vendor.bundle.js` |
//! | anywhere else | the entry's own bundle | `assets/js/[name].bundle.js` |
//!
//! An application module reached from several entries belongs to the first
//! declared entry that reaches it. In production, styles extracted by the
//! style chain are grouped the same way into `assets/css/[name].bundle.css`.
//!
//! Each module is wrapped in a factory function and registered in a module
//! table shared by every bundle on the page, keyed by the module's display
//! path. Top-level names therefore stay private to their module. Imports
//! become table lookups, exports become getters on the module's exports
//! object, and an app bundle finishes by running its entry. A default import
//! of an asset binds a `var` to the asset's URL. Identifiers from
//! `[provide]` that a module uses as free names are bound to the provider's
//! exports.

use crate::config::{BuildSettings, Environment};
use crate::graph::{self, ESM_IMPORT, EXPORT_FROM, Module, ModuleGraph, ModuleKind, REQUIRE_CALL};
use crate::naming::{self, NamingError};
use crate::transform::{Payload, ReferenceMap, StageFailure, Toolchain, TransformError};
use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

/// Name of the loader each bundle declares.
const LOADER: &str = "__sitepack_require__";

/// Local bound to an anonymous default export.
const DEFAULT_LOCAL: &str = "__sitepack_default__";

/// Module table prelude. Bundles loaded on the same page share one table.
const RUNTIME: &str = r#"var __sitepack_require__ = (function (root) {
  var table = root.__sitepack__ || (root.__sitepack__ = { factories: {}, cache: {} });
  function load(id) {
    var cached = table.cache[id];
    if (cached) return cached.exports;
    var factory = table.factories[id];
    if (!factory) throw new Error("sitepack: module " + id + " is not loaded");
    var module = (table.cache[id] = { exports: {} });
    factory.call(module.exports, module, module.exports, load);
    return module.exports;
  }
  load.define = function (id, factory) {
    table.factories[id] = factory;
  };
  load.exports = function (target, getters) {
    Object.defineProperty(target, "__esModule", { value: true });
    for (var name in getters) {
      Object.defineProperty(target, name, { enumerable: true, get: getters[name] });
    }
  };
  load.reexports = function (target, source) {
    Object.keys(source).forEach(function (name) {
      if (name === "default" || Object.prototype.hasOwnProperty.call(target, name)) return;
      Object.defineProperty(target, name, { enumerable: true, get: function () { return source[name]; } });
    });
  };
  load.interop = function (exported) {
    return exported && exported.__esModule ? exported["default"] : exported;
  };
  return load;
})(typeof globalThis !== "undefined" ? globalThis : this);
"#;

/// `export default function name`, `export default class name`, or the
/// anonymous forms. Group 3 is the name when present.
static EXPORT_DEFAULT_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^([ \t]*)export\s+default\s+((?:async\s+)?function\b\s*\*?\s*|class\b\s*)([\w$]+)?")
        .expect("valid regex")
});

static EXPORT_DEFAULT_EXPR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^([ \t]*)export\s+default\s+").expect("valid regex"));

/// `export function a`, `export const a`, ... Group 3 is the declared name.
static EXPORT_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^([ \t]*)export\s+((?:async\s+)?function\b\s*\*?\s*|class\s+|(?:const|let|var)\s+)([\w$]+)")
        .expect("valid regex")
});

static EXPORT_LIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*export\s*\{([^}]*)\}[ \t]*;?[ \t]*(?:\r?\n)?").expect("valid regex")
});

#[derive(Error, Debug)]
pub enum BundleError {
    #[error(transparent)]
    Naming(#[from] NamingError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error("{} was reached but never transformed", .0.display())]
    Untransformed(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleKind {
    App,
    Vendor,
}

/// Decides bundle membership from a module's location.
#[derive(Debug, Clone)]
pub struct Partitioner {
    vendor_root: PathBuf,
}

impl Partitioner {
    pub fn new(vendor_root: &Path) -> Self {
        Self {
            vendor_root: vendor_root.to_path_buf(),
        }
    }

    pub fn assign(&self, module: &Path) -> BundleKind {
        if module.starts_with(&self.vendor_root) {
            BundleKind::Vendor
        } else {
            BundleKind::App
        }
    }
}

/// A script bundle ready for emission.
#[derive(Debug, Clone, Serialize)]
pub struct Bundle {
    pub name: String,
    pub kind: BundleKind,
    /// Member modules in concatenation order.
    #[serde(skip)]
    pub modules: Vec<PathBuf>,
    pub filename: String,
    #[serde(skip)]
    pub code: String,
}

/// An entry's extracted stylesheet.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractedStylesheet {
    pub name: String,
    #[serde(skip)]
    pub modules: Vec<PathBuf>,
    pub filename: String,
    #[serde(skip)]
    pub code: String,
}

#[derive(Debug, Clone, Default)]
pub struct BundleSet {
    /// App bundles in entry order, then the vendor bundle when non-empty.
    pub bundles: Vec<Bundle>,
    pub stylesheets: Vec<ExtractedStylesheet>,
}

impl BundleSet {
    pub fn vendor(&self) -> Option<&Bundle> {
        self.bundles.iter().find(|b| b.kind == BundleKind::Vendor)
    }

    pub fn app(&self, name: &str) -> Option<&Bundle> {
        self.bundles
            .iter()
            .find(|b| b.kind == BundleKind::App && b.name == name)
    }

    pub fn stylesheet(&self, name: &str) -> Option<&ExtractedStylesheet> {
        self.stylesheets.iter().find(|s| s.name == name)
    }
}

/// Group transformed modules into bundles and link them.
///
/// `transformed` holds the chain output of every script and style module.
pub fn assemble(
    settings: &BuildSettings,
    graph: &ModuleGraph,
    transformed: &BTreeMap<PathBuf, Payload>,
    references: &ReferenceMap,
    toolchain: &dyn Toolchain,
) -> Result<BundleSet, BundleError> {
    let partitioner = Partitioner::new(&settings.vendor_root);
    let linker = Linker {
        settings,
        graph,
        transformed,
        references,
    };
    let mut claimed: HashSet<&Path> = HashSet::new();
    let mut vendor_modules: Vec<&Path> = Vec::new();
    let mut set = BundleSet::default();

    for entry in &graph.entries {
        let mut app_modules = Vec::new();
        let mut styles = Vec::new();
        for path in &entry.order {
            let Some(module) = graph.get(path) else {
                continue;
            };
            if module.kind == ModuleKind::Asset || !claimed.insert(path.as_path()) {
                continue;
            }
            let payload = transformed
                .get(path)
                .ok_or_else(|| BundleError::Untransformed(path.clone()))?;
            match payload {
                Payload::Stylesheet(_) => styles.push(path.as_path()),
                _ => match partitioner.assign(path) {
                    BundleKind::Vendor => vendor_modules.push(path.as_path()),
                    BundleKind::App => app_modules.push(path.as_path()),
                },
            }
        }

        let filename = naming::bundle_filename(&settings.config.bundles.script, &entry.name)?;
        set.bundles.push(link_bundle(
            &linker,
            &entry.name,
            BundleKind::App,
            &app_modules,
            filename,
            entry.order.last().map(PathBuf::as_path),
        )?);

        if !styles.is_empty() {
            let code = styles
                .iter()
                .filter_map(|p| match transformed.get(*p) {
                    Some(Payload::Stylesheet(css)) => Some(css.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n");
            set.stylesheets.push(ExtractedStylesheet {
                name: entry.name.clone(),
                modules: styles.iter().map(|p| p.to_path_buf()).collect(),
                filename: naming::bundle_filename(&settings.config.bundles.stylesheet, &entry.name)?,
                code,
            });
        }
    }

    if !vendor_modules.is_empty() {
        let filename = naming::bundle_filename(&settings.config.bundles.vendor, "vendor")?;
        set.bundles.push(link_bundle(
            &linker,
            "vendor",
            BundleKind::Vendor,
            &vendor_modules,
            filename,
            None,
        )?);
    }

    if settings.environment == Environment::Production {
        for bundle in &mut set.bundles {
            bundle.code = toolchain
                .minify_script(&bundle.code, settings.config.minify.drop_console)
                .map_err(|e| TransformError {
                    stage: "minify-js",
                    path: PathBuf::from(&bundle.filename),
                    cause: StageFailure::Tool(e),
                })?;
        }
    }
    Ok(set)
}

fn link_bundle(
    linker: &Linker<'_>,
    name: &str,
    kind: BundleKind,
    modules: &[&Path],
    filename: String,
    entry: Option<&Path>,
) -> Result<Bundle, BundleError> {
    let mut code = String::from(RUNTIME);
    for path in modules {
        let body = match (linker.transformed.get(*path), linker.graph.get(path)) {
            (Some(Payload::Module(body)), Some(module)) => linker.link_module(body, module)?,
            (Some(Payload::Source(bytes)), Some(module)) => {
                linker.link_module(&String::from_utf8_lossy(bytes), module)?
            }
            _ => return Err(BundleError::Untransformed(path.to_path_buf())),
        };
        let id = linker.settings.display_path(path);
        code.push_str(&format!(
            "/* {id} */\n{LOADER}.define({}, function (module, exports, require) {{\n",
            js_string(&id)
        ));
        code.push_str(&body);
        if !body.ends_with('\n') {
            code.push('\n');
        }
        code.push_str("});\n");
    }
    if let Some(entry) = entry {
        code.push_str(&format!(
            "{LOADER}({});\n",
            js_string(&linker.settings.display_path(entry))
        ));
    }
    Ok(Bundle {
        name: name.to_string(),
        kind,
        modules: modules.iter().map(|p| p.to_path_buf()).collect(),
        filename,
        code,
    })
}

/// Everything needed to turn transformed modules into factory bodies.
pub struct Linker<'a> {
    pub settings: &'a BuildSettings,
    pub graph: &'a ModuleGraph,
    pub transformed: &'a BTreeMap<PathBuf, Payload>,
    pub references: &'a ReferenceMap,
}

impl<'a> Linker<'a> {
    /// Rewrite one module's source into the body of its factory function.
    ///
    /// The body declares the module's exports first, then binds provided
    /// globals, then runs the rewritten source.
    pub fn link_module(&self, source: &str, module: &Module) -> Result<String, BundleError> {
        let mut failure = None;
        let mut exported: Vec<(String, String)> = Vec::new();
        let esm = ESM_IMPORT.is_match(source)
            || EXPORT_FROM.is_match(source)
            || EXPORT_DEFAULT_EXPR.is_match(source)
            || EXPORT_DECL.is_match(source)
            || EXPORT_LIST.is_match(source);

        let code = ESM_IMPORT.replace_all(source, |caps: &Captures<'_>| {
            match self.import_statement(module, caps) {
                Ok(Some(linked)) => linked,
                Ok(None) => caps[0].to_string(),
                Err(e) => {
                    failure.get_or_insert(e);
                    String::new()
                }
            }
        });
        let code = REQUIRE_CALL.replace_all(&code, |caps: &Captures<'_>| {
            let specifier = &caps[1];
            match asset_reference(specifier, module, self.graph, self.references) {
                Ok(Some(url)) => js_string(url),
                Ok(None) => match self.loadable_id(module, specifier) {
                    Some(id) => load_call(&id),
                    None => caps[0].to_string(),
                },
                Err(e) => {
                    failure.get_or_insert(e);
                    caps[0].to_string()
                }
            }
        });
        if let Some(e) = failure {
            return Err(e);
        }

        let code = EXPORT_FROM.replace_all(&code, |caps: &Captures<'_>| {
            let Some(id) = caps
                .name("specifier")
                .and_then(|s| self.loadable_id(module, s.as_str()))
            else {
                return caps[0].to_string();
            };
            let required = load_call(&id);
            if let Some(named) = caps.name("named") {
                for (imported, name) in specifier_pairs(named.as_str()) {
                    exported.push((name, format!("{required}.{imported}")));
                }
                String::new()
            } else if let Some(namespace) = caps.name("namespace") {
                exported.push((namespace.as_str().to_string(), required));
                String::new()
            } else {
                format!("{LOADER}.reexports(exports, {required});\n")
            }
        });
        let code = EXPORT_DEFAULT_DECL.replace_all(&code, |caps: &Captures<'_>| {
            match caps.get(3).map(|m| m.as_str()).filter(|n| *n != "extends") {
                Some(name) => {
                    exported.push(("default".to_string(), name.to_string()));
                    format!("{}{}{}", &caps[1], &caps[2], name)
                }
                None => {
                    exported.push(("default".to_string(), DEFAULT_LOCAL.to_string()));
                    format!(
                        "{}var {DEFAULT_LOCAL} = {}{}",
                        &caps[1],
                        &caps[2],
                        caps.get(3).map_or("", |m| m.as_str())
                    )
                }
            }
        });
        let code = EXPORT_DEFAULT_EXPR.replace_all(&code, |caps: &Captures<'_>| {
            exported.push(("default".to_string(), DEFAULT_LOCAL.to_string()));
            format!("{}var {DEFAULT_LOCAL} = ", &caps[1])
        });
        let code = EXPORT_DECL.replace_all(&code, |caps: &Captures<'_>| {
            exported.push((caps[3].to_string(), caps[3].to_string()));
            format!("{}{}{}", &caps[1], &caps[2], &caps[3])
        });
        let code = EXPORT_LIST.replace_all(&code, |caps: &Captures<'_>| {
            for (local, name) in specifier_pairs(&caps[1]) {
                exported.push((name, local));
            }
            String::new()
        });

        let mut linked = String::new();
        if esm {
            linked.push_str("\"use strict\";\n");
        }
        if !exported.is_empty() {
            let mut seen = HashSet::new();
            let getters = exported
                .iter()
                .filter(|(name, _)| seen.insert(name.as_str()))
                .map(|(name, value)| {
                    format!("{}: function () {{ return {value}; }}", js_string(name))
                })
                .collect::<Vec<_>>()
                .join(", ");
            linked.push_str(&format!("{LOADER}.exports(exports, {{ {getters} }});\n"));
        }
        for binding in self.provided_bindings(source, module) {
            linked.push_str(&binding);
            linked.push('\n');
        }
        linked.push_str(&code);
        Ok(linked)
    }

    /// Table id of a resolved dependency that some bundle defines.
    ///
    /// Assets and extracted stylesheets are not in the table.
    fn loadable_id(&self, module: &Module, specifier: &str) -> Option<String> {
        let target = module.resolved.get(specifier)?;
        let kind = self.graph.get(target)?.kind;
        let defined = match kind {
            ModuleKind::Script => true,
            ModuleKind::Style => !matches!(self.transformed.get(target), Some(Payload::Stylesheet(_))),
            ModuleKind::Asset => false,
        };
        defined.then(|| self.settings.display_path(target))
    }

    /// Replacement for one import statement; `None` keeps it as written.
    fn import_statement(
        &self,
        module: &Module,
        caps: &Captures<'_>,
    ) -> Result<Option<String>, BundleError> {
        let Some(specifier) = caps.name("specifier").map(|m| m.as_str()) else {
            return Ok(None);
        };
        if !module.resolved.contains_key(specifier) {
            return Ok(None);
        }
        let default = caps.name("default").map(|m| m.as_str());
        if let Some(url) = asset_reference(specifier, module, self.graph, self.references)? {
            return Ok(Some(match default {
                Some(binding) => format!("var {binding} = {};\n", js_string(url)),
                None => String::new(),
            }));
        }
        let Some(id) = self.loadable_id(module, specifier) else {
            return Ok(Some(String::new()));
        };
        let required = load_call(&id);

        let mut bindings = Vec::new();
        if let Some(binding) = default {
            bindings.push(format!("{binding} = {LOADER}.interop({required})"));
        }
        if let Some(namespace) = caps.name("namespace") {
            bindings.push(format!("{} = {required}", namespace.as_str()));
        }
        if let Some(named) = caps.name("named") {
            for (imported, local) in specifier_pairs(named.as_str()) {
                bindings.push(format!("{local} = {required}.{imported}"));
            }
        }
        Ok(Some(if bindings.is_empty() {
            format!("{required};\n")
        } else {
            format!("var {};\n", bindings.join(", "))
        }))
    }

    /// Declarations binding each provided global the module uses.
    fn provided_bindings(&self, source: &str, module: &Module) -> Vec<String> {
        self.settings
            .config
            .provide
            .iter()
            .filter(|(key, _)| graph::uses_global(source, key))
            .filter_map(|(key, provider)| {
                if *module.resolved.get(provider)? == module.path {
                    return None;
                }
                let id = self.loadable_id(module, provider)?;
                let value = format!("{LOADER}.interop({})", load_call(&id));
                Some(if key.contains('.') {
                    format!("{key} = {value};")
                } else {
                    format!("var {key} = {value};")
                })
            })
            .collect()
    }
}

/// `a, b as c` → `[(a, a), (b, c)]`.
fn specifier_pairs(list: &str) -> Vec<(String, String)> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| match item.split_once(" as ") {
            Some((from, to)) => (from.trim().to_string(), to.trim().to_string()),
            None => (item.to_string(), item.to_string()),
        })
        .collect()
}

fn load_call(id: &str) -> String {
    format!("{LOADER}({})", js_string(id))
}

/// The emitted reference of an asset import, `None` for code imports.
fn asset_reference<'r>(
    specifier: &str,
    module: &Module,
    graph: &ModuleGraph,
    references: &'r ReferenceMap,
) -> Result<Option<&'r str>, BundleError> {
    let Some(target) = module.resolved.get(specifier) else {
        return Ok(None);
    };
    match graph.get(target).map(|m| m.kind) {
        Some(ModuleKind::Asset) => references
            .get(target)
            .map(Some)
            .ok_or_else(|| BundleError::Untransformed(target.clone())),
        _ => Ok(None),
    }
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{value}\""))
}
