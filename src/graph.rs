//! Module graph: which scripts, stylesheets and assets each entry reaches.
//!
//! Starting from every configured entry, script sources are read and their
//! import statements followed. Stylesheets contribute `url(...)` targets
//! that exist on disk. The result lists, per entry, every reachable module in
//! dependency-first order; that order is what the bundles are assembled in.
//!
//! Specifiers resolve in this order:
//!
//! 1. `./x`, `../x`: relative to the importing file
//! 2. `/x`: absolute
//! 3. `alias/x`, `~alias/x`: through the alias table
//! 4. bare names: packages under the vendor root (`package.json` `main`, then
//!    `index.js`)
//!
//! A candidate that is not a file is retried with `.js` appended, then as a
//! directory.
//!
//! Identifiers declared in `[provide]` add an implicit dependency: a module
//! that uses `$` as a free name in code depends on `jquery` without
//! importing it. Comments and string literals are blanked before matching.

use crate::alias;
use crate::config::BuildSettings;
use crate::rules::{Concern, RuleSet};
use crate::transform::references;
use regex::{Captures, Regex};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

/// `import x from "y"`, `import { a } from "y"`, `import "y"` and friends.
/// Named groups: `default` binding, `named` list (inside the braces),
/// `namespace` binding and `specifier`.
pub static ESM_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)^[ \t]*import\s+(?:(?P<default>[\w$]+)\s*,?\s*)?(?:(?:\{(?P<named>[^}]*)\}|\*\s*as\s+(?P<namespace>[\w$]+))\s*)?(?:from\s*)?["'](?P<specifier>[^"'\n]+)["'][ \t]*;?[ \t]*(?:\r?\n)?"#,
    )
    .expect("valid regex")
});

/// `export { a, b as c } from "y"`, `export * from "y"`, `export * as ns from "y"`.
pub static EXPORT_FROM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)^[ \t]*export\s*(?:\{(?P<named>[^}]*)\}|\*(?:\s*as\s+(?P<namespace>[\w$]+))?)\s*from\s*["'](?P<specifier>[^"'\n]+)["'][ \t]*;?[ \t]*(?:\r?\n)?"#,
    )
    .expect("valid regex")
});

/// `require("y")`. Group 1 is the specifier.
pub static REQUIRE_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\brequire\(\s*["']([^"'\n]+)["']\s*\)"#).expect("valid regex")
});

static CSS_URL_TARGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"url\(\s*["']?([^)"'\s]+)["']?\s*\)"#).expect("valid regex")
});

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("entry '{name}' not found at {}", path.display())]
    MissingEntry { name: String, path: PathBuf },
    #[error("entry '{name}' at {} is not a script", path.display())]
    EntryNotScript { name: String, path: PathBuf },
    #[error("cannot resolve '{specifier}' imported from {}", importer.display())]
    Unresolved { specifier: String, importer: PathBuf },
    #[error("{} imports template {}; templates are not importable", importer.display(), target.display())]
    NotImportable { target: PathBuf, importer: PathBuf },
    #[error("{} is not valid UTF-8", .0.display())]
    NotUtf8(PathBuf),
}

/// How a module contributes to the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    /// Script code, concatenated into a bundle.
    Script,
    /// A stylesheet, injected or extracted depending on the environment.
    Style,
    /// A file referenced by URL (image, font, media, anything unmatched).
    Asset,
}

#[derive(Debug, Clone)]
pub struct Module {
    pub path: PathBuf,
    pub kind: ModuleKind,
    /// Specifier (as written) → resolved path.
    pub resolved: BTreeMap<String, PathBuf>,
    /// Direct dependencies in first-mention order.
    pub deps: Vec<PathBuf>,
}

/// The modules one entry reaches, dependencies before dependents.
#[derive(Debug, Clone)]
pub struct EntryModules {
    pub name: String,
    pub order: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct ModuleGraph {
    pub modules: BTreeMap<PathBuf, Module>,
    pub entries: Vec<EntryModules>,
}

impl ModuleGraph {
    pub fn get(&self, path: &Path) -> Option<&Module> {
        self.modules.get(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.modules.contains_key(path)
    }

    /// Assets reached by some module, in path order.
    pub fn assets(&self) -> impl Iterator<Item = &Module> {
        self.modules.values().filter(|m| m.kind == ModuleKind::Asset)
    }

    /// Scripts and stylesheets, in path order.
    pub fn code_modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values().filter(|m| m.kind != ModuleKind::Asset)
    }
}

/// Map specifiers to files.
pub struct Resolver<'a> {
    settings: &'a BuildSettings,
}

impl<'a> Resolver<'a> {
    pub fn new(settings: &'a BuildSettings) -> Self {
        Self { settings }
    }

    pub fn resolve(&self, specifier: &str, importer: &Path) -> Result<PathBuf, GraphError> {
        let spec = specifier.split_once('?').map_or(specifier, |(s, _)| s);
        let base = importer.parent().unwrap_or(Path::new(""));
        let candidate = if spec.starts_with("./") || spec.starts_with("../") {
            alias::normalize(&base.join(spec))
        } else if Path::new(spec).is_absolute() {
            alias::normalize(Path::new(spec))
        } else if let Some(expanded) = self.settings.aliases.expand(spec) {
            expanded
        } else {
            let name = spec.strip_prefix('~').unwrap_or(spec);
            alias::normalize(&self.settings.vendor_root.join(name))
        };

        complete(&candidate).ok_or_else(|| GraphError::Unresolved {
                specifier: specifier.to_string(),
                importer: importer.to_path_buf(),
            })
    }
}

/// Turn a candidate path into an existing file.
fn complete(candidate: &Path) -> Option<PathBuf> {
    if candidate.is_file() {
        return Some(candidate.to_path_buf());
    }
    let mut with_js = candidate.as_os_str().to_os_string();
    with_js.push(".js");
    let with_js = PathBuf::from(with_js);
    if with_js.is_file() {
        return Some(with_js);
    }
    if candidate.is_dir() {
        if let Some(main) = package_main(candidate) {
            let target = alias::normalize(&candidate.join(main));
            if target != candidate
                && let Some(found) = complete(&target)
            {
                return Some(found);
            }
        }
        let index = candidate.join("index.js");
        if index.is_file() {
            return Some(index);
        }
    }
    None
}

fn package_main(dir: &Path) -> Option<String> {
    let text = fs::read_to_string(dir.join("package.json")).ok()?;
    let manifest: serde_json::Value = serde_json::from_str(&text).ok()?;
    manifest
        .get("main")
        .and_then(|m| m.as_str())
        .map(str::to_string)
}

/// An import found in script source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRef {
    pub specifier: String,
    /// Default binding (`import logo from …`).
    pub binding: Option<String>,
}

/// Every import, re-export and `require` in `source`, in source order.
///
/// Statements inside comments and string literals are skipped.
pub fn scan_imports(source: &str) -> Vec<ImportRef> {
    let code = blank_non_code(source);
    let is_code = |offset: usize, keyword: &str| code[offset..].starts_with(keyword);
    let statement = |caps: &Captures<'_>, keyword: &str| {
        let whole = caps.get(0)?;
        let offset = whole.start() + (whole.as_str().len() - whole.as_str().trim_start().len());
        if !is_code(offset, keyword) {
            return None;
        }
        Some((
            offset,
            ImportRef {
                specifier: caps.name("specifier")?.as_str().to_string(),
                binding: caps.name("default").map(|m| m.as_str().to_string()),
            },
        ))
    };

    let mut found: Vec<(usize, ImportRef)> = ESM_IMPORT
        .captures_iter(source)
        .filter_map(|caps| statement(&caps, "import"))
        .collect();
    found.extend(
        EXPORT_FROM
            .captures_iter(source)
            .filter_map(|caps| statement(&caps, "export")),
    );
    found.extend(REQUIRE_CALL.captures_iter(source).filter_map(|caps| {
        let whole = caps.get(0)?;
        if !is_code(whole.start(), "require") {
            return None;
        }
        Some((
            whole.start(),
            ImportRef {
                specifier: caps.get(1)?.as_str().to_string(),
                binding: None,
            },
        ))
    }));
    found.sort_by_key(|(pos, _)| *pos);
    found.into_iter().map(|(_, import)| import).collect()
}

/// Whether `source` refers to the provided global `key` as code.
///
/// Mentions inside comments, string literals and template literal text do
/// not count, nor do property accesses (`obj.$`). A plain identifier that
/// the module declares itself is local, not the provided global. A dotted
/// key such as `window.$` matches the member expression.
pub fn uses_global(source: &str, key: &str) -> bool {
    let code = blank_non_code(source);
    let mentioned = Regex::new(&format!(
        r"(?:^|[^\w$.]){}(?:[^\w$]|$)",
        regex::escape(key)
    ))
    .is_ok_and(|re| re.is_match(&code));
    if !mentioned || key.contains('.') {
        return mentioned;
    }
    let declared = Regex::new(&format!(
        r"(?:^|[^\w$.])(?:var|let|const|function\s*\*?|class)\s+{}(?:[^\w$]|$)",
        regex::escape(key)
    ))
    .is_ok_and(|re| re.is_match(&code));
    !declared
}

/// Copy of script `source` with comment bodies, string literal contents
/// and template literal text replaced by spaces.
///
/// Byte offsets and line breaks are preserved, so a position found in the
/// copy indexes the same code in `source`. Template substitutions
/// (`${...}`) stay code, including nested templates. Regular expression
/// literals are not recognized.
pub fn blank_non_code(source: &str) -> String {
    let bytes = source.as_bytes();
    let mut out = bytes.to_vec();
    // Brace depth at which each open template substitution started.
    let mut substitutions: Vec<usize> = Vec::new();
    let mut depth = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                let end = bytes[i..]
                    .iter()
                    .position(|&b| b == b'\n')
                    .map_or(bytes.len(), |p| i + p);
                blank(&mut out, i, end);
                i = end;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = source[i + 2..]
                    .find("*/")
                    .map_or(bytes.len(), |p| i + 2 + p + 2);
                blank(&mut out, i, end);
                i = end;
            }
            quote @ (b'"' | b'\'') => {
                let end = quoted_end(bytes, i + 1, quote);
                let close = if bytes.get(end.wrapping_sub(1)) == Some(&quote) && end > i + 1 {
                    end - 1
                } else {
                    end
                };
                blank(&mut out, i + 1, close);
                i = end;
            }
            b'`' => {
                i = template_text(bytes, &mut out, i + 1, &mut substitutions, &mut depth);
            }
            b'{' => {
                depth += 1;
                i += 1;
            }
            b'}' => {
                depth = depth.saturating_sub(1);
                if substitutions.last() == Some(&depth) {
                    substitutions.pop();
                    i = template_text(bytes, &mut out, i + 1, &mut substitutions, &mut depth);
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    String::from_utf8(out).unwrap_or_else(|_| source.to_string())
}

/// Blank template text from `start`; returns where code resumes.
fn template_text(
    bytes: &[u8],
    out: &mut [u8],
    start: usize,
    substitutions: &mut Vec<usize>,
    depth: &mut usize,
) -> usize {
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'`' => {
                blank(out, start, i);
                return i + 1;
            }
            b'$' if bytes.get(i + 1) == Some(&b'{') => {
                blank(out, start, i + 2);
                substitutions.push(*depth);
                *depth += 1;
                return i + 2;
            }
            _ => i += 1,
        }
    }
    blank(out, start, bytes.len());
    bytes.len()
}

/// Index just past the closing quote, or the end of the line when unterminated.
fn quoted_end(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return i,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn blank(out: &mut [u8], from: usize, to: usize) {
    let to = to.min(out.len());
    for b in out.iter_mut().take(to).skip(from) {
        if *b != b'\n' {
            *b = b' ';
        }
    }
}

/// Build the graph reachable from every configured entry.
pub fn build(settings: &BuildSettings, rules: &RuleSet) -> Result<ModuleGraph, GraphError> {
    let mut builder = GraphBuilder {
        settings,
        rules,
        resolver: Resolver::new(settings),
        graph: ModuleGraph::default(),
    };

    for entry in &settings.config.entries {
        let path = alias::normalize(&settings.source_root.join(&entry.path));
        if !path.is_file() {
            return Err(GraphError::MissingEntry {
                name: entry.name.clone(),
                path,
            });
        }
        if !builder.is_script(&path) {
            return Err(GraphError::EntryNotScript {
                name: entry.name.clone(),
                path,
            });
        }
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        builder.visit(&path, &mut visited, &mut order)?;
        builder.graph.entries.push(EntryModules {
            name: entry.name.clone(),
            order,
        });
    }
    Ok(builder.graph)
}

struct GraphBuilder<'a> {
    settings: &'a BuildSettings,
    rules: &'a RuleSet,
    resolver: Resolver<'a>,
    graph: ModuleGraph,
}

impl GraphBuilder<'_> {
    fn visit(
        &mut self,
        path: &Path,
        visited: &mut HashSet<PathBuf>,
        order: &mut Vec<PathBuf>,
    ) -> Result<(), GraphError> {
        if !visited.insert(path.to_path_buf()) {
            return Ok(());
        }
        if !self.graph.contains(path) {
            let module = self.load(path)?;
            self.graph.modules.insert(path.to_path_buf(), module);
        }
        let deps = self.graph.modules[path].deps.clone();
        for dep in &deps {
            self.visit(dep, visited, order)?;
        }
        order.push(path.to_path_buf());
        Ok(())
    }

    fn is_script(&self, path: &Path) -> bool {
        let label = self.settings.display_path(path);
        match self.rules.match_path(&label).map(|r| r.concern) {
            Some(concern) => concern == Concern::Script,
            None => has_extension(path, "js"),
        }
    }

    fn kind_of(&self, path: &Path, importer: &Path) -> Result<ModuleKind, GraphError> {
        let label = self.settings.display_path(path);
        match self.rules.match_path(&label).map(|r| r.concern) {
            Some(Concern::Script) => Ok(ModuleKind::Script),
            Some(Concern::Style) => Ok(ModuleKind::Style),
            Some(Concern::Template) => Err(GraphError::NotImportable {
                target: path.to_path_buf(),
                importer: importer.to_path_buf(),
            }),
            Some(Concern::Image | Concern::Font | Concern::Media) => Ok(ModuleKind::Asset),
            // Third-party scripts are excluded from the script rule but are
            // still code.
            None if has_extension(path, "js") => Ok(ModuleKind::Script),
            None => Ok(ModuleKind::Asset),
        }
    }

    fn load(&self, path: &Path) -> Result<Module, GraphError> {
        let kind = self.kind_of(path, path)?;
        let mut module = Module {
            path: path.to_path_buf(),
            kind,
            resolved: BTreeMap::new(),
            deps: Vec::new(),
        };
        match kind {
            ModuleKind::Asset => {}
            ModuleKind::Script => {
                let source = read_text(path)?;
                for import in scan_imports(&source) {
                    let target = self.resolver.resolve(&import.specifier, path)?;
                    self.add_dep(&mut module, import.specifier, target)?;
                }
                for (ident, provider) in &self.settings.config.provide {
                    if !uses_global(&source, ident) {
                        continue;
                    }
                    let target = self.resolver.resolve(provider, path)?;
                    if target != path {
                        self.add_dep(&mut module, provider.clone(), target)?;
                    }
                }
            }
            ModuleKind::Style => {
                let source = read_text(path)?;
                let base = path.parent().unwrap_or(Path::new(""));
                for caps in CSS_URL_TARGET.captures_iter(&source) {
                    let spec = &caps[1];
                    if let Some(target) =
                        references::resolve_reference(spec, base, &self.settings.aliases)
                        && target.is_file()
                    {
                        self.add_dep(&mut module, spec.to_string(), target)?;
                    }
                }
            }
        }
        Ok(module)
    }

    fn add_dep(&self, module: &mut Module, specifier: String, target: PathBuf) -> Result<(), GraphError> {
        // Validate the target kind early so template imports fail at their import site.
        self.kind_of(&target, &module.path)?;
        if !module.deps.contains(&target) {
            module.deps.push(target.clone());
        }
        module.resolved.insert(specifier, target);
        Ok(())
    }
}

fn read_text(path: &Path) -> Result<String, GraphError> {
    let bytes = fs::read(path).map_err(|source| GraphError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    String::from_utf8(bytes).map_err(|_| GraphError::NotUtf8(path.to_path_buf()))
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .is_some_and(|e| e.to_string_lossy().eq_ignore_ascii_case(ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BuildConfig, EntryConfig, Environment};
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn settings(tmp: &TempDir, config: BuildConfig) -> BuildSettings {
        BuildSettings::new(tmp.path(), config, Environment::Development, None).unwrap()
    }

    fn build_graph(tmp: &TempDir, config: BuildConfig) -> Result<ModuleGraph, GraphError> {
        let settings = settings(tmp, config);
        let rules = RuleSet::from_config(&settings.config).unwrap();
        build(&settings, &rules)
    }

    fn labels(tmp: &TempDir, paths: &[PathBuf]) -> Vec<String> {
        let root = alias::normalize(tmp.path());
        paths
            .iter()
            .map(|p| crate::config::slash_path(p.strip_prefix(&root).unwrap()))
            .collect()
    }

    #[test]
    fn scan_imports_finds_every_form() {
        let source = r#"import $ from "jquery";
import { a, b } from './lib/util';
import * as ns from "../ns.js";
import './styles/main.scss';
import logo, { x } from 'images/logo.png';
const legacy = require("legacy");
"#;
        let imports = scan_imports(source);
        let specs: Vec<&str> = imports.iter().map(|i| i.specifier.as_str()).collect();
        assert_eq!(
            specs,
            vec![
                "jquery",
                "./lib/util",
                "../ns.js",
                "./styles/main.scss",
                "images/logo.png",
                "legacy"
            ]
        );
        assert_eq!(imports[0].binding.as_deref(), Some("$"));
        assert_eq!(imports[1].binding, None);
        assert_eq!(imports[4].binding.as_deref(), Some("logo"));
    }

    #[test]
    fn global_use_respects_word_boundaries() {
        assert!(uses_global("$(function () {});", "$"));
        assert!(uses_global("jQuery.fn.x = 1;", "jQuery"));
        assert!(uses_global("window.$ = null;", "window.$"));
        assert!(!uses_global("var my$ = 1; obj.$ = 2;", "$"));
        assert!(!uses_global("var jQueryLike = 1;", "jQuery"));
    }

    #[test]
    fn global_use_ignores_strings_comments_and_template_text() {
        assert!(!uses_global("const msg = `Hello ${name}`;", "$"));
        assert!(!uses_global("const sign = '$'; const other = \"$ \\\" $\";", "$"));
        assert!(!uses_global("// costs $ 5\n/* $ and\n $ */\nrun();", "$"));
        assert!(!uses_global("const t = `a ${`b $ ${x}`} $ c`;", "$"));
        assert!(uses_global("const t = `id: ${$('#x').text()}`;", "$"));
        assert!(uses_global("const s = '// not a comment'; $(go);", "$"));
    }

    #[test]
    fn locally_declared_name_is_not_the_provided_global() {
        assert!(!uses_global("const $ = (s) => document.querySelector(s);\n$('#a');", "$"));
        assert!(!uses_global("function jQuery() {}\njQuery();", "jQuery"));
    }

    #[test]
    fn blanking_preserves_offsets() {
        let source = "a('x'); // é\nb(`t ${c} u`);";
        let code = blank_non_code(source);
        assert_eq!(code.len(), source.len());
        assert_eq!(code.lines().count(), 2);
        assert!(code.starts_with("a(' ');"));
        assert!(code.ends_with("b(`    c}  `);"));
    }

    #[test]
    fn commented_imports_are_not_scanned() {
        let source = "// import './gone';\n/* require('old') */\nconst s = \"require('nope')\";\nimport './kept';\n";
        let specs: Vec<String> = scan_imports(source).into_iter().map(|i| i.specifier).collect();
        assert_eq!(specs, vec!["./kept"]);
    }

    #[test]
    fn re_exports_are_dependencies() {
        let source = "export { a, b as c } from './ab';\nexport * from \"./all\";\nexport const d = 1;\n";
        let specs: Vec<String> = scan_imports(source).into_iter().map(|i| i.specifier).collect();
        assert_eq!(specs, vec!["./ab", "./all"]);
    }

    #[test]
    fn entry_order_is_dependencies_first() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "src/app.js", "import './a';\nimport './b';\n");
        write(tmp.path(), "src/a.js", "import './c';\n");
        write(tmp.path(), "src/b.js", "import './c';\n");
        write(tmp.path(), "src/c.js", "export const c = 1;\n");

        let graph = build_graph(&tmp, BuildConfig::default()).unwrap();
        assert_eq!(graph.entries.len(), 1);
        assert_eq!(
            labels(&tmp, &graph.entries[0].order),
            vec!["src/c.js", "src/a.js", "src/b.js", "src/app.js"]
        );
    }

    #[test]
    fn cycles_terminate() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "src/app.js", "import './a';\n");
        write(tmp.path(), "src/a.js", "import './app';\n");
        let graph = build_graph(&tmp, BuildConfig::default()).unwrap();
        assert_eq!(
            labels(&tmp, &graph.entries[0].order),
            vec!["src/a.js", "src/app.js"]
        );
    }

    #[test]
    fn bare_specifier_resolves_through_package_main() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "src/app.js", "import $ from 'jquery';\n");
        write(
            tmp.path(),
            "node_modules/jquery/package.json",
            r#"{"name": "jquery", "main": "dist/jquery"}"#,
        );
        write(tmp.path(), "node_modules/jquery/dist/jquery.js", "window.jQuery = {};\n");

        let graph = build_graph(&tmp, BuildConfig::default()).unwrap();
        let order = labels(&tmp, &graph.entries[0].order);
        assert_eq!(order, vec!["node_modules/jquery/dist/jquery.js", "src/app.js"]);
        let jquery = graph.modules.values().find(|m| m.path.ends_with("jquery.js")).unwrap();
        assert_eq!(jquery.kind, ModuleKind::Script);
    }

    #[test]
    fn bare_specifier_falls_back_to_index() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "src/app.js", "import 'tiny';\n");
        write(tmp.path(), "node_modules/tiny/index.js", "var tiny = 1;\n");
        let graph = build_graph(&tmp, BuildConfig::default()).unwrap();
        assert!(graph.entries[0].order[0].ends_with("node_modules/tiny/index.js"));
    }

    #[test]
    fn aliased_asset_import_is_an_asset() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "src/app.js", "import logo from 'images/logo.png';\n");
        write(tmp.path(), "src/assets/images/logo.png", "png");
        let graph = build_graph(&tmp, BuildConfig::default()).unwrap();
        let assets: Vec<&Module> = graph.assets().collect();
        assert_eq!(assets.len(), 1);
        assert!(assets[0].path.ends_with("src/assets/images/logo.png"));
    }

    #[test]
    fn stylesheet_urls_become_asset_dependencies() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "src/app.js", "import './styles/main.css';\n");
        write(
            tmp.path(),
            "src/styles/main.css",
            ".a { background: url(../assets/images/bg.png); }\n.b { background: url(missing.png); }\n",
        );
        write(tmp.path(), "src/assets/images/bg.png", "png");
        let graph = build_graph(&tmp, BuildConfig::default()).unwrap();
        let order = labels(&tmp, &graph.entries[0].order);
        assert_eq!(
            order,
            vec!["src/assets/images/bg.png", "src/styles/main.css", "src/app.js"]
        );
    }

    #[test]
    fn provided_identifier_adds_dependency() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "src/app.js", "$(function () { console.log('ready'); });\n");
        write(tmp.path(), "node_modules/jquery/index.js", "window.$ = window.jQuery = function () {};\n");
        let graph = build_graph(&tmp, BuildConfig::default()).unwrap();
        let order = labels(&tmp, &graph.entries[0].order);
        // jquery mentions `$` itself but does not depend on itself
        assert_eq!(order, vec!["node_modules/jquery/index.js", "src/app.js"]);
    }

    #[test]
    fn dollar_in_text_does_not_pull_in_provider() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "src/app.js",
            "// costs $ 5\nconst price = '$';\nconst msg = `Hello ${name}`;\nconsole.log(price, msg);\n",
        );
        write(tmp.path(), "node_modules/jquery/index.js", "window.$ = function () {};\n");
        let graph = build_graph(&tmp, BuildConfig::default()).unwrap();
        assert_eq!(labels(&tmp, &graph.entries[0].order), vec!["src/app.js"]);
        assert_eq!(graph.modules.len(), 1);
    }

    #[test]
    fn unresolved_import_names_importer() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "src/app.js", "import './nope';\n");
        let err = build_graph(&tmp, BuildConfig::default()).unwrap_err();
        assert!(matches!(
            &err,
            GraphError::Unresolved { specifier, importer }
                if specifier == "./nope" && importer.ends_with("src/app.js")
        ));
    }

    #[test]
    fn missing_entry_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("src")).unwrap();
        assert!(matches!(
            build_graph(&tmp, BuildConfig::default()),
            Err(GraphError::MissingEntry { name, .. }) if name == "app"
        ));
    }

    #[test]
    fn template_import_is_rejected() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "src/app.js", "import './views/index.html';\n");
        write(tmp.path(), "src/views/index.html", "<html></html>");
        assert!(matches!(
            build_graph(&tmp, BuildConfig::default()),
            Err(GraphError::NotImportable { .. })
        ));
    }

    #[test]
    fn template_entry_is_rejected_as_entry() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "src/views/index.html", "<html></html>");
        let config = BuildConfig {
            entries: vec![EntryConfig {
                name: "home".into(),
                path: "views/index.html".into(),
            }],
            ..BuildConfig::default()
        };
        let err = build_graph(&tmp, config).unwrap_err();
        assert!(matches!(&err, GraphError::EntryNotScript { name, .. } if name == "home"));
        assert!(err.to_string().contains("entry 'home'"));
        assert!(!err.to_string().contains("imports template"));
    }

    #[test]
    fn each_entry_gets_its_own_order() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "src/app.js", "import './shared';\n");
        write(tmp.path(), "src/admin.js", "import './shared';\n");
        write(tmp.path(), "src/shared.js", "var shared = 1;\n");
        let config = BuildConfig {
            entries: vec![
                EntryConfig {
                    name: "app".into(),
                    path: "app.js".into(),
                },
                EntryConfig {
                    name: "admin".into(),
                    path: "admin.js".into(),
                },
            ],
            ..BuildConfig::default()
        };
        let graph = build_graph(&tmp, config).unwrap();
        assert_eq!(graph.entries[1].name, "admin");
        assert_eq!(
            labels(&tmp, &graph.entries[1].order),
            vec!["src/shared.js", "src/admin.js"]
        );
        assert_eq!(graph.modules.len(), 3);
    }
}
