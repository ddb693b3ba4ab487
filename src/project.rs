//! Build orchestration.
//!
//! ```text
//! kc.config.json → ProjectConfig → ComponentRegistry
//!        │
//!        ▼  (rayon, one task per component file)
//!   read + tokenize → SourceDocument, style texts, script bundle
//!        │
//!        ▼  (sequential, declaration order, entry first)
//!   compile_template / StyleSheet::finalize against one CompilationContext
//!        │
//!        ▼
//!   DependencyGraph → closure, unused components → BuildOutput
//! ```

use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::ast::AstNode;
use crate::cache::ArtifactCache;
use crate::config::{BuildOptions, ComponentDeclaration, ProjectConfig, CONFIG_FILE_NAME};
use crate::context::{CompilationContext, ENTRY_COMPONENT};
use crate::error::{CompilerError, CompilerWarning};
use crate::expression::ExpressionTable;
use crate::graph::DependencyGraph;
use crate::lowering::compile_template;
use crate::markup::{parse_source_document, MarkupNode, StyleSource};
use crate::stylesheet::StyleSheet;
use crate::visitor::ComponentUsageCollector;

pub const EXPRESSIONS_FILE_NAME: &str = "kc.ast.json";

// ═══════════════════════════════════════════════════════════════════════════════
// SOURCES
// ═══════════════════════════════════════════════════════════════════════════════

/// Where component sources come from. Reads happen on rayon worker threads.
pub trait SourceProvider: Sync {
    fn read(&self, path: &Path) -> io::Result<String>;
}

pub struct FsProvider;

impl SourceProvider for FsProvider {
    fn read(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }
}

/// Resolve `target` against the directory of `base_file`, folding `.` and `..`.
fn resolve_relative(base_file: &str, target: &str) -> String {
    let base = Path::new(base_file).parent().unwrap_or(Path::new(""));
    let mut parts: Vec<String> = Vec::new();
    for component in base.join(target).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop();
            }
            other => parts.push(other.as_os_str().to_string_lossy().to_string()),
        }
    }
    let joined: PathBuf = parts.iter().collect();
    joined.to_string_lossy().to_string()
}

// ═══════════════════════════════════════════════════════════════════════════════
// OUTPUT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// Compiled form of one component file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentArtifact {
    pub component_name: String,
    /// Source path relative to the project root.
    #[serde(skip)]
    pub path: String,
    pub template: Option<AstNode>,
    /// Name → path of every component the entry reaches. Entry only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependency: Option<BTreeMap<String, String>>,
    #[serde(skip)]
    pub style_sheet: Option<StyleSheet>,
    #[serde(skip)]
    pub script: Option<String>,
}

/// The registry persisted as the output `kc.config.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedRegistry {
    pub version: String,
    pub entrance: String,
    /// Used components plus the entry under `$enter`.
    pub components: Vec<ComponentDeclaration>,
    /// Transitive dependencies of every compiled component.
    pub dependency: BTreeMap<String, Vec<String>>,
}

#[derive(Debug)]
pub struct BuildOutput {
    /// Entry first, then components in declaration order.
    pub components: Vec<ComponentArtifact>,
    pub expressions: ExpressionTable,
    pub registry: PersistedRegistry,
    pub unused: Vec<String>,
    pub warnings: Vec<CompilerWarning>,
}

impl BuildOutput {
    pub fn component(&self, name: &str) -> Option<&ComponentArtifact> {
        self.components.iter().find(|c| c.component_name == name)
    }

    pub fn entry(&self) -> Option<&ComponentArtifact> {
        self.component(ENTRY_COMPONENT)
    }

    /// Write every artifact under `out_dir`, mirroring the source layout:
    /// `{file}.ast`, `{file}.ss`, `{file}.js`, `kc.ast.json`, `kc.config.json`.
    pub fn write_artifacts(&self, out_dir: &Path) -> Result<(), CompilerError> {
        let mut cache = ArtifactCache::open(out_dir);

        for component in &self.components {
            let base = out_dir.join(&component.path);
            let ast = to_json(component, &component.path)?;
            cache.write(&with_suffix(&base, "ast"), &ast)?;

            if let Some(sheet) = &component.style_sheet {
                cache.write(&with_suffix(&base, "ss"), &to_json(sheet, &component.path)?)?;
            }
            if let Some(script) = &component.script {
                cache.write(&with_suffix(&base, "js"), script)?;
            }
        }

        cache.write(
            &out_dir.join(EXPRESSIONS_FILE_NAME),
            &to_json(&self.expressions, EXPRESSIONS_FILE_NAME)?,
        )?;
        cache.write(
            &out_dir.join(CONFIG_FILE_NAME),
            &to_json(&self.registry, CONFIG_FILE_NAME)?,
        )?;
        cache.save()?;

        log::info!(
            "wrote {} artifacts to {:?} ({} unchanged)",
            cache.written,
            out_dir,
            cache.unchanged
        );
        Ok(())
    }
}

fn to_json<T: Serialize>(value: &T, what: &str) -> Result<String, CompilerError> {
    serde_json::to_string_pretty(value).map_err(|e| CompilerError::serialize(what, &e))
}

/// `page.html` → `page.html.ast`.
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOADING
// ═══════════════════════════════════════════════════════════════════════════════

/// One component file after the parallel read phase.
struct LoadedUnit {
    name: String,
    path: String,
    template: Option<MarkupNode>,
    styles: Vec<String>,
    script: Option<String>,
    warnings: Vec<CompilerWarning>,
}

fn isolate_script(path: &str, text: &str) -> String {
    format!("\n//src:{}\n(()=>{{\n{}\n}})()", path, text.trim())
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROJECT
// ═══════════════════════════════════════════════════════════════════════════════

pub struct Project<P: SourceProvider = FsProvider> {
    config: ProjectConfig,
    provider: P,
}

impl<P: SourceProvider> Project<P> {
    pub fn new(config: ProjectConfig, provider: P) -> Self {
        Self { config, provider }
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    fn read_asset(&self, path: &str, warnings: &mut Vec<CompilerWarning>) -> Option<String> {
        match self.provider.read(&self.config.resolve(path)) {
            Ok(text) => Some(text),
            Err(e) => {
                warnings.push(CompilerWarning::MissingAsset {
                    path: path.to_string(),
                    reason: e.to_string(),
                });
                None
            }
        }
    }

    fn load_unit(&self, name: &str, path: &str) -> Result<LoadedUnit, CompilerError> {
        let source = self
            .provider
            .read(&self.config.resolve(path))
            .map_err(|e| CompilerError::io(path, &e))?;
        let document = parse_source_document(&source, path)?;
        let mut warnings = Vec::new();

        let mut styles = Vec::new();
        for style in &document.styles {
            let text = match style {
                StyleSource::Inline(text) => Some(text.clone()),
                StyleSource::External(href) => {
                    self.read_asset(&resolve_relative(path, href), &mut warnings)
                }
            };
            styles.extend(text.filter(|t| !t.trim().is_empty()));
        }

        let main = document.main_script().map(|script| match &script.src {
            Some(src) if script.text.trim().is_empty() => self
                .read_asset(&resolve_relative(path, src), &mut warnings)
                .unwrap_or_default(),
            _ => script.text.clone(),
        });

        let script = match main.filter(|text| !text.trim().is_empty()) {
            Some(mut bundle) => {
                for script in document.scripts.iter().filter(|s| !s.main) {
                    let Some(src) = &script.src else { continue };
                    let resolved = resolve_relative(path, src);
                    if let Some(text) = self.read_asset(&resolved, &mut warnings) {
                        if !text.trim().is_empty() {
                            bundle.push_str(&isolate_script(&resolved, &text));
                        }
                    }
                }
                Some(bundle.trim().to_string())
            }
            None => None,
        };

        Ok(LoadedUnit {
            name: name.to_string(),
            path: path.to_string(),
            template: document.template,
            styles,
            script,
            warnings,
        })
    }

    pub fn build(&self) -> Result<BuildOutput, CompilerError> {
        let mut config_warnings = Vec::new();
        let registry = self.config.registry(&mut config_warnings);
        let mut ctx = CompilationContext::new(registry);
        for warning in config_warnings {
            ctx.warn(warning);
        }

        let mut units: Vec<(String, String)> =
            vec![(ENTRY_COMPONENT.to_string(), self.config.entrance.clone())];
        units.extend(
            ctx.registry
                .iter()
                .map(|(name, path)| (name.to_string(), path.to_string())),
        );

        let loaded = units
            .par_iter()
            .map(|(name, path)| self.load_unit(name, path))
            .collect::<Result<Vec<_>, _>>()?;

        let mut components = Vec::with_capacity(loaded.len());
        let mut graph = DependencyGraph::new();

        for unit in loaded {
            for warning in unit.warnings {
                ctx.warn(warning);
            }

            let template = match &unit.template {
                Some(root) => compile_template(root, &mut ctx).map_err(|e| e.in_file(&unit.path))?,
                None => {
                    log::debug!("{} has no <template>", unit.path);
                    None
                }
            };

            let style_sheet = if unit.styles.is_empty() {
                None
            } else {
                let mut sheet = StyleSheet::new();
                for css in &unit.styles {
                    sheet.parse(css);
                }
                ctx.warnings.extend(sheet.finalize());
                Some(sheet)
            };

            graph.add_vertex(&unit.name);
            if let Some(ast) = &template {
                for used in ComponentUsageCollector::collect(ast) {
                    graph
                        .add_edge(&unit.name, &used)
                        .map_err(|e| e.in_file(&unit.path))?;
                }
            }

            components.push(ComponentArtifact {
                component_name: unit.name,
                path: unit.path,
                template,
                dependency: None,
                style_sheet,
                script: unit.script,
            });
        }

        let closure = graph.dependency_closure();
        let unused = graph.unused(ctx.registry.names(), ENTRY_COMPONENT);
        for name in &unused {
            ctx.warn(CompilerWarning::UnusedComponent { name: name.clone() });
        }

        let entry_dependencies: BTreeMap<String, String> = closure
            .get(ENTRY_COMPONENT)
            .into_iter()
            .flatten()
            .filter_map(|name| {
                ctx.registry
                    .path(name)
                    .map(|path| (name.clone(), path.to_string()))
            })
            .collect();
        if let Some(entry) = components.first_mut() {
            entry.dependency = Some(entry_dependencies);
        }

        let mut declarations: Vec<ComponentDeclaration> = ctx
            .registry
            .iter()
            .filter(|(name, _)| !unused.iter().any(|u| u == name))
            .map(|(name, path)| ComponentDeclaration {
                name: name.to_string(),
                path: path.to_string(),
            })
            .collect();
        declarations.push(ComponentDeclaration {
            name: ENTRY_COMPONENT.to_string(),
            path: self.config.entrance.clone(),
        });

        let registry = PersistedRegistry {
            version: self.config.version.clone(),
            entrance: self.config.entrance.clone(),
            components: declarations,
            dependency: closure,
        };

        log::info!(
            "compiled {} components, {} expressions, {} warnings",
            components.len(),
            ctx.expressions.len(),
            ctx.warnings.len()
        );

        Ok(BuildOutput {
            components,
            expressions: ctx.expressions,
            registry,
            unused,
            warnings: ctx.warnings,
        })
    }
}

/// Load `config_path`, build the project from disk and, unless disabled,
/// write the artifacts.
pub fn build_project(config_path: &Path, options: &BuildOptions) -> Result<BuildOutput, CompilerError> {
    let config = ProjectConfig::load(config_path)?;
    let out_dir = options
        .out_dir
        .clone()
        .unwrap_or_else(|| config.root_dir.clone());

    let output = Project::new(config, FsProvider).build()?;
    if options.write_artifacts {
        output.write_artifacts(&out_dir)?;
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative() {
        assert_eq!(resolve_relative("pages/index.html", "./theme.css"), "pages/theme.css");
        assert_eq!(resolve_relative("pages/index.html", "../shared/a.js"), "shared/a.js");
        assert_eq!(resolve_relative("index.html", "util.js"), "util.js");
    }

    #[test]
    fn test_with_suffix_keeps_extension() {
        assert_eq!(
            with_suffix(Path::new("out/pages/index.html"), "ast"),
            PathBuf::from("out/pages/index.html.ast")
        );
    }

    #[test]
    fn test_isolate_script() {
        assert_eq!(
            isolate_script("util.js", "  let a = 1;\n"),
            "\n//src:util.js\n(()=>{\nlet a = 1;\n})()"
        );
    }
}
