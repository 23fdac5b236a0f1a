//! Recursive import resolution
//!
//! Imports are declared under the `imports:` front-matter key (strings or
//! `{id|path, inputs}` mappings) and as legacy `@include <path>` directives
//! in the body. Resolution is a depth-first traversal with two sets: an
//! in-progress stack for cycle detection and a completed cache so diamonds
//! contribute exactly once to the manifest and the merged configuration.
//!
//! Imports declared with `inputs:` are inlined at compile time with
//! `{{name}}` placeholders substituted textually; imports without inputs
//! are deferred to run time as `{{#runtime-import <path>}}` macros.

use crate::error::{CompileError, Result};
use crate::frontmatter::{ParsedSource, parse_source};
use regex_lite::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// How a file entered the compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
    /// Front-matter import with `inputs:`, pasted into the prompt.
    Inlined,
    /// Front-matter import without inputs, fetched by helper scripts at
    /// execution time.
    Runtime,
    /// Legacy `@include` directive, pasted into the prompt.
    Included,
}

/// One resolved file, recorded once, in topological order: every file
/// appears after the files it imports.
#[derive(Debug, Clone)]
pub struct ManifestEntry {
    pub path: PathBuf,
    /// The path exactly as the author wrote it in the directive.
    pub declared: String,
    pub kind: ManifestKind,
}

/// One `{{name}}` substitution performed while inlining an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSubstitution {
    pub import: PathBuf,
    pub name: String,
    pub value: String,
}

/// Product of import resolution.
#[derive(Debug)]
pub struct Resolution {
    pub root: ParsedSource,
    /// Every file reached from the root (root excluded), topological order.
    pub manifest: Vec<ManifestEntry>,
    /// Parsed sources for all reached files, topological order, root last.
    /// Merge folds these in order so leaf contributions land first.
    pub files: Vec<ParsedSource>,
    /// Root body after `@include` inlining, import pasting and
    /// runtime-import macro insertion.
    pub body: String,
    pub substitutions: Vec<InputSubstitution>,
    /// `@include?` targets that were missing; the caller reports them as
    /// warnings.
    pub missing_optional: Vec<String>,
}

/// A front-matter or body import directive, normalised.
#[derive(Debug, Clone)]
struct ImportDirective {
    declared: String,
    inputs: BTreeMap<String, String>,
    kind: ManifestKind,
    /// `@include?` form: a missing file is a warning upstream, not an error.
    optional: bool,
}

#[derive(Debug, Clone)]
struct ResolvedFile {
    source: ParsedSource,
    /// Assembled body: own body with includes inlined and import content or
    /// macros appended.
    body: String,
}

/// Depth-first import resolver with cycle detection.
#[derive(Default)]
pub struct ImportResolver {
    in_progress: Vec<PathBuf>,
    done: BTreeMap<PathBuf, ResolvedFile>,
    manifest: Vec<ManifestEntry>,
    substitutions: Vec<InputSubstitution>,
    engine_declaration: Option<(PathBuf, serde_yaml::Value)>,
    missing_optional: Vec<String>,
}

impl ImportResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the tree rooted at `path`.
    pub fn resolve(mut self, path: &Path) -> Result<Resolution> {
        let root_key = canonical(path)?;
        let resolved = self.resolve_file(&root_key, None)?;

        // The root is not part of the manifest; drop its entry.
        self.manifest.retain(|entry| entry.path != root_key);

        let mut files: Vec<ParsedSource> = self
            .manifest
            .iter()
            .filter_map(|entry| self.done.get(&entry.path).map(|f| f.source.clone()))
            .collect();
        files.push(resolved.source.clone());

        Ok(Resolution {
            root: resolved.source,
            manifest: self.manifest,
            files,
            body: resolved.body,
            substitutions: self.substitutions,
            missing_optional: self.missing_optional,
        })
    }

    fn resolve_file(&mut self, key: &PathBuf, declared: Option<&ImportDirective>) -> Result<ResolvedFile> {
        if let Some(done) = self.done.get(key) {
            return Ok(done.clone());
        }
        if let Some(pos) = self.in_progress.iter().position(|p| p == key) {
            let mut chain: Vec<PathBuf> = self.in_progress[pos..].to_vec();
            chain.push(key.clone());
            return Err(CompileError::ImportCycle { chain });
        }

        self.in_progress.push(key.clone());
        let result = self.resolve_file_inner(key);
        self.in_progress.pop();
        let resolved = result?;

        self.manifest.push(ManifestEntry {
            path: key.clone(),
            declared: declared
                .map(|d| d.declared.clone())
                .unwrap_or_else(|| key.display().to_string()),
            kind: declared.map(|d| d.kind).unwrap_or(ManifestKind::Inlined),
        });
        self.done.insert(key.clone(), resolved.clone());
        Ok(resolved)
    }

    fn resolve_file_inner(&mut self, key: &PathBuf) -> Result<ResolvedFile> {
        let source = parse_source(key)?;
        self.check_engine_conflict(&source)?;

        let dir = key.parent().map(Path::to_path_buf).unwrap_or_default();
        let directives = frontmatter_imports(&source)?;

        // Body pass: legacy @include directives are inlined in place.
        let mut body = self.inline_includes(&source, &dir)?;

        // Front-matter imports: inlined content and runtime macros are
        // appended after the body in declaration order.
        for directive in &directives {
            match directive.kind {
                ManifestKind::Runtime => {
                    // Still resolved now so the file's configuration merges
                    // and its expressions are validated, but its text is
                    // fetched at execution time.
                    let target = canonical_import(&dir, &directive.declared, &source.path)?;
                    self.resolve_file(&target, Some(directive))?;
                    if !body.ends_with('\n') {
                        body.push('\n');
                    }
                    body.push_str(&format!("\n{{{{#runtime-import {}}}}}\n", directive.declared));
                }
                ManifestKind::Inlined => {
                    let target = canonical_import(&dir, &directive.declared, &source.path)?;
                    let imported = self.resolve_file(&target, Some(directive))?;
                    let pasted = self.substitute_inputs(&imported, directive)?;
                    if !body.ends_with('\n') {
                        body.push('\n');
                    }
                    body.push('\n');
                    body.push_str(&pasted);
                    if !body.ends_with('\n') {
                        body.push('\n');
                    }
                }
                ManifestKind::Included => unreachable!("includes are body directives"),
            }
        }

        Ok(ResolvedFile { source, body })
    }

    /// Replace `@include <path>` lines with the included file's assembled
    /// body. `@include? <path>` tolerates a missing file.
    fn inline_includes(&mut self, source: &ParsedSource, dir: &Path) -> Result<String> {
        let mut out = String::with_capacity(source.body.len());
        for line in source.body.lines() {
            let trimmed = line.trim_start();
            let (optional, rest) = if let Some(rest) = trimmed.strip_prefix("@include?") {
                (true, rest)
            } else if let Some(rest) = trimmed.strip_prefix("@include") {
                (false, rest)
            } else {
                out.push_str(line);
                out.push('\n');
                continue;
            };
            let declared = rest.trim();
            if declared.is_empty() {
                return Err(CompileError::validation(format!(
                    "{}: @include directive is missing a path",
                    source.path.display()
                )));
            }

            let directive = ImportDirective {
                declared: declared.to_string(),
                inputs: BTreeMap::new(),
                kind: ManifestKind::Included,
                optional,
            };
            match canonical_import(dir, declared, &source.path) {
                Ok(target) => {
                    let included = self.resolve_file(&target, Some(&directive))?;
                    out.push_str(&included.body);
                    if !out.ends_with('\n') {
                        out.push('\n');
                    }
                }
                Err(err) if directive.optional => {
                    tracing::debug!(target: "aw", "optional include skipped: {err}");
                    self.missing_optional.push(declared.to_string());
                }
                Err(err) => return Err(err),
            }
        }
        Ok(out)
    }

    fn substitute_inputs(
        &mut self,
        imported: &ResolvedFile,
        directive: &ImportDirective,
    ) -> Result<String> {
        let mut text = imported.body.clone();
        for (name, value) in &directive.inputs {
            // Both `{{name}}` and the padded `{{ name }}` form are accepted.
            // NoExpand keeps `$` in values literal.
            let padded = padded_placeholder_regex(name);
            text = padded
                .replace_all(&text, regex_lite::NoExpand(value.as_str()))
                .into_owned();
            self.substitutions.push(InputSubstitution {
                import: imported.source.path.clone(),
                name: name.clone(),
                value: value.clone(),
            });
        }

        if let Some(unresolved) = first_unresolved_input(&text) {
            return Err(CompileError::validation(format!(
                "import {} leaves input '{{{{{unresolved}}}}}' unsubstituted; declare it under inputs:",
                directive.declared
            )));
        }
        Ok(text)
    }

    fn check_engine_conflict(&mut self, source: &ParsedSource) -> Result<()> {
        let Some(engine) = source.frontmatter.get("engine") else {
            return Ok(());
        };
        match &self.engine_declaration {
            None => {
                self.engine_declaration = Some((source.path.clone(), engine.clone()));
                Ok(())
            }
            Some((first_path, first_value)) if first_value == engine => {
                tracing::debug!(
                    target: "aw",
                    "duplicate identical engine declaration in {} (first seen in {})",
                    source.path.display(),
                    first_path.display()
                );
                Ok(())
            }
            Some((first_path, _)) => Err(CompileError::import(format!(
                "multiple engines configured: {} and {} both declare an engine; only one engine is allowed across a workflow and its imports",
                first_path.display(),
                source.path.display()
            ))),
        }
    }
}

/// Parse the `imports:` front-matter key into directives.
fn frontmatter_imports(source: &ParsedSource) -> Result<Vec<ImportDirective>> {
    let Some(value) = source.frontmatter.get("imports") else {
        return Ok(Vec::new());
    };
    let serde_yaml::Value::Sequence(entries) = value else {
        return Err(CompileError::validation(format!(
            "{}: imports: must be a sequence of paths",
            source.path.display()
        )));
    };

    let mut directives = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry {
            serde_yaml::Value::String(path) => directives.push(ImportDirective {
                declared: path.clone(),
                inputs: BTreeMap::new(),
                kind: ManifestKind::Runtime,
                optional: false,
            }),
            serde_yaml::Value::Mapping(map) => {
                let declared = map
                    .get("id")
                    .or_else(|| map.get("path"))
                    .and_then(serde_yaml::Value::as_str)
                    .ok_or_else(|| {
                        CompileError::validation(format!(
                            "{}: imports entry needs an id or path",
                            source.path.display()
                        ))
                    })?
                    .to_string();
                let mut inputs = BTreeMap::new();
                if let Some(serde_yaml::Value::Mapping(raw)) = map.get("inputs") {
                    for (k, v) in raw {
                        let name = k.as_str().ok_or_else(|| {
                            CompileError::validation(format!(
                                "{}: import input names must be strings",
                                source.path.display()
                            ))
                        })?;
                        inputs.insert(name.to_string(), scalar_to_string(v));
                    }
                }
                let kind = if inputs.is_empty() {
                    ManifestKind::Runtime
                } else {
                    ManifestKind::Inlined
                };
                directives.push(ImportDirective {
                    declared,
                    inputs,
                    kind,
                    optional: false,
                });
            }
            other => {
                return Err(CompileError::validation(format!(
                    "{}: unsupported imports entry: {other:?}",
                    source.path.display()
                )));
            }
        }
    }
    Ok(directives)
}

fn scalar_to_string(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Null => String::new(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

fn canonical(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .map_err(|e| CompileError::file_read(path, e))
}

fn canonical_import(dir: &Path, declared: &str, importer: &Path) -> Result<PathBuf> {
    let joined = if Path::new(declared).is_absolute() {
        PathBuf::from(declared)
    } else {
        dir.join(declared)
    };
    joined.canonicalize().map_err(|_| {
        CompileError::import(format!(
            "{}: imported file {declared} not found",
            importer.display()
        ))
    })
}

#[allow(clippy::expect_used)]
fn padded_placeholder_regex(name: &str) -> Regex {
    let escaped: String = name
        .chars()
        .flat_map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                vec![c]
            } else {
                vec!['\\', c]
            }
        })
        .collect();
    Regex::new(&format!(r"\{{\{{\s*{escaped}\s*\}}\}}")).expect("valid placeholder regex")
}

/// Find a `{{name}}` token that still looks like an unsubstituted input.
/// Template conditionals (`{{#if}}`, `{{/if}}`), runtime-import macros and
/// `${{ ... }}` expressions are not inputs.
fn first_unresolved_input(text: &str) -> Option<String> {
    #[allow(clippy::expect_used)]
    fn input_regex() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| {
            Regex::new(r"\$?\{\{\s*([a-zA-Z][a-zA-Z0-9_-]*)\s*\}\}").expect("valid input regex")
        })
    }

    for caps in input_regex().captures_iter(text) {
        let whole = caps.get(0)?.as_str();
        if whole.starts_with('$') {
            continue; // CI expression, handled by the expression engine
        }
        return Some(caps.get(1)?.as_str().to_string());
    }
    None
}
