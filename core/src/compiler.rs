//! Compilation pipeline
//!
//! One source file in, one lock file out, strictly leaves-first:
//! parse + imports -> merged configuration -> validation -> (expression
//! plan, job graph) -> step sequences -> assembled text -> written file.
//! The `Compiler` owns the per-run scratch state (schedule cache, step
//! tracker, diagnostics) and resets it at the start of every compilation.

use crate::assemble::{AssembleInputs, WriteOutcome, assemble, write_if_changed};
use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::expr::rewrite_body;
use crate::imports::ImportResolver;
use crate::jobs::graph::{GraphInputs, build_jobs};
use crate::mcp::render_mcp_config;
use crate::steps::tracker::StepOrderTracker;
use crate::triggers::resolve_stop_after;
use crate::validation;
use crate::workflow::WorkflowSpec;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Caller-facing compilation options.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Promote the defined warning subset to errors.
    pub strict: bool,
    /// Validate and assemble but do not write the lock file.
    pub no_emit: bool,
    /// Fixed compile time, for reproducible `stop-after` resolution.
    pub compile_time: Option<chrono::DateTime<chrono::Utc>>,
}

/// What one compilation produced.
#[derive(Debug)]
pub struct CompileOutcome {
    pub lock_path: PathBuf,
    pub lock_text: String,
    pub outcome: WriteOutcome,
    pub warning_count: usize,
}

/// The compiler; reusable across files, scratch state reset per run.
#[derive(Default)]
pub struct Compiler {
    options: CompileOptions,
    schedule_cache: BTreeMap<String, String>,
    tracker: StepOrderTracker,
    diagnostics: Diagnostics,
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Compile one source file. Errors are prefixed with the source path.
    pub fn compile(&mut self, source: &Path) -> Result<CompileOutcome> {
        self.compile_inner(source)
            .map_err(|e| e.locate(source))
    }

    fn compile_inner(&mut self, source: &Path) -> Result<CompileOutcome> {
        self.schedule_cache.clear();
        self.tracker.clear();
        self.diagnostics.clear();

        // Parse and resolve imports.
        let resolution = ImportResolver::new().resolve(source)?;
        for missing in &resolution.missing_optional {
            self.diagnostics
                .warn(format!("optional include {missing} not found; skipped"));
        }

        // Front-matter schema, every file in the tree.
        for file in &resolution.files {
            validation::schema::validate_frontmatter(&file.path, &file.frontmatter)?;
        }

        // Merge into the typed configuration.
        let mut spec = WorkflowSpec::from_resolution(&resolution, &mut self.schedule_cache)?;
        if self.options.strict {
            spec.strict = true;
        }

        // Semantic validation.
        validation::validate(&spec, &resolution, &mut self.diagnostics)?;

        // Expression plan and prompt rewrite.
        let (prompt, plan) = rewrite_body(&resolution.body)?;

        // MCP configuration and the job graph.
        let compile_time = self.options.compile_time.unwrap_or_else(chrono::Utc::now);
        let stop_time = spec
            .stop_after
            .as_deref()
            .map(|raw| resolve_stop_after(raw, compile_time))
            .transpose()?;
        let mcp = render_mcp_config(&spec)?;
        let graph_inputs = GraphInputs {
            spec: &spec,
            prompt: &prompt,
            plan: &plan,
            mcp: &mcp,
            compile_time,
        };
        let manager = build_jobs(&graph_inputs, &mut self.tracker)?;
        let jobs_text = manager.render()?;

        // Assemble and post-check.
        let lock_text = assemble(&AssembleInputs {
            spec: &spec,
            resolution: &resolution,
            source_display: &source.display().to_string(),
            stop_time: stop_time.as_deref(),
            jobs_text: &jobs_text,
        });
        let lock_path = lock_path_for(source);

        validation::limits::check_lock_size(&lock_text, &mut self.diagnostics);
        if let Err(error) = validation::schema::validate_lock_text(&lock_text)
            .and_then(|()| validation::injection::audit_lock_text(&lock_text))
        {
            // Keep the invalid text next to the target for inspection.
            let invalid_path = invalid_path_for(source);
            if let Err(write_error) = std::fs::write(&invalid_path, &lock_text) {
                tracing::warn!(target: "aw", "cannot write {}: {write_error}", invalid_path.display());
            } else {
                tracing::warn!(target: "aw", "invalid output written to {}", invalid_path.display());
            }
            return Err(error);
        }

        let outcome = if self.options.no_emit {
            WriteOutcome::Unchanged
        } else {
            write_if_changed(&lock_path, &lock_text)?
        };

        tracing::debug!(
            target: "aw",
            "compiled {} -> {} ({} bytes, {} warnings)",
            source.display(),
            lock_path.display(),
            lock_text.len(),
            self.diagnostics.warning_count()
        );

        Ok(CompileOutcome {
            lock_path,
            lock_text,
            outcome,
            warning_count: self.diagnostics.warning_count(),
        })
    }
}

/// The single target path: source with `.md` replaced by `.lock.yml`.
pub fn lock_path_for(source: &Path) -> PathBuf {
    replace_md_extension(source, "lock.yml")
}

/// Sibling path for schema-invalid output.
pub fn invalid_path_for(source: &Path) -> PathBuf {
    replace_md_extension(source, "invalid.yml")
}

fn replace_md_extension(source: &Path, new_extension: &str) -> PathBuf {
    let mut path = source.to_path_buf();
    if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("md")) {
        path.set_extension(new_extension);
    } else {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        path.set_file_name(format!("{name}.{new_extension}"));
    }
    path
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn lock_path_replaces_md_extension() {
        assert_eq!(
            lock_path_for(Path::new("/repo/.github/workflows/triage.md")),
            PathBuf::from("/repo/.github/workflows/triage.lock.yml")
        );
    }

    #[test]
    fn invalid_path_is_a_sibling() {
        assert_eq!(
            invalid_path_for(Path::new("wf.md")),
            PathBuf::from("wf.invalid.yml")
        );
    }

    #[test]
    fn non_md_sources_get_a_suffix() {
        assert_eq!(
            lock_path_for(Path::new("workflow")),
            PathBuf::from("workflow.lock.yml")
        );
    }
}
