//! Lock-file text assembly and writing
//!
//! The final text is built once, in order: commented header, `name:`,
//! optional `run-name:`, triggers, empty top-level `permissions: {}`,
//! concurrency, env, then the rendered jobs. If the on-disk file already
//! has identical bytes the write is skipped so the modification time is
//! preserved.

use crate::error::{CompileError, Result};
use crate::imports::{ManifestEntry, ManifestKind, Resolution};
use crate::render::{sorted_value, to_yaml_block, yaml_scalar};
use crate::workflow::WorkflowSpec;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Inputs the assembler needs beyond the workflow configuration.
pub struct AssembleInputs<'a> {
    pub spec: &'a WorkflowSpec,
    pub resolution: &'a Resolution,
    /// The source path as the user wrote it, for the header.
    pub source_display: &'a str,
    /// Resolved absolute stop time, if any.
    pub stop_time: Option<&'a str>,
    /// Rendered `jobs:` block.
    pub jobs_text: &'a str,
}

/// Build the full lock-file text.
pub fn assemble(inputs: &AssembleInputs) -> String {
    let spec = inputs.spec;
    // Pre-allocate generously; the jobs block dominates.
    let mut out = String::with_capacity(inputs.jobs_text.len() + 4096);

    header(&mut out, inputs);

    out.push_str(&format!("name: {}\n", yaml_scalar(&spec.name)));
    if let Some(run_name) = &spec.run_name {
        out.push_str(&format!("run-name: {}\n", yaml_scalar(run_name)));
    }

    out.push_str("\"on\":\n");
    let triggers = serde_yaml::Value::Mapping(spec.triggers.as_mapping().clone());
    out.push_str(&to_yaml_block(&triggers, 2));

    out.push_str("permissions: {}\n");

    out.push_str("concurrency:\n");
    match &spec.concurrency {
        Some(value) => out.push_str(&to_yaml_block(value, 2)),
        None => {
            out.push_str(&format!(
                "  group: {}\n",
                yaml_scalar("gh-aw-${{ github.workflow }}")
            ));
            if spec.triggers.has_pull_request_trigger() {
                out.push_str("  cancel-in-progress: true\n");
            }
        }
    }

    if !spec.env.is_empty() {
        out.push_str("env:\n");
        for (key, value) in &spec.env {
            out.push_str(&format!("  {key}: {}\n", yaml_scalar(value)));
        }
    }

    out.push_str(inputs.jobs_text);
    out
}

fn header(out: &mut String, inputs: &AssembleInputs) {
    let spec = inputs.spec;
    out.push_str("# ∿∿∿ gh-aw: agentic workflow ∿∿∿\n");
    out.push_str("#\n");
    out.push_str("# This file was generated by the agentic workflow compiler. DO NOT EDIT.\n");
    out.push_str("# Edit the source markdown file instead and recompile.\n");
    out.push_str("#\n");
    if let Some(description) = &spec.description {
        for line in description.lines() {
            out.push_str(&format!("# {line}\n"));
        }
        out.push_str("#\n");
    }
    out.push_str(&format!("# Source: {}\n", inputs.source_display));
    if !inputs.resolution.manifest.is_empty() {
        out.push_str("# Imports:\n");
        for entry in &inputs.resolution.manifest {
            out.push_str(&format!(
                "#   - {} ({})\n",
                entry.declared,
                manifest_kind_label(entry)
            ));
        }
    }
    out.push_str(&format!(
        "# Frontmatter hash: sha256:{}\n",
        frontmatter_hash(&inputs.resolution.root.frontmatter)
    ));
    if let Some(stop_time) = inputs.stop_time {
        out.push_str(&format!("# Stop time: {stop_time}\n"));
    }
    if let Some(environment) = &spec.manual_approval {
        out.push_str(&format!("# Manual approval environment: {environment}\n"));
    }
    out.push('\n');
}

fn manifest_kind_label(entry: &ManifestEntry) -> &'static str {
    match entry.kind {
        ManifestKind::Inlined => "inlined",
        ManifestKind::Runtime => "runtime",
        ManifestKind::Included => "included",
    }
}

/// Hash of the canonicalised front-matter, embedded so that merge
/// conflicts on regenerated lock files stay small.
pub fn frontmatter_hash(frontmatter: &serde_yaml::Mapping) -> String {
    let canonical = sorted_value(&serde_yaml::Value::Mapping(frontmatter.clone()));
    let json = serde_json::to_value(&canonical)
        .and_then(|v| serde_json::to_string(&v))
        .unwrap_or_default();
    let digest = Sha256::digest(json.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Outcome of the final write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// On-disk content was byte-identical; nothing touched.
    Unchanged,
}

/// Write `text` to `path` unless the existing content is identical.
pub fn write_if_changed(path: &Path, text: &str) -> Result<WriteOutcome> {
    if let Ok(existing) = std::fs::read_to_string(path) {
        if existing == text {
            return Ok(WriteOutcome::Unchanged);
        }
    }
    std::fs::write(path, text).map_err(|e| CompileError::file_write(path, e))?;
    Ok(WriteOutcome::Written)
}
