//! Step-order tracking
//!
//! Steps that run after agent execution are security-relevant: anything
//! uploaded as an artifact must first pass secret redaction, and every
//! uploaded path must be one the redaction step actually scans. Steps are
//! recorded append-only during emission; the invariants are validated once
//! when job assembly finishes. Violations are compiler bugs, not authoring
//! errors.

use crate::error::{CompileError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackedStepKind {
    AgentExecution,
    SecretRedaction,
    ArtifactUpload,
    Other,
}

#[derive(Debug, Clone)]
pub struct StepOrderRecord {
    pub kind: TrackedStepKind,
    pub name: String,
    pub order: usize,
    pub upload_paths: Vec<String>,
}

/// Append-only record of post-agent-execution steps, reset per run.
#[derive(Debug, Default)]
pub struct StepOrderTracker {
    records: Vec<StepOrderRecord>,
    agent_seen: bool,
    next_order: usize,
}

impl StepOrderTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.agent_seen = false;
        self.next_order = 0;
    }

    /// Record one emitted step. Only steps at or after agent execution are
    /// kept; earlier steps are outside the invariant.
    pub fn record(&mut self, kind: TrackedStepKind, name: &str, upload_paths: &[String]) {
        if kind == TrackedStepKind::AgentExecution {
            self.agent_seen = true;
        }
        if !self.agent_seen {
            return;
        }
        let order = self.next_order;
        self.next_order += 1;
        self.records.push(StepOrderRecord {
            kind,
            name: name.to_string(),
            order,
            upload_paths: upload_paths.to_vec(),
        });
    }

    /// Validate the three invariants; call once after all jobs are built.
    pub fn validate(&self) -> Result<()> {
        let redaction_order = self
            .records
            .iter()
            .find(|r| r.kind == TrackedStepKind::SecretRedaction)
            .map(|r| r.order);
        let uploads: Vec<&StepOrderRecord> = self
            .records
            .iter()
            .filter(|r| r.kind == TrackedStepKind::ArtifactUpload)
            .collect();

        if uploads.is_empty() {
            return Ok(());
        }
        let Some(redaction_order) = redaction_order else {
            return Err(CompileError::internal(format!(
                "artifact upload step '{}' emitted without a secret redaction step",
                uploads[0].name
            )));
        };
        for upload in &uploads {
            if upload.order <= redaction_order {
                return Err(CompileError::internal(format!(
                    "artifact upload step '{}' (order {}) emitted before secret redaction (order {redaction_order})",
                    upload.name, upload.order
                )));
            }
            for path in &upload.upload_paths {
                if !is_scannable_path(path) {
                    return Err(CompileError::internal(format!(
                        "artifact upload step '{}' uploads '{path}' which the secret redaction step does not scan",
                        upload.name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn records(&self) -> &[StepOrderRecord] {
        &self.records
    }
}

/// Whether the secret-redaction step scans `path` before upload.
///
/// Scannable: files under `/tmp/gh-aw/` or `/opt/gh-aw/` with a text-like
/// extension, directory paths (trailing `/`), the `/tmp/*.<ext>` wildcard
/// diagnostic patterns, and `${{ env.* }}` expressions (assumed to resolve
/// into the scanned tree).
pub fn is_scannable_path(path: &str) -> bool {
    const SCANNED_EXTENSIONS: &[&str] = &[".txt", ".json", ".log", ".jsonl"];

    let trimmed = path.trim();
    if trimmed.is_empty() {
        return false;
    }
    if trimmed.starts_with("${{ env.") && trimmed.ends_with("}}") {
        return true;
    }
    if trimmed.ends_with('/') {
        return trimmed.starts_with("/tmp/gh-aw/") || trimmed.starts_with("/opt/gh-aw/");
    }
    let has_scanned_extension = SCANNED_EXTENSIONS.iter().any(|ext| trimmed.ends_with(ext));
    if !has_scanned_extension {
        return false;
    }
    if trimmed.starts_with("/tmp/gh-aw/") || trimmed.starts_with("/opt/gh-aw/") {
        return true;
    }
    // Well-known diagnostic pattern: /tmp/*.ext with a wildcard component.
    trimmed.starts_with("/tmp/") && trimmed.contains('*')
}
