//! Custom agent file existence
//!
//! An `engine.agent-file` path must exist at compile time. Relative paths
//! resolve against the repository root, found by walking two directories up
//! from the workflow file (`.github/workflows/<file>` -> repo root).

use crate::error::{CompileError, Result};
use std::path::{Path, PathBuf};

pub fn check_agent_file(workflow_path: &Path, agent_file: &str) -> Result<()> {
    let candidate = resolve_agent_path(workflow_path, agent_file);
    if candidate.is_file() {
        return Ok(());
    }
    Err(CompileError::validation(format!(
        "engine.agent-file: {agent_file} does not exist (looked at {})",
        candidate.display()
    )))
}

fn resolve_agent_path(workflow_path: &Path, agent_file: &str) -> PathBuf {
    let path = Path::new(agent_file);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    let repo_root = workflow_path
        .parent()
        .and_then(Path::parent)
        .and_then(Path::parent)
        .unwrap_or_else(|| Path::new("."));
    repo_root.join(path)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn absolute_existing_file_passes() {
        let dir = TempDir::new().unwrap();
        let agent = dir.path().join("agent.md");
        fs::write(&agent, "agent").unwrap();
        check_agent_file(Path::new("/repo/.github/workflows/wf.md"), &agent.to_string_lossy())
            .unwrap();
    }

    #[test]
    fn relative_path_resolves_from_repo_root() {
        let dir = TempDir::new().unwrap();
        let workflows = dir.path().join(".github/workflows");
        fs::create_dir_all(&workflows).unwrap();
        let agents = dir.path().join(".github/agents");
        fs::create_dir_all(&agents).unwrap();
        fs::write(agents.join("helper.md"), "agent").unwrap();

        check_agent_file(&workflows.join("wf.md"), ".github/agents/helper.md").unwrap();
    }

    #[test]
    fn missing_file_names_path_and_says_does_not_exist() {
        let dir = TempDir::new().unwrap();
        let workflows = dir.path().join(".github/workflows");
        fs::create_dir_all(&workflows).unwrap();

        let err =
            check_agent_file(&workflows.join("wf.md"), ".github/agents/missing.md").unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.contains(".github/agents/missing.md"), "{rendered}");
        assert!(rendered.contains("does not exist"), "{rendered}");
    }
}
