//! Claude Code engine

use crate::engine::EngineConfig;
use crate::steps::{Step, StepSpec};
use crate::workflow::WorkflowSpec;

pub fn install_command(engine: &EngineConfig) -> String {
    let version = engine.version.as_deref().unwrap_or("latest");
    format!("npm install -g @anthropic-ai/claude-code@{version}\nclaude --version\n")
}

pub fn execution_step(spec: &WorkflowSpec) -> Step {
    let mut command = String::from("set -o pipefail\nclaude --print --dangerously-skip-permissions \\\n");
    command.push_str(&format!("  --mcp-config {} \\\n", super::mcp_config_path()));
    if let Some(model) = &spec.engine.model {
        command.push_str(&format!("  --model {model} \\\n"));
    }
    if let Some(max_turns) = spec.engine.max_turns {
        command.push_str(&format!("  --max-turns {max_turns} \\\n"));
    }
    let allowed = allowed_tool_names(spec);
    if !allowed.is_empty() {
        command.push_str(&format!("  --allowed-tools \"{}\" \\\n", allowed.join(",")));
    }
    command.push_str(&super::extra_args_lines(spec));
    command.push_str(&format!(
        "  \"$(cat {})\" 2>&1 | tee {}\n",
        super::PROMPT_PATH,
        super::AGENT_LOG_PATH
    ));

    let mut step = StepSpec::run("Run Claude Code", command).id("agent");
    step = step.env(
        "ANTHROPIC_API_KEY",
        "${{ secrets.ANTHROPIC_API_KEY || secrets.CLAUDE_CODE_OAUTH_TOKEN }}",
    );
    for (key, value) in super::base_execution_env(spec) {
        step = step.env(key, value);
    }
    step.render()
}

/// Map tool allowlists to Claude tool names: native tools by their Claude
/// name, MCP operations as `mcp__<server>__<operation>`.
fn allowed_tool_names(spec: &WorkflowSpec) -> Vec<String> {
    let mut names = Vec::new();
    for (tool, config) in spec.all_mcp_tools() {
        match tool.as_str() {
            "bash" => names.push("Bash".to_string()),
            "edit" => {
                names.push("Edit".to_string());
                names.push("Write".to_string());
            }
            "web-fetch" => names.push("WebFetch".to_string()),
            "web-search" => names.push("WebSearch".to_string()),
            _ => {
                if config.allowed.is_empty() {
                    names.push(format!("mcp__{tool}"));
                } else {
                    for operation in &config.allowed {
                        names.push(format!("mcp__{tool}__{operation}"));
                    }
                }
            }
        }
    }
    if spec.safe_outputs.has_sinks() {
        names.push("mcp__safe-outputs".to_string());
    }
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::imports::ImportResolver;
    use std::fs;
    use tempfile::TempDir;

    fn build(frontmatter: &str) -> WorkflowSpec {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wf.md");
        fs::write(&path, format!("---\n{frontmatter}---\nBody\n")).unwrap();
        let resolution = ImportResolver::new().resolve(&path).unwrap();
        let mut cache = std::collections::BTreeMap::new();
        WorkflowSpec::from_resolution(&resolution, &mut cache).unwrap()
    }

    #[test]
    fn allowed_tools_cover_native_and_mcp() {
        let spec = build(
            "on: issues\nengine: claude\ntools:\n  bash:\n  github:\n    allowed: [create_issue, get_issue]\n",
        );
        let names = allowed_tool_names(&spec);
        assert!(names.contains(&"Bash".to_string()));
        assert!(names.contains(&"mcp__github__create_issue".to_string()));
        assert!(names.contains(&"mcp__github__get_issue".to_string()));
    }

    #[test]
    fn max_turns_flag_is_forwarded() {
        let spec = build("on: issues\nengine:\n  id: claude\n  max-turns: 7\n");
        let step = execution_step(&spec);
        assert!(step.text.contains("--max-turns 7"), "{}", step.text);
    }
}
