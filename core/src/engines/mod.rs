//! Engine step emission
//!
//! Each engine contributes runtime installation steps and an execution
//! step that drives its CLI against the assembled prompt. Dispatch is a
//! plain match on the engine variant; the capability record already
//! constrained what reaches this point.

mod claude;
mod codex;
mod copilot;
mod custom;
mod gemini;

use crate::engine::EngineKind;
use crate::error::Result;
use crate::mcp::{MCP_CONFIG_PATH, SAFE_OUTPUTS_PATH};
use crate::steps::{Step, StepSpec};
use crate::workflow::WorkflowSpec;

/// Prompt file consumed by every engine.
pub const PROMPT_PATH: &str = "/tmp/gh-aw/aw-prompts/prompt.txt";
/// Agent stdout/stderr capture.
pub const AGENT_LOG_PATH: &str = "/tmp/gh-aw/agent/agent-stdio.log";

/// Node runtime setup plus the engine CLI installation, in order.
pub fn install_steps(spec: &WorkflowSpec) -> Vec<Step> {
    let mut steps = Vec::new();
    if spec.engine.kind == EngineKind::Custom {
        return steps;
    }

    steps.push(
        StepSpec::uses("Set up Node.js", "actions/setup-node@v4")
            .with("node-version", "24")
            .render(),
    );
    let install = match spec.engine.kind {
        EngineKind::Claude => claude::install_command(&spec.engine),
        EngineKind::Codex => codex::install_command(&spec.engine),
        EngineKind::Copilot => copilot::install_command(&spec.engine),
        EngineKind::Gemini => gemini::install_command(&spec.engine),
        EngineKind::Custom => unreachable!("custom engines install nothing"),
    };
    steps.push(
        StepSpec::run(
            format!("Install {} CLI", spec.engine.kind.as_str()),
            install,
        )
        .render(),
    );

    if !spec.plugins.is_empty() {
        steps.push(plugin_install_step(spec));
    }
    steps
}

/// The agent invocation. Custom engines expand to their author-supplied
/// step list; everything else is a single CLI call.
pub fn execution_steps(spec: &WorkflowSpec) -> Result<Vec<Step>> {
    match spec.engine.kind {
        EngineKind::Claude => Ok(vec![claude::execution_step(spec)]),
        EngineKind::Codex => Ok(vec![codex::execution_step(spec)]),
        EngineKind::Copilot => Ok(vec![copilot::execution_step(spec)]),
        EngineKind::Gemini => Ok(vec![gemini::execution_step(spec)]),
        EngineKind::Custom => custom::execution_steps(spec),
    }
}

/// Engine logs differ wildly in shape; each engine gets its own parser
/// that folds the stdio capture into the run summary. Custom engines
/// manage their own logging.
pub fn log_parse_step(spec: &WorkflowSpec) -> Option<Step> {
    let script = match spec.engine.kind {
        EngineKind::Claude => "parse_claude_log.cjs",
        EngineKind::Codex => "parse_codex_log.cjs",
        EngineKind::Copilot => "parse_copilot_log.cjs",
        EngineKind::Gemini => "parse_gemini_log.cjs",
        EngineKind::Custom => return None,
    };
    Some(
        StepSpec::run(
            "Parse agent logs",
            format!("node /opt/gh-aw/actions/{script} {AGENT_LOG_PATH}\n"),
        )
        .condition("always()")
        .render(),
    )
}

fn plugin_install_step(spec: &WorkflowSpec) -> Step {
    let binary = spec.engine.kind.as_str();
    let mut script = String::new();
    let mut step_env = Vec::new();
    for plugin in &spec.plugins {
        script.push_str(&format!("{binary} plugin install {}\n", plugin.id));
        for (key, value) in &plugin.env {
            step_env.push((key.clone(), value.clone()));
        }
    }
    let mut step = StepSpec::run("Install engine plugins", script);
    for (key, value) in step_env {
        step = step.env(key, value);
    }
    step.render()
}

/// Shared env entries every execution step carries, sorted later by the
/// step renderer.
fn base_execution_env(spec: &WorkflowSpec) -> Vec<(String, String)> {
    let mut env = vec![(
        "GH_AW_PROMPT".to_string(),
        PROMPT_PATH.to_string(),
    )];
    if spec.safe_outputs.has_sinks() {
        env.push(("GH_AW_SAFE_OUTPUTS".to_string(), SAFE_OUTPUTS_PATH.to_string()));
    }
    if let Some(agent_file) = &spec.engine.agent_file {
        env.push(("GH_AW_AGENT_FILE".to_string(), agent_file.clone()));
    }
    for (key, value) in &spec.engine.env {
        env.push((key.clone(), value.clone()));
    }
    for (key, value) in &spec.env {
        env.push((key.clone(), value.clone()));
    }
    env
}

/// `--mcp-config` style argument shared by engines that accept a config
/// file path.
fn mcp_config_path() -> &'static str {
    MCP_CONFIG_PATH
}

/// Author-supplied extra CLI arguments, shell-quoted one per continuation
/// line.
fn extra_args_lines(spec: &WorkflowSpec) -> String {
    let mut out = String::new();
    for arg in &spec.engine.args {
        let quoted = shlex::try_quote(arg)
            .map(|q| q.into_owned())
            .unwrap_or_else(|_| arg.clone());
        out.push_str(&format!("  {quoted} \\\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::imports::ImportResolver;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    fn build(frontmatter: &str) -> WorkflowSpec {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wf.md");
        fs::write(&path, format!("---\n{frontmatter}---\nBody\n")).unwrap();
        let resolution = ImportResolver::new().resolve(&path).unwrap();
        let mut cache = BTreeMap::new();
        WorkflowSpec::from_resolution(&resolution, &mut cache).unwrap()
    }

    #[test]
    fn claude_install_and_execute() {
        let spec = build("on: issues\nengine: claude\n");
        let install = install_steps(&spec);
        assert!(install[0].text.contains("actions/setup-node@v4"));
        assert!(install[1].text.contains("@anthropic-ai/claude-code"));
        let exec = execution_steps(&spec).unwrap();
        assert_eq!(exec.len(), 1);
        assert!(exec[0].text.contains("claude"), "{}", exec[0].text);
        assert!(exec[0].text.contains(PROMPT_PATH), "{}", exec[0].text);
    }

    #[test]
    fn engine_version_is_pinned_in_install() {
        let spec = build("on: issues\nengine:\n  id: codex\n  version: 0.48.0\n");
        let install = install_steps(&spec);
        assert!(install[1].text.contains("@openai/codex@0.48.0"), "{}", install[1].text);
    }

    #[test]
    fn custom_engine_emits_user_steps_verbatim() {
        let spec = build(
            "on: issues\nengine:\n  id: custom\n  steps:\n    - name: Run my agent\n      run: ./agent.sh\n",
        );
        assert!(install_steps(&spec).is_empty());
        let exec = execution_steps(&spec).unwrap();
        assert_eq!(exec.len(), 1);
        assert!(exec[0].text.contains("Run my agent"), "{}", exec[0].text);
        assert!(exec[0].text.contains("./agent.sh"), "{}", exec[0].text);
    }

    #[test]
    fn plugins_install_through_engine_cli() {
        let spec = build(
            "on: issues\nengine: claude\nplugins:\n  - github/some-plugin\n  - id: other/plugin\n    mcp:\n      env:\n        PLUGIN_KEY: value\n",
        );
        let install = install_steps(&spec);
        let plugin_step = install.last().unwrap();
        assert!(
            plugin_step.text.contains("claude plugin install github/some-plugin"),
            "{}",
            plugin_step.text
        );
        assert!(plugin_step.text.contains("PLUGIN_KEY"), "{}", plugin_step.text);
    }

    #[test]
    fn extra_args_are_shell_quoted() {
        let spec = build(
            "on: issues\nengine:\n  id: claude\n  args:\n    - --append-system-prompt\n    - 'be careful; stay focused'\n",
        );
        let exec = execution_steps(&spec).unwrap();
        assert!(
            exec[0].text.contains("'be careful; stay focused'"),
            "{}",
            exec[0].text
        );
    }

    #[test]
    fn safe_outputs_env_reaches_execution_step() {
        let spec = build("on: issues\nengine: claude\nsafe-outputs:\n  create-issue:\n");
        let exec = execution_steps(&spec).unwrap();
        assert!(
            exec[0].text.contains("GH_AW_SAFE_OUTPUTS"),
            "{}",
            exec[0].text
        );
    }
}
