//! Gemini CLI engine

use crate::engine::EngineConfig;
use crate::steps::{Step, StepSpec};
use crate::workflow::WorkflowSpec;

pub fn install_command(engine: &EngineConfig) -> String {
    let version = engine.version.as_deref().unwrap_or("latest");
    format!("npm install -g @google/gemini-cli@{version}\ngemini --version\n")
}

pub fn execution_step(spec: &WorkflowSpec) -> Step {
    // Gemini reads MCP servers from .gemini/settings.json in the workspace.
    let mut command = String::from("set -o pipefail\nmkdir -p .gemini\n");
    command.push_str(&format!(
        "jq '{{mcpServers: .mcpServers}}' {} > .gemini/settings.json\n",
        super::mcp_config_path()
    ));
    command.push_str("gemini --yolo \\\n");
    if let Some(model) = &spec.engine.model {
        command.push_str(&format!("  --model {model} \\\n"));
    }
    command.push_str(&super::extra_args_lines(spec));
    command.push_str(&format!(
        "  --prompt \"$(cat {})\" 2>&1 | tee {}\n",
        super::PROMPT_PATH,
        super::AGENT_LOG_PATH
    ));

    let mut step = StepSpec::run("Run Gemini CLI", command).id("agent");
    step = step.env("GEMINI_API_KEY", "${{ secrets.GEMINI_API_KEY }}");
    for (key, value) in super::base_execution_env(spec) {
        step = step.env(key, value);
    }
    step.render()
}
