//! GitHub Copilot CLI engine

use crate::engine::EngineConfig;
use crate::steps::{Step, StepSpec};
use crate::workflow::WorkflowSpec;

pub fn install_command(engine: &EngineConfig) -> String {
    let version = engine.version.as_deref().unwrap_or("latest");
    format!("npm install -g @github/copilot@{version}\ncopilot --version\n")
}

pub fn execution_step(spec: &WorkflowSpec) -> Step {
    // The Copilot CLI reads MCP servers from its XDG config directory.
    let mut command = String::from("set -o pipefail\nmkdir -p \"$HOME/.copilot\"\n");
    command.push_str(&format!(
        "cp {} \"$HOME/.copilot/mcp-config.json\"\n",
        super::mcp_config_path()
    ));
    command.push_str("copilot --add-dir /tmp/gh-aw/ --allow-all-tools \\\n");
    if let Some(model) = &spec.engine.model {
        command.push_str(&format!("  --model {model} \\\n"));
    }
    command.push_str(&super::extra_args_lines(spec));
    command.push_str(&format!(
        "  --prompt \"$(cat {})\" 2>&1 | tee {}\n",
        super::PROMPT_PATH,
        super::AGENT_LOG_PATH
    ));

    let mut step = StepSpec::run("Run GitHub Copilot CLI", command).id("agent");
    step = step.env(
        "GITHUB_TOKEN",
        "${{ secrets.GH_AW_GITHUB_TOKEN || secrets.GITHUB_TOKEN }}",
    );
    for (key, value) in super::base_execution_env(spec) {
        step = step.env(key, value);
    }
    step.render()
}
