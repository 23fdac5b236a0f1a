//! Codex engine

use crate::engine::EngineConfig;
use crate::steps::{Step, StepSpec};
use crate::workflow::WorkflowSpec;

pub fn install_command(engine: &EngineConfig) -> String {
    let version = engine.version.as_deref().unwrap_or("latest");
    format!("npm install -g @openai/codex@{version}\ncodex --version\n")
}

pub fn execution_step(spec: &WorkflowSpec) -> Step {
    let mut command = String::from("set -o pipefail\ncodex exec --full-auto --skip-git-repo-check \\\n");
    if let Some(model) = &spec.engine.model {
        command.push_str(&format!("  -c model={model} \\\n"));
    }
    command.push_str(&format!(
        "  -c mcp_config_path={} \\\n",
        super::mcp_config_path()
    ));
    command.push_str(&super::extra_args_lines(spec));
    command.push_str(&format!(
        "  \"$(cat {})\" 2>&1 | tee {}\n",
        super::PROMPT_PATH,
        super::AGENT_LOG_PATH
    ));

    let mut step = StepSpec::run("Run Codex", command).id("agent");
    step = step.env("OPENAI_API_KEY", "${{ secrets.OPENAI_API_KEY }}");
    for (key, value) in super::base_execution_env(spec) {
        step = step.env(key, value);
    }
    step.render()
}
