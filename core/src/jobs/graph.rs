//! Job graph construction
//!
//! Builds the deterministic DAG: `activation` (always), `pre_activation`
//! (role gate split out when skip/stop checks coexist with it), the agent
//! job, `detection` (threat analysis), `safe_outputs` (sink processor) and
//! `unlock` (lock release, runs on any outcome). Author-supplied reusable
//! jobs are appended last. Every security-relevant step is recorded in the
//! step-order tracker; the manager's post-conditions run before rendering.

use crate::engines;
use crate::error::Result;
use crate::expr::ExpressionPlan;
use crate::jobs::{Job, JobManager};
use crate::mcp::gateway::gateway_step;
use crate::mcp::{CACHE_MEMORY_DIR, MCP_CONFIG_PATH, McpRender, SAFE_OUTPUTS_PATH};
use crate::permissions::PermissionLevel;
use crate::steps::tracker::{StepOrderTracker, TrackedStepKind};
use crate::steps::{Step, StepSpec};
use crate::triggers::resolve_stop_after;
use crate::validation::injection::PROMPT_HEREDOC_DELIMITER;
use crate::validation::limits::chunk_prompt;
use crate::workflow::WorkflowSpec;

/// Helper scripts installed by the setup action; paths are the runtime
/// contract, their contents are not the compiler's business.
mod scripts {
    pub const SETUP_ACTION: &str = "githubnext/gh-aw/actions/setup@v1";
    pub const SETUP_ACTION_DEV: &str = "./.github/actions/gh-aw-setup";
    pub const SANDBOX_SETUP: &str = "/opt/gh-aw/actions/sandbox_setup.sh";
    pub const CHECK_STOP_TIME: &str = "/opt/gh-aw/actions/check_stop_time.cjs";
    pub const CHECK_MEMBERSHIP: &str = "/opt/gh-aw/actions/check_membership.cjs";
    pub const SEARCH_GATE: &str = "/opt/gh-aw/actions/search_gate.cjs";
    pub const ADD_REACTION: &str = "/opt/gh-aw/actions/add_reaction.cjs";
    pub const LOCK: &str = "/opt/gh-aw/actions/lock_conversation.cjs";
    pub const UNLOCK: &str = "/opt/gh-aw/actions/unlock_conversation.cjs";
    pub const INTERPOLATE: &str = "/opt/gh-aw/actions/interpolate_prompt.cjs";
    pub const COLLECT_OUTPUT: &str = "/opt/gh-aw/actions/collect_output.cjs";
    pub const REDACT_SECRETS: &str = "/opt/gh-aw/actions/redact_secrets.cjs";
    pub const THREAT_DETECTION: &str = "/opt/gh-aw/actions/threat_detection.cjs";
    pub const SAFE_OUTPUTS_DISPATCH: &str = "/opt/gh-aw/actions/safe_outputs_dispatch.cjs";
}

const DEFAULT_AGENT_TIMEOUT_MINUTES: u32 = 30;
const DEFAULT_TOKEN_CHAIN: &str = "${{ secrets.GH_AW_GITHUB_TOKEN || secrets.GITHUB_TOKEN }}";

/// Everything the builder needs besides the workflow configuration.
pub struct GraphInputs<'a> {
    pub spec: &'a WorkflowSpec,
    /// Rewritten prompt body: imports inlined, placeholders substituted.
    pub prompt: &'a str,
    pub plan: &'a ExpressionPlan,
    pub mcp: &'a McpRender,
    pub compile_time: chrono::DateTime<chrono::Utc>,
}

pub fn build_jobs(inputs: &GraphInputs, tracker: &mut StepOrderTracker) -> Result<JobManager> {
    let spec = inputs.spec;
    let mut manager = JobManager::new();

    let has_gate_checks = spec.stop_after.is_some()
        || spec.skip_if_match.is_some()
        || spec.skip_if_no_match.is_some();
    let split_role_gate = spec.role_check_enabled() && has_gate_checks;

    if split_role_gate {
        manager.add(pre_activation_job(spec))?;
    }
    manager.add(activation_job(inputs, split_role_gate)?)?;
    manager.add(agent_job(inputs, tracker)?)?;

    let detection = spec.safe_outputs.threat_detection_enabled();
    if detection {
        manager.add(detection_job(spec, tracker))?;
    }
    if spec.safe_outputs.has_sinks() {
        manager.add(safe_outputs_job(spec, detection))?;
    }
    if spec.triggers.lock_for_agent {
        manager.add(unlock_job(spec))?;
    }

    for (name, body) in &spec.extra_jobs {
        let Some(name) = name.as_str() else { continue };
        manager.add(Job::raw(name, body.clone()))?;
    }

    manager.validate_dependencies()?;
    manager.validate_no_duplicate_steps()?;
    tracker.validate()?;
    Ok(manager)
}

/// Separate role gate, emitted when timestamp or search checks would
/// otherwise run for actors who are not allowed to trigger at all.
fn pre_activation_job(spec: &WorkflowSpec) -> Job {
    let mut job = Job::new("pre_activation");
    job.runs_on = Some(serde_yaml::Value::String("ubuntu-latest".into()));
    job.permissions.grant("contents", PermissionLevel::Read);
    job.outputs.insert(
        "authorized".into(),
        "${{ steps.membership.outputs.ok }}".into(),
    );
    job.steps.push(setup_step(spec));
    job.steps.push(membership_step(spec));
    job
}

/// The always-present gate. Emits an `activated` output that is the
/// conjunction of every enabled sub-check.
fn activation_job(inputs: &GraphInputs, split_role_gate: bool) -> Result<Job> {
    let spec = inputs.spec;
    let mut job = Job::new("activation");
    job.runs_on = Some(serde_yaml::Value::String("ubuntu-latest".into()));
    job.permissions.grant("contents", PermissionLevel::Read);
    if split_role_gate {
        job.needs.push("pre_activation".to_string());
        job.condition =
            Some("needs.pre_activation.outputs.authorized == 'true'".to_string());
    }
    job.outputs
        .insert("activated".into(), "${{ steps.gate.outputs.activated }}".into());

    job.steps.push(setup_step(spec));

    // (check step id, env var fed to the gate script)
    let mut checks: Vec<(&str, &str)> = Vec::new();

    if let Some(stop_after) = &spec.stop_after {
        let stop_time = resolve_stop_after(stop_after, inputs.compile_time)?;
        job.steps.push(
            StepSpec::run(
                "Check stop time",
                format!("node {}", scripts::CHECK_STOP_TIME),
            )
            .id("stop_time")
            .env("GH_AW_STOP_TIME", stop_time)
            .render(),
        );
        checks.push(("stop_time", "STOP_TIME_OK"));
    }

    if spec.role_check_enabled() && !split_role_gate {
        job.steps.push(membership_step(spec));
        checks.push(("membership", "MEMBERSHIP_OK"));
    }

    if let Some(query) = &spec.skip_if_match {
        job.steps.push(search_gate_step(
            "Check skip-if-match",
            "skip_match",
            "skip-if-match",
            &query.query,
            query.min,
        ));
        checks.push(("skip_match", "SKIP_MATCH_OK"));
    }
    if let Some(query) = &spec.skip_if_no_match {
        job.steps.push(search_gate_step(
            "Check skip-if-no-match",
            "skip_no_match",
            "skip-if-no-match",
            &query.query,
            query.min,
        ));
        checks.push(("skip_no_match", "SKIP_NO_MATCH_OK"));
    }

    let mut script = String::from("activated=true\n");
    for (_, env_var) in &checks {
        script.push_str(&format!(
            "if [ \"${env_var}\" != \"true\" ]; then activated=false; fi\n"
        ));
    }
    script.push_str("echo \"activated=$activated\" >> \"$GITHUB_OUTPUT\"\n");
    let mut gate = StepSpec::run("Compute activation", script).id("gate");
    for (step_id, env_var) in &checks {
        gate = gate.env(
            (*env_var).to_string(),
            format!("${{{{ steps.{step_id}.outputs.ok }}}}"),
        );
    }
    job.steps.push(gate.render());
    Ok(job)
}

fn agent_job(inputs: &GraphInputs, tracker: &mut StepOrderTracker) -> Result<Job> {
    let spec = inputs.spec;
    let mut job = Job::new(spec.agent_job_name.clone());
    job.display_name = Some(spec.name.clone());
    job.runs_on = Some(spec.runs_on.clone());
    job.permissions = spec.permissions.clone();
    // The reaction and lock steps write to the triggering conversation.
    if spec.triggers.reaction.is_some() || spec.triggers.lock_for_agent {
        job.permissions.grant("issues", PermissionLevel::Write);
        if spec.triggers.has_pull_request_trigger() {
            job.permissions.grant("pull-requests", PermissionLevel::Write);
        }
    }
    job.needs.push("activation".to_string());
    job.condition = Some("needs.activation.outputs.activated == 'true'".to_string());
    job.timeout_minutes = Some(spec.timeout_minutes.unwrap_or(DEFAULT_AGENT_TIMEOUT_MINUTES));
    job.environment = spec.manual_approval.clone();
    job.concurrency = spec.engine.concurrency.clone();
    job.outputs.insert(
        "output_types".into(),
        "${{ steps.collect_output.outputs.output_types }}".into(),
    );
    job.outputs.insert(
        "has_patch".into(),
        "${{ steps.collect_output.outputs.has_patch }}".into(),
    );

    let mut push = |job: &mut Job, step: Step, kind: TrackedStepKind, paths: &[String]| {
        tracker.record(kind, step.name.as_deref().unwrap_or(""), paths);
        job.steps.push(step);
    };

    push(
        &mut job,
        StepSpec::uses("Check out repository", "actions/checkout@v5")
            .with("persist-credentials", "false")
            .render(),
        TrackedStepKind::Other,
        &[],
    );
    push(&mut job, setup_step(spec), TrackedStepKind::Other, &[]);
    push(
        &mut job,
        StepSpec::run(
            "Create temporary directories",
            "mkdir -p /tmp/gh-aw/aw-prompts /tmp/gh-aw/mcp-config /tmp/gh-aw/agent /tmp/gh-aw/safe-outputs\n",
        )
        .render(),
        TrackedStepKind::Other,
        &[],
    );

    if let Some(reaction) = &spec.triggers.reaction {
        push(
            &mut job,
            StepSpec::run("Add reaction", format!("node {}", scripts::ADD_REACTION))
                .env("GH_AW_REACTION", reaction.clone())
                .env("GITHUB_TOKEN", DEFAULT_TOKEN_CHAIN)
                .render(),
            TrackedStepKind::Other,
            &[],
        );
    }
    if spec.triggers.lock_for_agent {
        push(
            &mut job,
            StepSpec::run("Lock conversation", format!("node {}", scripts::LOCK))
                .env("GITHUB_TOKEN", DEFAULT_TOKEN_CHAIN)
                .render(),
            TrackedStepKind::Other,
            &[],
        );
    }
    if inputs.mcp.uses_cache_memory {
        push(
            &mut job,
            StepSpec::uses("Restore cache memory", "actions/cache@v4")
                .with("path", CACHE_MEMORY_DIR)
                .with(
                    "key",
                    "gh-aw-cache-memory-${{ github.workflow }}-${{ github.run_id }}",
                )
                .with("restore-keys", "gh-aw-cache-memory-${{ github.workflow }}-")
                .render(),
            TrackedStepKind::Other,
            &[],
        );
    }

    if spec.sandbox.agent_enabled {
        let mut script = format!("sudo {}", scripts::SANDBOX_SETUP);
        if let Some(sandbox_type) = &spec.sandbox.agent_type {
            script.push_str(&format!(" --type {sandbox_type}"));
        }
        script.push('\n');
        push(
            &mut job,
            StepSpec::run("Prepare agent sandbox", script).render(),
            TrackedStepKind::Other,
            &[],
        );
    }

    for step in engines::install_steps(spec) {
        push(&mut job, step, TrackedStepKind::Other, &[]);
    }

    if spec.network.firewall_enabled == Some(true) {
        push(&mut job, firewall_step(spec), TrackedStepKind::Other, &[]);
    }

    for step in prompt_steps(inputs.prompt)? {
        push(&mut job, step, TrackedStepKind::Other, &[]);
    }
    if !inputs.plan.is_empty() {
        push(
            &mut job,
            interpolation_step(inputs.plan),
            TrackedStepKind::Other,
            &[],
        );
    }

    if inputs.mcp.has_servers {
        push(&mut job, mcp_config_step(inputs.mcp), TrackedStepKind::Other, &[]);
        push(
            &mut job,
            gateway_step(spec, &inputs.mcp.hoisted),
            TrackedStepKind::Other,
            &[],
        );
    }

    for (index, step) in engines::execution_steps(spec)?.into_iter().enumerate() {
        let kind = if index == 0 {
            TrackedStepKind::AgentExecution
        } else {
            TrackedStepKind::Other
        };
        push(&mut job, step, kind, &[]);
    }

    if let Some(step) = engines::log_parse_step(spec) {
        push(&mut job, step, TrackedStepKind::Other, &[]);
    }

    push(
        &mut job,
        StepSpec::run(
            "Collect agent output",
            format!("node {}", scripts::COLLECT_OUTPUT),
        )
        .id("collect_output")
        .condition("always()")
        .env("GH_AW_SAFE_OUTPUTS", SAFE_OUTPUTS_PATH)
        .render(),
        TrackedStepKind::Other,
        &[],
    );
    push(
        &mut job,
        StepSpec::run(
            "Redact secrets",
            format!("node {} /tmp/gh-aw/\n", scripts::REDACT_SECRETS),
        )
        .condition("always()")
        .render(),
        TrackedStepKind::SecretRedaction,
        &[],
    );

    let upload_paths = vec![
        "/tmp/gh-aw/agent/".to_string(),
        "/tmp/gh-aw/aw-prompts/".to_string(),
        SAFE_OUTPUTS_PATH.to_string(),
    ];
    push(
        &mut job,
        StepSpec::uses("Upload agent artifacts", "actions/upload-artifact@v4")
            .condition("always()")
            .with("name", "agent-output")
            .with("path", upload_paths.join("\n"))
            .with("if-no-files-found", "ignore")
            .render(),
        TrackedStepKind::ArtifactUpload,
        &upload_paths,
    );

    Ok(job)
}

/// Secondary analysis of the agent's output before any sink runs.
fn detection_job(spec: &WorkflowSpec, tracker: &mut StepOrderTracker) -> Job {
    let agent = &spec.agent_job_name;
    let mut job = Job::new("detection");
    job.runs_on = Some(serde_yaml::Value::String("ubuntu-latest".into()));
    job.needs.push(agent.clone());
    job.condition = Some(format!(
        "needs.{agent}.outputs.output_types != '' || needs.{agent}.outputs.has_patch == 'true'"
    ));
    job.permissions.grant("contents", PermissionLevel::Read);
    job.outputs
        .insert("success".into(), "${{ steps.verdict.outputs.success }}".into());

    job.steps.push(setup_step(spec));
    job.steps.push(
        StepSpec::uses("Download agent artifacts", "actions/download-artifact@v4")
            .with("name", "agent-output")
            .with("path", "/tmp/gh-aw/")
            .render(),
    );

    let config = spec.safe_outputs.threat_detection.clone().unwrap_or_default();
    let mut analyze = StepSpec::run(
        "Analyze agent output",
        format!("node {}", scripts::THREAT_DETECTION),
    )
    .id("verdict")
    .env("GH_AW_SAFE_OUTPUTS", SAFE_OUTPUTS_PATH);
    if let Some(prompt) = &config.prompt {
        analyze = analyze.env("GH_AW_THREAT_PROMPT", prompt.clone());
    }
    if let Some(engine) = &config.engine {
        analyze = analyze.env("GH_AW_THREAT_ENGINE", engine.clone());
    }
    let analyze = analyze.render();
    tracker.record(
        TrackedStepKind::AgentExecution,
        analyze.name.as_deref().unwrap_or(""),
        &[],
    );
    job.steps.push(analyze);

    for raw in &config.steps {
        let name = raw
            .get("name")
            .and_then(serde_yaml::Value::as_str)
            .map(str::to_string);
        let text =
            crate::render::to_yaml_block(&serde_yaml::Value::Sequence(vec![raw.clone()]), 6);
        job.steps.push(Step { name, text });
    }

    let redact = StepSpec::run(
        "Redact detection log",
        format!("node {} /tmp/gh-aw/threat-detection/\n", scripts::REDACT_SECRETS),
    )
    .condition("always()")
    .render();
    tracker.record(
        TrackedStepKind::SecretRedaction,
        redact.name.as_deref().unwrap_or(""),
        &[],
    );
    job.steps.push(redact);

    let upload_paths = vec!["/tmp/gh-aw/threat-detection/".to_string()];
    let upload = StepSpec::uses("Upload detection log", "actions/upload-artifact@v4")
        .condition("always()")
        .with("name", "threat-detection")
        .with("path", upload_paths.join("\n"))
        .with("if-no-files-found", "ignore")
        .render();
    tracker.record(
        TrackedStepKind::ArtifactUpload,
        upload.name.as_deref().unwrap_or(""),
        &upload_paths,
    );
    job.steps.push(upload);

    job
}

/// One processor job replays every enabled sink through the dispatch
/// script, keyed by the env-embedded JSON configuration.
fn safe_outputs_job(spec: &WorkflowSpec, detection: bool) -> Job {
    let agent = &spec.agent_job_name;
    let mut job = Job::new("safe_outputs");
    job.runs_on = Some(serde_yaml::Value::String("ubuntu-latest".into()));
    job.needs.push(agent.clone());
    if detection {
        job.needs.push("detection".to_string());
    }
    job.condition = Some(if detection {
        "!cancelled() && needs.detection.outputs.success == 'true'".to_string()
    } else {
        format!("!cancelled() && needs.{agent}.outputs.output_types != ''")
    });
    job.permissions = spec.safe_outputs.required_permissions();

    let token = spec
        .safe_outputs
        .github_token
        .clone()
        .unwrap_or_else(|| DEFAULT_TOKEN_CHAIN.to_string());
    let config_json = serde_json::to_string(&spec.safe_outputs.dispatch_config())
        .unwrap_or_else(|_| "{}".to_string());

    job.steps.push(setup_step(spec));
    job.steps.push(
        StepSpec::uses("Download agent artifacts", "actions/download-artifact@v4")
            .with("name", "agent-output")
            .with("path", "/tmp/gh-aw/")
            .render(),
    );
    let mut dispatch = StepSpec::run(
        "Process safe outputs",
        format!("node {}", scripts::SAFE_OUTPUTS_DISPATCH),
    )
    .env("GH_AW_SAFE_OUTPUTS", SAFE_OUTPUTS_PATH)
    .env("GH_AW_SAFE_OUTPUTS_CONFIG", config_json)
    .env("GITHUB_TOKEN", token);
    for (key, value) in &spec.safe_outputs.env {
        dispatch = dispatch.env(key.clone(), value.clone());
    }
    job.steps.push(dispatch.render());
    job
}

/// Lock release; unconditional so locks never leak on failure paths.
fn unlock_job(spec: &WorkflowSpec) -> Job {
    let mut job = Job::new("unlock");
    job.runs_on = Some(serde_yaml::Value::String("ubuntu-latest".into()));
    job.needs.push(spec.agent_job_name.clone());
    if spec.safe_outputs.has_sinks() {
        job.needs.push("safe_outputs".to_string());
    }
    job.condition = Some("always()".to_string());
    job.permissions.grant("issues", PermissionLevel::Write);
    if spec.triggers.has_pull_request_trigger() {
        job.permissions.grant("pull-requests", PermissionLevel::Write);
    }
    job.steps.push(setup_step(spec));
    job.steps.push(
        StepSpec::run("Unlock conversation", format!("node {}", scripts::UNLOCK))
            .env("GITHUB_TOKEN", DEFAULT_TOKEN_CHAIN)
            .render(),
    );
    job
}

fn setup_step(spec: &WorkflowSpec) -> Step {
    // `features.action-mode: dev` points at the in-repo action for people
    // working on the helpers themselves.
    let action = match spec
        .features
        .get("action-mode")
        .and_then(serde_yaml::Value::as_str)
    {
        Some("dev") => scripts::SETUP_ACTION_DEV,
        _ => scripts::SETUP_ACTION,
    };
    StepSpec::uses("Install gh-aw helpers", action).render()
}

fn membership_step(spec: &WorkflowSpec) -> Step {
    StepSpec::run(
        "Check role membership",
        format!("node {}", scripts::CHECK_MEMBERSHIP),
    )
    .id("membership")
    .env("GH_AW_REQUIRED_ROLES", spec.roles.join(","))
    .env("GITHUB_TOKEN", DEFAULT_TOKEN_CHAIN)
    .render()
}

fn search_gate_step(name: &str, id: &str, mode: &str, query: &str, min: Option<u32>) -> Step {
    let mut step = StepSpec::run(name, format!("node {}", scripts::SEARCH_GATE))
        .id(id)
        .env("GH_AW_SEARCH_MODE", mode)
        .env("GH_AW_SEARCH_QUERY", query)
        .env("GITHUB_TOKEN", DEFAULT_TOKEN_CHAIN);
    if let Some(min) = min {
        step = step.env("GH_AW_SEARCH_MIN", min.to_string());
    }
    step.render()
}

fn firewall_step(spec: &WorkflowSpec) -> Step {
    let mut script = String::from("sudo /opt/gh-aw/actions/firewall.sh enable\n");
    if !spec.network.allowed.is_empty() {
        script.push_str(&format!(
            "sudo /opt/gh-aw/actions/firewall.sh allow {}\n",
            spec.network.allowed.join(" ")
        ));
    }
    let mut step = StepSpec::run("Enable egress firewall", script);
    if let Some(log_level) = &spec.network.firewall_log_level {
        step = step.env("GH_AW_FIREWALL_LOG_LEVEL", log_level.clone());
    }
    if let Some(version) = &spec.network.firewall_version {
        step = step.env("GH_AW_FIREWALL_VERSION", version.clone());
    }
    step.render()
}

/// Write the prompt in bounded heredoc chunks.
fn prompt_steps(prompt: &str) -> Result<Vec<Step>> {
    let chunks = chunk_prompt(prompt)?;
    let mut steps = Vec::with_capacity(chunks.len());
    for (index, chunk) in chunks.iter().enumerate() {
        let (name, redirect) = if index == 0 {
            ("Create prompt".to_string(), ">")
        } else {
            (format!("Append prompt (part {})", index + 1), ">>")
        };
        let mut script = String::new();
        if index == 0 {
            script.push_str("mkdir -p /tmp/gh-aw/aw-prompts\n");
        }
        script.push_str(&format!(
            "cat {redirect} {} << '{PROMPT_HEREDOC_DELIMITER}'\n",
            engines::PROMPT_PATH
        ));
        script.push_str(chunk);
        if !script.ends_with('\n') {
            script.push('\n');
        }
        script.push_str(PROMPT_HEREDOC_DELIMITER);
        script.push('\n');
        steps.push(StepSpec::run(name, script).render());
    }
    Ok(steps)
}

/// Recover expression values at run time and splice them into the prompt.
fn interpolation_step(plan: &ExpressionPlan) -> Step {
    let mut step = StepSpec::run(
        "Interpolate prompt placeholders",
        format!("node {} {}\n", scripts::INTERPOLATE, engines::PROMPT_PATH),
    );
    let mut mappings: Vec<_> = plan.mappings.iter().collect();
    mappings.sort_by(|a, b| a.placeholder.cmp(&b.placeholder));
    let substitutions: serde_json::Map<String, serde_json::Value> = mappings
        .iter()
        .map(|m| (m.placeholder.clone(), serde_json::json!(m.env_var)))
        .collect();
    step = step.env(
        "GH_AW_PROMPT_SUBSTITUTIONS",
        serde_json::to_string(&serde_json::Value::Object(substitutions))
            .unwrap_or_else(|_| "{}".to_string()),
    );
    for mapping in mappings {
        step = step.env(
            mapping.env_var.clone(),
            format!("${{{{ {} }}}}", mapping.expression),
        );
    }
    step.render()
}

/// Write the MCP server configuration. Token expressions inside it are
/// interpolated by the CI runner before the script executes.
fn mcp_config_step(mcp: &McpRender) -> Step {
    let json = serde_json::to_string_pretty(&mcp.config).unwrap_or_else(|_| "{}".to_string());
    let mut script = String::from("mkdir -p /tmp/gh-aw/mcp-config\n");
    script.push_str(&format!("cat > {MCP_CONFIG_PATH} << 'GH_AW_MCP_EOF'\n"));
    script.push_str(&json);
    script.push_str("\nGH_AW_MCP_EOF\n");
    StepSpec::run("Render MCP configuration", script).render()
}
