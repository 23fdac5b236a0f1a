//! Validators
//!
//! Validators run in a fixed order; later validators may assume earlier
//! invariants hold. Errors halt the pipeline, warnings accumulate in the
//! [`Diagnostics`] collector. The post-assembly checks (size guideline,
//! lock schema, injection audit) live here too but are invoked by the
//! compiler after text assembly.

pub mod agent_file;
pub mod concurrency;
pub mod containers;
pub mod expressions;
pub mod features;
pub mod injection;
pub mod limits;
pub mod runners;
pub mod schema;
pub mod secrets;
pub mod targets;
pub mod toolsets;
pub mod workflow_run;

use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::imports::Resolution;
use crate::workflow::WorkflowSpec;

/// Run the pre-assembly validators over the merged configuration.
pub fn validate(
    spec: &WorkflowSpec,
    resolution: &Resolution,
    diagnostics: &mut Diagnostics,
) -> Result<()> {
    // 1. Expression safety over the body and all imported text.
    expressions::check_resolution_expressions(resolution)?;

    // 2. Engine feature flags.
    features::check_engine_features(spec, diagnostics)?;
    features::check_permission_features(spec, diagnostics);

    // 3. Runner labels.
    runners::check_runs_on(&spec.runs_on)?;

    // 4. Reusable-workflow job secrets.
    secrets::check_job_secrets(&spec.extra_jobs)?;

    // 5. workflow_run branch restriction.
    workflow_run::check_workflow_run(&spec.triggers, spec.strict, diagnostics)?;

    // 6. Safe-output target syntax.
    targets::check_targets(&spec.safe_outputs)?;

    // 7. GitHub toolset consistency.
    if let Some(github) = spec.tools.get("github") {
        toolsets::check_github_toolsets(github)?;
        toolsets::check_toolset_permissions(github, &spec.permissions, spec.strict, diagnostics)?;
    }

    // 8. Custom agent file existence.
    if let Some(agent_file) = &spec.engine.agent_file {
        agent_file::check_agent_file(&spec.source_path, agent_file)?;
    }

    // Concurrency group expressions and container references; the latter
    // degrades to warnings (no network at compile time).
    concurrency::check_concurrency(spec)?;
    containers::check_container_images(spec, diagnostics);

    Ok(())
}
