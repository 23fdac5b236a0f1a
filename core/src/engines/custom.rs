//! Custom engine: the author supplies the step list

use crate::error::{CompileError, Result};
use crate::render::to_yaml_block;
use crate::steps::Step;
use crate::workflow::WorkflowSpec;

/// Render the author-supplied steps verbatim, at step indentation. Step
/// names are preserved so duplicate detection still applies.
pub fn execution_steps(spec: &WorkflowSpec) -> Result<Vec<Step>> {
    if spec.engine.steps.is_empty() {
        return Err(CompileError::validation(
            "engine: custom engine requires a steps list",
        ));
    }
    let mut steps = Vec::with_capacity(spec.engine.steps.len());
    for raw in &spec.engine.steps {
        let serde_yaml::Value::Mapping(map) = raw else {
            return Err(CompileError::validation(format!(
                "engine.steps: each step must be a mapping, got {raw:?}"
            )));
        };
        let name = map
            .get("name")
            .and_then(serde_yaml::Value::as_str)
            .map(str::to_string);
        let text = to_yaml_block(
            &serde_yaml::Value::Sequence(vec![raw.clone()]),
            6,
        );
        steps.push(Step { name, text });
    }
    Ok(steps)
}
