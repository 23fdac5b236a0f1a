//! Concurrency group validation
//!
//! Author-supplied `concurrency:` values (top-level and per-engine) may
//! embed expressions; those run through the same allow-list as prompt
//! expressions. A group that is entirely static is fine too.

use crate::error::{CompileError, Result};
use crate::expr::find_expressions;
use crate::expr::safety::check_expression;
use crate::workflow::WorkflowSpec;

pub fn check_concurrency(spec: &WorkflowSpec) -> Result<()> {
    if let Some(value) = &spec.concurrency {
        check_value(value)?;
    }
    if let Some(group) = &spec.engine.concurrency {
        check_group(group)?;
    }
    Ok(())
}

fn check_value(value: &serde_yaml::Value) -> Result<()> {
    match value {
        serde_yaml::Value::String(group) => check_group(group),
        serde_yaml::Value::Mapping(map) => {
            let Some(group) = map.get("group") else {
                return Err(CompileError::validation(
                    "concurrency: mapping form requires a group",
                ));
            };
            let group = group.as_str().ok_or_else(|| {
                CompileError::validation("concurrency: group must be a string")
            })?;
            check_group(group)?;
            if let Some(cancel) = map.get("cancel-in-progress") {
                match cancel {
                    serde_yaml::Value::Bool(_) => {}
                    serde_yaml::Value::String(expr) => check_group(expr)?,
                    other => {
                        return Err(CompileError::validation(format!(
                            "concurrency: cancel-in-progress must be a boolean or expression, got {other:?}"
                        )));
                    }
                }
            }
            Ok(())
        }
        other => Err(CompileError::validation(format!(
            "concurrency: expected a group string or mapping, got {other:?}"
        ))),
    }
}

fn check_group(group: &str) -> Result<()> {
    for found in find_expressions(group)? {
        check_expression(&found.inner)
            .map_err(|e| CompileError::validation(format!("concurrency: {e}")))?;
    }
    Ok(())
}
