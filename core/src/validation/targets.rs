//! Safe-output target syntax validation
//!
//! A sink target selects which issue, pull request or discussion receives
//! the output. Allowed shapes: absent, `triggering`, `*`, a positive
//! integer literal, or a CI expression.

use crate::error::{CompileError, Result};
use crate::safe_outputs::SafeOutputsConfig;

pub fn check_targets(safe_outputs: &SafeOutputsConfig) -> Result<()> {
    for (sink, target) in safe_outputs.targets() {
        check_target(sink, &target.0)?;
    }
    Ok(())
}

fn check_target(sink: &str, target: &str) -> Result<()> {
    let trimmed = target.trim();
    if trimmed.is_empty() || trimmed == "triggering" || trimmed == "*" {
        return Ok(());
    }
    if let Ok(number) = trimmed.parse::<i64>() {
        if number > 0 {
            return Ok(());
        }
        return Err(CompileError::validation(format!(
            "safe-outputs.{sink}.target: {number} is not a positive issue or pull request number"
        )));
    }
    // A well-formed expression has the opener before the closer.
    if let (Some(open), Some(close)) = (trimmed.find("${{"), trimmed.rfind("}}")) {
        if open < close {
            return Ok(());
        }
    }
    Err(CompileError::validation(format!(
        "safe-outputs.{sink}.target: '{trimmed}' is not a valid target; use \"triggering\", \"*\", an explicit number, or an expression such as ${{{{ github.event.issue.number }}}}"
    )))
}
