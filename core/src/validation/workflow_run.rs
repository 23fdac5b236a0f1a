//! `workflow_run` trigger safety
//!
//! A `workflow_run` trigger without a branch restriction fires for runs of
//! the named workflows on any branch, including forks' default-branch runs.
//! That is a warning in normal mode and an error in strict mode.

use crate::diagnostics::Diagnostics;
use crate::error::{CompileError, Result};
use crate::triggers::Triggers;

pub fn check_workflow_run(
    triggers: &Triggers,
    strict: bool,
    diagnostics: &mut Diagnostics,
) -> Result<()> {
    if triggers.workflow_run().is_none() || triggers.workflow_run_has_branches() {
        return Ok(());
    }
    let message = "on.workflow_run: no branches filter; the workflow will run for completed runs on every branch".to_string();
    if strict {
        return Err(CompileError::validation(message));
    }
    diagnostics.warn(message);
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::collections::BTreeMap;

    fn triggers(text: &str) -> Triggers {
        let mut cache = BTreeMap::new();
        Triggers::from_yaml(&serde_yaml::from_str(text).unwrap(), &mut cache).unwrap()
    }

    #[test]
    fn workflow_run_with_branches_is_silent() {
        let t = triggers("workflow_run:\n  workflows: [ci]\n  branches: [main]\n");
        let mut diagnostics = Diagnostics::new();
        check_workflow_run(&t, false, &mut diagnostics).unwrap();
        assert_eq!(diagnostics.warning_count(), 0);
    }

    #[test]
    fn missing_branches_warns_in_normal_mode() {
        let t = triggers("workflow_run:\n  workflows: [ci]\n  types: [completed]\n");
        let mut diagnostics = Diagnostics::new();
        check_workflow_run(&t, false, &mut diagnostics).unwrap();
        assert_eq!(diagnostics.warning_count(), 1);
    }

    #[test]
    fn missing_branches_fails_in_strict_mode() {
        let t = triggers("workflow_run:\n  workflows: [ci]\n");
        let mut diagnostics = Diagnostics::new();
        let err = check_workflow_run(&t, true, &mut diagnostics).unwrap_err();
        assert!(err.to_string().contains("branches"), "{err}");
    }
}
