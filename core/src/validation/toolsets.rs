//! GitHub toolset consistency
//!
//! Every allowed GitHub MCP tool name belongs to a toolset; requesting a
//! tool whose toolset is not enabled would silently fail at run time, so
//! the compiler rejects it with the full list of missing toolsets and the
//! tools that need each.

use crate::diagnostics::Diagnostics;
use crate::error::{CompileError, Result};
use crate::permissions::{PermissionLevel, Permissions};
use crate::tools::{ToolSpec, toolset_for_github_tool};
use std::collections::BTreeMap;

pub fn check_github_toolsets(github: &ToolSpec) -> Result<()> {
    let enabled = github.effective_toolsets();
    let mut missing: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for tool in &github.allowed {
        let Some(required) = toolset_for_github_tool(tool) else {
            // Unknown names may be newer server tools; the gateway will
            // reject them at run time if they do not exist.
            continue;
        };
        if !enabled.iter().any(|t| t == required) {
            missing.entry(required).or_default().push(tool);
        }
    }
    if missing.is_empty() {
        return Ok(());
    }
    let details: Vec<String> = missing
        .iter()
        .map(|(toolset, tools)| format!("{toolset} (needed by {})", tools.join(", ")))
        .collect();
    Err(CompileError::validation(format!(
        "tools.github: allowed tools require toolsets that are not enabled: {}; add them to tools.github.toolsets",
        details.join("; ")
    )))
}

/// Warn (error in strict mode) when an enabled toolset's read permission is
/// missing from the merged permission set.
pub fn check_toolset_permissions(
    github: &ToolSpec,
    permissions: &Permissions,
    strict: bool,
    diagnostics: &mut Diagnostics,
) -> Result<()> {
    for toolset in github.effective_toolsets() {
        let scope = match toolset.as_str() {
            "issues" | "labels" => "issues",
            "pull_requests" => "pull-requests",
            "discussions" => "discussions",
            "actions" => "actions",
            "repos" => "contents",
            _ => continue,
        };
        if permissions.level(scope) < PermissionLevel::Read {
            let message = format!(
                "tools.github: toolset '{toolset}' needs '{scope}: read' permission which is not granted"
            );
            if strict {
                return Err(CompileError::validation(message));
            }
            diagnostics.warn(message);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn tool(text: &str) -> ToolSpec {
        ToolSpec::from_yaml("github", &serde_yaml::from_str(text).unwrap()).unwrap()
    }

    #[test]
    fn default_toolsets_cover_issue_tools() {
        check_github_toolsets(&tool("allowed: [create_issue, get_pull_request]")).unwrap();
    }

    #[test]
    fn missing_toolset_lists_tools_that_need_it() {
        let err = check_github_toolsets(&tool(
            "allowed: [create_issue, list_discussions]\ntoolsets: [issues]\n",
        ))
        .unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.contains("discussions"), "{rendered}");
        assert!(rendered.contains("list_discussions"), "{rendered}");
    }

    #[test]
    fn multiple_missing_toolsets_are_all_reported() {
        let err = check_github_toolsets(&tool(
            "allowed: [search_code, list_workflow_runs]\ntoolsets: [issues]\n",
        ))
        .unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.contains("actions"), "{rendered}");
        assert!(rendered.contains("search"), "{rendered}");
    }

    #[test]
    fn unknown_tool_names_are_ignored() {
        check_github_toolsets(&tool("allowed: [frobnicate_widget]\ntoolsets: [issues]\n"))
            .unwrap();
    }

    #[test]
    fn missing_permission_is_a_warning_by_default() {
        let github = tool("toolsets: [issues]");
        let mut diagnostics = Diagnostics::new();
        check_toolset_permissions(&github, &Permissions::new(), false, &mut diagnostics).unwrap();
        assert_eq!(diagnostics.warning_count(), 1);
    }

    #[test]
    fn missing_permission_is_an_error_in_strict_mode() {
        let github = tool("toolsets: [issues]");
        let mut diagnostics = Diagnostics::new();
        let err =
            check_toolset_permissions(&github, &Permissions::new(), true, &mut diagnostics)
                .unwrap_err();
        assert!(err.to_string().contains("issues"), "{err}");
    }
}
