//! Engine capability checks
//!
//! Requested features are compared against the chosen engine's capability
//! record. An unsupported `max-turns` is fatal (the run would silently
//! ignore it); an unsupported `web-search` degrades to a warning unless
//! strict mode promotes it.

use crate::diagnostics::Diagnostics;
use crate::error::{CompileError, Result};
use crate::workflow::WorkflowSpec;

pub fn check_engine_features(spec: &WorkflowSpec, diagnostics: &mut Diagnostics) -> Result<()> {
    let capabilities = spec.engine.capabilities();
    let engine_id = spec.engine.kind.as_str();

    if spec.engine.max_turns.is_some() && !capabilities.supports_max_turns {
        return Err(CompileError::validation(format!(
            "engine: {engine_id} does not support max-turns"
        )));
    }

    if spec.tools.contains_key("web-search") && !capabilities.supports_web_search {
        let message =
            format!("tools.web-search: engine {engine_id} has no web search support; the tool will be unavailable");
        if spec.strict {
            return Err(CompileError::validation(message));
        }
        diagnostics.warn(message);
    }

    let has_allowlist = spec.tools.values().any(|t| !t.allowed.is_empty());
    if has_allowlist && !capabilities.supports_tools_allowlist {
        diagnostics.warn(format!(
            "tools: engine {engine_id} does not enforce per-tool allowlists; allowed: lists are advisory for this engine"
        ));
    }

    let has_http = spec
        .all_mcp_tools()
        .any(|(_, t)| t.transport() == Some(crate::tools::McpTransport::Http));
    if has_http && !capabilities.supports_http_transport {
        return Err(CompileError::validation(format!(
            "mcp: engine {engine_id} does not support http MCP servers"
        )));
    }

    if capabilities.experimental {
        diagnostics.warn(format!("engine: {engine_id} support is experimental"));
    }

    Ok(())
}

/// Write-level permissions on the agent job hand the model real power;
/// surface that unless the author opted in explicitly.
pub fn check_permission_features(spec: &WorkflowSpec, diagnostics: &mut Diagnostics) {
    let opted_in = spec
        .features
        .get("dangerous-permissions-write")
        .and_then(serde_yaml::Value::as_bool)
        .unwrap_or(false);
    if opted_in {
        return;
    }
    let write_scopes: Vec<&str> = spec
        .permissions
        .iter()
        .filter(|(_, level)| *level == crate::permissions::PermissionLevel::Write)
        .map(|(scope, _)| scope)
        .collect();
    if !write_scopes.is_empty() {
        diagnostics.warn(format!(
            "permissions: agent job has write access to {}; set features.dangerous-permissions-write to acknowledge",
            write_scopes.join(", ")
        ));
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::imports::ImportResolver;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    fn build(frontmatter: &str) -> WorkflowSpec {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wf.md");
        fs::write(&path, format!("---\n{frontmatter}---\nBody\n")).unwrap();
        let resolution = ImportResolver::new().resolve(&path).unwrap();
        let mut cache = BTreeMap::new();
        WorkflowSpec::from_resolution(&resolution, &mut cache).unwrap()
    }

    #[test]
    fn max_turns_on_claude_passes() {
        let spec = build("on: issues\nengine:\n  id: claude\n  max-turns: 5\n");
        let mut diagnostics = Diagnostics::new();
        check_engine_features(&spec, &mut diagnostics).unwrap();
    }

    #[test]
    fn max_turns_on_codex_is_fatal() {
        let spec = build("on: issues\nengine:\n  id: codex\n  max-turns: 5\n");
        let mut diagnostics = Diagnostics::new();
        let err = check_engine_features(&spec, &mut diagnostics).unwrap_err();
        assert!(err.to_string().contains("max-turns"), "{err}");
    }

    #[test]
    fn web_search_on_copilot_is_a_warning() {
        let spec = build("on: issues\nengine: copilot\ntools:\n  web-search:\n");
        let mut diagnostics = Diagnostics::new();
        check_engine_features(&spec, &mut diagnostics).unwrap();
        assert_eq!(diagnostics.warning_count(), 1);
    }

    #[test]
    fn web_search_warning_promotes_in_strict_mode() {
        let spec = build("on: issues\nengine: copilot\nstrict: true\ntools:\n  web-search:\n");
        let mut diagnostics = Diagnostics::new();
        let err = check_engine_features(&spec, &mut diagnostics).unwrap_err();
        assert!(err.to_string().contains("web search"), "{err}");
    }

    #[test]
    fn write_permissions_warn_without_feature_flag() {
        let spec = build("on: issues\nengine: claude\npermissions:\n  issues: write\n");
        let mut diagnostics = Diagnostics::new();
        check_permission_features(&spec, &mut diagnostics);
        assert_eq!(diagnostics.warning_count(), 1);
        assert!(diagnostics.warnings()[0].message.contains("issues"));
    }

    #[test]
    fn write_permissions_are_silent_with_feature_flag() {
        let spec = build(
            "on: issues\nengine: claude\npermissions:\n  issues: write\nfeatures:\n  dangerous-permissions-write: true\n",
        );
        let mut diagnostics = Diagnostics::new();
        check_permission_features(&spec, &mut diagnostics);
        assert_eq!(diagnostics.warning_count(), 0);
    }

    #[test]
    fn gemini_is_flagged_experimental() {
        let spec = build("on: issues\nengine: gemini\n");
        let mut diagnostics = Diagnostics::new();
        check_engine_features(&spec, &mut diagnostics).unwrap();
        assert!(
            diagnostics
                .warnings()
                .iter()
                .any(|w| w.message.contains("experimental")),
        );
    }
}
