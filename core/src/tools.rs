//! Tool and MCP-server descriptors
//!
//! Tools are polymorphic over the transport set {stdio, http}; a stdio
//! server may additionally run inside a container. The discriminant is
//! inferred when not explicit: a `command` or `container` field implies
//! stdio, a `url` field implies http. Tools with neither are engine-native
//! or compiler-provided (cache-memory, web-fetch, ...) and render no MCP
//! server of their own.

use crate::error::{CompileError, Result};
use crate::permissions::{PermissionLevel, Permissions};
use std::collections::BTreeMap;
use std::path::Path;

/// Wire transport for an MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpTransport {
    Stdio,
    Http,
}

/// One tool or MCP-server descriptor from the `tools:` / `mcp-servers:`
/// front-matter, merged across imports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolSpec {
    /// Explicit `type:` override (`stdio` or `http`).
    pub mcp_type: Option<String>,
    pub command: Option<String>,
    pub args: Vec<String>,
    pub container: Option<String>,
    pub version: Option<String>,
    pub url: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub env: BTreeMap<String, String>,
    /// Allowed operation names exposed to the agent.
    pub allowed: Vec<String>,
    /// GitHub MCP toolsets to enable.
    pub toolsets: Vec<String>,
    /// Languages requested from a language-server tool (serena).
    pub languages: Vec<String>,
    /// GitHub MCP mode: `local` (container) or `remote` (hosted http).
    pub mode: Option<String>,
    pub github_token: Option<String>,
    /// Extra docker arguments for container servers.
    pub proxy_args: Vec<String>,
    pub read_only: bool,
}

impl ToolSpec {
    /// Parse one descriptor. `null` enables a tool with defaults.
    pub fn from_yaml(name: &str, value: &serde_yaml::Value) -> Result<Self> {
        let map = match value {
            serde_yaml::Value::Null => return Ok(Self::default()),
            serde_yaml::Value::Bool(true) => return Ok(Self::default()),
            serde_yaml::Value::Mapping(map) => map,
            other => {
                return Err(CompileError::validation(format!(
                    "tools.{name}: expected a mapping or null, got {other:?}"
                )));
            }
        };

        let mut spec = Self {
            mcp_type: str_field(map, "type"),
            command: str_field(map, "command"),
            args: str_list(map, "args"),
            container: str_field(map, "container"),
            version: str_field(map, "version"),
            url: str_field(map, "url"),
            headers: str_map(map, "headers"),
            env: str_map(map, "env"),
            allowed: str_list(map, "allowed"),
            toolsets: str_list(map, "toolsets"),
            languages: str_list(map, "languages"),
            mode: str_field(map, "mode"),
            github_token: str_field(map, "github-token"),
            proxy_args: str_list(map, "proxy-args"),
            read_only: map
                .get("read-only")
                .and_then(serde_yaml::Value::as_bool)
                .unwrap_or(false),
        };
        if let Some(t) = &spec.mcp_type {
            if t != "stdio" && t != "http" && t != "local" {
                return Err(CompileError::validation(format!(
                    "tools.{name}: unknown type '{t}' (expected stdio or http)"
                )));
            }
        }
        spec.allowed.sort();
        spec.allowed.dedup();
        Ok(spec)
    }

    /// Transport, inferred from fields when `type:` is absent.
    pub fn transport(&self) -> Option<McpTransport> {
        match self.mcp_type.as_deref() {
            Some("http") => return Some(McpTransport::Http),
            Some("stdio" | "local") => return Some(McpTransport::Stdio),
            _ => {}
        }
        if self.url.is_some() {
            Some(McpTransport::Http)
        } else if self.command.is_some() || self.container.is_some() {
            Some(McpTransport::Stdio)
        } else {
            None
        }
    }

    pub fn is_container(&self) -> bool {
        self.container.is_some()
    }

    /// Fold `other` into `self`. The first definition wins; a later
    /// definition may only add fields, never change one.
    pub fn merge_compatible(
        &mut self,
        other: &ToolSpec,
        name: &str,
        first_source: &Path,
        second_source: &Path,
    ) -> Result<()> {
        let conflict = |field: &str| {
            CompileError::import(format!(
                "tools.{name}: conflicting '{field}' between {} and {}; imports may add to a tool but not override it",
                first_source.display(),
                second_source.display()
            ))
        };

        merge_scalar(&mut self.mcp_type, &other.mcp_type).map_err(|_| conflict("type"))?;
        merge_scalar(&mut self.command, &other.command).map_err(|_| conflict("command"))?;
        merge_scalar(&mut self.container, &other.container).map_err(|_| conflict("container"))?;
        merge_scalar(&mut self.version, &other.version).map_err(|_| conflict("version"))?;
        merge_scalar(&mut self.url, &other.url).map_err(|_| conflict("url"))?;
        merge_scalar(&mut self.mode, &other.mode).map_err(|_| conflict("mode"))?;
        merge_scalar(&mut self.github_token, &other.github_token)
            .map_err(|_| conflict("github-token"))?;

        if self.args.is_empty() {
            self.args = other.args.clone();
        } else if !other.args.is_empty() && self.args != other.args {
            return Err(conflict("args"));
        }
        if self.proxy_args.is_empty() {
            self.proxy_args = other.proxy_args.clone();
        } else if !other.proxy_args.is_empty() && self.proxy_args != other.proxy_args {
            return Err(conflict("proxy-args"));
        }

        merge_map(&mut self.headers, &other.headers).map_err(|key| {
            CompileError::import(format!(
                "tools.{name}: conflicting header '{key}' between {} and {}",
                first_source.display(),
                second_source.display()
            ))
        })?;
        merge_map(&mut self.env, &other.env).map_err(|key| {
            CompileError::import(format!(
                "tools.{name}: conflicting env '{key}' between {} and {}",
                first_source.display(),
                second_source.display()
            ))
        })?;

        // Allowed operations and toolsets union.
        self.allowed.extend(other.allowed.iter().cloned());
        self.allowed.sort();
        self.allowed.dedup();
        for toolset in &other.toolsets {
            if !self.toolsets.contains(toolset) {
                self.toolsets.push(toolset.clone());
            }
        }
        for language in &other.languages {
            if !self.languages.contains(language) {
                self.languages.push(language.clone());
            }
        }
        self.read_only = self.read_only || other.read_only;
        Ok(())
    }

    /// Permissions the workflow needs for this tool to function.
    pub fn required_permissions(&self, name: &str) -> Permissions {
        let mut permissions = Permissions::new();
        if name == "github" {
            permissions.grant("contents", PermissionLevel::Read);
            for toolset in self.effective_toolsets() {
                match toolset.as_str() {
                    "issues" | "labels" => permissions.grant("issues", PermissionLevel::Read),
                    "pull_requests" => {
                        permissions.grant("pull-requests", PermissionLevel::Read);
                    }
                    "discussions" => permissions.grant("discussions", PermissionLevel::Read),
                    "actions" => permissions.grant("actions", PermissionLevel::Read),
                    "code_security" | "security_advisories" => {
                        permissions.grant("security-events", PermissionLevel::Read);
                    }
                    _ => {}
                }
            }
        }
        permissions
    }

    /// Toolsets with the default set applied when the author named none.
    pub fn effective_toolsets(&self) -> Vec<String> {
        if self.toolsets.is_empty() {
            DEFAULT_GITHUB_TOOLSETS
                .iter()
                .map(|s| (*s).to_string())
                .collect()
        } else {
            self.toolsets.clone()
        }
    }
}

fn merge_scalar(
    first: &mut Option<String>,
    second: &Option<String>,
) -> std::result::Result<(), ()> {
    match (&first, second) {
        (None, Some(v)) => {
            *first = Some(v.clone());
            Ok(())
        }
        (Some(a), Some(b)) if *a != *b => Err(()),
        _ => Ok(()),
    }
}

fn merge_map(
    first: &mut BTreeMap<String, String>,
    second: &BTreeMap<String, String>,
) -> std::result::Result<(), String> {
    for (key, value) in second {
        match first.get(key) {
            None => {
                first.insert(key.clone(), value.clone());
            }
            Some(existing) if existing != value => return Err(key.clone()),
            Some(_) => {}
        }
    }
    Ok(())
}

fn str_field(map: &serde_yaml::Mapping, key: &str) -> Option<String> {
    map.get(key)
        .and_then(serde_yaml::Value::as_str)
        .map(str::to_string)
}

fn str_list(map: &serde_yaml::Mapping, key: &str) -> Vec<String> {
    match map.get(key) {
        Some(serde_yaml::Value::Sequence(seq)) => seq
            .iter()
            .filter_map(serde_yaml::Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn str_map(map: &serde_yaml::Mapping, key: &str) -> BTreeMap<String, String> {
    match map.get(key) {
        Some(serde_yaml::Value::Mapping(raw)) => raw
            .iter()
            .filter_map(|(k, v)| Some((k.as_str()?.to_string(), v.as_str()?.to_string())))
            .collect(),
        _ => BTreeMap::new(),
    }
}

/// Toolsets enabled when `tools.github` names none.
pub const DEFAULT_GITHUB_TOOLSETS: &[&str] = &["context", "repos", "issues", "pull_requests"];

/// GitHub MCP tool name -> toolset that must be enabled for it.
pub const GITHUB_TOOL_TOOLSETS: &[(&str, &str)] = &[
    ("add_issue_comment", "issues"),
    ("add_sub_issue", "issues"),
    ("create_issue", "issues"),
    ("get_issue", "issues"),
    ("list_issues", "issues"),
    ("update_issue", "issues"),
    ("create_pull_request", "pull_requests"),
    ("create_pull_request_review", "pull_requests"),
    ("get_pull_request", "pull_requests"),
    ("get_pull_request_diff", "pull_requests"),
    ("list_pull_requests", "pull_requests"),
    ("merge_pull_request", "pull_requests"),
    ("request_copilot_review", "pull_requests"),
    ("update_pull_request", "pull_requests"),
    ("create_branch", "repos"),
    ("create_or_update_file", "repos"),
    ("get_file_contents", "repos"),
    ("list_branches", "repos"),
    ("list_commits", "repos"),
    ("push_files", "repos"),
    ("create_discussion", "discussions"),
    ("get_discussion", "discussions"),
    ("list_discussions", "discussions"),
    ("download_workflow_run_artifact", "actions"),
    ("get_workflow_run", "actions"),
    ("list_workflow_runs", "actions"),
    ("rerun_workflow_run", "actions"),
    ("get_code_scanning_alert", "code_security"),
    ("list_code_scanning_alerts", "code_security"),
    ("get_me", "context"),
    ("search_code", "search"),
    ("search_issues", "search"),
    ("search_pull_requests", "search"),
    ("search_repositories", "search"),
    ("get_label", "labels"),
    ("list_labels", "labels"),
    ("list_notifications", "notifications"),
];

/// Toolset required for a GitHub MCP tool name, if known.
pub fn toolset_for_github_tool(tool: &str) -> Option<&'static str> {
    GITHUB_TOOL_TOOLSETS
        .iter()
        .find(|(name, _)| *name == tool)
        .map(|(_, toolset)| *toolset)
}
