//! Merged workflow configuration
//!
//! [`WorkflowSpec`] is the single typed product of parsing and importing.
//! The root file's keys are set first, then each import's contribution is
//! folded in with key-specific rules: permission union (strongest level
//! wins), tool merge by name (first definition wins, later definitions may
//! only add), first-writer-wins for the engine. Everything else comes from
//! the root alone.

use crate::engine::EngineConfig;
use crate::error::{CompileError, Result};
use crate::frontmatter::ParsedSource;
use crate::imports::Resolution;
use crate::permissions::Permissions;
use crate::safe_outputs::SafeOutputsConfig;
use crate::tools::ToolSpec;
use crate::triggers::Triggers;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Agent sandbox and MCP gateway container settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxConfig {
    /// Whether the agent process runs inside the sandbox container.
    pub agent_enabled: bool,
    pub agent_type: Option<String>,
    pub mcp_container: Option<String>,
    pub mcp_version: Option<String>,
    pub mcp_port: Option<u16>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            agent_enabled: true,
            agent_type: None,
            mcp_container: None,
            mcp_version: None,
            mcp_port: None,
        }
    }
}

impl SandboxConfig {
    fn from_yaml(value: &serde_yaml::Value) -> Result<Self> {
        let map = match value {
            serde_yaml::Value::Mapping(map) => map,
            // `sandbox: true` / `sandbox: false` is ambiguous about which
            // sandbox it means; the agent and gateway are configured
            // separately.
            serde_yaml::Value::Bool(_) => {
                return Err(CompileError::validation(
                    "sandbox: top-level boolean is not supported; use sandbox.agent or sandbox.mcp",
                ));
            }
            other => {
                return Err(CompileError::validation(format!(
                    "sandbox: expected a mapping, got {other:?}"
                )));
            }
        };

        let mut config = Self::default();
        if let Some(agent) = map.get("agent") {
            match agent {
                serde_yaml::Value::Bool(enabled) => config.agent_enabled = *enabled,
                serde_yaml::Value::Mapping(agent_map) => {
                    if let Some(disabled) =
                        agent_map.get("disabled").and_then(serde_yaml::Value::as_bool)
                    {
                        config.agent_enabled = !disabled;
                    }
                    config.agent_type = agent_map
                        .get("type")
                        .and_then(serde_yaml::Value::as_str)
                        .map(str::to_string);
                }
                other => {
                    return Err(CompileError::validation(format!(
                        "sandbox.agent: expected bool or mapping, got {other:?}"
                    )));
                }
            }
        }
        if let Some(serde_yaml::Value::Mapping(mcp)) = map.get("mcp") {
            config.mcp_container = mcp
                .get("container")
                .and_then(serde_yaml::Value::as_str)
                .map(str::to_string);
            config.mcp_version = mcp
                .get("version")
                .and_then(serde_yaml::Value::as_str)
                .map(str::to_string);
            config.mcp_port = mcp
                .get("port")
                .and_then(serde_yaml::Value::as_u64)
                .map(|p| p as u16);
        }
        Ok(config)
    }
}

/// Egress control for the agent job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkConfig {
    pub allowed: Vec<String>,
    pub firewall_enabled: Option<bool>,
    pub firewall_version: Option<String>,
    pub firewall_log_level: Option<String>,
}

impl NetworkConfig {
    fn from_yaml(value: &serde_yaml::Value) -> Result<Self> {
        let serde_yaml::Value::Mapping(map) = value else {
            return Err(CompileError::validation(format!(
                "network: expected a mapping, got {value:?}"
            )));
        };
        let mut config = Self {
            allowed: match map.get("allowed") {
                Some(serde_yaml::Value::Sequence(seq)) => seq
                    .iter()
                    .filter_map(serde_yaml::Value::as_str)
                    .map(str::to_string)
                    .collect(),
                _ => Vec::new(),
            },
            ..Self::default()
        };
        match map.get("firewall") {
            None => {}
            Some(serde_yaml::Value::Bool(enabled)) => config.firewall_enabled = Some(*enabled),
            Some(serde_yaml::Value::Mapping(fw)) => {
                config.firewall_enabled =
                    fw.get("enabled").and_then(serde_yaml::Value::as_bool).or(Some(true));
                config.firewall_version = fw
                    .get("version")
                    .and_then(serde_yaml::Value::as_str)
                    .map(str::to_string);
                config.firewall_log_level = fw
                    .get("log-level")
                    .and_then(serde_yaml::Value::as_str)
                    .map(str::to_string);
            }
            Some(other) => {
                return Err(CompileError::validation(format!(
                    "network.firewall: expected bool or mapping, got {other:?}"
                )));
            }
        }
        Ok(config)
    }
}

/// An engine plugin installed by the engine CLI before the agent runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginSpec {
    pub id: String,
    pub env: BTreeMap<String, String>,
}

/// A `skip-if-match` / `skip-if-no-match` search gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipQuery {
    pub query: String,
    pub min: Option<u32>,
}

impl SkipQuery {
    fn from_yaml(key: &str, value: &serde_yaml::Value) -> Result<Self> {
        match value {
            serde_yaml::Value::String(query) => Ok(Self {
                query: query.clone(),
                min: None,
            }),
            serde_yaml::Value::Mapping(map) => Ok(Self {
                query: map
                    .get("query")
                    .and_then(serde_yaml::Value::as_str)
                    .ok_or_else(|| {
                        CompileError::validation(format!("{key}: mapping form requires query"))
                    })?
                    .to_string(),
                min: map
                    .get("min")
                    .and_then(serde_yaml::Value::as_u64)
                    .map(|n| n as u32),
            }),
            other => Err(CompileError::validation(format!(
                "{key}: expected a query string or mapping, got {other:?}"
            ))),
        }
    }
}

/// Roles allowed to trigger the workflow when role gating is on.
pub const DEFAULT_ROLES: &[&str] = &["admin", "maintainer", "write"];

/// The merged, typed workflow configuration.
#[derive(Debug, Clone)]
pub struct WorkflowSpec {
    pub source_path: PathBuf,
    pub name: String,
    pub description: Option<String>,
    pub triggers: Triggers,
    pub engine: EngineConfig,
    /// Explicit permissions unioned with tool-required permissions. These
    /// become the agent job's permissions; top-level stays `{}`.
    pub permissions: Permissions,
    pub tools: BTreeMap<String, ToolSpec>,
    pub mcp_servers: BTreeMap<String, ToolSpec>,
    pub plugins: Vec<PluginSpec>,
    pub safe_outputs: SafeOutputsConfig,
    pub sandbox: SandboxConfig,
    pub network: NetworkConfig,
    pub runs_on: serde_yaml::Value,
    pub strict: bool,
    pub concurrency: Option<serde_yaml::Value>,
    pub run_name: Option<String>,
    pub env: BTreeMap<String, String>,
    pub stop_after: Option<String>,
    pub skip_if_match: Option<SkipQuery>,
    pub skip_if_no_match: Option<SkipQuery>,
    pub roles: Vec<String>,
    pub features: BTreeMap<String, serde_yaml::Value>,
    /// Extra reusable-workflow jobs appended verbatim (after secret
    /// expression validation).
    pub extra_jobs: serde_yaml::Mapping,
    pub timeout_minutes: Option<u32>,
    pub manual_approval: Option<String>,
    /// Name of the main agent job.
    pub agent_job_name: String,
}

impl WorkflowSpec {
    /// Build the merged configuration from a resolved import tree.
    pub fn from_resolution(
        resolution: &Resolution,
        schedule_cache: &mut BTreeMap<String, String>,
    ) -> Result<Self> {
        let root = &resolution.root;
        let fm = &root.frontmatter;

        let name = get_str(fm, "name").unwrap_or_else(|| default_name(&root.path));
        let triggers = match fm.get("on") {
            Some(value) => Triggers::from_yaml(value, schedule_cache)?,
            None => Triggers::default(),
        };

        let mut spec = Self {
            source_path: root.path.clone(),
            name,
            description: get_str(fm, "description"),
            triggers,
            engine: EngineConfig::default(),
            permissions: Permissions::new(),
            tools: BTreeMap::new(),
            mcp_servers: BTreeMap::new(),
            plugins: parse_plugins(fm)?,
            safe_outputs: match fm.get("safe-outputs") {
                Some(value) => SafeOutputsConfig::from_yaml(value)?,
                None => SafeOutputsConfig::default(),
            },
            sandbox: match fm.get("sandbox") {
                Some(value) => SandboxConfig::from_yaml(value)?,
                None => SandboxConfig::default(),
            },
            network: match fm.get("network") {
                Some(value) => NetworkConfig::from_yaml(value)?,
                None => NetworkConfig::default(),
            },
            runs_on: fm
                .get("runs-on")
                .cloned()
                .unwrap_or_else(|| serde_yaml::Value::String("ubuntu-latest".into())),
            strict: fm
                .get("strict")
                .and_then(serde_yaml::Value::as_bool)
                .unwrap_or(false),
            concurrency: fm.get("concurrency").cloned(),
            run_name: get_str(fm, "run-name"),
            env: str_map(fm, "env"),
            stop_after: get_str(fm, "stop-after"),
            skip_if_match: fm
                .get("skip-if-match")
                .map(|v| SkipQuery::from_yaml("skip-if-match", v))
                .transpose()?,
            skip_if_no_match: fm
                .get("skip-if-no-match")
                .map(|v| SkipQuery::from_yaml("skip-if-no-match", v))
                .transpose()?,
            roles: parse_roles(fm)?,
            features: match fm.get("features") {
                Some(serde_yaml::Value::Mapping(map)) => map
                    .iter()
                    .filter_map(|(k, v)| Some((k.as_str()?.to_string(), v.clone())))
                    .collect(),
                _ => BTreeMap::new(),
            },
            extra_jobs: match fm.get("jobs") {
                Some(serde_yaml::Value::Mapping(map)) => map.clone(),
                _ => serde_yaml::Mapping::new(),
            },
            timeout_minutes: fm
                .get("timeout-minutes")
                .and_then(serde_yaml::Value::as_u64)
                .map(|n| n as u32),
            manual_approval: get_str(fm, "manual-approval"),
            agent_job_name: "agent".to_string(),
        };

        // Explicit permissions from the root.
        if let Some(value) = fm.get("permissions") {
            spec.permissions = Permissions::from_yaml(value)?;
        }

        // Fold the root's own tools first, then each import in manifest
        // (topological) order. First definition wins per tool name.
        let mut first_definition: BTreeMap<String, PathBuf> = BTreeMap::new();
        let mut engine_declared = false;
        spec.fold_tools(root, &mut first_definition)?;
        spec.fold_engine(root, &mut engine_declared)?;
        for file in &resolution.files {
            if file.path == root.path {
                continue;
            }
            spec.fold_tools(file, &mut first_definition)?;
            spec.fold_engine(file, &mut engine_declared)?;
            if let Some(value) = file.frontmatter.get("permissions") {
                spec.permissions.merge(&Permissions::from_yaml(value)?);
            }
        }

        // Union in what the configured tools themselves require.
        let tool_permissions: Vec<Permissions> = spec
            .tools
            .iter()
            .map(|(name, tool)| tool.required_permissions(name))
            .collect();
        for required in tool_permissions {
            spec.permissions.merge(&required);
        }

        Ok(spec)
    }

    fn fold_tools(
        &mut self,
        file: &ParsedSource,
        first_definition: &mut BTreeMap<String, PathBuf>,
    ) -> Result<()> {
        for (section, store) in [("tools", true), ("mcp-servers", false)] {
            let Some(serde_yaml::Value::Mapping(map)) = file.frontmatter.get(section) else {
                continue;
            };
            for (key, value) in map {
                let name = key.as_str().ok_or_else(|| {
                    CompileError::validation(format!(
                        "{}: {section} names must be strings",
                        file.path.display()
                    ))
                })?;
                let incoming = ToolSpec::from_yaml(name, value)?;
                let tools = if store {
                    &mut self.tools
                } else {
                    &mut self.mcp_servers
                };
                match tools.get_mut(name) {
                    None => {
                        tools.insert(name.to_string(), incoming);
                        first_definition.insert(format!("{section}.{name}"), file.path.clone());
                    }
                    Some(existing) => {
                        let first = first_definition
                            .get(&format!("{section}.{name}"))
                            .cloned()
                            .unwrap_or_else(|| file.path.clone());
                        existing.merge_compatible(&incoming, name, &first, &file.path)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn fold_engine(&mut self, file: &ParsedSource, declared: &mut bool) -> Result<()> {
        // First writer wins; distinct declarations were already rejected
        // during import resolution.
        if *declared {
            return Ok(());
        }
        if let Some(value) = file.frontmatter.get("engine") {
            self.engine = EngineConfig::from_yaml(value)?;
            *declared = true;
        }
        Ok(())
    }

    /// Tools and advanced MCP servers, one namespace for rendering.
    pub fn all_mcp_tools(&self) -> impl Iterator<Item = (&String, &ToolSpec)> {
        self.tools.iter().chain(self.mcp_servers.iter())
    }

    /// Whether role gating applies (an explicit `roles: all` disables it).
    pub fn role_check_enabled(&self) -> bool {
        !(self.roles.len() == 1 && self.roles[0] == "all")
    }
}

fn default_name(path: &std::path::Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "workflow".to_string())
}

fn get_str(map: &serde_yaml::Mapping, key: &str) -> Option<String> {
    map.get(key).and_then(serde_yaml::Value::as_str).map(str::to_string)
}

fn str_map(map: &serde_yaml::Mapping, key: &str) -> BTreeMap<String, String> {
    match map.get(key) {
        Some(serde_yaml::Value::Mapping(raw)) => raw
            .iter()
            .filter_map(|(k, v)| {
                let key = k.as_str()?.to_string();
                let value = match v {
                    serde_yaml::Value::String(s) => s.clone(),
                    serde_yaml::Value::Number(n) => n.to_string(),
                    serde_yaml::Value::Bool(b) => b.to_string(),
                    _ => return None,
                };
                Some((key, value))
            })
            .collect(),
        _ => BTreeMap::new(),
    }
}

fn parse_plugins(fm: &serde_yaml::Mapping) -> Result<Vec<PluginSpec>> {
    let Some(value) = fm.get("plugins") else {
        return Ok(Vec::new());
    };
    let serde_yaml::Value::Sequence(entries) = value else {
        return Err(CompileError::validation("plugins: expected a sequence"));
    };
    let mut plugins = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry {
            serde_yaml::Value::String(id) => plugins.push(PluginSpec {
                id: id.clone(),
                env: BTreeMap::new(),
            }),
            serde_yaml::Value::Mapping(map) => {
                let id = map
                    .get("id")
                    .and_then(serde_yaml::Value::as_str)
                    .ok_or_else(|| CompileError::validation("plugins: entry needs an id"))?
                    .to_string();
                let env = match map.get("mcp") {
                    Some(serde_yaml::Value::Mapping(mcp)) => match mcp.get("env") {
                        Some(serde_yaml::Value::Mapping(raw)) => raw
                            .iter()
                            .filter_map(|(k, v)| {
                                Some((k.as_str()?.to_string(), v.as_str()?.to_string()))
                            })
                            .collect(),
                        _ => BTreeMap::new(),
                    },
                    _ => BTreeMap::new(),
                };
                plugins.push(PluginSpec { id, env });
            }
            other => {
                return Err(CompileError::validation(format!(
                    "plugins: unsupported entry {other:?}"
                )));
            }
        }
    }
    Ok(plugins)
}

fn parse_roles(fm: &serde_yaml::Mapping) -> Result<Vec<String>> {
    match fm.get("roles") {
        None => Ok(DEFAULT_ROLES.iter().map(|s| (*s).to_string()).collect()),
        Some(serde_yaml::Value::String(role)) => Ok(vec![role.clone()]),
        Some(serde_yaml::Value::Sequence(seq)) => Ok(seq
            .iter()
            .filter_map(serde_yaml::Value::as_str)
            .map(str::to_string)
            .collect()),
        Some(other) => Err(CompileError::validation(format!(
            "roles: expected a role name or sequence, got {other:?}"
        ))),
    }
}
