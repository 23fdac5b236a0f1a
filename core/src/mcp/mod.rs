//! MCP server configuration rendering
//!
//! For each engine the renderer walks the merged tool set and produces the
//! JSON document written to `/tmp/gh-aw/mcp-config/mcp-servers.json` and
//! consumed by the gateway at run time. Well-known tools (github,
//! playwright, serena, safe-outputs, ...) get their canonical server
//! blocks; user-defined descriptors render as plain stdio or http servers.
//! Engine-native tools (web-fetch, web-search, bash, edit) render nothing.

pub mod gateway;

use crate::error::{CompileError, Result};
use crate::tools::{McpTransport, ToolSpec};
use crate::workflow::WorkflowSpec;
use gateway::{HoistedSecret, hoist_header_secrets};
use serde_json::{Map, Value, json};

/// Where the agent writes safe-output requests.
pub const SAFE_OUTPUTS_PATH: &str = "/tmp/gh-aw/safe-outputs/outputs.jsonl";
/// Where the rendered server configuration lands.
pub const MCP_CONFIG_PATH: &str = "/tmp/gh-aw/mcp-config/mcp-servers.json";
/// Shared filesystem for the cache-memory tool; no server involved.
pub const CACHE_MEMORY_DIR: &str = "/tmp/gh-aw/cache-memory";
/// Fixed port for serena's local http mode.
const SERENA_LOCAL_PORT: u16 = 24282;

/// Default token chain for the GitHub MCP server.
const GITHUB_MCP_TOKEN_CHAIN: &str =
    "${{ secrets.GH_AW_GITHUB_MCP_SERVER_TOKEN || secrets.GH_AW_GITHUB_TOKEN || secrets.GITHUB_TOKEN }}";

/// Tools the engine provides natively; they never become MCP servers.
const ENGINE_NATIVE_TOOLS: &[&str] = &["bash", "edit", "web-fetch", "web-search"];

/// The rendered MCP configuration plus everything the gateway step needs.
#[derive(Debug)]
pub struct McpRender {
    /// The `mcp-servers.json` document.
    pub config: Value,
    /// Header secrets hoisted into the gateway's env block.
    pub hoisted: Vec<HoistedSecret>,
    /// Whether any server was rendered at all.
    pub has_servers: bool,
    /// Whether the cache-memory filesystem is in use.
    pub uses_cache_memory: bool,
}

/// Render the MCP configuration for a workflow.
pub fn render_mcp_config(spec: &WorkflowSpec) -> Result<McpRender> {
    let mut servers = Map::new();
    let mut hoisted = Vec::new();
    let mut uses_cache_memory = false;

    // BTreeMap iteration gives deterministic server order.
    for (name, tool) in spec.all_mcp_tools() {
        match name.as_str() {
            "github" => {
                servers.insert("github".into(), render_github(tool));
            }
            "playwright" => {
                servers.insert("playwright".into(), render_playwright(tool));
            }
            "serena" => {
                servers.insert("serena".into(), render_serena(tool));
            }
            "cache-memory" => {
                uses_cache_memory = true;
            }
            "agentic-workflows" => {
                servers.insert(
                    "agentic-workflows".into(),
                    node_server("/opt/gh-aw/actions/agentic_workflows_mcp.cjs", &[]),
                );
            }
            "safe-inputs" => {
                servers.insert(
                    "safe-inputs".into(),
                    node_server("/opt/gh-aw/actions/safe_inputs_mcp.cjs", &[]),
                );
            }
            _ if ENGINE_NATIVE_TOOLS.contains(&name.as_str()) => {}
            _ => {
                if let Some(server) = render_custom(name, tool, &mut hoisted)? {
                    servers.insert(name.clone(), server);
                }
            }
        }
    }

    // The safe-outputs server is implied by any enabled sink.
    if spec.safe_outputs.has_sinks() {
        servers.insert(
            "safe-outputs".into(),
            node_server(
                "/opt/gh-aw/actions/safe_outputs_mcp.cjs",
                &[("GH_AW_SAFE_OUTPUTS", SAFE_OUTPUTS_PATH)],
            ),
        );
    }

    let has_servers = !servers.is_empty();
    Ok(McpRender {
        config: json!({ "mcpServers": Value::Object(servers) }),
        hoisted,
        has_servers,
        uses_cache_memory,
    })
}

/// GitHub MCP server: local container by default, hosted http when
/// `mode: remote`.
fn render_github(tool: &ToolSpec) -> Value {
    let token = tool
        .github_token
        .clone()
        .unwrap_or_else(|| GITHUB_MCP_TOKEN_CHAIN.to_string());
    let toolsets = tool.effective_toolsets().join(",");

    if tool.mode.as_deref() == Some("remote") {
        return json!({
            "type": "http",
            "url": "https://api.githubcopilot.com/mcp/",
            "headers": { "Authorization": format!("Bearer {token}") },
        });
    }

    let image = format!(
        "ghcr.io/github/github-mcp-server:{}",
        tool.version.as_deref().unwrap_or("latest")
    );
    let mut args = vec![
        "run".to_string(),
        "--rm".to_string(),
        "-i".to_string(),
        "--network".to_string(),
        "host".to_string(),
        "-e".to_string(),
        "GITHUB_PERSONAL_ACCESS_TOKEN".to_string(),
        "-e".to_string(),
        "GITHUB_TOOLSETS".to_string(),
    ];
    if tool.read_only {
        args.push("-e".to_string());
        args.push("GITHUB_READ_ONLY".to_string());
    }
    args.extend(tool.proxy_args.iter().cloned());
    args.push(image);

    let mut env = Map::new();
    env.insert("GITHUB_PERSONAL_ACCESS_TOKEN".into(), json!(token));
    env.insert("GITHUB_TOOLSETS".into(), json!(toolsets));
    if tool.read_only {
        env.insert("GITHUB_READ_ONLY".into(), json!("1"));
    }

    json!({
        "type": "stdio",
        "command": "docker",
        "args": args,
        "env": Value::Object(env),
    })
}

fn render_playwright(tool: &ToolSpec) -> Value {
    let package = match &tool.version {
        Some(version) => format!("@playwright/mcp@{version}"),
        None => "@playwright/mcp@latest".to_string(),
    };
    json!({
        "type": "stdio",
        "command": "npx",
        "args": ["-y", package, "--output-dir", "/tmp/gh-aw/playwright"],
    })
}

/// Serena language server: docker mode with an image chosen from the union
/// of requested languages, or an already-running local http endpoint.
fn render_serena(tool: &ToolSpec) -> Value {
    if tool.mcp_type.as_deref() == Some("http") || tool.url.is_some() {
        let url = tool
            .url
            .clone()
            .unwrap_or_else(|| format!("http://127.0.0.1:{SERENA_LOCAL_PORT}/mcp"));
        return json!({ "type": "http", "url": url });
    }

    let mut languages = tool.languages.clone();
    languages.sort();
    languages.dedup();
    let tag = if languages.is_empty() {
        "latest".to_string()
    } else {
        languages.join("-")
    };
    let image = format!("ghcr.io/oraios/serena:{tag}");
    json!({
        "type": "stdio",
        "command": "docker",
        "args": [
            "run", "--rm", "-i",
            "--network", "host",
            "-v", "${GITHUB_WORKSPACE}:${GITHUB_WORKSPACE}:rw",
            image,
            "serena", "start-mcp-server",
            "--context", "agent",
            "--project", "${GITHUB_WORKSPACE}",
        ],
    })
}

/// User-defined descriptor: stdio command/container or http url.
fn render_custom(
    name: &str,
    tool: &ToolSpec,
    hoisted: &mut Vec<HoistedSecret>,
) -> Result<Option<Value>> {
    match tool.transport() {
        None => Ok(None),
        Some(McpTransport::Http) => {
            let url = tool.url.clone().ok_or_else(|| {
                CompileError::validation(format!("tools.{name}: http servers require a url"))
            })?;
            let headers = hoist_header_secrets(&tool.headers, hoisted);
            let mut server = Map::new();
            server.insert("type".into(), json!("http"));
            server.insert("url".into(), json!(url));
            if !headers.is_empty() {
                server.insert("headers".into(), json!(headers));
            }
            Ok(Some(Value::Object(server)))
        }
        Some(McpTransport::Stdio) => {
            let mut server = Map::new();
            server.insert("type".into(), json!("stdio"));
            if let Some(container) = &tool.container {
                let mut args = vec![
                    "run".to_string(),
                    "--rm".to_string(),
                    "-i".to_string(),
                    "--network".to_string(),
                    "host".to_string(),
                    "-v".to_string(),
                    "${GITHUB_WORKSPACE}:${GITHUB_WORKSPACE}:rw".to_string(),
                ];
                for key in tool.env.keys() {
                    args.push("-e".to_string());
                    args.push(key.clone());
                }
                args.extend(tool.proxy_args.iter().cloned());
                args.push(match &tool.version {
                    Some(version) => format!("{container}:{version}"),
                    None => container.clone(),
                });
                args.extend(tool.args.iter().cloned());
                server.insert("command".into(), json!("docker"));
                server.insert("args".into(), json!(args));
            } else if let Some(command) = &tool.command {
                server.insert("command".into(), json!(command));
                if !tool.args.is_empty() {
                    server.insert("args".into(), json!(tool.args));
                }
            } else {
                return Err(CompileError::validation(format!(
                    "tools.{name}: stdio servers require a command or container"
                )));
            }
            if !tool.env.is_empty() {
                server.insert("env".into(), json!(tool.env));
            }
            Ok(Some(Value::Object(server)))
        }
    }
}

fn node_server(script: &str, env: &[(&str, &str)]) -> Value {
    let mut server = Map::new();
    server.insert("type".into(), json!("stdio"));
    server.insert("command".into(), json!("node"));
    server.insert("args".into(), json!([script]));
    if !env.is_empty() {
        let env: Map<String, Value> = env
            .iter()
            .map(|(k, v)| ((*k).to_string(), json!(v)))
            .collect();
        server.insert("env".into(), Value::Object(env));
    }
    Value::Object(server)
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
    fn github_local_renders_docker_with_token_chain() {
        let spec = build("on: issues\ntools:\n  github:\n    allowed: [create_issue]\n");
        let render = render_mcp_config(&spec).unwrap();
        let github = &render.config["mcpServers"]["github"];
        assert_eq!(github["command"], "docker");
        let env = github["env"]["GITHUB_PERSONAL_ACCESS_TOKEN"].as_str().unwrap();
        assert!(env.contains("GH_AW_GITHUB_MCP_SERVER_TOKEN"), "{env}");
        assert!(env.contains("GITHUB_TOKEN"), "{env}");
    }

    #[test]
    fn github_token_override_wins() {
        let spec = build(
            "on: issues\ntools:\n  github:\n    github-token: ${{ secrets.CUSTOM_PAT }}\n",
        );
        let render = render_mcp_config(&spec).unwrap();
        let env = render.config["mcpServers"]["github"]["env"]["GITHUB_PERSONAL_ACCESS_TOKEN"]
            .as_str()
            .unwrap();
        assert_eq!(env, "${{ secrets.CUSTOM_PAT }}");
    }

    #[test]
    fn github_remote_mode_uses_hosted_url() {
        let spec = build("on: issues\ntools:\n  github:\n    mode: remote\n");
        let render = render_mcp_config(&spec).unwrap();
        let github = &render.config["mcpServers"]["github"];
        assert_eq!(github["type"], "http");
        assert_eq!(github["url"], "https://api.githubcopilot.com/mcp/");
    }

    #[test]
    fn serena_image_reflects_sorted_language_union() {
        let spec = build("on: issues\ntools:\n  serena:\n    languages: [rust, python]\n");
        let render = render_mcp_config(&spec).unwrap();
        let args = render.config["mcpServers"]["serena"]["args"].as_array().unwrap();
        let image = args.iter().find(|a| {
            a.as_str().is_some_and(|s| s.starts_with("ghcr.io/oraios/serena"))
        });
        assert_eq!(image.unwrap(), "ghcr.io/oraios/serena:python-rust");
    }

    #[test]
    fn cache_memory_renders_no_server() {
        let spec = build("on: issues\ntools:\n  cache-memory:\n");
        let render = render_mcp_config(&spec).unwrap();
        assert!(render.uses_cache_memory);
        assert!(render.config["mcpServers"].get("cache-memory").is_none());
    }

    #[test]
    fn safe_outputs_server_is_implied_by_sinks() {
        let spec = build("on: issues\nsafe-outputs:\n  create-issue:\n");
        let render = render_mcp_config(&spec).unwrap();
        let server = &render.config["mcpServers"]["safe-outputs"];
        assert_eq!(server["command"], "node");
        assert_eq!(server["env"]["GH_AW_SAFE_OUTPUTS"], SAFE_OUTPUTS_PATH);
    }

    #[test]
    fn http_header_secrets_are_hoisted() {
        let spec = build(
            "on: issues\nmcp-servers:\n  notion:\n    url: https://mcp.notion.com/mcp\n    headers:\n      Authorization: ${{ secrets.NOTION_TOKEN }}\n",
        );
        let render = render_mcp_config(&spec).unwrap();
        assert_eq!(render.hoisted.len(), 1);
        assert_eq!(render.hoisted[0].env_name, "NOTION_TOKEN");
        let header = render.config["mcpServers"]["notion"]["headers"]["Authorization"]
            .as_str()
            .unwrap();
        assert_eq!(header, "Bearer $NOTION_TOKEN");
    }

    #[test]
    fn engine_native_tools_render_nothing() {
        let spec = build("on: issues\ntools:\n  web-fetch:\n  bash:\n");
        let render = render_mcp_config(&spec).unwrap();
        assert!(!render.has_servers);
    }
}
