//! MCP gateway launch
//!
//! Stdio and http servers are fronted by a single gateway container that
//! the agent talks to. Secrets referenced in http headers never land in
//! the JSON config: they are hoisted into the gateway step's env block,
//! passed through `-e NAME` docker arguments, and the header value becomes
//! `Bearer $NAME`, expanded inside the container.

use crate::steps::{Step, StepSpec};
use crate::workflow::WorkflowSpec;
use regex_lite::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

const DEFAULT_GATEWAY_IMAGE: &str = "ghcr.io/githubnext/gh-aw-mcp-gateway";
const DEFAULT_GATEWAY_PORT: u16 = 8088;

/// One secret moved from a header value into the gateway env block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoistedSecret {
    /// Environment variable (and secret) name.
    pub env_name: String,
    /// The original `${{ secrets.NAME }}` expression.
    pub expression: String,
}

#[allow(clippy::expect_used)]
fn secret_ref_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{\{\s*secrets\.([A-Za-z_][A-Za-z0-9_]*)\s*\}\}")
            .expect("valid secret reference regex")
    })
}

/// Rewrite header values that reference secrets, collecting the hoisted
/// names. Headers without secret references pass through untouched.
pub fn hoist_header_secrets(
    headers: &BTreeMap<String, String>,
    hoisted: &mut Vec<HoistedSecret>,
) -> BTreeMap<String, String> {
    let mut rewritten = BTreeMap::new();
    for (name, value) in headers {
        match secret_ref_regex().captures(value) {
            Some(caps) => {
                let env_name = caps[1].to_string();
                let expression = caps[0].to_string();
                if !hoisted.iter().any(|h| h.env_name == env_name) {
                    hoisted.push(HoistedSecret {
                        env_name: env_name.clone(),
                        expression,
                    });
                }
                rewritten.insert(name.clone(), format!("Bearer ${env_name}"));
            }
            None => {
                rewritten.insert(name.clone(), value.clone());
            }
        }
    }
    rewritten
}

/// The `docker run` step that starts the gateway.
pub fn gateway_step(spec: &WorkflowSpec, hoisted: &[HoistedSecret]) -> Step {
    let image = spec
        .sandbox
        .mcp_container
        .clone()
        .unwrap_or_else(|| DEFAULT_GATEWAY_IMAGE.to_string());
    let version = spec.sandbox.mcp_version.as_deref().unwrap_or("latest");
    let port = spec.sandbox.mcp_port.unwrap_or(DEFAULT_GATEWAY_PORT);

    let mut script = String::from("docker run -d --name gh-aw-mcp-gateway \\\n");
    script.push_str("  --network host \\\n");
    script.push_str("  -v ${GITHUB_WORKSPACE}:${GITHUB_WORKSPACE}:rw \\\n");
    script.push_str("  -v /tmp/gh-aw:/tmp/gh-aw \\\n");
    script.push_str("  -v /var/run/docker.sock:/var/run/docker.sock \\\n");
    for secret in hoisted {
        script.push_str(&format!("  -e {} \\\n", secret.env_name));
    }
    script.push_str(&format!("  {image}:{version} \\\n"));
    script.push_str(&format!(
        "  --config {} --port {port}\n",
        super::MCP_CONFIG_PATH
    ));

    let mut step = StepSpec::run("Start MCP gateway", script);
    for secret in hoisted {
        step = step.env(secret.env_name.clone(), secret.expression.clone());
    }
    step.render()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn plain_headers_pass_through() {
        let headers = BTreeMap::from([("Accept".to_string(), "application/json".to_string())]);
        let mut hoisted = Vec::new();
        let rewritten = hoist_header_secrets(&headers, &mut hoisted);
        assert!(hoisted.is_empty());
        assert_eq!(rewritten["Accept"], "application/json");
    }

    #[test]
    fn secret_header_is_rewritten_to_bearer() {
        let headers = BTreeMap::from([(
            "Authorization".to_string(),
            "${{ secrets.API_KEY }}".to_string(),
        )]);
        let mut hoisted = Vec::new();
        let rewritten = hoist_header_secrets(&headers, &mut hoisted);
        assert_eq!(rewritten["Authorization"], "Bearer $API_KEY");
        assert_eq!(hoisted.len(), 1);
        assert_eq!(hoisted[0].expression, "${{ secrets.API_KEY }}");
    }

    #[test]
    fn duplicate_secret_names_hoist_once() {
        let headers = BTreeMap::from([
            ("A".to_string(), "${{ secrets.TOKEN }}".to_string()),
            ("B".to_string(), "${{ secrets.TOKEN }}".to_string()),
        ]);
        let mut hoisted = Vec::new();
        hoist_header_secrets(&headers, &mut hoisted);
        assert_eq!(hoisted.len(), 1);
    }

    #[test]
    fn gateway_step_exports_hoisted_secrets() {
        let hoisted = vec![HoistedSecret {
            env_name: "NOTION_TOKEN".to_string(),
            expression: "${{ secrets.NOTION_TOKEN }}".to_string(),
        }];
        let spec = test_spec();
        let step = gateway_step(&spec, &hoisted);
        assert!(step.text.contains("-e NOTION_TOKEN"), "{}", step.text);
        assert!(
            step.text.contains("NOTION_TOKEN: ${{ secrets.NOTION_TOKEN }}"),
            "{}",
            step.text
        );
        assert!(step.text.contains("--network host"), "{}", step.text);
    }

    fn test_spec() -> WorkflowSpec {
        use crate::imports::ImportResolver;
        use std::fs;
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("wf.md");
        fs::write(&path, "---\non: issues\n---\nBody\n").unwrap();
        let resolution = ImportResolver::new().resolve(&path).unwrap();
        let mut cache = std::collections::BTreeMap::new();
        WorkflowSpec::from_resolution(&resolution, &mut cache).unwrap()
    }
}
