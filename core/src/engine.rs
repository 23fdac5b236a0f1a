//! Agent engines
//!
//! The four built-in engines plus `custom` form a closed set. Each carries
//! a capability record; validators read the record, emitters dispatch on
//! the variant. The registry is populated once per process and shared
//! read-only.

use crate::error::{CompileError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Engine identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Claude,
    Codex,
    Copilot,
    Gemini,
    /// User-supplied step list; the compiler emits the steps verbatim.
    Custom,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
            Self::Copilot => "copilot",
            Self::Gemini => "gemini",
            Self::Custom => "custom",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "claude" => Some(Self::Claude),
            "codex" => Some(Self::Codex),
            "copilot" => Some(Self::Copilot),
            "gemini" => Some(Self::Gemini),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }

    pub fn capabilities(&self) -> &'static EngineCapabilities {
        &engine_registry()[self]
    }
}

/// What an engine can do; drives conditional validation and emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineCapabilities {
    pub supports_tools_allowlist: bool,
    pub supports_http_transport: bool,
    pub supports_max_turns: bool,
    pub supports_web_search: bool,
    pub experimental: bool,
}

/// Process-wide engine registry, populated once at startup.
pub fn engine_registry() -> &'static BTreeMap<EngineKind, EngineCapabilities> {
    static REGISTRY: OnceLock<BTreeMap<EngineKind, EngineCapabilities>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        BTreeMap::from([
            (
                EngineKind::Claude,
                EngineCapabilities {
                    supports_tools_allowlist: true,
                    supports_http_transport: true,
                    supports_max_turns: true,
                    supports_web_search: true,
                    experimental: false,
                },
            ),
            (
                EngineKind::Codex,
                EngineCapabilities {
                    supports_tools_allowlist: false,
                    supports_http_transport: false,
                    supports_max_turns: false,
                    supports_web_search: true,
                    experimental: false,
                },
            ),
            (
                EngineKind::Copilot,
                EngineCapabilities {
                    supports_tools_allowlist: true,
                    supports_http_transport: true,
                    supports_max_turns: false,
                    supports_web_search: false,
                    experimental: false,
                },
            ),
            (
                EngineKind::Gemini,
                EngineCapabilities {
                    supports_tools_allowlist: false,
                    supports_http_transport: true,
                    supports_max_turns: false,
                    supports_web_search: true,
                    experimental: true,
                },
            ),
            (
                EngineKind::Custom,
                EngineCapabilities {
                    supports_tools_allowlist: false,
                    supports_http_transport: false,
                    supports_max_turns: false,
                    supports_web_search: false,
                    experimental: false,
                },
            ),
        ])
    })
}

/// Parsed `engine:` front-matter.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub kind: EngineKind,
    pub model: Option<String>,
    pub version: Option<String>,
    pub max_turns: Option<u32>,
    pub env: BTreeMap<String, String>,
    pub args: Vec<String>,
    pub concurrency: Option<String>,
    /// Custom agent file, absolute or repo-root-relative.
    pub agent_file: Option<String>,
    /// Step list for the `custom` engine, emitted verbatim.
    pub steps: Vec<serde_yaml::Value>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::Copilot,
            model: None,
            version: None,
            max_turns: None,
            env: BTreeMap::new(),
            args: Vec::new(),
            concurrency: None,
            agent_file: None,
            steps: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Parse the `engine:` value: a bare id string or a mapping.
    pub fn from_yaml(value: &serde_yaml::Value) -> Result<Self> {
        match value {
            serde_yaml::Value::String(id) => {
                let kind = EngineKind::from_id(id).ok_or_else(|| unknown_engine(id))?;
                Ok(Self {
                    kind,
                    ..Self::default()
                })
            }
            serde_yaml::Value::Mapping(map) => {
                let id = map
                    .get("id")
                    .and_then(serde_yaml::Value::as_str)
                    .ok_or_else(|| {
                        CompileError::validation("engine: mapping form requires an id")
                    })?;
                let kind = EngineKind::from_id(id).ok_or_else(|| unknown_engine(id))?;

                let mut env = BTreeMap::new();
                if let Some(serde_yaml::Value::Mapping(raw)) = map.get("env") {
                    for (k, v) in raw {
                        if let (Some(k), Some(v)) = (k.as_str(), v.as_str()) {
                            env.insert(k.to_string(), v.to_string());
                        }
                    }
                }
                let args = match map.get("args") {
                    Some(serde_yaml::Value::Sequence(seq)) => seq
                        .iter()
                        .filter_map(serde_yaml::Value::as_str)
                        .map(str::to_string)
                        .collect(),
                    _ => Vec::new(),
                };
                let steps = match map.get("steps") {
                    Some(serde_yaml::Value::Sequence(seq)) => seq.clone(),
                    _ => Vec::new(),
                };
                if kind == EngineKind::Custom && steps.is_empty() {
                    return Err(CompileError::validation(
                        "engine: custom engine requires a steps list",
                    ));
                }

                Ok(Self {
                    kind,
                    model: str_field(map, "model"),
                    version: str_field(map, "version"),
                    max_turns: map
                        .get("max-turns")
                        .and_then(serde_yaml::Value::as_u64)
                        .map(|n| n as u32),
                    env,
                    args,
                    concurrency: str_field(map, "concurrency"),
                    agent_file: str_field(map, "agent-file"),
                    steps,
                })
            }
            other => Err(CompileError::validation(format!(
                "engine: expected an id string or mapping, got {other:?}"
            ))),
        }
    }

    pub fn capabilities(&self) -> &'static EngineCapabilities {
        self.kind.capabilities()
    }
}

fn str_field(map: &serde_yaml::Mapping, key: &str) -> Option<String> {
    map.get(key)
        .and_then(serde_yaml::Value::as_str)
        .map(str::to_string)
}

fn unknown_engine(id: &str) -> CompileError {
    CompileError::validation(format!(
        "engine: unknown engine '{id}' (expected claude, codex, copilot, gemini or custom)"
    ))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn yaml(text: &str) -> serde_yaml::Value {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn bare_id_parses() {
        let engine = EngineConfig::from_yaml(&yaml("claude")).unwrap();
        assert_eq!(engine.kind, EngineKind::Claude);
        assert!(engine.model.is_none());
    }

    #[test]
    fn mapping_form_parses_fields() {
        let engine = EngineConfig::from_yaml(&yaml(
            "id: codex\nmodel: o4-mini\nmax-turns: 12\nenv:\n  FOO: bar\n",
        ))
        .unwrap();
        assert_eq!(engine.kind, EngineKind::Codex);
        assert_eq!(engine.model.as_deref(), Some("o4-mini"));
        assert_eq!(engine.max_turns, Some(12));
        assert_eq!(engine.env.get("FOO").map(String::as_str), Some("bar"));
    }

    #[test]
    fn unknown_engine_is_rejected() {
        let err = EngineConfig::from_yaml(&yaml("grok")).unwrap_err();
        assert!(err.to_string().contains("unknown engine"), "{err}");
    }

    #[test]
    fn custom_engine_requires_steps() {
        let err = EngineConfig::from_yaml(&yaml("id: custom")).unwrap_err();
        assert!(err.to_string().contains("steps"), "{err}");
    }

    #[test]
    fn capability_table_is_consistent() {
        assert!(EngineKind::Claude.capabilities().supports_max_turns);
        assert!(!EngineKind::Codex.capabilities().supports_max_turns);
        assert!(!EngineKind::Copilot.capabilities().supports_web_search);
        assert!(EngineKind::Gemini.capabilities().experimental);
    }
}
