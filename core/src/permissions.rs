//! Workflow permission model
//!
//! Permissions form a small lattice per scope: absent < `read` < `write`.
//! The merged workflow takes the union of the author's explicit permissions
//! and every permission required by an enabled tool or safe-output sink,
//! always keeping the strongest level.

use crate::error::{CompileError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Access level for one permission scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    None,
    Read,
    Write,
}

impl PermissionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

/// A set of scoped permissions, e.g. `contents: read`.
///
/// Keys are sorted (BTreeMap) so rendering is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions {
    scopes: BTreeMap<String, PermissionLevel>,
}

impl Permissions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the `permissions:` front-matter value: a mapping of scope to
    /// level, or the shorthand strings `read-all` / `write-all`.
    pub fn from_yaml(value: &serde_yaml::Value) -> Result<Self> {
        let mut permissions = Self::new();
        match value {
            serde_yaml::Value::Null => {}
            serde_yaml::Value::String(s) if s == "read-all" => {
                for scope in KNOWN_SCOPES {
                    permissions.grant(scope, PermissionLevel::Read);
                }
            }
            serde_yaml::Value::String(s) if s == "write-all" => {
                for scope in KNOWN_SCOPES {
                    permissions.grant(scope, PermissionLevel::Write);
                }
            }
            serde_yaml::Value::Mapping(map) => {
                for (key, level) in map {
                    let scope = key.as_str().ok_or_else(|| {
                        CompileError::validation("permissions: scope names must be strings")
                    })?;
                    let level = level.as_str().ok_or_else(|| {
                        CompileError::validation(format!(
                            "permissions: level for '{scope}' must be a string"
                        ))
                    })?;
                    let level = match level {
                        "read" => PermissionLevel::Read,
                        "write" => PermissionLevel::Write,
                        "none" => PermissionLevel::None,
                        other => {
                            return Err(CompileError::validation(format!(
                                "permissions: unknown level '{other}' for '{scope}' (expected read, write or none)"
                            )));
                        }
                    };
                    permissions.grant(scope, level);
                }
            }
            other => {
                return Err(CompileError::validation(format!(
                    "permissions: expected a mapping, got {other:?}"
                )));
            }
        }
        Ok(permissions)
    }

    /// Raise `scope` to at least `level`. Never lowers an existing grant.
    pub fn grant(&mut self, scope: &str, level: PermissionLevel) {
        let entry = self
            .scopes
            .entry(scope.to_string())
            .or_insert(PermissionLevel::None);
        if level > *entry {
            *entry = level;
        }
    }

    /// Union with `other`, keeping the strongest level per scope.
    pub fn merge(&mut self, other: &Permissions) {
        for (scope, level) in &other.scopes {
            self.grant(scope, *level);
        }
    }

    pub fn level(&self, scope: &str) -> PermissionLevel {
        self.scopes
            .get(scope)
            .copied()
            .unwrap_or(PermissionLevel::None)
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, PermissionLevel)> {
        self.scopes.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Render as a YAML block at the given indent, `{}` when nothing is
    /// granted.
    pub fn render(&self, indent: usize) -> String {
        let pad = " ".repeat(indent);
        let granted: Vec<(&String, &PermissionLevel)> = self
            .scopes
            .iter()
            .filter(|(_, level)| **level != PermissionLevel::None)
            .collect();
        if granted.is_empty() {
            return format!("{pad}permissions: {{}}\n");
        }
        let mut out = format!("{pad}permissions:\n");
        for (scope, level) in granted {
            out.push_str(&format!("{pad}  {scope}: {}\n", level.as_str()));
        }
        out
    }
}

/// Scopes expanded by the `read-all` / `write-all` shorthands.
const KNOWN_SCOPES: &[&str] = &[
    "actions",
    "checks",
    "contents",
    "discussions",
    "issues",
    "packages",
    "pages",
    "pull-requests",
    "repository-projects",
    "security-events",
    "statuses",
];
