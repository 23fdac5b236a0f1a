//! Safe-output sink configuration
//!
//! Safe outputs are the only side-effecting operations an agent's text can
//! trigger: the agent writes structured requests to `$GH_AW_SAFE_OUTPUTS`
//! and a processor job replays them through a constrained dispatcher. Each
//! sink carries its own sub-configuration; `threat-detection` configures
//! the secondary analysis job that gates the processor.

use crate::error::{CompileError, Result};
use crate::permissions::{PermissionLevel, Permissions};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;

/// A sink target: which issue/PR/discussion the output lands on.
///
/// Allowed shapes: absent (the triggering item), `triggering`, `*`, a
/// positive integer literal, or a `${{ ... }}` expression. Shape
/// validation happens in the target validator; this type only normalises
/// YAML scalars to text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target(pub String);

impl<'de> Deserialize<'de> for Target {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_yaml::Value::deserialize(deserializer)?;
        match value {
            serde_yaml::Value::String(s) => Ok(Target(s)),
            serde_yaml::Value::Number(n) => Ok(Target(n.to_string())),
            other => Err(serde::de::Error::custom(format!(
                "target must be a string or integer, got {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct AddCommentConfig {
    #[serde(default)]
    pub target: Option<Target>,
    #[serde(default)]
    pub max: Option<u32>,
    /// Comment on a discussion instead of an issue/PR.
    #[serde(default)]
    pub discussion: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct CreateIssueConfig {
    #[serde(default)]
    pub title_prefix: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub max: Option<u32>,
    #[serde(default)]
    pub target_repo: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct CreateDiscussionConfig {
    #[serde(default)]
    pub title_prefix: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub max: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct CreatePullRequestConfig {
    #[serde(default)]
    pub title_prefix: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub draft: Option<bool>,
    #[serde(default)]
    pub auto_merge: bool,
    /// Open an issue with the patch when branch push is not possible.
    #[serde(default)]
    pub fallback_as_issue: bool,
    #[serde(default)]
    pub if_no_changes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct LabelsConfig {
    #[serde(default)]
    pub allowed: Vec<String>,
    #[serde(default)]
    pub blocked: Vec<String>,
    #[serde(default)]
    pub max: Option<u32>,
    #[serde(default)]
    pub target: Option<Target>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct UpdateIssueConfig {
    #[serde(default)]
    pub target: Option<Target>,
    #[serde(default)]
    pub max: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct CloseIssueConfig {
    #[serde(default)]
    pub target: Option<Target>,
    #[serde(default)]
    pub max: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct AssignIssueConfig {
    #[serde(default)]
    pub allowed: Vec<String>,
    #[serde(default)]
    pub max: Option<u32>,
    #[serde(default)]
    pub target: Option<Target>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct UploadAssetsConfig {
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub max_size_kb: Option<u32>,
    #[serde(default)]
    pub allowed_exts: Vec<String>,
}

/// Secondary analysis job configuration. `threat-detection: true` enables
/// it with defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ThreatDetectionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub steps: Vec<serde_yaml::Value>,
    #[serde(default)]
    pub engine: Option<String>,
}

impl Default for ThreatDetectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prompt: None,
            steps: Vec::new(),
            engine: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// The whole `safe-outputs:` front-matter block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SafeOutputsConfig {
    pub add_comment: Option<AddCommentConfig>,
    pub create_issue: Option<CreateIssueConfig>,
    pub create_discussion: Option<CreateDiscussionConfig>,
    pub create_pull_request: Option<CreatePullRequestConfig>,
    pub add_labels: Option<LabelsConfig>,
    pub remove_labels: Option<LabelsConfig>,
    pub update_issue: Option<UpdateIssueConfig>,
    pub close_issue: Option<CloseIssueConfig>,
    pub assign_issue: Option<AssignIssueConfig>,
    pub upload_assets: Option<UploadAssetsConfig>,
    pub threat_detection: Option<ThreatDetectionConfig>,
    pub env: BTreeMap<String, String>,
    pub staged: bool,
    pub allowed_domains: Vec<String>,
    pub allow_github_references: bool,
    pub github_token: Option<String>,
}

impl SafeOutputsConfig {
    pub fn from_yaml(value: &serde_yaml::Value) -> Result<Self> {
        let map = match value {
            serde_yaml::Value::Null => return Ok(Self::default()),
            serde_yaml::Value::Mapping(map) => map,
            other => {
                return Err(CompileError::validation(format!(
                    "safe-outputs: expected a mapping, got {other:?}"
                )));
            }
        };

        let config = Self {
            add_comment: sink(map, "add-comment")?,
            create_issue: sink(map, "create-issue")?,
            create_discussion: sink(map, "create-discussion")?,
            create_pull_request: sink(map, "create-pull-request")?,
            add_labels: sink(map, "add-labels")?,
            remove_labels: sink(map, "remove-labels")?,
            update_issue: sink(map, "update-issue")?,
            close_issue: sink(map, "close-issue")?,
            assign_issue: sink(map, "assign-issue")?,
            upload_assets: sink(map, "upload-assets")?,
            threat_detection: sink(map, "threat-detection")?,
            env: match map.get("env") {
                Some(serde_yaml::Value::Mapping(raw)) => raw
                    .iter()
                    .filter_map(|(k, v)| Some((k.as_str()?.to_string(), v.as_str()?.to_string())))
                    .collect(),
                _ => BTreeMap::new(),
            },
            staged: map
                .get("staged")
                .and_then(serde_yaml::Value::as_bool)
                .unwrap_or(false),
            allowed_domains: match map.get("allowed-domains") {
                Some(serde_yaml::Value::Sequence(seq)) => seq
                    .iter()
                    .filter_map(serde_yaml::Value::as_str)
                    .map(str::to_string)
                    .collect(),
                _ => Vec::new(),
            },
            allow_github_references: map
                .get("allow-github-references")
                .and_then(serde_yaml::Value::as_bool)
                .unwrap_or(false),
            github_token: map
                .get("github-token")
                .and_then(serde_yaml::Value::as_str)
                .map(str::to_string),
        };
        Ok(config)
    }

    /// Names of enabled sinks, deterministic order. `threat-detection` is
    /// not a sink.
    pub fn enabled_sinks(&self) -> Vec<&'static str> {
        let mut sinks = Vec::new();
        if self.add_comment.is_some() {
            sinks.push("add-comment");
        }
        if self.create_issue.is_some() {
            sinks.push("create-issue");
        }
        if self.create_discussion.is_some() {
            sinks.push("create-discussion");
        }
        if self.create_pull_request.is_some() {
            sinks.push("create-pull-request");
        }
        if self.add_labels.is_some() {
            sinks.push("add-labels");
        }
        if self.remove_labels.is_some() {
            sinks.push("remove-labels");
        }
        if self.update_issue.is_some() {
            sinks.push("update-issue");
        }
        if self.close_issue.is_some() {
            sinks.push("close-issue");
        }
        if self.assign_issue.is_some() {
            sinks.push("assign-issue");
        }
        if self.upload_assets.is_some() {
            sinks.push("upload-assets");
        }
        sinks
    }

    pub fn has_sinks(&self) -> bool {
        !self.enabled_sinks().is_empty()
    }

    pub fn threat_detection_enabled(&self) -> bool {
        self.threat_detection
            .as_ref()
            .map(|t| t.enabled)
            .unwrap_or(false)
    }

    /// `(sink name, target)` pairs for target-syntax validation.
    pub fn targets(&self) -> Vec<(&'static str, &Target)> {
        let mut targets = Vec::new();
        if let Some(c) = &self.add_comment {
            if let Some(t) = &c.target {
                targets.push(("add-comment", t));
            }
        }
        if let Some(c) = &self.add_labels {
            if let Some(t) = &c.target {
                targets.push(("add-labels", t));
            }
        }
        if let Some(c) = &self.remove_labels {
            if let Some(t) = &c.target {
                targets.push(("remove-labels", t));
            }
        }
        if let Some(c) = &self.update_issue {
            if let Some(t) = &c.target {
                targets.push(("update-issue", t));
            }
        }
        if let Some(c) = &self.close_issue {
            if let Some(t) = &c.target {
                targets.push(("close-issue", t));
            }
        }
        if let Some(c) = &self.assign_issue {
            if let Some(t) = &c.target {
                targets.push(("assign-issue", t));
            }
        }
        targets
    }

    /// Permissions the safe-output processor job needs for the enabled
    /// sinks.
    pub fn required_permissions(&self) -> Permissions {
        let mut permissions = Permissions::new();
        if self.add_comment.is_some() {
            permissions.grant("issues", PermissionLevel::Write);
            permissions.grant("pull-requests", PermissionLevel::Write);
        }
        if self.create_issue.is_some()
            || self.add_labels.is_some()
            || self.remove_labels.is_some()
            || self.update_issue.is_some()
            || self.close_issue.is_some()
            || self.assign_issue.is_some()
        {
            permissions.grant("issues", PermissionLevel::Write);
        }
        if self.create_discussion.is_some() {
            permissions.grant("discussions", PermissionLevel::Write);
        }
        if self.create_pull_request.is_some() {
            permissions.grant("contents", PermissionLevel::Write);
            permissions.grant("pull-requests", PermissionLevel::Write);
        }
        if self.upload_assets.is_some() {
            permissions.grant("contents", PermissionLevel::Write);
        }
        permissions
    }

    /// JSON configuration embedded into the processor job's env; the
    /// dispatch script keys off it at run time.
    pub fn dispatch_config(&self) -> serde_json::Value {
        let mut config = serde_json::Map::new();
        if let Some(c) = &self.add_comment {
            config.insert(
                "add-comment".into(),
                serde_json::json!({
                    "target": c.target.as_ref().map(|t| t.0.clone()),
                    "max": c.max.unwrap_or(1),
                    "discussion": c.discussion,
                }),
            );
        }
        if let Some(c) = &self.create_issue {
            config.insert(
                "create-issue".into(),
                serde_json::json!({
                    "title-prefix": c.title_prefix,
                    "labels": c.labels,
                    "max": c.max.unwrap_or(1),
                    "target-repo": c.target_repo,
                }),
            );
        }
        if let Some(c) = &self.create_discussion {
            config.insert(
                "create-discussion".into(),
                serde_json::json!({
                    "title-prefix": c.title_prefix,
                    "category": c.category,
                    "max": c.max.unwrap_or(1),
                }),
            );
        }
        if let Some(c) = &self.create_pull_request {
            config.insert(
                "create-pull-request".into(),
                serde_json::json!({
                    "title-prefix": c.title_prefix,
                    "labels": c.labels,
                    "draft": c.draft.unwrap_or(true),
                    "auto-merge": c.auto_merge,
                    "fallback-as-issue": c.fallback_as_issue,
                    "if-no-changes": c.if_no_changes,
                }),
            );
        }
        if let Some(c) = &self.add_labels {
            config.insert("add-labels".into(), labels_json(c));
        }
        if let Some(c) = &self.remove_labels {
            config.insert("remove-labels".into(), labels_json(c));
        }
        if let Some(c) = &self.update_issue {
            config.insert(
                "update-issue".into(),
                serde_json::json!({
                    "target": c.target.as_ref().map(|t| t.0.clone()),
                    "max": c.max.unwrap_or(1),
                }),
            );
        }
        if let Some(c) = &self.close_issue {
            config.insert(
                "close-issue".into(),
                serde_json::json!({
                    "target": c.target.as_ref().map(|t| t.0.clone()),
                    "max": c.max.unwrap_or(1),
                }),
            );
        }
        if let Some(c) = &self.assign_issue {
            config.insert(
                "assign-issue".into(),
                serde_json::json!({
                    "allowed": c.allowed,
                    "max": c.max.unwrap_or(1),
                    "target": c.target.as_ref().map(|t| t.0.clone()),
                }),
            );
        }
        if let Some(c) = &self.upload_assets {
            config.insert(
                "upload-assets".into(),
                serde_json::json!({
                    "branch": c.branch,
                    "max-size-kb": c.max_size_kb.unwrap_or(10240),
                    "allowed-exts": c.allowed_exts,
                }),
            );
        }
        if self.staged {
            config.insert("staged".into(), serde_json::Value::Bool(true));
        }
        if !self.allowed_domains.is_empty() {
            config.insert(
                "allowed-domains".into(),
                serde_json::json!(self.allowed_domains),
            );
        }
        if self.allow_github_references {
            config.insert(
                "allow-github-references".into(),
                serde_json::Value::Bool(true),
            );
        }
        serde_json::Value::Object(config)
    }
}

fn labels_json(c: &LabelsConfig) -> serde_json::Value {
    serde_json::json!({
        "allowed": c.allowed,
        "blocked": c.blocked,
        "max": c.max.unwrap_or(3),
        "target": c.target.as_ref().map(|t| t.0.clone()),
    })
}

/// Decode one sink value: absent -> None, `null`/`true` -> defaults,
/// `false` -> disabled, mapping -> parsed.
fn sink<T>(map: &serde_yaml::Mapping, key: &str) -> Result<Option<T>>
where
    T: Default + DeserializeOwned,
{
    match map.get(key) {
        None | Some(serde_yaml::Value::Bool(false)) => Ok(None),
        Some(serde_yaml::Value::Null) | Some(serde_yaml::Value::Bool(true)) => {
            Ok(Some(T::default()))
        }
        Some(value) => serde_yaml::from_value(value.clone())
            .map(Some)
            .map_err(|e| CompileError::validation(format!("safe-outputs.{key}: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(text: &str) -> SafeOutputsConfig {
        SafeOutputsConfig::from_yaml(&serde_yaml::from_str(text).unwrap()).unwrap()
    }

    #[test]
    fn null_sink_enables_with_defaults() {
        let config = parse("add-comment:\n");
        assert!(config.add_comment.is_some());
        assert_eq!(config.enabled_sinks(), vec!["add-comment"]);
    }

    #[test]
    fn false_disables_a_sink() {
        let config = parse("add-comment: false\n");
        assert!(config.add_comment.is_none());
        assert!(!config.has_sinks());
    }

    #[test]
    fn integer_target_normalises_to_text() {
        let config = parse("add-comment:\n  target: 123\n");
        let target = config.add_comment.unwrap().target.unwrap();
        assert_eq!(target.0, "123");
    }

    #[test]
    fn threat_detection_bool_form() {
        let config = parse("create-issue:\nthreat-detection: true\n");
        assert!(config.threat_detection_enabled());
    }

    #[test]
    fn threat_detection_disabled_inside_mapping() {
        let config = parse("threat-detection:\n  enabled: false\n");
        assert!(!config.threat_detection_enabled());
    }

    #[test]
    fn create_pull_request_permissions() {
        let config = parse("create-pull-request:\n  draft: false\n");
        let perms = config.required_permissions();
        assert_eq!(perms.level("contents"), PermissionLevel::Write);
        assert_eq!(perms.level("pull-requests"), PermissionLevel::Write);
    }

    #[test]
    fn unknown_sink_field_is_rejected() {
        let err = SafeOutputsConfig::from_yaml(
            &serde_yaml::from_str("create-issue:\n  bogus-field: 1\n").unwrap(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("create-issue"), "{err}");
    }

    #[test]
    fn dispatch_config_lists_enabled_sinks_only() {
        let config = parse("add-comment:\ncreate-issue:\n  labels: [bot]\n");
        let json = config.dispatch_config();
        assert!(json.get("add-comment").is_some());
        assert!(json.get("create-issue").is_some());
        assert!(json.get("create-pull-request").is_none());
    }
}
