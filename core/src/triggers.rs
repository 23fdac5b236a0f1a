//! Trigger (`on:`) model
//!
//! Triggers are kept close to their YAML shape: a normalised mapping from
//! trigger name to configuration. Normalisation expands the string and
//! sequence shorthands, resolves friendly schedule phrases to cron, and
//! extracts the compiler-owned keys (`lock-for-agent`, `reaction`) that
//! must not appear in the emitted file.

use crate::error::{CompileError, Result};
use std::collections::BTreeMap;

/// Trigger names that operate on pull requests.
const PR_TRIGGERS: &[&str] = &[
    "pull_request",
    "pull_request_target",
    "pull_request_review",
    "pull_request_review_comment",
];

/// Trigger names that operate on issues (or their comments).
const ISSUE_TRIGGERS: &[&str] = &["issues", "issue_comment"];

#[derive(Debug, Clone, Default)]
pub struct Triggers {
    /// Trigger name -> configuration, as emitted under `on:`.
    map: serde_yaml::Mapping,
    /// Any trigger carried `lock-for-agent: true`.
    pub lock_for_agent: bool,
    /// `reaction:` under `on:`, e.g. `eyes`.
    pub reaction: Option<String>,
}

impl Triggers {
    /// Parse and normalise the `on:` front-matter value.
    pub fn from_yaml(
        value: &serde_yaml::Value,
        schedule_cache: &mut BTreeMap<String, String>,
    ) -> Result<Self> {
        let mut triggers = Self::default();
        match value {
            serde_yaml::Value::String(name) => {
                triggers.add_trigger(name, serde_yaml::Value::Null, schedule_cache)?;
            }
            serde_yaml::Value::Sequence(names) => {
                for name in names {
                    let name = name.as_str().ok_or_else(|| {
                        CompileError::validation("on: trigger names must be strings")
                    })?;
                    triggers.add_trigger(name, serde_yaml::Value::Null, schedule_cache)?;
                }
            }
            serde_yaml::Value::Mapping(map) => {
                for (key, config) in map {
                    let name = key.as_str().ok_or_else(|| {
                        CompileError::validation("on: trigger names must be strings")
                    })?;
                    triggers.add_trigger(name, config.clone(), schedule_cache)?;
                }
            }
            other => {
                return Err(CompileError::validation(format!(
                    "on: expected a trigger name, sequence or mapping, got {other:?}"
                )));
            }
        }
        Ok(triggers)
    }

    fn add_trigger(
        &mut self,
        name: &str,
        config: serde_yaml::Value,
        schedule_cache: &mut BTreeMap<String, String>,
    ) -> Result<()> {
        match name {
            "reaction" => {
                self.reaction = config
                    .as_str()
                    .map(str::to_string)
                    .or(Some("eyes".to_string()));
                return Ok(());
            }
            // Friendly schedule shorthands.
            "daily" | "hourly" | "weekly" => {
                let cron = normalize_schedule(name, schedule_cache)?;
                self.insert_schedule(&cron);
                return Ok(());
            }
            "schedule" => {
                let normalized = self.normalize_schedule_config(&config, schedule_cache)?;
                self.map
                    .insert(serde_yaml::Value::String("schedule".into()), normalized);
                return Ok(());
            }
            _ => {}
        }

        let config = self.strip_compiler_keys(config)?;
        self.map
            .insert(serde_yaml::Value::String(name.to_string()), config);
        Ok(())
    }

    /// Remove `lock-for-agent` from a trigger configuration; it drives the
    /// lock/unlock sidecar jobs and is not CI schema.
    fn strip_compiler_keys(&mut self, config: serde_yaml::Value) -> Result<serde_yaml::Value> {
        let serde_yaml::Value::Mapping(mut map) = config else {
            return Ok(config);
        };
        if let Some(value) = map.remove("lock-for-agent") {
            if value.as_bool() == Some(true) {
                self.lock_for_agent = true;
            }
        }
        Ok(serde_yaml::Value::Mapping(map))
    }

    fn insert_schedule(&mut self, cron: &str) {
        let mut entry = serde_yaml::Mapping::new();
        entry.insert(
            serde_yaml::Value::String("cron".into()),
            serde_yaml::Value::String(cron.to_string()),
        );
        self.map.insert(
            serde_yaml::Value::String("schedule".into()),
            serde_yaml::Value::Sequence(vec![serde_yaml::Value::Mapping(entry)]),
        );
    }

    fn normalize_schedule_config(
        &mut self,
        config: &serde_yaml::Value,
        schedule_cache: &mut BTreeMap<String, String>,
    ) -> Result<serde_yaml::Value> {
        let serde_yaml::Value::Sequence(entries) = config else {
            return Err(CompileError::validation(
                "on.schedule: expected a sequence of cron entries",
            ));
        };
        let mut normalized = Vec::with_capacity(entries.len());
        for entry in entries {
            let cron_text = match entry {
                serde_yaml::Value::String(s) => s.clone(),
                serde_yaml::Value::Mapping(map) => map
                    .get("cron")
                    .and_then(serde_yaml::Value::as_str)
                    .ok_or_else(|| {
                        CompileError::validation("on.schedule: entry needs a cron field")
                    })?
                    .to_string(),
                other => {
                    return Err(CompileError::validation(format!(
                        "on.schedule: unsupported entry {other:?}"
                    )));
                }
            };
            let cron = normalize_schedule(&cron_text, schedule_cache)?;
            let mut map = serde_yaml::Mapping::new();
            map.insert(
                serde_yaml::Value::String("cron".into()),
                serde_yaml::Value::String(cron),
            );
            normalized.push(serde_yaml::Value::Mapping(map));
        }
        Ok(serde_yaml::Value::Sequence(normalized))
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.map.keys().filter_map(serde_yaml::Value::as_str).collect()
    }

    pub fn get(&self, name: &str) -> Option<&serde_yaml::Value> {
        self.map.get(name)
    }

    pub fn has_pull_request_trigger(&self) -> bool {
        self.names().iter().any(|n| PR_TRIGGERS.contains(n))
    }

    pub fn has_issue_trigger(&self) -> bool {
        self.names().iter().any(|n| ISSUE_TRIGGERS.contains(n))
    }

    /// The `workflow_run` configuration, if that trigger is present.
    pub fn workflow_run(&self) -> Option<&serde_yaml::Value> {
        self.get("workflow_run")
    }

    /// Whether the `workflow_run` trigger restricts branches.
    pub fn workflow_run_has_branches(&self) -> bool {
        match self.workflow_run() {
            Some(serde_yaml::Value::Mapping(map)) => {
                map.contains_key("branches") || map.contains_key("branches-ignore")
            }
            _ => false,
        }
    }

    /// Trigger mapping for emission; keys are sorted at render time.
    pub fn as_mapping(&self) -> &serde_yaml::Mapping {
        &self.map
    }
}

/// Resolve a schedule phrase to a cron expression, consulting the per-run
/// cache first. Plain five-field cron strings pass through after a field
/// count check.
pub fn normalize_schedule(
    phrase: &str,
    cache: &mut BTreeMap<String, String>,
) -> Result<String> {
    if let Some(cached) = cache.get(phrase) {
        return Ok(cached.clone());
    }
    let cron = resolve_schedule(phrase)?;
    cache.insert(phrase.to_string(), cron.clone());
    Ok(cron)
}

fn resolve_schedule(phrase: &str) -> Result<String> {
    let trimmed = phrase.trim();
    match trimmed {
        "hourly" => return Ok("0 * * * *".to_string()),
        "daily" => return Ok("0 0 * * *".to_string()),
        "weekly" => return Ok("0 0 * * 0".to_string()),
        _ => {}
    }
    // daily@HH:MM form.
    if let Some(time) = trimmed.strip_prefix("daily@") {
        let (hour, minute) = parse_clock(time).ok_or_else(|| {
            CompileError::validation(format!(
                "on.schedule: cannot parse time of day in '{trimmed}'"
            ))
        })?;
        return Ok(format!("{minute} {hour} * * *"));
    }
    if trimmed.split_whitespace().count() == 5 {
        return Ok(trimmed.to_string());
    }
    Err(CompileError::validation(format!(
        "on.schedule: '{trimmed}' is neither a cron expression nor a recognised shorthand"
    )))
}

fn parse_clock(text: &str) -> Option<(u32, u32)> {
    let (h, m) = text.split_once(':')?;
    let hour: u32 = h.parse().ok()?;
    let minute: u32 = m.parse().ok()?;
    (hour < 24 && minute < 60).then_some((hour, minute))
}

/// Resolve a `stop-after:` value to an absolute UTC timestamp.
///
/// Accepted: `+Nd` / `+Nh` / `+Nm` relative to `now`, RFC 3339, or
/// `YYYY-MM-DD[ HH:MM[:SS]]`.
pub fn resolve_stop_after(value: &str, now: chrono::DateTime<chrono::Utc>) -> Result<String> {
    use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};

    let trimmed = value.trim();
    if let Some(relative) = trimmed.strip_prefix('+') {
        let unit = relative.chars().last().ok_or_else(|| bad_stop_after(trimmed))?;
        let amount: i64 = relative[..relative.len() - 1]
            .parse()
            .map_err(|_| bad_stop_after(trimmed))?;
        let delta = match unit {
            'm' => chrono::Duration::minutes(amount),
            'h' => chrono::Duration::hours(amount),
            'd' => chrono::Duration::days(amount),
            _ => return Err(bad_stop_after(trimmed)),
        };
        return Ok((now + delta).format("%Y-%m-%d %H:%M:%S").to_string());
    }

    if let Ok(ts) = chrono::DateTime::parse_from_rfc3339(trimmed) {
        return Ok(ts
            .with_timezone(&Utc)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string());
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(Utc
                .from_utc_datetime(&naive)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc
                .from_utc_datetime(&naive)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string());
        }
    }
    Err(bad_stop_after(trimmed))
}

fn bad_stop_after(value: &str) -> CompileError {
    CompileError::validation(format!(
        "stop-after: cannot parse '{value}' (expected +Nd/+Nh/+Nm or an absolute timestamp)"
    ))
}
