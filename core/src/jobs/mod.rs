//! Job model and manager
//!
//! A [`Job`] is a named unit with runner, permissions, dependencies,
//! condition and an ordered list of opaque rendered steps. The
//! [`JobManager`] keeps jobs in DAG order and validates two post-conditions
//! before rendering: every `needs` target exists, and no step name repeats
//! within one job. Both violations are compiler bugs.

pub mod graph;

use crate::error::{CompileError, Result};
use crate::permissions::Permissions;
use crate::render::to_yaml_block;
use crate::steps::Step;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct Job {
    /// YAML key under `jobs:`.
    pub name: String,
    pub display_name: Option<String>,
    pub runs_on: Option<serde_yaml::Value>,
    pub permissions: Permissions,
    pub needs: Vec<String>,
    pub condition: Option<String>,
    pub environment: Option<String>,
    pub concurrency: Option<String>,
    pub timeout_minutes: Option<u32>,
    pub outputs: BTreeMap<String, String>,
    pub env: BTreeMap<String, String>,
    pub steps: Vec<Step>,
    /// Raw reusable-workflow job body; mutually exclusive with the built
    /// fields above.
    pub raw: Option<serde_yaml::Value>,
}

impl Job {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Wrap an author-supplied reusable-workflow job. `needs` is extracted
    /// for dependency validation; the body renders verbatim (keys sorted).
    pub fn raw(name: impl Into<String>, body: serde_yaml::Value) -> Self {
        let needs = match body.get("needs") {
            Some(serde_yaml::Value::String(one)) => vec![one.clone()],
            Some(serde_yaml::Value::Sequence(seq)) => seq
                .iter()
                .filter_map(serde_yaml::Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };
        Self {
            name: name.into(),
            needs,
            raw: Some(body),
            ..Self::default()
        }
    }

    fn render(&self) -> String {
        let mut out = format!("  {}:\n", self.name);
        if let Some(raw) = &self.raw {
            out.push_str(&to_yaml_block(raw, 4));
            return out;
        }

        if let Some(display_name) = &self.display_name {
            out.push_str(&format!("    name: {}\n", crate::render::yaml_scalar(display_name)));
        }
        match self.needs.len() {
            0 => {}
            1 => out.push_str(&format!("    needs: {}\n", self.needs[0])),
            _ => {
                out.push_str("    needs:\n");
                for need in &self.needs {
                    out.push_str(&format!("      - {need}\n"));
                }
            }
        }
        if let Some(condition) = &self.condition {
            out.push_str(&format!(
                "    if: {}\n",
                crate::render::yaml_scalar(condition)
            ));
        }
        if let Some(runs_on) = &self.runs_on {
            match runs_on {
                serde_yaml::Value::String(label) => {
                    out.push_str(&format!("    runs-on: {label}\n"));
                }
                other => {
                    out.push_str("    runs-on:\n");
                    out.push_str(&to_yaml_block(other, 6));
                }
            }
        }
        if let Some(environment) = &self.environment {
            out.push_str(&format!("    environment: {environment}\n"));
        }
        if let Some(concurrency) = &self.concurrency {
            out.push_str(&format!(
                "    concurrency: {}\n",
                crate::render::yaml_scalar(concurrency)
            ));
        }
        out.push_str(&self.permissions.render(4));
        if let Some(timeout) = self.timeout_minutes {
            out.push_str(&format!("    timeout-minutes: {timeout}\n"));
        }
        if !self.outputs.is_empty() {
            out.push_str("    outputs:\n");
            for (key, value) in &self.outputs {
                out.push_str(&format!(
                    "      {key}: {}\n",
                    crate::render::yaml_scalar(value)
                ));
            }
        }
        if !self.env.is_empty() {
            out.push_str("    env:\n");
            for (key, value) in &self.env {
                out.push_str(&format!(
                    "      {key}: {}\n",
                    crate::render::yaml_scalar(value)
                ));
            }
        }
        out.push_str("    steps:\n");
        for step in &self.steps {
            out.push_str(&step.text);
        }
        out
    }
}

/// Ordered job collection with pre-render validation.
#[derive(Debug, Default)]
pub struct JobManager {
    jobs: Vec<Job>,
}

impl JobManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.jobs.clear();
    }

    pub fn add(&mut self, job: Job) -> Result<()> {
        if self.jobs.iter().any(|j| j.name == job.name) {
            return Err(CompileError::internal(format!(
                "job '{}' declared twice",
                job.name
            )));
        }
        self.jobs.push(job);
        Ok(())
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|j| j.name.as_str()).collect()
    }

    /// Every `needs` reference must name a declared job.
    pub fn validate_dependencies(&self) -> Result<()> {
        let names: Vec<&str> = self.job_names();
        for job in &self.jobs {
            for need in &job.needs {
                if !names.contains(&need.as_str()) {
                    return Err(CompileError::internal(format!(
                        "job '{}' needs undeclared job '{need}'",
                        job.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// No two steps within one job may share a name.
    pub fn validate_no_duplicate_steps(&self) -> Result<()> {
        for job in &self.jobs {
            let mut seen: Vec<&str> = Vec::with_capacity(job.steps.len());
            for step in &job.steps {
                let Some(name) = step.name.as_deref() else {
                    continue;
                };
                if seen.contains(&name) {
                    return Err(CompileError::internal(format!(
                        "job '{}' emits two steps named '{name}'",
                        job.name
                    )));
                }
                seen.push(name);
            }
        }
        Ok(())
    }

    /// Render the whole `jobs:` block, jobs in DAG (insertion) order.
    pub fn render(&self) -> Result<String> {
        self.validate_dependencies()?;
        self.validate_no_duplicate_steps()?;
        let mut out = String::from("jobs:\n");
        for job in &self.jobs {
            out.push_str(&job.render());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::steps::StepSpec;

    fn job_with_steps(name: &str, steps: &[&str]) -> Job {
        let mut job = Job::new(name);
        job.runs_on = Some(serde_yaml::Value::String("ubuntu-latest".into()));
        job.steps = steps
            .iter()
            .map(|s| StepSpec::run(*s, "true").render())
            .collect();
        job
    }

    #[test]
    fn duplicate_job_names_are_rejected() {
        let mut manager = JobManager::new();
        manager.add(job_with_steps("agent", &["a"])).unwrap();
        let err = manager.add(job_with_steps("agent", &["b"])).unwrap_err();
        assert!(err.to_string().contains("declared twice"), "{err}");
    }

    #[test]
    fn dangling_needs_is_an_internal_error() {
        let mut manager = JobManager::new();
        let mut job = job_with_steps("agent", &["a"]);
        job.needs.push("activation".to_string());
        manager.add(job).unwrap();
        let err = manager.validate_dependencies().unwrap_err();
        assert!(err.to_string().contains("undeclared job"), "{err}");
        assert!(err.to_string().contains("compiler bug"), "{err}");
    }

    #[test]
    fn duplicate_step_names_are_rejected() {
        let mut manager = JobManager::new();
        manager
            .add(job_with_steps("agent", &["Setup", "Setup"]))
            .unwrap();
        let err = manager.validate_no_duplicate_steps().unwrap_err();
        assert!(err.to_string().contains("two steps named"), "{err}");
    }

    #[test]
    fn render_emits_jobs_in_insertion_order() {
        let mut manager = JobManager::new();
        manager.add(job_with_steps("activation", &["Gate"])).unwrap();
        let mut agent = job_with_steps("agent", &["Run"]);
        agent.needs.push("activation".to_string());
        manager.add(agent).unwrap();
        let rendered = manager.render().unwrap();
        let activation = rendered.find("  activation:").unwrap();
        let agent = rendered.find("  agent:").unwrap();
        assert!(activation < agent, "{rendered}");
        assert!(rendered.contains("    needs: activation\n"), "{rendered}");
    }

    #[test]
    fn raw_job_extracts_needs_for_validation() {
        let body: serde_yaml::Value =
            serde_yaml::from_str("uses: ./.github/workflows/deploy.yml\nneeds: [agent]\n").unwrap();
        let job = Job::raw("deploy", body);
        assert_eq!(job.needs, vec!["agent"]);
        let mut manager = JobManager::new();
        manager.add(job).unwrap();
        assert!(manager.validate_dependencies().is_err());
    }
}
