//! Step construction and rendering
//!
//! Steps are built as [`StepSpec`] values and rendered once into opaque
//! text; the job renderer concatenates them in order. All rendering is
//! plain string building with fixed indentation: steps sit at six spaces
//! under `jobs.<name>.steps`.

pub mod tracker;

use crate::render::{indent_block, yaml_scalar};

/// Indent of the `- name:` line of a step.
const STEP_INDENT: usize = 6;
/// Indent of a step's keys.
const KEY_INDENT: usize = 8;

/// One rendered step: the name (for duplicate detection) plus its text.
#[derive(Debug, Clone)]
pub struct Step {
    pub name: Option<String>,
    pub text: String,
}

/// Builder for one workflow step.
#[derive(Debug, Clone, Default)]
pub struct StepSpec {
    pub name: Option<String>,
    pub id: Option<String>,
    pub condition: Option<String>,
    pub uses: Option<String>,
    pub with: Vec<(String, String)>,
    pub run: Option<String>,
    pub shell: Option<String>,
    pub env: Vec<(String, String)>,
    pub continue_on_error: bool,
}

impl StepSpec {
    pub fn uses(name: impl Into<String>, uses: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            uses: Some(uses.into()),
            ..Self::default()
        }
    }

    pub fn run(name: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            run: Some(script.into()),
            ..Self::default()
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.with.push((key.into(), value.into()));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn continue_on_error(mut self) -> Self {
        self.continue_on_error = true;
        self
    }

    /// Render to the step text used in the lock file.
    pub fn render(&self) -> Step {
        let pad = " ".repeat(STEP_INDENT);
        let key_pad = " ".repeat(KEY_INDENT);
        let mut out = String::new();

        let mut first = true;
        let mut push_key = |out: &mut String, key: &str, value: &str| {
            if first {
                out.push_str(&format!("{pad}- {key}: {value}\n"));
                first = false;
            } else {
                out.push_str(&format!("{key_pad}{key}: {value}\n"));
            }
        };

        if let Some(name) = &self.name {
            push_key(&mut out, "name", &yaml_scalar(name));
        }
        if let Some(id) = &self.id {
            push_key(&mut out, "id", id);
        }
        if let Some(condition) = &self.condition {
            push_key(&mut out, "if", &yaml_scalar(condition));
        }
        if let Some(uses) = &self.uses {
            push_key(&mut out, "uses", uses);
        }
        if self.continue_on_error {
            push_key(&mut out, "continue-on-error", "true");
        }
        if let Some(shell) = &self.shell {
            push_key(&mut out, "shell", shell);
        }
        if !self.env.is_empty() {
            push_key(&mut out, "env", "");
            // push_key appends a trailing space before the newline when the
            // value is empty; normalise it.
            trim_line_end(&mut out);
            let mut env = self.env.clone();
            env.sort_by(|a, b| a.0.cmp(&b.0));
            for (key, value) in env {
                out.push_str(&format!("{key_pad}  {key}: {}\n", yaml_scalar(&value)));
            }
        }
        if !self.with.is_empty() {
            push_key(&mut out, "with", "");
            trim_line_end(&mut out);
            let mut with = self.with.clone();
            with.sort_by(|a, b| a.0.cmp(&b.0));
            for (key, value) in with {
                if value.contains('\n') {
                    out.push_str(&format!("{key_pad}  {key}: |\n"));
                    out.push_str(&indent_block(value.trim_end_matches('\n'), KEY_INDENT + 4));
                } else {
                    out.push_str(&format!("{key_pad}  {key}: {}\n", yaml_scalar(&value)));
                }
            }
        }
        if let Some(run) = &self.run {
            push_key(&mut out, "run", "|");
            out.push_str(&indent_block(run.trim_end_matches('\n'), KEY_INDENT + 2));
        }

        Step {
            name: self.name.clone(),
            text: out,
        }
    }
}

fn trim_line_end(out: &mut String) {
    while out.ends_with('\n') || out.ends_with(' ') {
        out.pop();
    }
    out.push('\n');
}
