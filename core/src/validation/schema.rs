//! JSON Schema validation
//!
//! Two embedded Draft 7 schemas: one for source front-matter, one for the
//! emitted lock file (the subset of the GitHub Actions workflow schema the
//! compiler produces). Schemas are compiled once per process with
//! `include_str!` so there is no filesystem dependency at run time.

use crate::error::{CompileError, Result};
use jsonschema::{Draft, JSONSchema};
use serde_json::Value;
use std::sync::OnceLock;

const FRONTMATTER_SCHEMA: &str = include_str!("../schemas/frontmatter.schema.json");
const WORKFLOW_SCHEMA: &str = include_str!("../schemas/github-workflow.schema.json");

// The embedded schemas are fixed at build time; a compile failure here can
// only be a defect in the schema files themselves.
fn compile(schema_text: &str, which: &str) -> JSONSchema {
    let value: Value = serde_json::from_str(schema_text)
        .unwrap_or_else(|e| panic!("embedded {which} schema is not valid JSON: {e}"));
    JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(&value)
        .unwrap_or_else(|e| panic!("embedded {which} schema does not compile: {e}"))
}

fn frontmatter_schema() -> &'static JSONSchema {
    static SCHEMA: OnceLock<JSONSchema> = OnceLock::new();
    SCHEMA.get_or_init(|| compile(FRONTMATTER_SCHEMA, "frontmatter"))
}

fn workflow_schema() -> &'static JSONSchema {
    static SCHEMA: OnceLock<JSONSchema> = OnceLock::new();
    SCHEMA.get_or_init(|| compile(WORKFLOW_SCHEMA, "workflow"))
}

/// Validate one source file's front-matter document.
pub fn validate_frontmatter(path: &std::path::Path, frontmatter: &serde_yaml::Mapping) -> Result<()> {
    let value = to_json(&serde_yaml::Value::Mapping(frontmatter.clone()))?;
    run(frontmatter_schema(), &value).map_err(|details| {
        CompileError::schema(format!(
            "{}: front-matter does not match the workflow schema:\n  - {details}",
            path.display()
        ))
    })
}

/// Validate the assembled lock-file text against the emitted-workflow
/// schema subset.
pub fn validate_lock_text(lock_text: &str) -> Result<()> {
    let parsed: serde_yaml::Value = serde_yaml::from_str(lock_text)
        .map_err(|e| CompileError::schema(format!("emitted lock file is not valid YAML: {e}")))?;
    let value = to_json(&parsed)?;
    run(workflow_schema(), &value).map_err(|details| {
        CompileError::schema(format!(
            "emitted lock file does not match the workflow schema:\n  - {details}"
        ))
    })
}

fn run(schema: &JSONSchema, value: &Value) -> std::result::Result<(), String> {
    let result = schema.validate(value);
    if let Err(errors) = result {
        let messages: Vec<String> = errors
            .map(|e| {
                let path = e.instance_path.to_string();
                let path = if path.is_empty() { "root".to_string() } else { path };
                format!("{e} at '{path}'")
            })
            .collect();
        return Err(messages.join("\n  - "));
    }
    Ok(())
}

fn to_json(value: &serde_yaml::Value) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| CompileError::schema(format!("cannot represent document as JSON: {e}")))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::path::Path;

    fn fm(text: &str) -> serde_yaml::Mapping {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn minimal_frontmatter_passes() {
        validate_frontmatter(Path::new("wf.md"), &fm("on: issues\nengine: claude\n")).unwrap();
    }

    #[test]
    fn unknown_top_level_key_fails() {
        let err =
            validate_frontmatter(Path::new("wf.md"), &fm("on: issues\nbogus-key: 1\n")).unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.contains("wf.md"), "{rendered}");
        assert!(rendered.contains("bogus-key"), "{rendered}");
    }

    #[test]
    fn engine_mapping_without_id_fails() {
        let err = validate_frontmatter(Path::new("wf.md"), &fm("on: issues\nengine:\n  model: gpt\n"))
            .unwrap_err();
        assert!(err.to_string().contains("id"), "{err}");
    }

    #[test]
    fn minimal_lock_text_passes() {
        let lock = r#"
name: demo
"on":
  issues: null
permissions: {}
jobs:
  agent:
    runs-on: ubuntu-latest
    steps:
      - name: Check out
        uses: actions/checkout@v5
"#;
        validate_lock_text(lock).unwrap();
    }

    #[test]
    fn lock_with_step_missing_run_and_uses_fails() {
        let lock = r#"
"on":
  issues: null
jobs:
  agent:
    runs-on: ubuntu-latest
    steps:
      - name: Does nothing
"#;
        let err = validate_lock_text(lock).unwrap_err();
        assert!(err.to_string().contains("workflow schema"), "{err}");
    }

    #[test]
    fn lock_missing_jobs_fails() {
        let err = validate_lock_text("\"on\": push\n").unwrap_err();
        assert!(err.to_string().contains("jobs"), "{err}");
    }
}
