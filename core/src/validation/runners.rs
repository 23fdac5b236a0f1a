//! Runner label validation
//!
//! `runs-on` may be a label string, a sequence of labels, or a mapping with
//! a `labels` sequence. macOS runners are rejected: the sandbox and MCP
//! gateway containers are Linux-only downstream.

use crate::error::{CompileError, Result};

const MACOS_FAQ_URL: &str =
    "https://githubnext.github.io/gh-aw/reference/faq/#why-macos-runners-arent-supported";

pub fn check_runs_on(runs_on: &serde_yaml::Value) -> Result<()> {
    for label in collect_labels(runs_on)? {
        if label.to_ascii_lowercase().contains("macos") {
            return Err(CompileError::validation(format!(
                "runs-on: runner label '{label}' is not supported; agentic workflows require Linux runners (see {MACOS_FAQ_URL})"
            )));
        }
    }
    Ok(())
}

fn collect_labels(runs_on: &serde_yaml::Value) -> Result<Vec<String>> {
    match runs_on {
        serde_yaml::Value::String(label) => Ok(vec![label.clone()]),
        serde_yaml::Value::Sequence(seq) => Ok(seq
            .iter()
            .filter_map(serde_yaml::Value::as_str)
            .map(str::to_string)
            .collect()),
        serde_yaml::Value::Mapping(map) => match map.get("labels") {
            Some(serde_yaml::Value::Sequence(seq)) => Ok(seq
                .iter()
                .filter_map(serde_yaml::Value::as_str)
                .map(str::to_string)
                .collect()),
            Some(serde_yaml::Value::String(label)) => Ok(vec![label.clone()]),
            _ => Ok(Vec::new()),
        },
        other => Err(CompileError::validation(format!(
            "runs-on: expected a label, sequence or mapping, got {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn yaml(text: &str) -> serde_yaml::Value {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn linux_labels_pass() {
        check_runs_on(&yaml("ubuntu-latest")).unwrap();
        check_runs_on(&yaml("[self-hosted, linux, x64]")).unwrap();
        check_runs_on(&yaml("group: hosted\nlabels: [ubuntu-22.04]")).unwrap();
    }

    #[test]
    fn macos_string_is_fatal_with_faq() {
        let err = check_runs_on(&yaml("macos-latest")).unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.contains("macos-latest"), "{rendered}");
        assert!(rendered.contains(MACOS_FAQ_URL), "{rendered}");
    }

    #[test]
    fn macos_in_label_list_is_fatal() {
        let err = check_runs_on(&yaml("[self-hosted, macOS]")).unwrap_err();
        assert!(err.to_string().contains("macOS"), "{err}");
    }

    #[test]
    fn macos_case_insensitive_in_mapping() {
        let err = check_runs_on(&yaml("labels: [MacOS-14]")).unwrap_err();
        assert!(err.to_string().contains("MacOS-14"), "{err}");
    }
}
