//! Deterministic YAML emission helpers
//!
//! The lock file must be byte-for-byte stable across compilations, so every
//! mapping is re-sorted by key before serialization. Sequences preserve
//! source order.

use serde_yaml::Value;

/// Recursively rebuild `value` with mapping keys sorted.
pub fn sorted_value(value: &Value) -> Value {
    match value {
        Value::Mapping(map) => {
            let mut entries: Vec<(String, Value)> = map
                .iter()
                .map(|(k, v)| (key_string(k), sorted_value(v)))
                .collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = serde_yaml::Mapping::new();
            for (k, v) in entries {
                sorted.insert(Value::String(k), v);
            }
            Value::Mapping(sorted)
        }
        Value::Sequence(seq) => Value::Sequence(seq.iter().map(sorted_value).collect()),
        other => other.clone(),
    }
}

fn key_string(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

/// Serialize `value` as a YAML block with every line indented by `indent`
/// spaces. Mapping keys come out sorted; the result always ends with a
/// newline.
pub fn to_yaml_block(value: &Value, indent: usize) -> String {
    let text = serde_yaml::to_string(&sorted_value(value)).unwrap_or_default();
    indent_block(text.trim_end_matches('\n'), indent)
}

/// Indent every line of `text` by `indent` spaces, terminating with a
/// newline. Blank lines stay blank.
pub fn indent_block(text: &str, indent: usize) -> String {
    let pad = " ".repeat(indent);
    let mut out = String::with_capacity(text.len() + 16);
    for line in text.lines() {
        if line.is_empty() {
            out.push('\n');
        } else {
            out.push_str(&pad);
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

/// Quote a scalar for inline YAML the way serde_yaml would.
pub fn yaml_scalar(text: &str) -> String {
    serde_yaml::to_string(&Value::String(text.to_string()))
        .map(|s| s.trim_end().to_string())
        .unwrap_or_else(|_| format!("\"{text}\""))
}
