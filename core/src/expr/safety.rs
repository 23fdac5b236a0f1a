//! Expression safety checking
//!
//! Every expression that reaches the lock file must stay inside an
//! allow-list of contexts. References to `secrets.*` or `github.token`
//! are rejected outright; so is anything the checker does not recognise.
//! The checker is a plain tokenizer over the inner expression text and
//! must never panic, whatever the input.

use crate::error::{CompileError, Result};

/// Exactly-allowed context paths.
const ALLOWED_EXACT: &[&str] = &[
    "github.workflow",
    "github.repository",
    "github.run_id",
    "github.actor",
    "github.event.issue.number",
    "github.event.pull_request.number",
];

/// Allowed context prefixes (`prefix.` + anything).
const ALLOWED_PREFIXES: &[&str] = &["env.", "inputs.", "needs.", "github.event.inputs."];

/// Allowed status and string functions.
const ALLOWED_FUNCTIONS: &[&str] = &[
    "always",
    "cancelled",
    "success",
    "failure",
    "contains",
    "startsWith",
    "endsWith",
    "format",
    "join",
];

/// Check one expression (the inner text of a `${{ ... }}` frame).
pub fn check_expression(expression: &str) -> Result<()> {
    for token in path_tokens(expression) {
        check_path(&token, expression)?;
    }
    Ok(())
}

fn check_path(path: &str, expression: &str) -> Result<()> {
    // The forbidden contexts get their own message: they are the whole
    // point of this validator.
    if path == "github.token" || path.starts_with("secrets.") || path == "secrets" {
        return Err(CompileError::validation(format!(
            "expression '{expression}' references '{path}'; secrets are not allowed in workflow prompt text"
        )));
    }

    if ALLOWED_EXACT.contains(&path) {
        return Ok(());
    }
    if ALLOWED_PREFIXES.iter().any(|p| path.starts_with(p)) {
        return Ok(());
    }
    // steps.<id>.outputs.<name>
    if let Some(rest) = path.strip_prefix("steps.") {
        if rest.split('.').count() >= 3 && rest.splitn(2, '.').nth(1).is_some_and(|r| r.starts_with("outputs.")) {
            return Ok(());
        }
    }
    if ALLOWED_FUNCTIONS.contains(&path) {
        return Ok(());
    }

    Err(CompileError::validation(format!(
        "expression '{expression}' uses context '{path}' which is not in the allowed list"
    )))
}

/// Extract dotted context paths and function names from an expression,
/// skipping string literals, numbers and operators.
fn path_tokens(expression: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = expression.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            // Single-quoted string literal; '' is an escaped quote.
            '\'' => {
                while let Some((_, c)) = chars.next() {
                    if c == '\'' {
                        if chars.peek().is_some_and(|(_, next)| *next == '\'') {
                            chars.next();
                        } else {
                            break;
                        }
                    }
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                let mut end = i + c.len_utf8();
                while let Some((j, c)) = chars.peek().copied() {
                    if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                        end = j + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let token = expression[start..end].trim_end_matches('.').to_string();
                if !is_literal_keyword(&token) {
                    tokens.push(token);
                }
            }
            _ => {}
        }
    }
    tokens
}

fn is_literal_keyword(token: &str) -> bool {
    matches!(token, "true" | "false" | "null")
}
