//! CI expression handling
//!
//! Prompt text may embed `${{ ... }}` expressions. They are never passed to
//! the agent as-is: the compiler replaces each occurrence with a placeholder
//! token, emits a preamble step that evaluates the original expression into
//! an environment variable, and a substitution step that splices the value
//! back in at run time. An agent that emits `${{ secrets.X }}` into its own
//! output gains nothing, because extraction ran at compile time against the
//! author-written source only.

pub mod safety;

use crate::error::{CompileError, Result};
use sha2::{Digest, Sha256};

/// How one `${{ ... }}` occurrence is recovered at run time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpressionMapping {
    /// Inner expression text, trimmed, without the `${{ }}` frame.
    pub expression: String,
    /// Token substituted into the prompt, `__GH_AW_..._<hex>__`.
    pub placeholder: String,
    /// Environment variable the preamble step assigns.
    pub env_var: String,
}

impl ExpressionMapping {
    fn new(expression: &str) -> Self {
        let digest = Sha256::digest(expression.as_bytes());
        let tag = hex_prefix(&digest, 4);
        Self {
            expression: expression.to_string(),
            placeholder: format!("__GH_AW_{}_{}__", uppercase_path(expression), tag),
            env_var: format!("GH_AW_EXPR_{}", tag.to_ascii_uppercase()),
        }
    }
}

/// The substitution plan for one prompt body.
#[derive(Debug, Default)]
pub struct ExpressionPlan {
    /// One mapping per distinct expression, in order of first appearance.
    pub mappings: Vec<ExpressionMapping>,
}

impl ExpressionPlan {
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    fn mapping_for(&mut self, expression: &str) -> &ExpressionMapping {
        let pos = match self
            .mappings
            .iter()
            .position(|m| m.expression == expression)
        {
            Some(pos) => pos,
            None => {
                self.mappings.push(ExpressionMapping::new(expression));
                self.mappings.len() - 1
            }
        };
        &self.mappings[pos]
    }
}

/// One `${{ ... }}` occurrence found in text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundExpression {
    /// Byte range of the whole `${{ ... }}` frame.
    pub start: usize,
    pub end: usize,
    /// Trimmed inner text.
    pub inner: String,
}

/// Scan `text` for `${{ ... }}` occurrences.
///
/// The scanner is a hand-rolled walk rather than a regex so malformed input
/// (unterminated frames, stray braces) degrades gracefully: an unterminated
/// opener is simply not an expression. A nested opener inside a frame is
/// the double-wrap error.
pub fn find_expressions(text: &str) -> Result<Vec<FoundExpression>> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let Some(rel) = text[i..].find("${{") else {
            break;
        };
        let start = i + rel;
        let after_open = start + 3;
        let Some(close_rel) = text[after_open..].find("}}") else {
            break; // unterminated; not an expression
        };
        let end = after_open + close_rel + 2;
        let inner_raw = &text[after_open..after_open + close_rel];
        if inner_raw.contains("${{") {
            return Err(CompileError::validation(format!(
                "nested expression '${{{{ {} }}}}' is not allowed; expressions cannot wrap other expressions",
                inner_raw.trim()
            )));
        }
        found.push(FoundExpression {
            start,
            end,
            inner: inner_raw.trim().to_string(),
        });
        i = end;
    }
    Ok(found)
}

/// Pass one: rewrite bare `{{#if cond}}` conditionals so the condition is a
/// real CI expression. Conditions already written as `{{#if ${{ ... }}}}`
/// are left for pass two.
pub fn wrap_template_conditionals(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find("{{#if ") {
        // `${{#if` would be an expression, not a conditional.
        let preceded_by_dollar = pos > 0 && rest.as_bytes()[pos - 1] == b'$';
        out.push_str(&rest[..pos]);
        let after = &rest[pos..];
        let Some(close) = after.find("}}") else {
            out.push_str(after);
            return out;
        };
        let frame = &after[..close + 2];
        if preceded_by_dollar {
            out.push_str(frame);
        } else {
            let condition = frame["{{#if ".len()..frame.len() - 2].trim();
            if condition.starts_with("${{") || condition.is_empty() {
                out.push_str(frame);
            } else {
                out.push_str(&format!("{{{{#if ${{{{ {condition} }}}} }}}}"));
            }
        }
        rest = &after[close + 2..];
    }
    out.push_str(rest);
    out
}

/// Pass two: replace every `${{ ... }}` occurrence with its placeholder.
/// Returns the rewritten text and extends `plan` with any new mappings.
pub fn substitute_expressions(text: &str, plan: &mut ExpressionPlan) -> Result<String> {
    let found = find_expressions(text)?;
    if found.is_empty() {
        return Ok(text.to_string());
    }
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for expr in &found {
        out.push_str(&text[cursor..expr.start]);
        let mapping = plan.mapping_for(&expr.inner);
        out.push_str(&mapping.placeholder);
        cursor = expr.end;
    }
    out.push_str(&text[cursor..]);
    Ok(out)
}

/// Full body rewrite: wrap conditionals, then substitute expressions.
pub fn rewrite_body(body: &str) -> Result<(String, ExpressionPlan)> {
    let wrapped = wrap_template_conditionals(body);
    let mut plan = ExpressionPlan::default();
    let rewritten = substitute_expressions(&wrapped, &mut plan)?;
    Ok((rewritten, plan))
}

/// Uppercase an expression path for embedding in a placeholder: every run
/// of non-alphanumeric characters collapses to a single underscore.
fn uppercase_path(expression: &str) -> String {
    let mut out = String::with_capacity(expression.len());
    let mut last_was_sep = false;
    for c in expression.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_uppercase());
            last_was_sep = false;
        } else if !last_was_sep && !out.is_empty() {
            out.push('_');
            last_was_sep = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

fn hex_prefix(digest: &[u8], bytes: usize) -> String {
    digest
        .iter()
        .take(bytes)
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn finds_simple_expression() {
        let found = find_expressions("Issue: ${{ github.event.issue.number }}!").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].inner, "github.event.issue.number");
    }

    #[test]
    fn unterminated_frame_is_not_an_expression() {
        let found = find_expressions("broken ${{ github.actor").unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn double_wrapping_is_fatal() {
        let err = find_expressions("${{ ${{ github.actor }} }}").unwrap_err();
        assert!(err.to_string().contains("nested expression"), "{err}");
    }

    #[test]
    fn placeholder_embeds_uppercased_path() {
        let mapping = ExpressionMapping::new("github.event.issue.number");
        assert!(
            mapping
                .placeholder
                .starts_with("__GH_AW_GITHUB_EVENT_ISSUE_NUMBER_"),
            "{}",
            mapping.placeholder
        );
        assert!(mapping.placeholder.ends_with("__"));
        assert!(mapping.env_var.starts_with("GH_AW_EXPR_"));
    }

    #[test]
    fn distinct_expressions_get_distinct_env_vars() {
        let a = ExpressionMapping::new("github.actor");
        let b = ExpressionMapping::new("github.repository");
        assert_ne!(a.env_var, b.env_var);
        assert_ne!(a.placeholder, b.placeholder);
    }

    #[test]
    fn repeated_expression_reuses_one_mapping() {
        let mut plan = ExpressionPlan::default();
        let text = "${{ github.actor }} and ${{ github.actor }}";
        let rewritten = substitute_expressions(text, &mut plan).unwrap();
        assert_eq!(plan.mappings.len(), 1);
        let placeholder = &plan.mappings[0].placeholder;
        assert_eq!(rewritten, format!("{placeholder} and {placeholder}"));
    }

    #[test]
    fn no_original_expression_survives_rewrite() {
        let (rewritten, plan) =
            rewrite_body("A ${{ github.actor }} B ${{ env.FOO }} C").unwrap();
        assert!(!rewritten.contains("${{"), "{rewritten}");
        assert_eq!(plan.mappings.len(), 2);
    }

    #[test]
    fn bare_conditional_is_wrapped_then_substituted() {
        let (rewritten, plan) =
            rewrite_body("{{#if github.event.issue.number}}issue{{/if}}").unwrap();
        assert_eq!(plan.mappings.len(), 1);
        assert_eq!(plan.mappings[0].expression, "github.event.issue.number");
        assert!(rewritten.starts_with("{{#if __GH_AW_"), "{rewritten}");
        assert!(rewritten.contains("issue{{/if}}"), "{rewritten}");
    }

    #[test]
    fn wrapped_conditional_is_not_double_wrapped() {
        let wrapped = wrap_template_conditionals("{{#if ${{ env.FLAG }} }}x{{/if}}");
        assert_eq!(wrapped, "{{#if ${{ env.FLAG }} }}x{{/if}}");
    }

    #[test]
    fn runtime_import_macro_is_untouched() {
        let (rewritten, plan) = rewrite_body("{{#runtime-import shared.md}}").unwrap();
        assert!(plan.is_empty());
        assert_eq!(rewritten, "{{#runtime-import shared.md}}");
    }
}
