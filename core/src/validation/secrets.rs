//! Reusable-workflow secret expression validation
//!
//! Values under `jobs.*.secrets.*` must be exactly `${{ secrets.NAME }}` or
//! a `||` fallback chain of secret references. Anything else (plaintext,
//! `env.*`, `vars.*`, `github.*`) would leak or forge a secret value.

use crate::error::{CompileError, Result};
use regex_lite::Regex;
use std::sync::OnceLock;

const SECRET_EXPR_PATTERN: &str =
    r"^\$\{\{\s*secrets\.[A-Za-z_][A-Za-z0-9_]*(\s*\|\|\s*secrets\.[A-Za-z_][A-Za-z0-9_]*)*\s*\}\}$";

#[allow(clippy::expect_used)]
fn secret_expr_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(SECRET_EXPR_PATTERN).expect("valid secret expression regex"))
}

/// Check every `secrets:` value in the extra `jobs:` block.
pub fn check_job_secrets(jobs: &serde_yaml::Mapping) -> Result<()> {
    for (job_name, job) in jobs {
        let Some(job_name) = job_name.as_str() else {
            continue;
        };
        let serde_yaml::Value::Mapping(job) = job else {
            continue;
        };
        let Some(serde_yaml::Value::Mapping(secrets)) = job.get("secrets") else {
            continue;
        };
        for (secret_name, value) in secrets {
            let Some(secret_name) = secret_name.as_str() else {
                continue;
            };
            let text = value.as_str().unwrap_or_default();
            if !secret_expr_regex().is_match(text) {
                return Err(CompileError::schema(format!(
                    "jobs.{job_name}.secrets.{secret_name}: value {text:?} does not match pattern {SECRET_EXPR_PATTERN}; use ${{{{ secrets.NAME }}}} or a ${{{{ secrets.A || secrets.B }}}} fallback chain"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn jobs(text: &str) -> serde_yaml::Mapping {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn single_secret_reference_passes() {
        check_job_secrets(&jobs(
            "deploy:\n  secrets:\n    token: ${{ secrets.DEPLOY_TOKEN }}\n",
        ))
        .unwrap();
    }

    #[test]
    fn fallback_chain_passes() {
        check_job_secrets(&jobs(
            "deploy:\n  secrets:\n    token: ${{ secrets.A || secrets.B || secrets.C }}\n",
        ))
        .unwrap();
    }

    #[test]
    fn plaintext_is_rejected_with_pattern_message() {
        let err = check_job_secrets(&jobs(
            "deploy:\n  secrets:\n    token: my-plaintext-secret\n",
        ))
        .unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.contains("does not match pattern"), "{rendered}");
        assert!(rendered.contains("jobs.deploy.secrets.token"), "{rendered}");
    }

    #[test]
    fn env_reference_is_rejected() {
        let err = check_job_secrets(&jobs(
            "deploy:\n  secrets:\n    token: ${{ env.TOKEN }}\n",
        ))
        .unwrap_err();
        assert!(err.to_string().contains("does not match pattern"), "{err}");
    }

    #[test]
    fn github_context_is_rejected() {
        let err = check_job_secrets(&jobs(
            "deploy:\n  secrets:\n    token: ${{ github.token }}\n",
        ))
        .unwrap_err();
        assert!(err.to_string().contains("does not match pattern"), "{err}");
    }

    #[test]
    fn jobs_without_secrets_pass() {
        check_job_secrets(&jobs("deploy:\n  uses: ./.github/workflows/deploy.yml\n")).unwrap();
    }
}
