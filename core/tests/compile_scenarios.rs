//! End-to-end compilation scenarios
//!
//! Each test writes a small workflow tree into a temp directory, runs the
//! compiler, and asserts on the emitted lock text or the failure.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use aw_core::assemble::WriteOutcome;
use aw_core::{CompileOptions, Compiler, lock_path_for};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn fixed_time() -> chrono::DateTime<chrono::Utc> {
    use chrono::TimeZone;
    chrono::Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

fn compiler() -> Compiler {
    Compiler::new(CompileOptions {
        strict: false,
        no_emit: false,
        compile_time: Some(fixed_time()),
    })
}

fn write_tree(dir: &TempDir, files: &[(&str, &str)]) -> PathBuf {
    for (name, content) in files {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
    }
    dir.path().join(files[0].0)
}

fn compile_ok(files: &[(&str, &str)]) -> (String, usize) {
    let dir = TempDir::new().unwrap();
    let root = write_tree(&dir, files);
    let mut compiler = compiler();
    let result = compiler.compile(&root).expect("compilation should succeed");
    (result.lock_text, result.warning_count)
}

fn compile_err(files: &[(&str, &str)]) -> (aw_core::CompileError, PathBuf) {
    let dir = TempDir::new().unwrap();
    let root = write_tree(&dir, files);
    let mut compiler = compiler();
    let error = compiler.compile(&root).expect_err("compilation should fail");
    // TempDir is gone after return; capture the lock path existence now.
    let lock = lock_path_for(&root);
    assert!(!lock.exists(), "no lock file may be written on failure");
    (error, lock)
}

// Scenario 1: diamond imports resolve the shared file once, with every
// tool contribution present.
#[test]
fn diamond_imports_record_shared_file_once() {
    let (lock, _) = compile_ok(&[
        (
            "root.md",
            "---\non: issues\nengine: claude\nimports: [a.md, b.md]\n---\nRoot body\n",
        ),
        ("a.md", "---\nimports: [c.md]\ntools:\n  playwright:\n---\nA\n"),
        ("b.md", "---\nimports: [c.md]\ntools:\n  serena:\n    languages: [rust]\n---\nB\n"),
        ("c.md", "---\ntools:\n  github:\n    allowed: [create_issue]\n---\nC\n"),
    ]);

    let manifest_lines: Vec<&str> = lock
        .lines()
        .filter(|l| l.starts_with("#   - "))
        .collect();
    let c_count = manifest_lines.iter().filter(|l| l.contains("c.md")).count();
    assert_eq!(c_count, 1, "c.md must appear once in the manifest: {manifest_lines:?}");

    let pos = |needle: &str| {
        manifest_lines
            .iter()
            .position(|l| l.contains(needle))
            .unwrap_or_else(|| panic!("{needle} missing from {manifest_lines:?}"))
    };
    assert!(pos("c.md") < pos("a.md"));
    assert!(pos("c.md") < pos("b.md"));

    // All three tool contributions are present.
    assert!(lock.contains("playwright"), "{lock}");
    assert!(lock.contains("serena"), "{lock}");
    assert!(lock.contains("github-mcp-server"), "{lock}");
}

// Scenario 2: cyclic imports are fatal and name both files.
#[test]
fn cyclic_imports_are_fatal() {
    let (error, _) = compile_err(&[
        ("root.md", "---\non: issues\nimports: [a.md]\n---\nRoot\n"),
        ("a.md", "---\nimports: [b.md]\n---\nA\n"),
        ("b.md", "---\nimports: [a.md]\n---\nB\n"),
    ]);
    let rendered = error.to_string();
    assert!(rendered.contains("mport cycle detected"), "{rendered}");
    assert!(rendered.contains("a.md"), "{rendered}");
    assert!(rendered.contains("b.md"), "{rendered}");
}

// Scenario 3: macOS runners are rejected with the FAQ URL, and no lock
// file is written.
#[test]
fn macos_runner_is_rejected() {
    let (error, lock_path) = compile_err(&[(
        "wf.md",
        "---\non: issues\nengine: claude\nruns-on: macos-latest\n---\nBody\n",
    )]);
    let rendered = error.to_string();
    assert!(rendered.contains("macos-latest"), "{rendered}");
    assert!(
        rendered.contains("githubnext.github.io/gh-aw/reference/faq"),
        "{rendered}"
    );
    assert!(!lock_path.exists());
}

// Scenario 4: workflow_run without branches compiles with a warning and
// the trigger appears in the emitted file.
#[test]
fn workflow_run_without_branches_warns() {
    let (lock, warnings) = compile_ok(&[(
        "wf.md",
        "---\non:\n  workflow_run:\n    workflows: [foo]\n    types: [completed]\nengine: claude\n---\nBody\n",
    )]);
    assert!(warnings >= 1, "expected a warning");
    assert!(lock.contains("workflow_run:"), "{lock}");
    assert!(lock.contains("- foo"), "{lock}");
    assert!(lock.contains("- completed"), "{lock}");
}

// Strict mode promotes the same condition to an error.
#[test]
fn workflow_run_without_branches_fails_in_strict_mode() {
    let dir = TempDir::new().unwrap();
    let root = write_tree(
        &dir,
        &[(
            "wf.md",
            "---\non:\n  workflow_run:\n    workflows: [foo]\nengine: claude\n---\nBody\n",
        )],
    );
    let mut compiler = Compiler::new(CompileOptions {
        strict: true,
        no_emit: false,
        compile_time: Some(fixed_time()),
    });
    let error = compiler.compile(&root).expect_err("strict mode must fail");
    assert!(error.to_string().contains("branches"), "{error}");
}

// Scenario 5: invalid target shape suggests the issue-number expression.
#[test]
fn invalid_target_suggests_expression() {
    let (error, _) = compile_err(&[(
        "wf.md",
        "---\non: issues\nengine: claude\nsafe-outputs:\n  add-comment:\n    target: event\n---\nBody\n",
    )]);
    let rendered = error.to_string();
    assert!(
        rendered.contains("${{ github.event.issue.number }}"),
        "{rendered}"
    );
}

// Scenario 6: plaintext jobs.*.secrets.* values are schema errors.
#[test]
fn plaintext_job_secret_is_rejected() {
    let (error, _) = compile_err(&[(
        "wf.md",
        "---\non: issues\nengine: claude\njobs:\n  deploy:\n    uses: ./.github/workflows/deploy.yml\n    secrets:\n      token: my-plaintext-secret\n---\nBody\n",
    )]);
    let rendered = error.to_string();
    assert!(rendered.contains("does not match pattern"), "{rendered}");
    assert_eq!(error.kind(), aw_core::ErrorKind::Schema);
}

// Scenario 7: a missing custom agent file is fatal.
#[test]
fn missing_agent_file_is_fatal() {
    let (error, _) = compile_err(&[(
        ".github/workflows/wf.md",
        "---\non: issues\nengine:\n  id: claude\n  agent-file: .github/agents/missing.md\n---\nBody\n",
    )]);
    let rendered = error.to_string();
    assert!(rendered.contains(".github/agents/missing.md"), "{rendered}");
    assert!(rendered.contains("does not exist"), "{rendered}");
}

// Scenario 8: a secrets reference in the body never reaches the lock file.
#[test]
fn secret_expression_in_body_is_fatal() {
    let (error, lock_path) = compile_err(&[(
        "wf.md",
        "---\non: issues\nengine: claude\n---\nToken: ${{ secrets.GITHUB_TOKEN }}\n",
    )]);
    let rendered = error.to_string();
    assert!(rendered.contains("secrets"), "{rendered}");
    assert!(!lock_path.exists());
}

// Scenario 9: recompiling unchanged input does not rewrite the lock file.
#[test]
fn idempotent_write_preserves_mtime() {
    let dir = TempDir::new().unwrap();
    let root = write_tree(
        &dir,
        &[("wf.md", "---\non: issues\nengine: claude\n---\nBody\n")],
    );
    let mut compiler = compiler();
    let first = compiler.compile(&root).unwrap();
    assert_eq!(first.outcome, WriteOutcome::Written);
    let mtime = fs::metadata(&first.lock_path).unwrap().modified().unwrap();

    std::thread::sleep(std::time::Duration::from_millis(20));
    let second = compiler.compile(&root).unwrap();
    assert_eq!(second.outcome, WriteOutcome::Unchanged);
    let mtime_after = fs::metadata(&second.lock_path).unwrap().modified().unwrap();
    assert_eq!(mtime, mtime_after, "unchanged content must not touch the file");
}

// Scenario 10: nested diamond with full topological constraints.
#[test]
fn nested_imports_are_topologically_ordered() {
    let (lock, _) = compile_ok(&[
        (
            "main.md",
            "---\non: issues\nengine: claude\nimports: [a.md, b.md]\n---\nMain\n",
        ),
        ("a.md", "---\nimports: [c.md, d.md]\n---\nA\n"),
        ("b.md", "---\nimports: [e.md]\n---\nB\n"),
        ("c.md", "---\nimports: [f.md]\n---\nC\n"),
        ("d.md", "---\n---\nD\n"),
        ("e.md", "---\n---\nE\n"),
        ("f.md", "---\n---\nF\n"),
    ]);
    let manifest: Vec<&str> = lock.lines().filter(|l| l.starts_with("#   - ")).collect();
    let pos = |needle: &str| {
        manifest
            .iter()
            .position(|l| l.contains(needle))
            .unwrap_or_else(|| panic!("{needle} missing from {manifest:?}"))
    };
    assert!(pos("f.md") < pos("c.md"));
    assert!(pos("c.md") < pos("a.md"));
    assert!(pos("d.md") < pos("a.md"));
    assert!(pos("e.md") < pos("b.md"));
}

// Determinism: identical input trees give byte-identical output.
#[test]
fn compilation_is_deterministic() {
    let files = &[
        (
            "wf.md",
            "---\non: issues\nengine: claude\ntools:\n  github:\n    allowed: [create_issue]\nsafe-outputs:\n  add-comment:\n---\nFix issue ${{ github.event.issue.number }}\n",
        ),
    ];
    let (first, _) = compile_ok(files);
    let (second, _) = compile_ok(files);
    assert_eq!(first, second);
}

// Placeholder round trip: no original expression survives in the heredoc,
// and the interpolation step recovers each one.
#[test]
fn expressions_become_placeholders_with_env_recovery() {
    let (lock, _) = compile_ok(&[(
        "wf.md",
        "---\non: issues\nengine: claude\n---\nIssue ${{ github.event.issue.number }} opened by ${{ github.actor }}\n",
    )]);

    // The heredoc body carries placeholders only.
    let heredoc_start = lock.find("GH_AW_PROMPT_EOF").unwrap();
    let heredoc_end = lock[heredoc_start + 1..]
        .find("GH_AW_PROMPT_EOF")
        .map(|i| heredoc_start + 1 + i)
        .unwrap();
    let heredoc = &lock[heredoc_start..heredoc_end];
    assert!(!heredoc.contains("${{"), "{heredoc}");
    assert!(heredoc.contains("__GH_AW_GITHUB_EVENT_ISSUE_NUMBER_"), "{heredoc}");

    // The interpolation step maps env vars back to the expressions.
    assert!(lock.contains("GH_AW_EXPR_"), "{lock}");
    assert!(lock.contains("${{ github.event.issue.number }}"), "{lock}");
    assert!(lock.contains("${{ github.actor }}"), "{lock}");
}

// The emitted jobs close over their dependencies.
#[test]
fn rendered_needs_reference_declared_jobs() {
    let (lock, _) = compile_ok(&[(
        "wf.md",
        "---\non: issues\nengine: claude\nsafe-outputs:\n  create-issue:\n  threat-detection: true\n---\nBody\n",
    )]);
    let job_names = ["activation", "agent", "detection", "safe_outputs"];
    for name in job_names {
        assert!(lock.contains(&format!("  {name}:\n")), "{name} missing:\n{lock}");
    }
    // Single-target needs: lines must reference declared jobs.
    for line in lock.lines() {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix("needs: ") {
            assert!(job_names.contains(&rest), "unknown need {rest}");
        }
    }
}

// Prompt chunk limit: an oversized prompt fails with a limit error.
#[test]
fn oversized_prompt_fails_with_limit_error() {
    let body = format!("{}\n", "long prompt line ".repeat(40)).repeat(200);
    assert!(body.len() > 100_000);
    let frontmatter = "---\non: issues\nengine: claude\n---\n".to_string();
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("wf.md");
    fs::write(&root, format!("{frontmatter}{body}")).unwrap();
    let mut compiler = compiler();
    let error = compiler.compile(&root).expect_err("six chunks must fail");
    assert_eq!(error.kind(), aw_core::ErrorKind::Limit);
}

// A large but within-limits prompt compiles without warnings about size.
#[test]
fn large_prompt_within_limits_compiles() {
    let body = format!("{}\n", "prompt line ".repeat(30)).repeat(200);
    assert!(body.len() < 100_000);
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("wf.md");
    fs::write(&root, format!("---\non: issues\nengine: claude\n---\n{body}")).unwrap();
    let mut compiler = compiler();
    let result = compiler.compile(&root).expect("within limits");
    assert!(result.lock_text.len() < 500_000);
}

// The lock file's fixed head: empty top-level permissions and the
// generated concurrency group.
#[test]
fn lock_head_has_empty_permissions_and_concurrency() {
    let (lock, _) = compile_ok(&[(
        "wf.md",
        "---\non: issues\nengine: claude\nname: Triage\n---\nBody\n",
    )]);
    assert!(lock.contains("name: Triage\n"), "{lock}");
    assert!(lock.contains("permissions: {}\n"), "{lock}");
    assert!(lock.contains("gh-aw-${{ github.workflow }}"), "{lock}");
    assert!(lock.contains("# Frontmatter hash: sha256:"), "{lock}");
}

// A workflow using stop-after embeds the resolved absolute timestamp.
#[test]
fn stop_after_is_resolved_at_compile_time() {
    let (lock, _) = compile_ok(&[(
        "wf.md",
        "---\non: issues\nengine: claude\nstop-after: +25h\n---\nBody\n",
    )]);
    assert!(lock.contains("# Stop time: 2026-03-02 13:00:00"), "{lock}");
    assert!(lock.contains("GH_AW_STOP_TIME"), "{lock}");
}

// Unknown front-matter keys are schema errors naming the file.
#[test]
fn unknown_frontmatter_key_is_a_schema_error() {
    let (error, _) = compile_err(&[(
        "wf.md",
        "---\non: issues\nengine: claude\ntypo-key: true\n---\nBody\n",
    )]);
    assert_eq!(error.kind(), aw_core::ErrorKind::Schema);
    assert!(error.to_string().contains("typo-key"), "{error}");
}

// Runtime imports stay macros; @include content is pasted.
#[test]
fn runtime_imports_and_includes_differ_in_the_prompt() {
    let (lock, _) = compile_ok(&[
        (
            "wf.md",
            "---\non: issues\nengine: claude\nimports: [shared.md]\n---\nBody\n@include frag.md\n",
        ),
        ("shared.md", "---\n---\nShared guidance text\n"),
        ("frag.md", "---\n---\nFragment text\n"),
    ]);
    assert!(lock.contains("{{#runtime-import shared.md}}"), "{lock}");
    assert!(!lock.contains("Shared guidance text"), "{lock}");
    assert!(lock.contains("Fragment text"), "{lock}");
}

// Import inputs substitute into the pasted content.
#[test]
fn import_inputs_parameterise_inlined_content() {
    let (lock, _) = compile_ok(&[
        (
            "wf.md",
            "---\non: issues\nengine: claude\nimports:\n  - id: tmpl.md\n    inputs:\n      area: docs\n---\nBody\n",
        ),
        ("tmpl.md", "---\n---\nFocus on the {{area}} area.\n"),
    ]);
    assert!(lock.contains("Focus on the docs area."), "{lock}");
    assert!(!lock.contains("{{area}}"), "{lock}");
}

// Custom engines bypass runtime install and emit their own steps.
#[test]
fn custom_engine_emits_verbatim_steps() {
    let (lock, _) = compile_ok(&[(
        "wf.md",
        "---\non: issues\nengine:\n  id: custom\n  steps:\n    - name: Run local agent\n      run: ./scripts/agent.sh\n---\nBody\n",
    )]);
    assert!(lock.contains("Run local agent"), "{lock}");
    assert!(lock.contains("./scripts/agent.sh"), "{lock}");
    assert!(!lock.contains("setup-node"), "{lock}");
}

// cache-memory adds a cache step, not an MCP server.
#[test]
fn cache_memory_emits_cache_step() {
    let (lock, _) = compile_ok(&[(
        "wf.md",
        "---\non: issues\nengine: claude\ntools:\n  cache-memory:\n---\nBody\n",
    )]);
    assert!(lock.contains("actions/cache@v4"), "{lock}");
    assert!(lock.contains("/tmp/gh-aw/cache-memory"), "{lock}");
    assert!(!lock.contains("\"cache-memory\""), "{lock}");
}

// Reaction and lock grant conversation-write to the agent job.
#[test]
fn reaction_grants_issue_write_on_agent_job() {
    let (lock, _) = compile_ok(&[(
        "wf.md",
        "---\non:\n  issues:\n  reaction: eyes\nengine: claude\n---\nBody\n",
    )]);
    let agent_start = lock.find("  agent:").expect("agent job");
    let agent_section = &lock[agent_start..];
    assert!(agent_section.contains("issues: write"), "{agent_section}");
    assert!(lock.contains("GH_AW_REACTION"), "{lock}");
}

// Author-provided concurrency passes through; firewall config emits the
// egress step.
#[test]
fn concurrency_and_firewall_pass_through() {
    let (lock, _) = compile_ok(&[(
        "wf.md",
        "---\non: issues\nengine: claude\nconcurrency:\n  group: triage-${{ github.workflow }}\n  cancel-in-progress: true\nnetwork:\n  allowed: [example.com]\n  firewall: true\n---\nBody\n",
    )]);
    assert!(lock.contains("triage-${{ github.workflow }}"), "{lock}");
    assert!(lock.contains("Enable egress firewall"), "{lock}");
    assert!(lock.contains("example.com"), "{lock}");
}

// Env passthrough: workflow env lands at the top level, engine env on the
// execution step.
#[test]
fn env_passthrough_reaches_the_right_scopes() {
    let (lock, _) = compile_ok(&[(
        "wf.md",
        "---\non: issues\nengine:\n  id: claude\n  env:\n    CLAUDE_DEBUG: '1'\nenv:\n  DEPLOY_REGION: eu-west-1\n---\nBody\n",
    )]);
    assert!(lock.contains("env:\n  DEPLOY_REGION: eu-west-1"), "{lock}");
    assert!(lock.contains("CLAUDE_DEBUG"), "{lock}");
}

// The emitted lock validates against the embedded workflow schema; a
// sanity check that compile output parses as YAML at all.
#[test]
fn lock_text_is_valid_yaml() {
    let (lock, _) = compile_ok(&[(
        "wf.md",
        "---\non: issues\nengine: claude\nsafe-outputs:\n  add-comment:\n---\nBody ${{ github.actor }}\n",
    )]);
    let parsed: serde_yaml::Value = serde_yaml::from_str(&lock).expect("lock must parse");
    assert!(parsed.get("jobs").is_some());
    let on = parsed.get("on").expect("on key");
    assert!(on.get("issues").is_some(), "{on:?}");
}
