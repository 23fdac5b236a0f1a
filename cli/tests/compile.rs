//! Binary-level smoke tests for `aw compile`

#![allow(clippy::unwrap_used, clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn aw() -> Command {
    Command::cargo_bin("aw").expect("binary builds")
}

#[test]
fn compile_writes_lock_file_and_exits_zero() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("triage.md");
    fs::write(&source, "---\non: issues\nengine: claude\n---\nTriage issues.\n").unwrap();

    aw().arg("compile")
        .arg(&source)
        .assert()
        .success()
        .stdout(predicate::str::contains("triage.lock.yml"));

    let lock = dir.path().join("triage.lock.yml");
    let text = fs::read_to_string(&lock).expect("lock file written");
    assert!(text.contains("permissions: {}"));
}

#[test]
fn second_compile_reports_unchanged() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("wf.md");
    fs::write(&source, "---\non: issues\nengine: claude\n---\nBody\n").unwrap();

    aw().arg("compile").arg(&source).assert().success();
    aw().arg("compile")
        .arg(&source)
        .assert()
        .success()
        .stdout(predicate::str::contains("unchanged"));
}

#[test]
fn compile_failure_exits_one_with_error_kind() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("wf.md");
    fs::write(
        &source,
        "---\non: issues\nengine: claude\nruns-on: macos-latest\n---\nBody\n",
    )
    .unwrap();

    aw().arg("compile")
        .arg(&source)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error[VALIDATION_ERROR]"))
        .stderr(predicate::str::contains("macos-latest"));
}

#[test]
fn missing_input_file_is_an_infrastructure_error() {
    aw().arg("compile")
        .arg("/definitely/not/here.md")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn no_emit_checks_without_writing() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("wf.md");
    fs::write(&source, "---\non: issues\nengine: claude\n---\nBody\n").unwrap();

    aw().arg("compile")
        .arg("--no-emit")
        .arg(&source)
        .assert()
        .success()
        .stdout(predicate::str::contains("checked"));
    assert!(!dir.path().join("wf.lock.yml").exists());
}

#[test]
fn strict_flag_promotes_warnings() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("wf.md");
    fs::write(
        &source,
        "---\non:\n  workflow_run:\n    workflows: [ci]\nengine: claude\n---\nBody\n",
    )
    .unwrap();

    aw().arg("compile").arg(&source).assert().success();
    aw().arg("compile")
        .arg("--strict")
        .arg(&source)
        .assert()
        .code(1);
}
