//! End-to-end tests for the `keel` binary.

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

use tempfile::TempDir;

const BUILD: &str = r#"{
    "id": "octocat hello_1",
    "steps": [
        {"id": "step_octocat hello_1_test", "name": "test", "image": "golang:1.22",
         "ruleset": {"if": {"event": ["push"]}}},
        {"id": "step_octocat hello_1_publish", "name": "publish", "image": "plugins/docker",
         "ruleset": {"if": {"event": ["tag"]}}}
    ]
}"#;

const PUSH: &str = r#"{"branch": "main", "event": "push", "repo": "octocat/hello"}"#;

fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, body).expect("write fixture");
    path
}

fn keel(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_keel"))
        .args(args)
        .env_remove("KEEL_DRIVER")
        .env_remove("KEEL_BUILD")
        .env_remove("KEEL_RULES")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run keel")
}

// ── compile ─────────────────────────────────────────────────────────────

/// Test: compile purges and sanitizes for docker by default
#[test]
fn test_compile_docker() {
    let dir = TempDir::new().unwrap();
    let build = write(&dir, "build.json", BUILD);
    let rules = write(&dir, "rules.json", PUSH);

    let out = keel(&[
        "compile",
        "--build",
        build.to_str().unwrap(),
        "--rules",
        rules.to_str().unwrap(),
    ]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let compiled: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(compiled["id"], "octocat-hello_1");

    let steps = compiled["steps"].as_array().unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0]["name"], "test");
    assert_eq!(steps[0]["number"], 1);
    assert_eq!(steps[0]["id"], "step_octocat-hello_1_test");
}

/// Test: compile for kubernetes lowercases and replaces underscores
#[test]
fn test_compile_kubernetes() {
    let dir = TempDir::new().unwrap();
    let build = write(&dir, "build.json", BUILD);
    let rules = write(&dir, "rules.json", PUSH);

    let out = keel(&[
        "compile",
        "-b",
        build.to_str().unwrap(),
        "-r",
        rules.to_str().unwrap(),
        "--driver",
        "kubernetes",
    ]);
    assert!(out.status.success());

    let compiled: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(compiled["steps"][0]["id"], "step-octocat-hello-1-test");
}

/// Test: unknown drivers fail with a non-zero exit
#[test]
fn test_compile_unknown_driver() {
    let dir = TempDir::new().unwrap();
    let build = write(&dir, "build.json", BUILD);
    let rules = write(&dir, "rules.json", PUSH);

    let out = keel(&[
        "compile",
        "-b",
        build.to_str().unwrap(),
        "-r",
        rules.to_str().unwrap(),
        "-d",
        "nomad",
    ]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("nomad"));
}

/// Test: a missing build file is reported
#[test]
fn test_compile_missing_file() {
    let dir = TempDir::new().unwrap();
    let rules = write(&dir, "rules.json", PUSH);
    let missing = dir.path().join("missing.json");

    let out = keel(&[
        "compile",
        "-b",
        missing.to_str().unwrap(),
        "-r",
        rules.to_str().unwrap(),
    ]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("Failed to read"));
}

// ── match ───────────────────────────────────────────────────────────────

/// Test: match reports whether a ruleset applies to the event
#[test]
fn test_match_ruleset() {
    let dir = TempDir::new().unwrap();
    let rules = write(&dir, "rules.json", PUSH);
    let on_push = write(&dir, "push.json", r#"{"if": {"event": ["push"], "branch": ["ma*"]}}"#);
    let on_tag = write(&dir, "tag.json", r#"{"if": {"event": ["tag"]}}"#);

    let out = keel(&[
        "match",
        "--ruleset",
        on_push.to_str().unwrap(),
        "--rules",
        rules.to_str().unwrap(),
    ]);
    assert!(out.status.success());
    let result: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(result["matched"], true);

    let out = keel(&[
        "match",
        "--ruleset",
        on_tag.to_str().unwrap(),
        "--rules",
        rules.to_str().unwrap(),
    ]);
    let result: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(result["matched"], false);
}
