//! Binary-level tests for the benchwarden CLI
#![allow(deprecated)] // suppress assert_cmd::Command::cargo_bin deprecation in tests

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use assert_cmd::Command;
use benchwarden::record::HistoricalRecord;
use chrono::Utc;
use predicates::prelude::*;

fn write_cases(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("cases.json");
    let json = serde_json::json!({
        "cases": [
            {
                "id": "parser_large",
                "suite": "compile",
                "description": "large parser stress input",
                "tags": ["parser"],
                "entry": "cases/parser_large.hash"
            }
        ]
    });
    fs::write(&path, serde_json::to_string_pretty(&json).unwrap()).unwrap();
    path
}

fn write_fake_compiler(dir: &Path, commit: &str, value: f64) {
    let artifact = dir.join(commit);
    fs::write(
        &artifact,
        format!(
            "#!/bin/sh\necho '{{\"message\":\"measurement\",\"metric\":\"compile_time_ms\",\"value\":{value},\"unit\":\"ms\"}}'\n"
        ),
    )
    .unwrap();
    let mut perms = fs::metadata(&artifact).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&artifact, perms).unwrap();
}

fn seed_history(path: &Path, centers: &[f64]) {
    let records: Vec<HistoricalRecord> = centers
        .iter()
        .enumerate()
        .map(|(i, center)| HistoricalRecord {
            case_id: "parser_large".to_string(),
            metric: "compile_time_ms".to_string(),
            commit_ref: format!("seed{i}"),
            timestamp: Utc::now() - chrono::Duration::minutes((centers.len() - i) as i64),
            center: *center,
            spread: 1.0,
            sample_count: 3,
        })
        .collect();
    fs::write(path, serde_json::to_string_pretty(&records).unwrap()).unwrap();
}

#[test]
fn test_help_lists_core_flags() {
    let mut cmd = Command::cargo_bin("benchwarden").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--cases"))
        .stdout(predicate::str::contains("--commit"))
        .stdout(predicate::str::contains("--artifact-dir"))
        .stdout(predicate::str::contains("--format"));
}

#[test]
fn test_missing_required_args_fails() {
    let mut cmd = Command::cargo_bin("benchwarden").unwrap();
    cmd.assert().failure();
}

#[test]
fn test_cold_start_run_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    let cases = write_cases(dir.path());
    write_fake_compiler(dir.path(), "abc123", 100.0);

    let mut cmd = Command::cargo_bin("benchwarden").unwrap();
    cmd.arg("--cases")
        .arg(&cases)
        .arg("--commit")
        .arg("abc123")
        .arg("--artifact-dir")
        .arg(dir.path())
        .arg("--repetitions")
        .arg("2")
        .assert()
        .success()
        .stdout(predicate::str::contains("parser_large"))
        .stdout(predicate::str::contains("Inconclusive"));
}

#[test]
fn test_regression_blocks_with_exit_code_one() {
    let dir = tempfile::tempdir().unwrap();
    let cases = write_cases(dir.path());
    write_fake_compiler(dir.path(), "candidate", 140.0);
    let history = dir.path().join("history.json");
    seed_history(&history, &[100.0, 100.0, 100.0, 100.0, 100.0]);

    let mut cmd = Command::cargo_bin("benchwarden").unwrap();
    cmd.arg("--cases")
        .arg(&cases)
        .arg("--commit")
        .arg("candidate")
        .arg("--artifact-dir")
        .arg(dir.path())
        .arg("--history")
        .arg(&history)
        .arg("--repetitions")
        .arg("2")
        .arg("--format")
        .arg("json")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("\"overall_status\": \"REGRESSION\""));
}

#[test]
fn test_missing_artifact_reports_failure_status() {
    let dir = tempfile::tempdir().unwrap();
    let cases = write_cases(dir.path());

    let mut cmd = Command::cargo_bin("benchwarden").unwrap();
    cmd.arg("--cases")
        .arg(&cases)
        .arg("--commit")
        .arg("unbuilt")
        .arg("--artifact-dir")
        .arg(dir.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unbuilt"));
}

#[test]
fn test_history_file_grows_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let cases = write_cases(dir.path());
    let history = dir.path().join("history.json");

    for commit in ["r1", "r2"] {
        write_fake_compiler(dir.path(), commit, 100.0);
        let mut cmd = Command::cargo_bin("benchwarden").unwrap();
        cmd.arg("--cases")
            .arg(&cases)
            .arg("--commit")
            .arg(commit)
            .arg("--artifact-dir")
            .arg(dir.path())
            .arg("--history")
            .arg(&history)
            .arg("--repetitions")
            .arg("1")
            .assert()
            .success();
    }

    let records: Vec<HistoricalRecord> =
        serde_json::from_str(&fs::read_to_string(&history).unwrap()).unwrap();
    assert_eq!(records.len(), 2);
}

#[test]
fn test_unknown_tag_filter_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let cases = write_cases(dir.path());
    write_fake_compiler(dir.path(), "abc123", 100.0);

    let mut cmd = Command::cargo_bin("benchwarden").unwrap();
    cmd.arg("--cases")
        .arg(&cases)
        .arg("--commit")
        .arg("abc123")
        .arg("--artifact-dir")
        .arg(dir.path())
        .arg("--tag")
        .arg("no_such_tag")
        .assert()
        .failure();
}
