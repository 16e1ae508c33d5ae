//! CLI integration tests for pg-automigrate.
//!
//! These tests verify command-line argument parsing, help output,
//! exit codes for configuration errors and the offline `plan` command.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use std::path::PathBuf;

/// Get a command for the pg-automigrate binary.
fn cmd() -> Command {
    Command::cargo_bin("pg-automigrate").unwrap()
}

const CONFIG: &str = "\
datastore:
  host: localhost
  database: app
  user: postgres
";

const MODELS: &str = "\
pet:
  attributes:
    id:
      columnType: _numberkey
      autoIncrement: true
    name:
      columnType: _string
    owner:
      columnType: _numberkey
      model: user
user:
  attributes:
    id:
      columnType: _numberkey
      autoIncrement: true
    email:
      columnType: _string
      unique: true
";

fn write(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("migrate"))
        .stdout(predicate::str::contains("drop"))
        .stdout(predicate::str::contains("health-check"));
}

#[test]
fn test_migrate_subcommand_help() {
    cmd()
        .args(["migrate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--models"))
        .stdout(predicate::str::contains("--schema"))
        .stdout(predicate::str::contains("--workers"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("pg-automigrate"));
}

#[test]
fn test_global_flag_defaults() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("[default: config.yaml]"))
        .stdout(predicate::str::contains("[default: text]"))
        .stdout(predicate::str::contains("[default: info]"));
}

#[test]
fn test_drop_requires_table() {
    cmd()
        .arg("drop")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--table"));
}

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

// =============================================================================
// Exit Code Tests
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_7() {
    // Missing file is an IO error (code 7), not config error (code 1)
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "health-check"])
        .assert()
        .code(7);
}

#[test]
fn test_invalid_yaml_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "invalid: yaml: content: [").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1);
}

#[test]
fn test_empty_config_exits_with_code_1() {
    let file = tempfile::NamedTempFile::new().unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1);
}

#[test]
fn test_missing_host_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "datastore:").unwrap();
    writeln!(file, "  database: app").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("host"));
}

#[test]
fn test_invalid_column_name_exits_with_code_3() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(&dir, "config.yaml", CONFIG);
    let models = write(
        &dir,
        "models.yaml",
        "pet:\n  attributes:\n    id:\n      columnType: _numberkey\n    bad__name:\n      columnType: _string\n",
    );

    cmd()
        .args(["-c", config.to_str().unwrap(), "plan", "--models"])
        .arg(&models)
        .assert()
        .code(3)
        .stderr(predicate::str::contains("bad__name"));
}

// =============================================================================
// Offline Plan Tests
// =============================================================================

#[test]
fn test_plan_prints_ordered_statements() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(&dir, "config.yaml", CONFIG);
    let models = write(&dir, "models.yaml", MODELS);

    cmd()
        .args(["-c", config.to_str().unwrap(), "plan", "--models"])
        .arg(&models)
        .assert()
        .success()
        .stdout(predicate::str::contains("-- creation order: user, pet"))
        .stdout(predicate::str::contains(
            "CREATE TABLE IF NOT EXISTS \"public\".\"user\"",
        ))
        .stdout(predicate::str::contains("REFERENCES \"public\".\"user\" (\"id\")"))
        .stdout(predicate::str::contains("ALTER TABLE").not());
}

#[test]
fn test_plan_defers_cycle_edge() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(&dir, "config.yaml", CONFIG);
    let models = write(
        &dir,
        "models.yaml",
        "\
author:
  attributes:
    id:
      columnType: _numberkey
    favorite:
      columnType: _numberkey
      model: book
book:
  attributes:
    id:
      columnType: _numberkey
    author:
      columnType: _numberkey
      model: author
",
    );

    cmd()
        .args(["-c", config.to_str().unwrap(), "plan", "--models"])
        .arg(&models)
        .assert()
        .success()
        .stdout(predicate::str::contains("-- cycle:"))
        .stdout(predicate::str::contains("-- deferred constraints"))
        .stdout(predicate::str::contains("ADD CONSTRAINT"));
}

#[test]
fn test_plan_json_output() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(&dir, "config.yaml", CONFIG);
    let models = write(&dir, "models.yaml", MODELS);

    let output = cmd()
        .args(["-c", config.to_str().unwrap(), "--output-json", "plan", "--models"])
        .arg(&models)
        .output()
        .unwrap();
    assert!(output.status.success());

    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(plan["creation_order"], serde_json::json!(["user", "pet"]));
    assert_eq!(plan["tables"].as_array().unwrap().len(), 2);
}

#[test]
fn test_plan_missing_models_file_exits_with_code_7() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(&dir, "config.yaml", CONFIG);

    cmd()
        .args(["-c", config.to_str().unwrap(), "plan", "--models", "missing.yaml"])
        .assert()
        .code(7);
}
