//! Binary-level tests: startup, configuration handling and the repair
//! command. None of these launch a browser.

mod common;

use assert_cmd::cargo::cargo_bin_cmd;
use common::fixtures::fixture_path;
use predicates::prelude::*;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

fn mapleads() -> assert_cmd::Command {
    cargo_bin_cmd!("mapleads")
}

#[test]
fn test_help_lists_subcommands() {
    mapleads()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("scrape"))
        .stdout(predicate::str::contains("repair"));
}

#[test]
fn test_init_writes_default_config() {
    let tmp = TempDir::new().unwrap();

    mapleads()
        .current_dir(tmp.path())
        .arg("--init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created default configuration file"));

    let written = fs::read_to_string(tmp.path().join("config").join("mapleads.toml")).unwrap();
    assert_eq!(written, mapleads::config::DEFAULT_CONFIG);
}

/// Without a TTY the missing-config prompt is skipped and the binary exits
/// with a hint instead of waiting on stdin.
#[test]
fn test_scrape_without_config_exits_with_hint() {
    let tmp = TempDir::new().unwrap();

    mapleads()
        .current_dir(tmp.path())
        .args(["scrape", "--query", "padarias"])
        .timeout(Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("--init"));
}

#[test]
fn test_scrape_rejects_invalid_arguments() {
    let tmp = TempDir::new().unwrap();

    mapleads()
        .current_dir(tmp.path())
        .args(["scrape", "--query", "padarias", "--max-results", "0"])
        .timeout(Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Max results must be greater than 0"));
}

#[test]
fn test_no_command_fails() {
    let tmp = TempDir::new().unwrap();

    mapleads()
        .current_dir(tmp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("No command given"));
}

#[test]
fn test_repair_without_config_uses_defaults() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("leads.csv");
    fs::copy(fixture_path("csv/leads_with_sentinels.csv"), &input).unwrap();

    mapleads()
        .current_dir(tmp.path())
        .args(["repair", "leads.csv"])
        .timeout(Duration::from_secs(10))
        .assert()
        .success()
        .stdout(predicate::str::contains("Rows repaired: 3/6"));

    let outputs: Vec<_> = fs::read_dir(tmp.path())
        .unwrap()
        .flatten()
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| name.starts_with("leads_corrigidos_manual_"))
        .collect();
    assert_eq!(outputs.len(), 1);
}

#[test]
fn test_repair_honours_output_dir() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("leads.csv");
    fs::copy(fixture_path("csv/leads_with_sentinels.csv"), &input).unwrap();
    let out_dir = tmp.path().join("fixed");

    mapleads()
        .current_dir(tmp.path())
        .args(["repair", "leads.csv", "--output-dir"])
        .arg(&out_dir)
        .timeout(Duration::from_secs(10))
        .assert()
        .success();

    assert_eq!(fs::read_dir(&out_dir).unwrap().count(), 1);
}

#[test]
fn test_repair_missing_input_fails() {
    let tmp = TempDir::new().unwrap();

    mapleads()
        .current_dir(tmp.path())
        .args(["repair", "missing.csv"])
        .timeout(Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input file not found"));

    assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
}

#[test]
fn test_repair_with_invalid_config_fails() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("config")).unwrap();
    fs::write(tmp.path().join("config").join("mapleads.toml"), "[browser]\nheadless = \"maybe\"\n").unwrap();
    fs::copy(fixture_path("csv/leads_with_sentinels.csv"), tmp.path().join("leads.csv")).unwrap();

    mapleads()
        .current_dir(tmp.path())
        .args(["repair", "leads.csv"])
        .timeout(Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}
