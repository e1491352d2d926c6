//! Binary-level tests for the nmlock exit-code contract.

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

/// Lay out a scratch index directory plus a config file pointing at it.
fn scratch_database(dir: &Path) -> (PathBuf, PathBuf) {
    let db_path = dir.join("mail");
    std::fs::create_dir(&db_path).unwrap();

    let config_path = dir.join("notmuch-config");
    std::fs::write(
        &config_path,
        format!(
            "[database]\npath={}\n\n[new]\ntags=unread;inbox;\n",
            db_path.display()
        ),
    )
    .unwrap();

    (config_path, db_path)
}

#[test]
fn help_shows_usage() {
    let mut cmd = cargo_bin_cmd!("nmlock");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--sleep"))
        .stdout(predicate::str::contains("COMMAND"));
}

#[test]
fn missing_command_is_a_usage_error() {
    let mut cmd = cargo_bin_cmd!("nmlock");
    cmd.env("NOTMUCH_CONFIG", "/nonexistent")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("COMMAND"));
}

#[test]
fn forwards_a_successful_exit() {
    let dir = tempfile::tempdir().unwrap();
    let (config_path, _db_path) = scratch_database(dir.path());

    let mut cmd = cargo_bin_cmd!("nmlock");
    cmd.env("NOTMUCH_CONFIG", &config_path)
        .args(["--sleep=5000", "--", "true"])
        .assert()
        .success();
}

#[test]
fn forwards_a_nonzero_exit() {
    let dir = tempfile::tempdir().unwrap();
    let (config_path, _db_path) = scratch_database(dir.path());

    let mut cmd = cargo_bin_cmd!("nmlock");
    cmd.env("NOTMUCH_CONFIG", &config_path)
        .args(["--sleep=5000", "--", "sh", "-c", "exit 7"])
        .assert()
        .failure()
        .code(7);
}

#[test]
fn missing_config_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();

    let mut cmd = cargo_bin_cmd!("nmlock");
    cmd.env("NOTMUCH_CONFIG", dir.path().join("absent"))
        .args(["--sleep=5000", "--", "true"])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn unresolvable_config_location_is_fatal() {
    let mut cmd = cargo_bin_cmd!("nmlock");
    cmd.env_remove("NOTMUCH_CONFIG")
        .env_remove("HOME")
        .args(["--sleep=5000", "--", "true"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("NOTMUCH_CONFIG"));
}

#[test]
fn missing_database_directory_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("notmuch-config");
    std::fs::write(&config_path, "[database]\npath=/nonexistent/mail\n").unwrap();

    let mut cmd = cargo_bin_cmd!("nmlock");
    cmd.env("NOTMUCH_CONFIG", &config_path)
        .args(["--sleep=5000", "--", "true"])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn spawn_failure_reports_the_sentinel() {
    let dir = tempfile::tempdir().unwrap();
    let (config_path, _db_path) = scratch_database(dir.path());

    let mut cmd = cargo_bin_cmd!("nmlock");
    cmd.env("NOTMUCH_CONFIG", &config_path)
        .args(["--sleep=5000", "--", "nmlock-no-such-command-1234"])
        .assert()
        .failure()
        .code(1);
}
