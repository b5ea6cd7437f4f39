//! CLI integration tests
//!
//! The default action watches and serves forever, so these only exercise the
//! paths that terminate: help output and configuration failures.

use assert_cmd::Command;
use predicates::prelude::*;

fn assetpipe() -> Command {
    Command::cargo_bin("assetpipe").unwrap()
}

#[test]
fn help_mentions_the_default_action_flags() {
    assetpipe()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--port"));
}

#[test]
fn missing_explicit_config_fails() {
    let dir = tempfile::tempdir().unwrap();

    assetpipe()
        .current_dir(dir.path())
        .args(["--config", "nope.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration"));
}

#[test]
fn malformed_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("assetpipe.toml"), "not [ valid toml").unwrap();

    assetpipe()
        .current_dir(dir.path())
        .args(["--config", "assetpipe.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration"));
}

#[test]
fn destination_collision_fails_before_anything_runs() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("assetpipe.toml"),
        r#"
        [categories.a]
        src = "a"
        files = "**/*.css"
        dest = "out"

        [categories.b]
        src = "b"
        files = "**/*.css"
        dest = "out"
        "#,
    )
    .unwrap();

    assetpipe()
        .current_dir(dir.path())
        .args(["--config", "assetpipe.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("same output path"));
}
