use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn autobuild_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("autobuild"));
    cmd.current_dir(dir)
        .env_remove("AUTOBUILD_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

fn write_config(dir: &Path, yaml: &str) -> PathBuf {
    let path = dir.join("config.yaml");
    fs::write(&path, yaml).expect("write config");
    path
}

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(["-c", "user.name=autobuild", "-c", "user.email=autobuild@example.com"])
        .args(["-c", "commit.gpgsign=false"])
        .args(args)
        .current_dir(dir)
        .output()
        .expect("run git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Local upstream on `main` plus a config that builds an executable `svc`.
fn buildable_workspace() -> (TempDir, String) {
    let root = TempDir::new().expect("tempdir");
    let upstream = root.path().join("upstream");
    fs::create_dir_all(&upstream).expect("mkdir");
    git(&upstream, &["init", "-q"]);
    git(&upstream, &["checkout", "-q", "-b", "main"]);
    fs::write(upstream.join("README"), "hello\n").expect("write");
    git(&upstream, &["add", "."]);
    git(&upstream, &["commit", "-q", "-m", "initial"]);
    let head = git(&upstream, &["rev-parse", "HEAD"]);

    write_config(
        root.path(),
        &format!(
            r##"
log_level: warn
repos:
  - name: svc
    url: "{}"
    clone_dir: work/svc
    output_dir: bin
    build_cmd:
      - "printf '#!/bin/sh\n' > svc && chmod 755 svc"
"##,
            upstream.display()
        ),
    );
    (root, head)
}

const VALID: &str = r#"
interval_minutes: 2
repos:
  - name: api
    url: "https://example.com/org/api.git"
    auth: { type: https, username: bot, token: t0k }
    clone_dir: src/api
    output_dir: bin
    build_cmd: ["make"]
  - name: web
    url: "git@example.com:org/web.git"
    branch: release
    auth: { type: ssh, ssh_key: keys/id_ed25519 }
    clone_dir: src/web
    output_dir: www
    build_cmd: ["npm ci", "npm run build"]
"#;

// ---------------------------------------------------------------------------
// check
// ---------------------------------------------------------------------------

#[test]
fn check_summarises_a_valid_config() {
    let dir = TempDir::new().expect("tempdir");
    write_config(dir.path(), VALID);

    autobuild_cmd(dir.path())
        .arg("check")
        .assert()
        .success()
        .stdout(contains("2 repositories, every 2 min"))
        .stdout(contains("api [main] https auth"))
        .stdout(contains("web [release] ssh auth, 2 build step(s)"))
        .stdout(contains("self-update: disabled"))
        .stdout(contains("t0k").not());
}

#[test]
fn check_rejects_duplicate_names() {
    let dir = TempDir::new().expect("tempdir");
    write_config(
        dir.path(),
        r#"
repos:
  - { name: a, url: "https://x/a.git", clone_dir: a, output_dir: o }
  - { name: a, url: "https://x/b.git", clone_dir: b, output_dir: o }
"#,
    );

    autobuild_cmd(dir.path())
        .arg("check")
        .assert()
        .failure()
        .stderr(contains("failed to load configuration"))
        .stderr(contains("duplicate repository name"));
}

#[test]
fn missing_config_file_is_reported() {
    let dir = TempDir::new().expect("tempdir");
    autobuild_cmd(dir.path())
        .args(["--config", "nope.yaml", "check"])
        .assert()
        .failure()
        .stderr(contains("nope.yaml"));
}

#[test]
fn config_path_can_come_from_the_environment() {
    let dir = TempDir::new().expect("tempdir");
    let elsewhere = dir.path().join("etc");
    fs::create_dir_all(&elsewhere).expect("mkdir");
    let path = write_config(&elsewhere, VALID);

    autobuild_cmd(dir.path())
        .env("AUTOBUILD_CONFIG", &path)
        .arg("check")
        .assert()
        .success()
        .stdout(contains("2 repositories"));
}

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

#[test]
fn status_before_any_build_shows_never() {
    let dir = TempDir::new().expect("tempdir");
    write_config(dir.path(), VALID);

    autobuild_cmd(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(contains("2 repositories"))
        .stdout(contains("never"));
}

#[test]
fn status_json_lists_every_repository() {
    let dir = TempDir::new().expect("tempdir");
    write_config(dir.path(), VALID);

    let output = autobuild_cmd(dir.path())
        .args(["status", "--json"])
        .output()
        .expect("run");
    assert!(output.status.success());
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(rows.as_array().map(Vec::len), Some(2));
    assert_eq!(rows[0]["name"], "api");
    assert_eq!(rows[0]["cloned"], false);
    assert!(rows[0]["last_built_commit"].is_null());
}

// ---------------------------------------------------------------------------
// build / run
// ---------------------------------------------------------------------------

#[test]
fn build_then_status_reports_the_commit() {
    let (root, head) = buildable_workspace();

    autobuild_cmd(root.path())
        .args(["build", "svc"])
        .assert()
        .success()
        .stdout(contains("'svc' built"));
    assert!(root.path().join("bin/svc").is_file());

    autobuild_cmd(root.path())
        .args(["build", "svc"])
        .assert()
        .success()
        .stdout(contains("'svc' up to date"));

    let output = autobuild_cmd(root.path())
        .args(["status", "--json"])
        .output()
        .expect("run");
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(rows[0]["cloned"], true);
    assert_eq!(rows[0]["last_built_commit"], head.as_str());
    assert!(rows[0]["last_built_at"].is_string());
}

#[test]
fn force_rebuilds_an_up_to_date_repository() {
    let (root, _) = buildable_workspace();
    autobuild_cmd(root.path())
        .args(["build", "svc"])
        .assert()
        .success();

    autobuild_cmd(root.path())
        .args(["build", "svc", "--force"])
        .assert()
        .success()
        .stdout(contains("'svc' built"));
}

#[test]
fn unknown_repository_lists_configured_names() {
    let (root, _) = buildable_workspace();
    autobuild_cmd(root.path())
        .args(["build", "nope"])
        .assert()
        .failure()
        .stderr(contains("unknown repository 'nope' (configured: svc)"));
}

#[test]
fn run_once_builds_every_repository() {
    let (root, _) = buildable_workspace();
    autobuild_cmd(root.path())
        .args(["run", "--once"])
        .assert()
        .success();
    assert!(root.path().join("bin/svc").is_file());
    assert!(root.path().join("work/svc/.last_commit").is_file());
}

#[test]
fn run_once_fails_when_a_repository_fails() {
    let dir = TempDir::new().expect("tempdir");
    write_config(
        dir.path(),
        &format!(
            "repos:\n  - {{ name: gone, url: \"{}\", clone_dir: c, output_dir: o }}\n",
            dir.path().join("missing").display()
        ),
    );
    autobuild_cmd(dir.path())
        .args(["run", "--once"])
        .assert()
        .failure()
        .stderr(contains("1 of 1 repositories failed"));
}
