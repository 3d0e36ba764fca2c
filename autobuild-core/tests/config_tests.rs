//! Config loading error-message and validation integration tests.

use assert_fs::prelude::*;
use autobuild_core::{config, Auth, CommandSpec, ConfigError};
use predicates::prelude::predicate;
use std::path::PathBuf;

const FULL: &str = r#"
log_level: debug
log_format: json
interval_minutes: 2
repos:
  - name: api
    url: https://example.com/org/api.git
    branch: release
    auth:
      type: https
      username: bot
      token: t0ken
    clone_dir: src/api
    source_dir: cmd/api
    output_dir: bin
    build_cmd:
      - go build -o api .
      - [strip, api]
    restart_cmd: systemctl restart api
    artifact_name: api
  - name: web
    url: git@example.com:org/web.git
    auth:
      type: ssh
      ssh_key: keys/deploy
      strict_host_key_checking: true
    clone_dir: /srv/src/web
    output_dir: /srv/www
    build_cmd: ["npm ci", "npm run build"]
self_update:
  enable: true
  url: https://example.com/org/autobuild.git
  clone_dir: self/src
  output_dir: self/bin
  build_cmd: ["cargo build --release"]
  source_dir: target/release
"#;

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn load_missing_file_returns_io_error_with_path() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let path = dir.path().join("config.yaml");
    let err = config::load_at(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }), "got: {err}");
    assert!(err.to_string().contains("config.yaml"));
}

#[test]
fn load_corrupt_yaml_returns_parse_error_with_path() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("config.yaml");
    file.write_str(": : corrupt : yaml : !!!\n  - broken: [unclosed")
        .expect("write");

    let err = config::load_at(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("config.yaml"));
}

#[test]
fn load_wrong_type_yaml_returns_parse_error() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("config.yaml");
    file.write_str("repos: 42\n").expect("write");
    let err = config::load_at(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
}

// ---------------------------------------------------------------------------
// 2. Full document
// ---------------------------------------------------------------------------

#[test]
fn full_document_loads_and_resolves_paths() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("config.yaml");
    file.write_str(FULL).expect("write");
    file.assert(predicate::path::exists());

    let cfg = config::load_at(file.path()).expect("load");
    assert_eq!(cfg.log_level, "debug");
    assert_eq!(cfg.interval().as_secs(), 120);
    assert_eq!(cfg.repos.len(), 2);

    let api = cfg.repo("api").expect("api repo");
    assert_eq!(api.branch, "release");
    assert_eq!(api.clone_dir, dir.path().join("src/api"));
    assert_eq!(api.output_dir, dir.path().join("bin"));
    assert_eq!(api.source_path(), dir.path().join("src/api").join("cmd/api"));
    assert_eq!(
        api.build_cmd[1],
        CommandSpec::Argv(vec!["strip".to_string(), "api".to_string()])
    );
    assert!(api.restart_cmd.is_some());

    let web = cfg.repo("web").expect("web repo");
    match &web.auth {
        Auth::Ssh {
            ssh_key,
            ssh_passphrase,
            strict_host_key_checking,
        } => {
            assert_eq!(ssh_key, &dir.path().join("keys/deploy"));
            assert!(ssh_passphrase.is_none());
            assert!(*strict_host_key_checking);
        }
        other => panic!("expected ssh auth, got {other:?}"),
    }

    let su = cfg.enabled_self_update().expect("self update enabled");
    assert!(su.run_on_startup);
    assert_eq!(su.clone_dir, dir.path().join("self/src"));
    assert_eq!(su.source_dir, Some(PathBuf::from("target/release")));
}

// ---------------------------------------------------------------------------
// 3. Validation
// ---------------------------------------------------------------------------

fn invalid_reason(yaml: &str) -> String {
    match config::from_yaml_str(yaml, std::path::Path::new("/cfg")) {
        Err(ConfigError::Invalid { reason, .. }) => reason,
        other => panic!("expected Invalid, got {other:?}"),
    }
}

#[test]
fn duplicate_names_are_rejected() {
    let yaml = r#"
repos:
  - { name: a, url: "https://x/a.git", clone_dir: /a, output_dir: /o }
  - { name: a, url: "https://x/b.git", clone_dir: /b, output_dir: /o }
"#;
    assert!(invalid_reason(yaml).contains("duplicate"));
}

#[test]
fn empty_build_command_is_rejected() {
    let yaml = r#"
repos:
  - { name: a, url: "https://x/a.git", clone_dir: /a, output_dir: /o, build_cmd: ["make", ""] }
"#;
    assert!(invalid_reason(yaml).contains("build_cmd[1]"));
}

#[test]
fn https_auth_without_token_is_rejected() {
    let yaml = r#"
repos:
  - name: a
    url: https://x/a.git
    clone_dir: /a
    output_dir: /o
    auth: { type: https, username: bot, token: "" }
"#;
    assert!(invalid_reason(yaml).contains("username and token"));
}

#[test]
fn https_auth_on_scp_style_url_is_rejected() {
    let yaml = r#"
repos:
  - name: a
    url: git@example.com:org/a.git
    clone_dir: /a
    output_dir: /o
    auth: { type: https, username: bot, token: t }
"#;
    assert!(invalid_reason(yaml).contains("invalid remote url"));
}

#[test]
fn artifact_name_with_separator_is_rejected() {
    let yaml = r#"
repos:
  - { name: a, url: "https://x/a.git", clone_dir: /a, output_dir: /o, artifact_name: bin/a }
"#;
    assert!(invalid_reason(yaml).contains("bare file name"));
}

#[rstest::rstest]
#[case(".")]
#[case("..")]
fn artifact_name_of_dot_entries_is_rejected(#[case] name: &str) {
    let yaml = format!(
        "repos:\n  - {{ name: a, url: \"https://x/a.git\", clone_dir: /a, output_dir: /o, artifact_name: \"{name}\" }}\n"
    );
    assert!(invalid_reason(&yaml).contains("bare file name"));
}

#[test]
fn enabled_self_update_without_url_is_rejected() {
    let yaml = r#"
self_update:
  enable: true
  url: ""
  clone_dir: /s
  output_dir: /o
"#;
    assert!(invalid_reason(yaml).contains("url"));
}
