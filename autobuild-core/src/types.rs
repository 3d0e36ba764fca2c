//! Domain types for the autobuild configuration.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.
//! All types are serializable/deserializable via serde + serde_yaml.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

/// Polling interval used when `interval_minutes` is absent or not positive.
pub const DEFAULT_INTERVAL_MINUTES: i64 = 5;

/// Longest polling interval honoured (one year); larger values are clamped.
pub const MAX_INTERVAL_MINUTES: i64 = 365 * 24 * 60;

/// Branch tracked when a repository does not name one.
pub const DEFAULT_BRANCH: &str = "main";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed name for a watched repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepoName(pub String);

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for RepoName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RepoName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Output format of the daemon's log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// A build or restart command.
///
/// A plain string is handed to the platform shell; a list is spawned directly
/// with its first element as the program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
    Shell(String),
    Argv(Vec<String>),
}

impl CommandSpec {
    /// `true` when there is nothing to execute.
    pub fn is_empty(&self) -> bool {
        match self {
            CommandSpec::Shell(line) => line.trim().is_empty(),
            CommandSpec::Argv(argv) => argv.first().map_or(true, |p| p.trim().is_empty()),
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandSpec::Shell(line) => f.write_str(line),
            CommandSpec::Argv(argv) => f.write_str(&argv.join(" ")),
        }
    }
}

/// How the daemon authenticates against a remote.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Auth {
    /// Public repository, or credentials handled outside the daemon.
    #[default]
    None,
    /// Username + token embedded into the HTTPS remote URL.
    Https { username: String, token: String },
    /// Private key handed to ssh through `GIT_SSH_COMMAND`.
    Ssh {
        ssh_key: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ssh_passphrase: Option<String>,
        /// Off by default so unattended first connections succeed.
        #[serde(default)]
        strict_host_key_checking: bool,
    },
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::None => f.write_str("None"),
            Auth::Https { username, .. } => f
                .debug_struct("Https")
                .field("username", username)
                .field("token", &"<redacted>")
                .finish(),
            Auth::Ssh {
                ssh_key,
                ssh_passphrase,
                strict_host_key_checking,
            } => f
                .debug_struct("Ssh")
                .field("ssh_key", ssh_key)
                .field(
                    "ssh_passphrase",
                    &ssh_passphrase.as_ref().map(|_| "<redacted>"),
                )
                .field("strict_host_key_checking", strict_host_key_checking)
                .finish(),
        }
    }
}

impl Auth {
    /// The URL git should talk to.
    ///
    /// For HTTPS credentials the username and token are embedded
    /// (percent-encoded) into `url`; every other variant returns `url` as-is.
    pub fn remote_url(&self, url: &str) -> Result<String, ConfigError> {
        let Auth::Https { username, token } = self else {
            return Ok(url.to_string());
        };

        let mut parsed = Url::parse(url)
            .map_err(|e| ConfigError::invalid("auth", format!("invalid remote url '{url}': {e}")))?;
        if !matches!(parsed.scheme(), "https" | "http") {
            return Err(ConfigError::invalid(
                "auth",
                format!("https credentials need an http(s) url, got '{url}'"),
            ));
        }
        parsed
            .set_username(username)
            .map_err(|()| ConfigError::invalid("auth", format!("cannot embed username into '{url}'")))?;
        parsed
            .set_password(Some(token))
            .map_err(|()| ConfigError::invalid("auth", format!("cannot embed token into '{url}'")))?;
        Ok(parsed.into())
    }
}

// ---------------------------------------------------------------------------
// Configuration structs
// ---------------------------------------------------------------------------

/// One watched repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub name: RepoName,
    pub url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default)]
    pub auth: Auth,
    /// Local working copy. Holds `.git/` and the last-built marker.
    pub clone_dir: PathBuf,
    /// Where build commands run and artifacts are looked up.
    /// Relative values are resolved against `clone_dir`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_dir: Option<PathBuf>,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub build_cmd: Vec<CommandSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_cmd: Option<CommandSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_name: Option<String>,
}

impl RepositoryConfig {
    /// Absolute-or-as-configured directory the build runs in.
    pub fn source_path(&self) -> PathBuf {
        match &self.source_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => self.clone_dir.join(dir),
            None => self.clone_dir.clone(),
        }
    }

    /// Canonical artifact name; defaults to the repository name.
    pub fn artifact(&self) -> &str {
        self.artifact_name.as_deref().unwrap_or(&self.name.0)
    }

    /// `<clone_dir>/.git` — its existence means the repository is cloned.
    pub fn git_dir(&self) -> PathBuf {
        self.clone_dir.join(".git")
    }
}

/// The daemon's own source checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfUpdateConfig {
    #[serde(default)]
    pub enable: bool,
    pub url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default)]
    pub auth: Auth,
    pub clone_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_dir: Option<PathBuf>,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub build_cmd: Vec<CommandSpec>,
    /// Defaults to the running executable's file name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_name: Option<String>,
    #[serde(default = "default_true")]
    pub run_on_startup: bool,
}

impl SelfUpdateConfig {
    /// Name used in logs for the self-update pipeline.
    pub const NAME: &'static str = "self-update";

    /// View this section as a repository so it can share the sync and build
    /// pipeline. A self-update never runs a restart command.
    pub fn as_repository(&self, default_artifact: &str) -> RepositoryConfig {
        RepositoryConfig {
            name: RepoName::from(Self::NAME),
            url: self.url.clone(),
            branch: self.branch.clone(),
            auth: self.auth.clone(),
            clone_dir: self.clone_dir.clone(),
            source_dir: self.source_dir.clone(),
            output_dir: self.output_dir.clone(),
            build_cmd: self.build_cmd.clone(),
            restart_cmd: None,
            artifact_name: Some(
                self.artifact_name
                    .clone()
                    .unwrap_or_else(|| default_artifact.to_string()),
            ),
        }
    }
}

/// Root of the YAML configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default = "default_interval")]
    pub interval_minutes: i64,
    #[serde(default)]
    pub repos: Vec<RepositoryConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_update: Option<SelfUpdateConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
            repos: Vec::new(),
            self_update: None,
        }
    }
}

impl Config {
    /// Time between polling ticks.
    pub fn interval(&self) -> Duration {
        let minutes = if self.interval_minutes > 0 {
            self.interval_minutes.min(MAX_INTERVAL_MINUTES)
        } else {
            DEFAULT_INTERVAL_MINUTES
        };
        Duration::from_secs(minutes as u64 * 60)
    }

    /// Look up a repository by name.
    pub fn repo(&self, name: &str) -> Option<&RepositoryConfig> {
        self.repos.iter().find(|r| r.name.0 == name)
    }

    /// The self-update section, only when it is enabled.
    pub fn enabled_self_update(&self) -> Option<&SelfUpdateConfig> {
        self.self_update.as_ref().filter(|su| su.enable)
    }
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_interval() -> i64 {
    DEFAULT_INTERVAL_MINUTES
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
