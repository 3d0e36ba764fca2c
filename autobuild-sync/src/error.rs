//! Error types for autobuild-sync.

use std::path::PathBuf;

use thiserror::Error;

use autobuild_core::ConfigError;

/// Failure to run an external command.
#[derive(Debug, Error)]
pub enum RunError {
    /// The program could not be started at all (not found, not executable, ...).
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The program ran and exited unsuccessfully.
    #[error("`{command}` exited with {}{}", exit_label(.code), stderr_tail(.stderr))]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Errors from synchronising a working copy or reading/writing its marker.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Credentials could not be applied to the remote URL.
    #[error("auth error: {0}")]
    Auth(#[from] ConfigError),

    /// A git network or working-copy operation failed.
    #[error("git {action} failed: {source}")]
    Git {
        action: &'static str,
        #[source]
        source: RunError,
    },

    /// A revision could not be resolved to a commit.
    #[error("cannot resolve {rev}: {source}")]
    RevParse {
        rev: String,
        #[source]
        source: RunError,
    },

    /// `git rev-parse` succeeded but printed nothing.
    #[error("git rev-parse {rev} returned empty output")]
    EmptyRevision { rev: String },
}

/// Errors from the build & publish pipeline.
#[derive(Debug, Error)]
pub enum BuildError {
    /// An I/O error outside of the publish step (output dir, source scan, rename).
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A configured build command failed. `step` is 1-based.
    #[error("build step {step} (`{command}`) failed: {source}")]
    Step {
        step: usize,
        command: String,
        #[source]
        source: RunError,
    },

    /// The build claimed success but produced nothing publishable.
    #[error("missing artifact in {dir}: {reason}")]
    MissingArtifact { dir: PathBuf, reason: String },

    /// Several executables were produced and none carries the artifact name.
    #[error(
        "ambiguous artifact in {dir}: none of [{}] is named '{expected}'",
        .candidates.join(", ")
    )]
    AmbiguousArtifact {
        dir: PathBuf,
        expected: String,
        candidates: Vec<String>,
    },

    /// Copying into the output directory or setting permissions failed.
    #[error("failed to publish {path}: {source}")]
    Publish {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from one orchestration cycle of a repository.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("synchronization failed: {0}")]
    Sync(#[source] SyncError),

    #[error("divergence check failed: {0}")]
    DivergenceCheck(#[source] SyncError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("artifact published but marker not recorded: {0}")]
    Record(#[source] SyncError),

    /// The artifact was published and the marker recorded; only the restart failed.
    #[error("restart after building {commit} failed: {source}")]
    Restart {
        commit: String,
        #[source]
        source: RunError,
    },
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`BuildError::Io`].
pub(crate) fn build_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> BuildError {
    BuildError::Io {
        path: path.into(),
        source,
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

fn stderr_tail(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let last = trimmed.lines().last().unwrap_or(trimmed);
    format!(": {last}")
}
