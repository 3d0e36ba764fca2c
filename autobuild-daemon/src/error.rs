use std::path::PathBuf;

use thiserror::Error;

use autobuild_sync::{BuildError, SyncError};

/// Error surface for the scheduler runtime.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{task} task join failure: {message}")]
    Join { task: &'static str, message: String },

    #[error("ctrl-c handler failed: {0}")]
    Signal(#[source] std::io::Error),
}

/// Failures of the self-update pipeline. None of them touch the running
/// binary; the daemon keeps going on the old version.
#[derive(Debug, Error)]
pub enum SelfUpdateError {
    #[error("cannot determine the running executable: {0}")]
    CurrentExe(#[source] std::io::Error),

    #[error("synchronization failed: {0}")]
    Sync(#[source] SyncError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("self-update produced an asset tree at {path}, not an executable")]
    NotABinary { path: PathBuf },

    #[error("cannot resolve artifact path {path}: {source}")]
    ResolvePath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("new binary {path} does not exist")]
    NotFound { path: PathBuf },

    #[error("new binary {path} is not a regular file")]
    NotRegularFile { path: PathBuf },

    #[error("new binary {path} is not executable")]
    NotExecutable { path: PathBuf },

    #[error("failed to exec {path}: {source}")]
    Exec {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("new binary {path} exited right after launch ({status})")]
    ExitedEarly { path: PathBuf, status: String },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
