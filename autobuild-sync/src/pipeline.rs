//! Per-repository orchestration, shared by the CLI and the daemon.
//!
//! ```text
//! UNSYNCED -> clone | fetch+fast-forward -> SYNCED
//! SYNCED   -> diverged? no  -> UP_TO_DATE
//!                       yes -> BUILDING
//! BUILDING -> ok   -> MARK_BUILT -> DONE
//!          -> fail -> FAILED (marker untouched)
//! ```
//!
//! A fresh clone skips the divergence check and goes straight to BUILDING.

use std::path::PathBuf;

use serde::Serialize;

use autobuild_core::{RepoName, RepositoryConfig};

use crate::build::{self, RestartOutcome};
use crate::error::ProcessError;
use crate::git::{self, SyncOutcome};
use crate::tracker::{self, Divergence};

/// Whether an unchanged repository is rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessMode {
    /// Build only when upstream moved past the marker.
    #[default]
    IfChanged,
    /// Build regardless of the marker.
    Force,
}

/// Successful end state of one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RepoOutcome {
    UpToDate { commit: String },
    Built { commit: String, destination: PathBuf },
}

impl RepoOutcome {
    /// One-word-ish summary for tick logs.
    pub fn label(&self) -> String {
        match self {
            RepoOutcome::UpToDate { .. } => "up-to-date".to_string(),
            RepoOutcome::Built { commit, .. } => format!("built {}", git::short(commit)),
        }
    }
}

/// Run one sync/check/build cycle for `cfg`.
pub fn process(cfg: &RepositoryConfig, mode: ProcessMode) -> Result<RepoOutcome, ProcessError> {
    let synced = git::ensure_synced(cfg).map_err(ProcessError::Sync)?;

    match (synced, mode) {
        (SyncOutcome::Cloned, _) => {
            tracing::info!("[{}] fresh clone, building", cfg.name);
        }
        (SyncOutcome::Updated, ProcessMode::Force) => {
            tracing::info!("[{}] forced build", cfg.name);
        }
        (SyncOutcome::Updated, ProcessMode::IfChanged) => {
            match tracker::has_diverged(cfg).map_err(ProcessError::DivergenceCheck)? {
                Divergence::UpToDate { commit } => {
                    tracing::info!("[{}] up to date at {}", cfg.name, git::short(&commit));
                    return Ok(RepoOutcome::UpToDate { commit });
                }
                diverged => tracing::info!("[{}] {diverged}, building", cfg.name),
            }
        }
    }

    let report = build::build_and_publish(cfg)?;
    let commit = tracker::record_built(cfg, &report.published).map_err(ProcessError::Record)?;

    match report.restart {
        RestartOutcome::Failed(source) => Err(ProcessError::Restart { commit, source }),
        RestartOutcome::NotConfigured | RestartOutcome::Succeeded => Ok(RepoOutcome::Built {
            commit,
            destination: report.published.destination().to_path_buf(),
        }),
    }
}

/// Process every repository in order. One failure never stops the rest.
pub fn process_all(
    repos: &[RepositoryConfig],
    mode: ProcessMode,
) -> Vec<(RepoName, Result<RepoOutcome, ProcessError>)> {
    repos
        .iter()
        .map(|cfg| (cfg.name.clone(), process(cfg, mode)))
        .collect()
}
