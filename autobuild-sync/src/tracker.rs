//! Last-built marker and divergence detection.
//!
//! Persists the hash of the commit a repository was last successfully built
//! at as plain text in `<clone_dir>/.last_commit`. Writes use the atomic
//! `.tmp` + rename pattern, so a crash leaves either the old or the new hash.
//!
//! The remote-tracking ref is the source of truth: a repository has diverged
//! when its marker is missing or differs from `refs/remotes/origin/<branch>`.
//! If that ref cannot be resolved the marker is compared with local `HEAD`.

use std::fmt;
use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use autobuild_core::RepositoryConfig;

use crate::build::PublishedArtifact;
use crate::error::{io_err, SyncError};
use crate::git;

/// Marker file name inside the clone directory.
pub const MARKER_FILE: &str = ".last_commit";

/// The persisted last-built commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitMarker {
    pub commit: String,
    /// Modification time of the marker file, when the filesystem reports one.
    pub written_at: Option<DateTime<Utc>>,
}

/// Result of comparing the marker with upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Divergence {
    /// No marker: the repository was never built successfully.
    NeverBuilt { upstream: String },
    /// The marker points somewhere other than upstream.
    Changed { built: String, upstream: String },
    /// The marker matches upstream.
    UpToDate { commit: String },
}

impl Divergence {
    pub fn is_diverged(&self) -> bool {
        !matches!(self, Divergence::UpToDate { .. })
    }
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Divergence::NeverBuilt { upstream } => {
                write!(f, "never built, upstream at {}", git::short(upstream))
            }
            Divergence::Changed { built, upstream } => write!(
                f,
                "built {} but upstream is {}",
                git::short(built),
                git::short(upstream)
            ),
            Divergence::UpToDate { commit } => write!(f, "up to date at {}", git::short(commit)),
        }
    }
}

/// `<clone_dir>/.last_commit`
pub fn marker_path(cfg: &RepositoryConfig) -> PathBuf {
    cfg.clone_dir.join(MARKER_FILE)
}

/// Read the marker. Returns `None` if it does not exist or is empty.
pub fn read_marker(cfg: &RepositoryConfig) -> Result<Option<CommitMarker>, SyncError> {
    let path = marker_path(cfg);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_err(&path, err)),
    };
    let commit = contents.trim();
    if commit.is_empty() {
        return Ok(None);
    }
    let written_at = std::fs::metadata(&path)
        .and_then(|meta| meta.modified())
        .ok()
        .map(DateTime::<Utc>::from);
    Ok(Some(CommitMarker {
        commit: commit.to_string(),
        written_at,
    }))
}

/// Write the marker atomically: `<path>.tmp` then rename over `<path>`.
fn write_marker(cfg: &RepositoryConfig, commit: &str) -> Result<(), SyncError> {
    let path = marker_path(cfg);
    let tmp = path.with_file_name(format!("{MARKER_FILE}.tmp"));
    std::fs::write(&tmp, commit).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, &path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(&path, e));
    }
    Ok(())
}

/// Decide whether `cfg` needs a build. Call after the working copy is synced.
pub fn has_diverged(cfg: &RepositoryConfig) -> Result<Divergence, SyncError> {
    let upstream = match git::resolve(&cfg.clone_dir, &git::remote_tracking_ref(cfg)) {
        Ok(commit) => commit,
        Err(err) => {
            tracing::warn!(
                "[{}] remote-tracking ref unavailable ({err}); comparing marker with HEAD",
                cfg.name
            );
            git::head_commit(&cfg.clone_dir)?
        }
    };

    let divergence = match read_marker(cfg)? {
        None => Divergence::NeverBuilt { upstream },
        Some(marker) if marker.commit == upstream => Divergence::UpToDate { commit: upstream },
        Some(marker) => Divergence::Changed {
            built: marker.commit,
            upstream,
        },
    };
    tracing::debug!("[{}] {divergence}", cfg.name);
    Ok(divergence)
}

/// Advance the marker to the current `HEAD`.
///
/// Takes the [`PublishedArtifact`] as proof that the artifact built from
/// `HEAD` is already in the output directory.
pub fn record_built(
    cfg: &RepositoryConfig,
    published: &PublishedArtifact,
) -> Result<String, SyncError> {
    let head = git::head_commit(&cfg.clone_dir)?;
    write_marker(cfg, &head)?;
    tracing::info!(
        "[{}] recorded {} as built ({})",
        cfg.name,
        git::short(&head),
        published.destination().display()
    );
    Ok(head)
}

#[cfg(test)]
mod tests {
    use super::*;
    use autobuild_core::{Auth, RepoName};
    use tempfile::TempDir;

    fn repo_at(dir: &TempDir) -> RepositoryConfig {
        RepositoryConfig {
            name: RepoName::from("svc"),
            url: "unused".to_string(),
            branch: "main".to_string(),
            auth: Auth::None,
            clone_dir: dir.path().to_path_buf(),
            source_dir: None,
            output_dir: dir.path().join("out"),
            build_cmd: vec![],
            restart_cmd: None,
            artifact_name: None,
        }
    }

    #[test]
    fn missing_marker_reads_as_none() {
        let dir = TempDir::new().unwrap();
        assert_eq!(read_marker(&repo_at(&dir)).unwrap(), None);
    }

    #[test]
    fn blank_marker_reads_as_none() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(MARKER_FILE), "  \n").unwrap();
        assert_eq!(read_marker(&repo_at(&dir)).unwrap(), None);
    }

    #[test]
    fn marker_roundtrip_trims_and_timestamps() {
        let dir = TempDir::new().unwrap();
        let cfg = repo_at(&dir);
        write_marker(&cfg, "abc123").unwrap();
        let marker = read_marker(&cfg).unwrap().expect("marker");
        assert_eq!(marker.commit, "abc123");
        assert!(marker.written_at.is_some());
    }

    #[test]
    fn tmp_file_cleaned_up_after_write() {
        let dir = TempDir::new().unwrap();
        let cfg = repo_at(&dir);
        write_marker(&cfg, "abc123").unwrap();
        let tmp = dir.path().join(format!("{MARKER_FILE}.tmp"));
        assert!(!tmp.exists(), "tmp file should be removed after atomic rename");
    }

    #[test]
    fn divergence_outside_a_repository_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(has_diverged(&repo_at(&dir)).is_err());
    }

    #[test]
    fn only_up_to_date_is_not_diverged() {
        let up = Divergence::UpToDate {
            commit: "a".into(),
        };
        let never = Divergence::NeverBuilt {
            upstream: "a".into(),
        };
        let changed = Divergence::Changed {
            built: "a".into(),
            upstream: "b".into(),
        };
        assert!(!up.is_diverged());
        assert!(never.is_diverged());
        assert!(changed.is_diverged());
    }
}
