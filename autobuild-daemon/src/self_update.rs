//! Self-update: rebuild the daemon from its own repository and replace the
//! running process with the new binary.
//!
//! The sync and build steps reuse the repository pipeline. Nothing about the
//! running process changes until [`HandOff::execute`], which is only reached
//! once the new binary has been checked on disk.

use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::time::Duration;

use autobuild_core::{RepositoryConfig, SelfUpdateConfig};
use autobuild_sync::artifact::Artifact;
use autobuild_sync::{build_and_publish, ensure_synced, git};

use crate::error::SelfUpdateError;

/// Pause before replacing the process so buffered log lines get out.
pub const FLUSH_DELAY: Duration = Duration::from_millis(500);

/// How long a spawned replacement must survive on platforms without `exec`.
pub const LAUNCH_GRACE: Duration = Duration::from_secs(1);

/// The only way [`self_update`] returns successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelfUpdateOutcome {
    UpToDate { commit: String },
}

/// What the self-update cycle decided, before anything irreversible.
#[derive(Debug)]
pub enum SelfUpdatePlan {
    UpToDate { commit: String },
    HandOff(HandOff),
}

/// A verified replacement binary, ready to take over the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandOff {
    binary: PathBuf,
    workdir: PathBuf,
}

impl HandOff {
    /// Check that `binary` exists, is a regular file and is executable.
    pub fn prepare(binary: &Path, workdir: &Path) -> Result<Self, SelfUpdateError> {
        let meta = match std::fs::metadata(binary) {
            Ok(meta) => meta,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(SelfUpdateError::NotFound {
                    path: binary.to_path_buf(),
                })
            }
            Err(source) => {
                return Err(SelfUpdateError::ResolvePath {
                    path: binary.to_path_buf(),
                    source,
                })
            }
        };
        if !meta.is_file() {
            return Err(SelfUpdateError::NotRegularFile {
                path: binary.to_path_buf(),
            });
        }
        if !is_executable(binary, &meta) {
            return Err(SelfUpdateError::NotExecutable {
                path: binary.to_path_buf(),
            });
        }
        Ok(Self {
            binary: binary.to_path_buf(),
            workdir: workdir.to_path_buf(),
        })
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Replace the current process with the new binary, forwarding the
    /// original arguments. Returns only on failure.
    #[cfg(unix)]
    pub fn execute(self) -> Result<Infallible, SelfUpdateError> {
        use std::os::unix::process::CommandExt;

        tracing::info!(binary = %self.binary.display(), "handing off to new binary");
        std::thread::sleep(FLUSH_DELAY);
        let source = std::process::Command::new(&self.binary)
            .args(std::env::args_os().skip(1))
            .current_dir(&self.workdir)
            .exec();
        Err(SelfUpdateError::Exec {
            path: self.binary,
            source,
        })
    }

    /// Start the new binary, make sure it survives its first second, then
    /// exit this process.
    #[cfg(not(unix))]
    pub fn execute(self) -> Result<Infallible, SelfUpdateError> {
        tracing::info!(binary = %self.binary.display(), "handing off to new binary");
        std::thread::sleep(FLUSH_DELAY);
        let mut child = std::process::Command::new(&self.binary)
            .args(std::env::args_os().skip(1))
            .current_dir(&self.workdir)
            .spawn()
            .map_err(|source| SelfUpdateError::Exec {
                path: self.binary.clone(),
                source,
            })?;
        std::thread::sleep(LAUNCH_GRACE);
        match child.try_wait() {
            Ok(None) => std::process::exit(0),
            Ok(Some(status)) if status.success() => std::process::exit(0),
            Ok(Some(status)) => Err(SelfUpdateError::ExitedEarly {
                path: self.binary,
                status: status.to_string(),
            }),
            Err(source) => Err(SelfUpdateError::Exec {
                path: self.binary,
                source,
            }),
        }
    }
}

#[cfg(unix)]
fn is_executable(_path: &Path, meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(path: &Path, _meta: &std::fs::Metadata) -> bool {
    path.extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("exe"))
}

/// File stem of the running executable, used when no artifact name is set.
pub fn current_artifact_name() -> Result<String, SelfUpdateError> {
    let exe = std::env::current_exe().map_err(SelfUpdateError::CurrentExe)?;
    exe.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .ok_or_else(|| {
            SelfUpdateError::CurrentExe(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} has no file name", exe.display()),
            ))
        })
}

/// Sync the self clone and, if it moved, build and verify the new binary.
pub fn plan(
    cfg: &SelfUpdateConfig,
    default_artifact: &str,
) -> Result<SelfUpdatePlan, SelfUpdateError> {
    let repo = cfg.as_repository(default_artifact);

    let before = if git::is_cloned(&repo) {
        best_effort_head(&repo, "pre-sync")
    } else {
        None
    };
    ensure_synced(&repo).map_err(SelfUpdateError::Sync)?;
    let after = best_effort_head(&repo, "post-sync");

    if let (Some(before), Some(after)) = (&before, &after) {
        if before == after {
            tracing::info!(commit = git::short(after), "self-update: already up to date");
            return Ok(SelfUpdatePlan::UpToDate {
                commit: after.clone(),
            });
        }
    }

    tracing::info!(
        from = before.as_deref().map(git::short).unwrap_or("none"),
        to = after.as_deref().map(git::short).unwrap_or("unknown"),
        "self-update: new commits, rebuilding"
    );
    let report = build_and_publish(&repo)?;
    let binary = match report.published.artifact() {
        Artifact::Binary { .. } => report.published.destination(),
        Artifact::AssetTree { .. } => {
            return Err(SelfUpdateError::NotABinary {
                path: report.published.destination().to_path_buf(),
            })
        }
    };
    let binary = std::fs::canonicalize(binary).map_err(|source| SelfUpdateError::ResolvePath {
        path: binary.to_path_buf(),
        source,
    })?;

    Ok(SelfUpdatePlan::HandOff(HandOff::prepare(
        &binary,
        &repo.output_dir,
    )?))
}

/// Run one self-update cycle. On success the process is replaced and this
/// function never returns; it returns `Ok` only when there is nothing to do.
pub fn self_update(cfg: &SelfUpdateConfig) -> Result<SelfUpdateOutcome, SelfUpdateError> {
    let default_artifact = current_artifact_name()?;
    match plan(cfg, &default_artifact)? {
        SelfUpdatePlan::UpToDate { commit } => Ok(SelfUpdateOutcome::UpToDate { commit }),
        SelfUpdatePlan::HandOff(hand_off) => match hand_off.execute() {
            Ok(never) => match never {},
            Err(err) => Err(err),
        },
    }
}

fn best_effort_head(repo: &RepositoryConfig, stage: &str) -> Option<String> {
    match git::head_commit(&repo.clone_dir) {
        Ok(commit) => Some(commit),
        Err(err) => {
            tracing::warn!(error = %err, stage, "self-update: cannot resolve HEAD");
            None
        }
    }
}
