//! Build & publish.
//!
//! ## `build_and_publish` — 5 steps
//!
//! 1. Create the output directory.
//! 2. Run the configured build steps in order inside the source path.
//! 3. Locate the artifact (see [`crate::artifact`]).
//! 4. Copy it into the output directory.
//! 5. Run the restart command, if any, and report how it went.
//!
//! A failure in steps 1-4 aborts and leaves the previous artifact (and the
//! marker) alone. A failed restart does not undo the publish.

use std::path::{Path, PathBuf};

use autobuild_core::RepositoryConfig;

use crate::artifact::{self, Artifact};
use crate::error::{build_io_err, BuildError, RunError};
use crate::runner::Invocation;

/// Proof that an artifact has been copied into the output directory.
///
/// Only this module can construct one, which is what lets
/// [`crate::tracker::record_built`] demand it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedArtifact {
    artifact: Artifact,
    destination: PathBuf,
}

impl PublishedArtifact {
    /// What was found in the source tree.
    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    /// The published binary, or the output directory for an asset tree.
    pub fn destination(&self) -> &Path {
        &self.destination
    }
}

/// Result of the post-publish restart command.
#[derive(Debug)]
pub enum RestartOutcome {
    NotConfigured,
    Succeeded,
    Failed(RunError),
}

#[derive(Debug)]
pub struct PublishReport {
    pub published: PublishedArtifact,
    pub restart: RestartOutcome,
}

/// Build `cfg` from its current working copy and publish the artifact.
pub fn build_and_publish(cfg: &RepositoryConfig) -> Result<PublishReport, BuildError> {
    std::fs::create_dir_all(&cfg.output_dir).map_err(|e| build_io_err(&cfg.output_dir, e))?;

    let source = cfg.source_path();
    run_build_steps(cfg, &source)?;

    let artifact = artifact::locate(&source, cfg.artifact())?;
    let published = publish(artifact, &cfg.output_dir)?;
    tracing::info!(
        "[{}] published {}",
        cfg.name,
        published.destination().display()
    );

    let restart = restart(cfg);
    Ok(PublishReport { published, restart })
}

/// Run every build step with `source` as cwd, stopping at the first failure.
pub fn run_build_steps(cfg: &RepositoryConfig, source: &Path) -> Result<(), BuildError> {
    for (index, spec) in cfg.build_cmd.iter().enumerate() {
        let step = index + 1;
        tracing::info!("[{}] build step {step}: {spec}", cfg.name);
        Invocation::from_spec(spec)
            .current_dir(source)
            .run()
            .map_err(|source| BuildError::Step {
                step,
                command: spec.to_string(),
                source,
            })?;
    }
    Ok(())
}

fn publish(artifact: Artifact, output_dir: &Path) -> Result<PublishedArtifact, BuildError> {
    let destination = match &artifact {
        Artifact::AssetTree { dir } => {
            copy_dir(dir, output_dir)?;
            output_dir.to_path_buf()
        }
        Artifact::Binary { path } => {
            let name = path.file_name().ok_or_else(|| BuildError::MissingArtifact {
                dir: path.clone(),
                reason: "binary path has no file name".to_string(),
            })?;
            let destination = output_dir.join(name);
            publish_binary(path, &destination)?;
            destination
        }
    };
    Ok(PublishedArtifact {
        artifact,
        destination,
    })
}

/// Replace `dst` with a copy of `src` and mark it executable.
///
/// The old file is removed first so a running executable ("text file busy")
/// does not block the copy. If removal fails the copy is still attempted.
fn publish_binary(src: &Path, dst: &Path) -> Result<(), BuildError> {
    remove_existing(dst);
    std::fs::copy(src, dst).map_err(|source| BuildError::Publish {
        path: dst.to_path_buf(),
        source,
    })?;
    set_executable(dst)
}

fn remove_existing(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!("could not remove {}: {err}", path.display()),
    }
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<(), BuildError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).map_err(|source| {
        BuildError::Publish {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<(), BuildError> {
    Ok(())
}

/// Recursively copy the contents of `src` into `dst`.
fn copy_dir(src: &Path, dst: &Path) -> Result<(), BuildError> {
    std::fs::create_dir_all(dst).map_err(|source| BuildError::Publish {
        path: dst.to_path_buf(),
        source,
    })?;
    let entries = std::fs::read_dir(src).map_err(|e| build_io_err(src, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| build_io_err(src, e))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| build_io_err(&from, e))?;
        if file_type.is_dir() {
            copy_dir(&from, &to)?;
        } else {
            remove_existing(&to);
            std::fs::copy(&from, &to).map_err(|source| BuildError::Publish { path: to, source })?;
        }
    }
    Ok(())
}

fn restart(cfg: &RepositoryConfig) -> RestartOutcome {
    let Some(spec) = &cfg.restart_cmd else {
        return RestartOutcome::NotConfigured;
    };
    tracing::info!("[{}] restarting: {spec}", cfg.name);
    match Invocation::from_spec(spec).run() {
        Ok(()) => RestartOutcome::Succeeded,
        Err(err) => RestartOutcome::Failed(err),
    }
}
