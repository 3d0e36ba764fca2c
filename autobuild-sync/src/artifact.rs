//! Artifact discovery.
//!
//! Two mutually exclusive policies decide what a build produced:
//!
//! - **Web assets**: a `package.json` at the source root means the build
//!   output is the `dist/` tree.
//! - **Binary**: otherwise the immediate regular files of the source directory
//!   are scanned for executables and one of them is chosen.
//!
//! Manifest probing follows the same "indicator file at the root" approach as
//! stack detection: the first match decides, nothing is parsed.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{build_io_err, BuildError};

/// Indicator file for the web-asset policy.
pub const PACKAGE_MANIFEST: &str = "package.json";

/// Directory a web build is expected to emit.
pub const WEB_OUTPUT_DIR: &str = "dist";

/// Which discovery policy applies to a source tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactPolicy {
    WebAssets,
    Binary,
}

/// What was found after a successful build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Artifact {
    /// A directory whose contents are copied into the output directory.
    AssetTree { dir: PathBuf },
    /// A single executable, already carrying its canonical name.
    Binary { path: PathBuf },
}

/// Pick the policy for `source`.
pub fn policy_for(source: &Path) -> ArtifactPolicy {
    if source.join(PACKAGE_MANIFEST).is_file() {
        ArtifactPolicy::WebAssets
    } else {
        ArtifactPolicy::Binary
    }
}

/// Find the artifact in `source`. `artifact_name` is only used for binaries.
pub fn locate(source: &Path, artifact_name: &str) -> Result<Artifact, BuildError> {
    match policy_for(source) {
        ArtifactPolicy::WebAssets => Ok(Artifact::AssetTree {
            dir: locate_asset_tree(source)?,
        }),
        ArtifactPolicy::Binary => Ok(Artifact::Binary {
            path: locate_binary(source, artifact_name)?,
        }),
    }
}

/// `<source>/dist`, which must exist and be a directory.
pub fn locate_asset_tree(source: &Path) -> Result<PathBuf, BuildError> {
    let dist = source.join(WEB_OUTPUT_DIR);
    if !dist.is_dir() {
        return Err(BuildError::MissingArtifact {
            dir: source.to_path_buf(),
            reason: format!("{PACKAGE_MANIFEST} present but no {WEB_OUTPUT_DIR}/ directory"),
        });
    }
    Ok(dist)
}

/// Executable regular files directly inside `dir`, sorted by path.
pub fn find_executables(dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
    let entries = std::fs::read_dir(dir).map_err(|e| build_io_err(dir, e))?;
    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| build_io_err(dir, e))?;
        let path = entry.path();
        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(err) => {
                tracing::warn!("skipping {}: {err}", path.display());
                continue;
            }
        };
        if meta.is_file() && is_executable(&path, &meta) {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
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

/// The file name a published binary carries. Windows gets `.exe` appended
/// when `name` has no extension.
pub fn canonical_binary_name(name: &str) -> String {
    if cfg!(windows) && Path::new(name).extension().is_none() {
        format!("{name}.exe")
    } else {
        name.to_string()
    }
}

/// Choose the binary to publish from `source`.
///
/// A single executable is renamed in place to the canonical name. With
/// several, the one already carrying the artifact name wins; otherwise the
/// result is [`BuildError::AmbiguousArtifact`].
pub fn locate_binary(source: &Path, artifact_name: &str) -> Result<PathBuf, BuildError> {
    let mut found = find_executables(source)?;
    let canonical = canonical_binary_name(artifact_name);

    match found.len() {
        0 => Err(BuildError::MissingArtifact {
            dir: source.to_path_buf(),
            reason: "no executable file found".to_string(),
        }),
        1 => {
            let path = found.remove(0);
            if file_name(&path) == canonical {
                return Ok(path);
            }
            let renamed = source.join(&canonical);
            tracing::info!(
                "renaming built binary {} -> {}",
                path.display(),
                renamed.display()
            );
            std::fs::rename(&path, &renamed).map_err(|e| build_io_err(&renamed, e))?;
            Ok(renamed)
        }
        _ => {
            if let Some(hit) = found
                .iter()
                .find(|p| file_name(p) == artifact_name || file_name(p) == canonical)
            {
                return Ok(hit.clone());
            }
            Err(BuildError::AmbiguousArtifact {
                dir: source.to_path_buf(),
                expected: artifact_name.to_string(),
                candidates: found.iter().map(|p| file_name(p)).collect(),
            })
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
