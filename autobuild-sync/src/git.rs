//! Git working-copy synchronisation.
//!
//! [`ensure_synced`] clones a missing working copy or moves an existing one
//! to the fetched upstream tip. Authentication travels with each git
//! invocation through a [`GitTransport`]; no process-wide state is touched,
//! so repositories with different keys never interfere.

use std::fmt;
use std::path::Path;

use autobuild_core::{Auth, RepositoryConfig};

use crate::error::{io_err, RunError, SyncError};
use crate::runner::Invocation;

/// Environment variable git consults for the ssh command line.
pub const GIT_SSH_COMMAND: &str = "GIT_SSH_COMMAND";

/// Read by `sshpass -e`.
const SSHPASS: &str = "SSHPASS";

/// How the working copy got into shape this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// There was no working copy; a fresh clone was made.
    Cloned,
    /// An existing working copy was fetched and moved to the upstream tip.
    Updated,
}

/// Per-invocation transport settings derived from a repository's [`Auth`].
#[derive(Clone, Default, PartialEq, Eq)]
pub struct GitTransport {
    ssh_command: Option<String>,
    ssh_passphrase: Option<String>,
}

impl GitTransport {
    pub fn for_auth(auth: &Auth) -> Self {
        let Auth::Ssh {
            ssh_key,
            ssh_passphrase,
            strict_host_key_checking,
        } = auth
        else {
            return Self::default();
        };

        let mut command = format!(
            "ssh -i {} -o IdentitiesOnly=yes",
            shell_quote(&ssh_key.to_string_lossy())
        );
        if !strict_host_key_checking {
            command.push_str(" -o StrictHostKeyChecking=no");
        }
        let passphrase = ssh_passphrase.clone().filter(|p| !p.is_empty());
        if passphrase.is_some() {
            command = format!("sshpass -e -P passphrase {command}");
        }

        Self {
            ssh_command: Some(command),
            ssh_passphrase: passphrase,
        }
    }

    /// The `GIT_SSH_COMMAND` value, if this transport uses ssh.
    pub fn ssh_command(&self) -> Option<&str> {
        self.ssh_command.as_deref()
    }

    /// Attach this transport to one git invocation.
    pub fn apply(&self, invocation: Invocation) -> Invocation {
        // Never block on an interactive credential prompt.
        let mut invocation = invocation.env("GIT_TERMINAL_PROMPT", "0");
        if let Some(command) = &self.ssh_command {
            invocation = invocation.env(GIT_SSH_COMMAND, command);
        }
        if let Some(passphrase) = &self.ssh_passphrase {
            invocation = invocation.env(SSHPASS, passphrase);
        }
        invocation
    }
}

impl fmt::Debug for GitTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitTransport")
            .field("ssh_command", &self.ssh_command)
            .field(
                "ssh_passphrase",
                &self.ssh_passphrase.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// `true` once `<clone_dir>/.git` exists.
pub fn is_cloned(cfg: &RepositoryConfig) -> bool {
    cfg.git_dir().exists()
}

/// Make sure `cfg.clone_dir` holds an up-to-date checkout of `cfg.branch`.
pub fn ensure_synced(cfg: &RepositoryConfig) -> Result<SyncOutcome, SyncError> {
    let transport = GitTransport::for_auth(&cfg.auth);
    let remote = cfg.auth.remote_url(&cfg.url)?;

    if !is_cloned(cfg) {
        clone(cfg, &remote, &transport)?;
        return Ok(SyncOutcome::Cloned);
    }

    if matches!(cfg.auth, Auth::Https { .. }) {
        // Re-embed credentials so rotated tokens are honoured without a re-clone.
        git_in(cfg, &transport)
            .args(["remote", "set-url", "origin"])
            .secret_arg(&remote)
            .output_text()
            .map_err(|source| SyncError::Git {
                action: "remote set-url",
                source,
            })?;
    }

    git_in(cfg, &transport)
        .args(["fetch", "origin", cfg.branch.as_str()])
        .run()
        .map_err(|source| SyncError::Git {
            action: "fetch",
            source,
        })?;

    follow_upstream(cfg, &transport)?;
    Ok(SyncOutcome::Updated)
}

/// Move the working copy to `refs/remotes/origin/<branch>`.
///
/// Fast-forwards when possible. When upstream history was rewritten (a
/// force-push, including one back to an ancestor) the working copy is reset
/// to the upstream tip, so `HEAD` always names the commit that was fetched.
fn follow_upstream(cfg: &RepositoryConfig, transport: &GitTransport) -> Result<(), SyncError> {
    let upstream = resolve(&cfg.clone_dir, &remote_tracking_ref(cfg))?;
    let head = head_commit(&cfg.clone_dir)?;
    if head == upstream {
        tracing::debug!("[{}] {} already at {}", cfg.name, cfg.branch, short(&head));
        return Ok(());
    }

    if is_ancestor(&cfg.clone_dir, &head, &upstream)? {
        git_in(cfg, transport)
            .args(["merge", "--ff-only", "--quiet"])
            .arg(&upstream)
            .run()
            .map_err(|source| SyncError::Git {
                action: "fast-forward",
                source,
            })?;
        tracing::debug!("[{}] fast-forwarded to {}", cfg.name, short(&upstream));
    } else {
        tracing::warn!(
            "[{}] upstream {} was rewritten ({} is not an ancestor of {}); resetting",
            cfg.name,
            cfg.branch,
            short(&head),
            short(&upstream)
        );
        git_in(cfg, transport)
            .args(["reset", "--hard", "--quiet"])
            .arg(&upstream)
            .run()
            .map_err(|source| SyncError::Git {
                action: "reset",
                source,
            })?;
    }
    Ok(())
}

/// `true` if `ancestor` is reachable from `descendant` in `dir`.
pub fn is_ancestor(dir: &Path, ancestor: &str, descendant: &str) -> Result<bool, SyncError> {
    let result = Invocation::git()
        .args(["merge-base", "--is-ancestor", ancestor, descendant])
        .current_dir(dir)
        .output_text();
    match result {
        Ok(_) => Ok(true),
        Err(RunError::Failed { code: Some(1), .. }) => Ok(false),
        Err(source) => Err(SyncError::Git {
            action: "merge-base",
            source,
        }),
    }
}

fn clone(cfg: &RepositoryConfig, remote: &str, transport: &GitTransport) -> Result<(), SyncError> {
    std::fs::create_dir_all(&cfg.clone_dir).map_err(|e| io_err(&cfg.clone_dir, e))?;
    tracing::info!(
        "[{}] cloning branch {} into {}",
        cfg.name,
        cfg.branch,
        cfg.clone_dir.display()
    );
    git_in(cfg, transport)
        .args(["clone", "--branch", cfg.branch.as_str()])
        .secret_arg(remote)
        .arg(".")
        .run()
        .map_err(|source| SyncError::Git {
            action: "clone",
            source,
        })
}

fn git_in(cfg: &RepositoryConfig, transport: &GitTransport) -> Invocation {
    transport.apply(Invocation::git().current_dir(&cfg.clone_dir))
}

/// Resolve `rev` to a full commit hash inside `dir`.
pub fn resolve(dir: &Path, rev: &str) -> Result<String, SyncError> {
    let commit = Invocation::git()
        .args(["rev-parse", "--verify", "--quiet"])
        .arg(format!("{rev}^{{commit}}"))
        .current_dir(dir)
        .output_text()
        .map_err(|source| SyncError::RevParse {
            rev: rev.to_string(),
            source,
        })?;
    if commit.is_empty() {
        return Err(SyncError::EmptyRevision {
            rev: rev.to_string(),
        });
    }
    Ok(commit)
}

/// The commit currently checked out in `dir`.
pub fn head_commit(dir: &Path) -> Result<String, SyncError> {
    resolve(dir, "HEAD")
}

/// `refs/remotes/origin/<branch>` for this repository.
pub fn remote_tracking_ref(cfg: &RepositoryConfig) -> String {
    format!("refs/remotes/origin/{}", cfg.branch)
}

/// Abbreviated hash for log lines.
pub fn short(commit: &str) -> &str {
    commit.get(..12).unwrap_or(commit)
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
