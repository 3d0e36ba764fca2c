//! `autobuild build` — one sync/check/build cycle for a named repository.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use autobuild_sync::{git, process, ProcessMode, RepoOutcome};

use super::{init_logging, load_config};

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Repository name as configured under `repos`.
    pub name: String,

    /// Rebuild even if the last built commit matches upstream.
    #[arg(long)]
    pub force: bool,
}

impl BuildArgs {
    pub fn run(self, config_path: &Path) -> Result<()> {
        let config = load_config(config_path)?;
        init_logging(&config);

        let repo = config.repo(&self.name).with_context(|| {
            let known: Vec<_> = config.repos.iter().map(|r| r.name.0.as_str()).collect();
            format!(
                "unknown repository '{}' (configured: {})",
                self.name,
                if known.is_empty() {
                    "none".to_string()
                } else {
                    known.join(", ")
                }
            )
        })?;

        let mode = if self.force {
            ProcessMode::Force
        } else {
            ProcessMode::IfChanged
        };
        let outcome =
            process(repo, mode).with_context(|| format!("build failed for '{}'", self.name))?;

        match outcome {
            RepoOutcome::UpToDate { commit } => {
                println!("✓ '{}' up to date at {}", self.name, git::short(&commit));
            }
            RepoOutcome::Built {
                commit,
                destination,
            } => {
                println!(
                    "✓ '{}' built {} -> {}",
                    self.name,
                    git::short(&commit),
                    destination.display()
                );
            }
        }
        Ok(())
    }
}
