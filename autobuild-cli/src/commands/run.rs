//! `autobuild run` — the polling daemon.

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Args;

use autobuild_daemon::{once_blocking, start_blocking};

use super::{init_logging, load_config};

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Run a single tick and exit instead of polling.
    #[arg(long)]
    pub once: bool,
}

impl RunArgs {
    pub fn run(self, config_path: &Path) -> Result<()> {
        let config = load_config(config_path)?;
        init_logging(&config);

        if !self.once {
            return start_blocking(config).context("scheduler exited with error");
        }

        let summary = once_blocking(config).context("tick failed")?;
        let failures = summary.failures();
        if failures > 0 {
            bail!(
                "{failures} of {} repositories failed",
                summary.repos.len()
            );
        }
        Ok(())
    }
}
