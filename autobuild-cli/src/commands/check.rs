//! `autobuild check` — validate the configuration without touching anything.

use std::path::Path;

use anyhow::Result;
use clap::Args;

use autobuild_core::Auth;

use super::load_config;

#[derive(Args, Debug)]
pub struct CheckArgs {}

impl CheckArgs {
    pub fn run(self, config_path: &Path) -> Result<()> {
        let config = load_config(config_path)?;

        println!(
            "✓ {} is valid ({} repositories, every {} min)",
            config_path.display(),
            config.repos.len(),
            config.interval().as_secs() / 60
        );
        for repo in &config.repos {
            println!(
                "  - {} [{}] {} auth, {} build step(s) -> {}",
                repo.name,
                repo.branch,
                auth_label(&repo.auth),
                repo.build_cmd.len(),
                repo.output_dir.display()
            );
        }
        match config.enabled_self_update() {
            Some(su) => println!(
                "  self-update: enabled [{}] -> {}",
                su.branch,
                su.output_dir.display()
            ),
            None => println!("  self-update: disabled"),
        }
        Ok(())
    }
}

fn auth_label(auth: &Auth) -> &'static str {
    match auth {
        Auth::None => "no",
        Auth::Https { .. } => "https",
        Auth::Ssh { .. } => "ssh",
    }
}
