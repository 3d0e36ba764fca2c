pub mod build;
pub mod check;
pub mod run;
pub mod status;

use std::path::Path;

use anyhow::{Context, Result};

use autobuild_core::{config, Config};

/// Load and validate the configuration, naming the file on failure.
pub(crate) fn load_config(path: &Path) -> Result<Config> {
    config::load_at(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

/// Install the tracing subscriber configured in `config`.
pub(crate) fn init_logging(config: &Config) {
    autobuild_daemon::init_tracing(&config.log_level, config.log_format);
}
