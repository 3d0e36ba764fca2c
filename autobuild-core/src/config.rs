//! YAML configuration loading.
//!
//! # Document layout
//!
//! ```text
//! log_level: info
//! interval_minutes: 5
//! repos:
//!   - name, url, branch, auth, clone_dir, source_dir, output_dir,
//!     build_cmd, restart_cmd, artifact_name
//! self_update:
//!   enable, url, branch, clone_dir, source_dir, output_dir, build_cmd, ...
//! ```
//!
//! # Path handling
//!
//! `~` is expanded with `dirs::home_dir()`. Relative `clone_dir`,
//! `output_dir` and `ssh_key` values are resolved against the directory that
//! holds the config file. `source_dir` stays relative to `clone_dir`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::types::{Auth, CommandSpec, Config, RepositoryConfig, SelfUpdateConfig, DEFAULT_BRANCH};

/// File name looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

// ---------------------------------------------------------------------------
// 1. Load
// ---------------------------------------------------------------------------

/// Load, normalise and validate the configuration at `path`.
///
/// Returns `ConfigError::Io` if the file cannot be read and
/// `ConfigError::Parse` (with path + line context) if the YAML is malformed.
pub fn load_at(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: Config = serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    let base = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    finish(config, base)
}

/// `load_at` convenience wrapper for `./config.yaml`.
pub fn load() -> Result<Config, ConfigError> {
    load_at(Path::new(DEFAULT_CONFIG_FILE))
}

/// Parse a YAML document that did not come from a file.
/// Relative paths are resolved against `base_dir`.
pub fn from_yaml_str(yaml: &str, base_dir: &Path) -> Result<Config, ConfigError> {
    let config: Config = serde_yaml::from_str(yaml)?;
    finish(config, base_dir)
}

fn finish(mut config: Config, base_dir: &Path) -> Result<Config, ConfigError> {
    normalize(&mut config, base_dir)?;
    validate(&config)?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// 2. Normalise
// ---------------------------------------------------------------------------

fn normalize(config: &mut Config, base_dir: &Path) -> Result<(), ConfigError> {
    if config.interval_minutes <= 0 {
        config.interval_minutes = crate::types::DEFAULT_INTERVAL_MINUTES;
    }

    for repo in &mut config.repos {
        if repo.branch.trim().is_empty() {
            repo.branch = DEFAULT_BRANCH.to_string();
        }
        repo.clone_dir = resolve_path(&repo.clone_dir, base_dir)?;
        repo.output_dir = resolve_path(&repo.output_dir, base_dir)?;
        if let Some(source) = &repo.source_dir {
            repo.source_dir = Some(expand_home(source)?);
        }
        normalize_auth(&mut repo.auth, base_dir)?;
    }

    if let Some(su) = &mut config.self_update {
        if su.branch.trim().is_empty() {
            su.branch = DEFAULT_BRANCH.to_string();
        }
        su.clone_dir = resolve_path(&su.clone_dir, base_dir)?;
        su.output_dir = resolve_path(&su.output_dir, base_dir)?;
        if let Some(source) = &su.source_dir {
            su.source_dir = Some(expand_home(source)?);
        }
        normalize_auth(&mut su.auth, base_dir)?;
    }
    Ok(())
}

fn normalize_auth(auth: &mut Auth, base_dir: &Path) -> Result<(), ConfigError> {
    if let Auth::Ssh { ssh_key, .. } = auth {
        if !ssh_key.as_os_str().is_empty() {
            *ssh_key = resolve_path(ssh_key, base_dir)?;
        }
    }
    Ok(())
}

/// Expand `~` and anchor relative paths at `base_dir`.
fn resolve_path(path: &Path, base_dir: &Path) -> Result<PathBuf, ConfigError> {
    let expanded = expand_home(path)?;
    if expanded.is_absolute() || expanded.as_os_str().is_empty() {
        Ok(expanded)
    } else {
        Ok(base_dir.join(expanded))
    }
}

fn expand_home(path: &Path) -> Result<PathBuf, ConfigError> {
    match path.strip_prefix("~") {
        Ok(rest) => {
            let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
            Ok(home.join(rest))
        }
        Err(_) => Ok(path.to_path_buf()),
    }
}

// ---------------------------------------------------------------------------
// 3. Validate
// ---------------------------------------------------------------------------

/// Reject configurations the daemon could only fail on at runtime.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for (index, repo) in config.repos.iter().enumerate() {
        let context = format!("repos[{index}] ({})", repo.name);
        validate_repo(repo, &context)?;
        if !seen.insert(repo.name.0.as_str()) {
            return Err(ConfigError::invalid(
                context,
                format!("duplicate repository name '{}'", repo.name),
            ));
        }
    }

    if let Some(su) = config.enabled_self_update() {
        validate_self_update(su)?;
    }
    Ok(())
}

fn validate_repo(repo: &RepositoryConfig, context: &str) -> Result<(), ConfigError> {
    if repo.name.0.trim().is_empty() {
        return Err(ConfigError::invalid(context, "name must not be empty"));
    }
    validate_remote(&repo.url, &repo.auth, context)?;
    validate_dirs(&repo.clone_dir, &repo.output_dir, context)?;
    validate_commands(&repo.build_cmd, context)?;
    if let Some(restart) = &repo.restart_cmd {
        if restart.is_empty() {
            return Err(ConfigError::invalid(context, "restart_cmd must not be empty"));
        }
    }
    if let Some(name) = &repo.artifact_name {
        validate_artifact_name(name, context)?;
    }
    Ok(())
}

fn validate_self_update(su: &SelfUpdateConfig) -> Result<(), ConfigError> {
    let context = SelfUpdateConfig::NAME;
    validate_remote(&su.url, &su.auth, context)?;
    validate_dirs(&su.clone_dir, &su.output_dir, context)?;
    validate_commands(&su.build_cmd, context)?;
    if let Some(name) = &su.artifact_name {
        validate_artifact_name(name, context)?;
    }
    Ok(())
}

fn validate_remote(url: &str, auth: &Auth, context: &str) -> Result<(), ConfigError> {
    if url.trim().is_empty() {
        return Err(ConfigError::invalid(context, "url must not be empty"));
    }
    match auth {
        Auth::None => Ok(()),
        Auth::Https { username, token } => {
            if username.trim().is_empty() || token.trim().is_empty() {
                return Err(ConfigError::invalid(
                    context,
                    "https auth requires both username and token",
                ));
            }
            auth.remote_url(url)
                .map(|_| ())
                .map_err(|e| match e {
                    ConfigError::Invalid { reason, .. } => ConfigError::invalid(context, reason),
                    other => other,
                })
        }
        Auth::Ssh { ssh_key, .. } => {
            if ssh_key.as_os_str().is_empty() {
                return Err(ConfigError::invalid(context, "ssh auth requires ssh_key"));
            }
            Ok(())
        }
    }
}

fn validate_dirs(clone_dir: &Path, output_dir: &Path, context: &str) -> Result<(), ConfigError> {
    if clone_dir.as_os_str().is_empty() {
        return Err(ConfigError::invalid(context, "clone_dir must not be empty"));
    }
    if output_dir.as_os_str().is_empty() {
        return Err(ConfigError::invalid(context, "output_dir must not be empty"));
    }
    Ok(())
}

fn validate_commands(commands: &[CommandSpec], context: &str) -> Result<(), ConfigError> {
    if let Some(index) = commands.iter().position(CommandSpec::is_empty) {
        return Err(ConfigError::invalid(
            context,
            format!("build_cmd[{index}] is empty"),
        ));
    }
    Ok(())
}

fn validate_artifact_name(name: &str, context: &str) -> Result<(), ConfigError> {
    if name.trim().is_empty() || matches!(name, "." | "..") || name.contains(['/', '\\']) {
        return Err(ConfigError::invalid(
            context,
            format!("artifact_name '{name}' must be a bare file name"),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
